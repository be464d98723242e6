//! Compile errors and warnings.
//!
//! Every fatal condition aborts the whole compile and carries the location of
//! the descriptor element that caused it. Non-fatal anomalies are collected
//! as [`Warning`]s and the build proceeds.

use std::fmt;
use std::path::{Path, PathBuf};

use ipk_schema::PolicyError;
use thiserror::Error;

/// Where in which descriptor something happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Descriptor file, when compiling from disk.
    pub file: Option<PathBuf>,
    /// 1-based line of the element.
    pub line: Option<u32>,
}

impl Location {
    /// Location of an element at `line` in `file`.
    pub fn new(file: Option<&Path>, line: u32) -> Self {
        Self {
            file: file.map(Path::to_path_buf),
            line: Some(line),
        }
    }

    /// Location of a whole file.
    pub fn file(file: &Path) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            line: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{line}", file.display()),
            (Some(file), None) => write!(f, "{}", file.display()),
            (None, Some(line)) => write!(f, "<descriptor>:{line}"),
            (None, None) => write!(f, "<descriptor>"),
        }
    }
}

/// A fatal compile error.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Not an installation descriptor, or not well-formed XML.
    #[error("{at}: {message}")]
    MalformedDescriptor {
        /// Origin.
        at: Location,
        /// What is wrong.
        message: String,
    },

    /// The descriptor was written for another compiler version.
    #[error("{at}: the file version '{found}' is different from the compiler version '{expected}'")]
    VersionMismatch {
        /// Origin.
        at: Location,
        /// Version found in the descriptor.
        found: String,
        /// Version this compiler understands.
        expected: &'static str,
    },

    /// A mandatory attribute is absent.
    #[error("{at}: <{element}> requires attribute '{attribute}'")]
    MissingRequiredAttribute {
        /// Origin.
        at: Location,
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: String,
    },

    /// A mandatory child element (or content) is absent.
    #[error("{at}: <{element}> requires child <{child}>")]
    MissingRequiredChild {
        /// Origin.
        at: Location,
        /// Element name.
        element: String,
        /// Expected child.
        child: String,
    },

    /// An enumerated keyword was not recognised.
    #[error("{at}: {source}")]
    InvalidEnumValue {
        /// Origin.
        at: Location,
        /// Keyword parse failure.
        #[source]
        source: PolicyError,
    },

    /// A free-form value (integer, URL, yes/no) is malformed.
    #[error("{at}: {message}")]
    InvalidValue {
        /// Origin.
        at: Location,
        /// What is wrong.
        message: String,
    },

    /// A referenced resource or file does not exist.
    #[error("{at}: {what} not found: {}", path.display())]
    ResourceNotFound {
        /// Origin.
        at: Location,
        /// Kind of resource that was looked up.
        what: String,
        /// Path that was tried last.
        path: PathBuf,
    },

    /// A path exists but can not be used the way it is referenced.
    #[error("{at}: invalid path {}: {reason}", path.display())]
    InvalidPath {
        /// Origin.
        at: Location,
        /// The offending path.
        path: PathBuf,
        /// Why it is unusable.
        reason: String,
    },

    /// Pack declarations contradict each other.
    #[error("{at}: {message}")]
    StructuralConflict {
        /// Origin.
        at: Location,
        /// What conflicts.
        message: String,
    },

    /// A pack depends on a pack that was never assembled.
    #[error("{at}: pack '{pack}' depends on '{missing}', which does not exist")]
    DependencyUnresolved {
        /// Declaration of the dependent pack.
        at: Location,
        /// Dependent pack.
        pack: String,
        /// Missing dependency.
        missing: String,
    },

    /// Pack dependencies form a cycle.
    #[error("{at}: circular pack dependency: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// Declaration of the pack that closes the cycle.
        at: Location,
        /// Pack names along the cycle, first repeated last.
        cycle: Vec<String>,
    },

    /// A short class name matches an archive entry only when ignoring case.
    #[error("{at}: declared class name '{declared}' differs in case from archive entry '{found}'")]
    AmbiguousClassName {
        /// Origin.
        at: Location,
        /// Name from the descriptor.
        declared: String,
        /// Entry found in the archive.
        found: String,
    },

    /// A build listener could not be loaded.
    #[error("{at}: cannot load build listener '{class}': {reason}")]
    ListenerLoadFailure {
        /// Origin.
        at: Location,
        /// Declared class name.
        class: String,
        /// Why loading failed.
        reason: String,
    },

    /// A build listener's metadata hook failed.
    #[error("{at}: build listener failed: {message}")]
    ListenerHook {
        /// Origin (the file element being processed).
        at: Location,
        /// Listener message.
        message: String,
    },

    /// An archive could not be opened or read.
    #[error("{at}: cannot read archive {}: {source}", path.display())]
    ArchiveReadFailure {
        /// Origin.
        at: Location,
        /// Archive path.
        path: PathBuf,
        /// Underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The resource pipeline (re-encode, XML rewrite, substitution, merge) failed.
    #[error("{at}: resource '{id}': {message}")]
    ResourceTransform {
        /// Origin.
        at: Location,
        /// Resource id.
        id: String,
        /// What failed.
        message: String,
    },

    /// The packager sink rejected the finished model.
    #[error("packager failed: {source}")]
    Packager {
        /// Sink error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Filesystem failure.
    #[error("{at}: {context}: {source}")]
    Io {
        /// Origin.
        at: Location,
        /// What was being done.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Wrap an I/O error with its origin.
    pub fn io(at: Location, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            at,
            context: context.into(),
            source,
        }
    }

    /// Location of the failing element, when the error has one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::MalformedDescriptor { at, .. }
            | Self::VersionMismatch { at, .. }
            | Self::MissingRequiredAttribute { at, .. }
            | Self::MissingRequiredChild { at, .. }
            | Self::InvalidEnumValue { at, .. }
            | Self::InvalidValue { at, .. }
            | Self::ResourceNotFound { at, .. }
            | Self::InvalidPath { at, .. }
            | Self::StructuralConflict { at, .. }
            | Self::DependencyUnresolved { at, .. }
            | Self::DependencyCycle { at, .. }
            | Self::AmbiguousClassName { at, .. }
            | Self::ListenerLoadFailure { at, .. }
            | Self::ListenerHook { at, .. }
            | Self::ArchiveReadFailure { at, .. }
            | Self::ResourceTransform { at, .. }
            | Self::Io { at, .. } => Some(at),
            Self::Packager { .. } => None,
        }
    }
}

/// A non-fatal anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Origin.
    pub at: Location,
    /// Description.
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.at, self.message)
    }
}

/// Warnings collected during one compile.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record and log a warning.
    pub fn warn(&mut self, at: Location, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(location = %at, "{message}");
        self.warnings.push(Warning { at, message });
    }

    /// Warnings so far, in emission order.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Take ownership of the collected warnings.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
