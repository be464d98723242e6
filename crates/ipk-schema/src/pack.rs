//! Packs and the files, executables and parsables attached to them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::os::OsConstraint;

/// Extra per-file metadata contributed by build listeners.
pub type AdditionalData = BTreeMap<String, String>;

/// Errors raised when an enumerated descriptor keyword is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The value is not one of the accepted keywords for `attribute`.
    #[error("invalid value '{value}' for attribute \"{attribute}\"")]
    InvalidValue {
        /// Attribute (or element) the value was read from.
        attribute: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl PolicyError {
    fn invalid(attribute: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            attribute,
            value: value.to_string(),
        }
    }
}

/// Structural errors of a single pack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    /// A pack in an exclude group can never be required.
    #[error("pack '{pack}' is in excludeGroup '{group}' and therefore can not be required")]
    RequiredInExcludeGroup {
        /// Pack name.
        pack: String,
        /// The exclude group it belongs to.
        group: String,
    },
}

/// What to do when the target of a file already exists at install time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Always overwrite.
    AlwaysTrue,
    /// Never overwrite.
    AlwaysFalse,
    /// Ask, defaulting to overwrite.
    AskTrue,
    /// Ask, defaulting to keep.
    AskFalse,
    /// Overwrite when the packaged file is newer.
    #[default]
    Update,
}

impl FromStr for OverridePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Self::AlwaysTrue),
            "false" => Ok(Self::AlwaysFalse),
            "asktrue" => Ok(Self::AskTrue),
            "askfalse" => Ok(Self::AskFalse),
            "update" => Ok(Self::Update),
            _ => Err(PolicyError::invalid("override", s)),
        }
    }
}

/// Whether a file must be protected against in-use replacement.
///
/// Anything but [`BlockablePolicy::None`] only has an effect on Windows targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockablePolicy {
    /// No protection (default).
    #[default]
    None,
    /// Detect in-use files and defer replacement.
    Auto,
    /// Always defer replacement until reboot.
    Force,
}

impl FromStr for BlockablePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "auto" => Ok(Self::Auto),
            "force" => Ok(Self::Force),
            _ => Err(PolicyError::invalid("blockable", s)),
        }
    }
}

/// Placeholder syntax used when substituting variables into file content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionType {
    /// `${name}` and `$name`.
    #[default]
    Plain,
    /// Plain syntax, values escaped for key/value property files.
    JavaProperties,
    /// Plain syntax, values escaped as XML text.
    Xml,
    /// `%{name}` and `%name`.
    Shell,
    /// `@name@`.
    At,
    /// `@name@`, as used by Ant filter sets.
    Ant,
}

impl FromStr for SubstitutionType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "javaprop" => Ok(Self::JavaProperties),
            "xml" => Ok(Self::Xml),
            "shell" => Ok(Self::Shell),
            "at" => Ok(Self::At),
            "ant" => Ok(Self::Ant),
            _ => Err(PolicyError::invalid("type", s)),
        }
    }
}

/// A single entry of a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackFile {
    /// Absolute source path at build time (may be a temporary artifact).
    pub source: PathBuf,
    /// Install-time target path, `/`-separated.
    pub target: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// True when the entry is an (empty) directory.
    pub is_dir: bool,
    /// Source path relative to the base directory, kept for loose packs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_source: Option<String>,
    /// Target OS constraints.
    #[serde(default)]
    pub os: Vec<OsConstraint>,
    /// Conflict resolution for an existing target.
    pub override_policy: OverridePolicy,
    /// In-use replacement protection.
    pub blockable: BlockablePolicy,
    /// Listener-contributed metadata.
    #[serde(default)]
    pub additional: AdditionalData,
    /// Condition gating installation of this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A file whose content gets variables substituted at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsableFile {
    /// Target path of the file to parse.
    pub target: String,
    /// Placeholder syntax.
    pub substitution: SubstitutionType,
    /// Content encoding, when not UTF-8.
    pub encoding: Option<String>,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
    /// Optional condition id.
    pub condition: Option<String>,
}

/// When an executable runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    /// Never executed, only marked executable.
    #[default]
    Never,
    /// After the files are installed.
    PostInstall,
    /// During uninstallation.
    Uninstall,
}

/// How an executable is launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
    /// Native binary or script.
    #[default]
    Bin,
    /// Archive with a main class.
    Jar,
}

/// Reaction to a failing executable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Ask the user.
    #[default]
    Ask,
    /// Abort the installation.
    Abort,
    /// Warn and continue.
    Warn,
    /// Continue silently.
    Ignore,
}

/// A file to run (or mark executable) during installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableFile {
    /// Target path of the executable.
    pub target: String,
    /// When to execute it.
    pub stage: ExecutionStage,
    /// How to launch it.
    pub kind: ExecutableKind,
    /// Main class for [`ExecutableKind::Jar`].
    pub main_class: Option<String>,
    /// What to do on failure.
    pub on_failure: FailurePolicy,
    /// Keep the file after execution.
    pub keep: bool,
    /// Command line arguments.
    pub args: Vec<String>,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
    /// Optional condition id.
    pub condition: Option<String>,
}

/// Include/exclude patterns checked when updating an existing installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    /// Patterns of files to consider.
    pub includes: Vec<String>,
    /// Patterns of files to leave alone.
    pub excludes: Vec<String>,
    /// Raw `casesensitive` attribute, if given.
    pub case_sensitive: Option<String>,
}

/// A named, independently selectable unit of installable content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    /// Identifier; defaults to the name.
    pub id: String,
    /// Display name (grouping key, not necessarily unique).
    pub name: String,
    /// Description text.
    pub description: String,
    /// Always installed.
    pub required: bool,
    /// Mutual-exclusion group.
    pub exclude_group: Option<String>,
    /// Display group.
    pub group: Option<String>,
    /// Install groups this pack belongs to.
    pub install_groups: BTreeSet<String>,
    /// Parent pack id (packs form a forest).
    pub parent: Option<String>,
    /// Hidden from the selection UI.
    pub hidden: bool,
    /// Selected by default.
    pub preselected: bool,
    /// Condition gating the pack.
    pub condition: Option<String>,
    /// Files are referenced, not embedded.
    pub loose: bool,
    /// Files are removed by the uninstaller.
    pub uninstall: bool,
    /// Resource id of the pack image.
    pub image_id: Option<String>,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
    /// Names of packs this one depends on, in declaration order.
    pub dependencies: Vec<String>,
    /// Files, in declaration order.
    pub files: Vec<PackFile>,
    /// Executables.
    pub executables: Vec<ExecutableFile>,
    /// Parsable files.
    pub parsables: Vec<ParsableFile>,
    /// Validator class names.
    pub validators: Vec<String>,
    /// Update checks.
    pub update_checks: Vec<UpdateCheck>,
}

impl Pack {
    /// Create a pack with the preselection default derived from `exclude_group`.
    pub fn new(
        name: impl Into<String>,
        id: Option<String>,
        description: impl Into<String>,
        required: bool,
        exclude_group: Option<String>,
    ) -> Self {
        let name = name.into();
        let preselected = Self::default_preselected(exclude_group.as_deref());
        Self {
            id: id.unwrap_or_else(|| name.clone()),
            name,
            description: description.into(),
            required,
            exclude_group,
            preselected,
            uninstall: true,
            ..Self::default()
        }
    }

    /// Packs in an exclude group start deselected; all others start selected.
    pub fn default_preselected(exclude_group: Option<&str>) -> bool {
        exclude_group.is_none()
    }

    /// Check the invariants that hold for a pack on its own.
    pub fn validate_structure(&self) -> Result<(), PackError> {
        match (&self.exclude_group, self.required) {
            (Some(group), true) => Err(PackError::RequiredInExcludeGroup {
                pack: self.name.clone(),
                group: group.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Add every comma-separated token of `groups` to the install groups.
    pub fn add_install_groups(&mut self, groups: &str) {
        self.install_groups.extend(
            groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
        );
    }
}

impl fmt::Display for Pack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id == self.name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_accepts_exactly_five_keywords() {
        let accepted = ["true", "FALSE", "AskTrue", "askfalse", "Update"];
        for value in accepted {
            assert!(value.parse::<OverridePolicy>().is_ok(), "{value}");
        }
        for value in ["yes", "no", "", "always", "update "] {
            assert_eq!(
                value.parse::<OverridePolicy>(),
                Err(PolicyError::InvalidValue {
                    attribute: "override",
                    value: value.to_string()
                })
            );
        }
        assert_eq!(OverridePolicy::default(), OverridePolicy::Update);
    }

    #[test]
    fn test_blockable_parse() {
        assert_eq!("FORCE".parse(), Ok(BlockablePolicy::Force));
        assert_eq!("none".parse(), Ok(BlockablePolicy::None));
        assert!("sometimes".parse::<BlockablePolicy>().is_err());
    }

    #[test]
    fn test_preselection_default() {
        assert!(Pack::new("a", None, "", false, None).preselected);
        assert!(!Pack::new("b", None, "", false, Some("opt".into())).preselected);
    }

    #[test]
    fn test_id_defaults_to_name() {
        let pack = Pack::new("Core", None, "", true, None);
        assert_eq!(pack.id, "Core");
        let pack = Pack::new("Core", Some("core.id".into()), "", true, None);
        assert_eq!(pack.id, "core.id");
        assert_eq!(pack.to_string(), "Core (core.id)");
    }

    #[test]
    fn test_required_pack_in_exclude_group_is_rejected() {
        let pack = Pack::new("b", None, "", true, Some("opt".into()));
        assert!(matches!(
            pack.validate_structure(),
            Err(PackError::RequiredInExcludeGroup { .. })
        ));
    }

    #[test]
    fn test_install_groups_accumulate() {
        let mut pack = Pack::new("a", None, "", false, None);
        pack.add_install_groups("full, minimal");
        pack.add_install_groups("full,,dev");
        let groups: Vec<_> = pack.install_groups.iter().map(String::as_str).collect();
        assert_eq!(groups, ["dev", "full", "minimal"]);
    }
}
