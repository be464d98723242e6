//! The compiler entry point.
//!
//! A compile reads one installation descriptor, runs every phase against a
//! fresh [`BuildContext`], and hands the finished model to a [`Packager`].
//! Nothing reaches the packager when any phase fails.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ipk_schema::{InstallerModel, PolicyError};

use crate::context::BuildContext;
use crate::descriptor::Descriptor;
use crate::error::{CompileError, Location, Warning};
use crate::listener::PluginCatalog;
use crate::packager::{Packager, commit};
use crate::paths;

/// Installer flavour being built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallerKind {
    /// Self-contained installer.
    #[default]
    Standard,
    /// Installer that downloads its packs from `<webdir>`.
    Web,
}

impl FromStr for InstallerKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "web" => Ok(Self::Web),
            _ => Err(PolicyError::InvalidValue {
                attribute: "kind",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Web => "web",
        })
    }
}

/// Everything a compile needs besides the descriptor itself.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Base directory relative project paths resolve against.
    pub basedir: PathBuf,
    /// Installer home holding compiler resources.
    pub home: Option<PathBuf>,
    /// Installer flavour.
    pub kind: InstallerKind,
    /// Properties defined before the descriptor's own, in order.
    pub properties: Vec<(String, String)>,
    /// Compiler resources by `/`-separated relative path, used when the
    /// home does not have them.
    pub embedded: BTreeMap<String, Vec<u8>>,
    /// Extra directories searched for listener archives.
    pub listener_search_path: Vec<PathBuf>,
    /// Available build listener implementations.
    pub catalog: PluginCatalog,
    /// Environment seen by `<property environment>`; the process
    /// environment when unset.
    pub environment: Option<Vec<(String, String)>>,
}

impl CompilerConfig {
    /// Configuration with the installer home taken from `IPK_HOME` or `~/.ipk`.
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            home: paths::try_ipk_home(),
            kind: InstallerKind::default(),
            properties: Vec::new(),
            embedded: BTreeMap::new(),
            listener_search_path: Vec::new(),
            catalog: PluginCatalog::default(),
            environment: None,
        }
    }

    /// Use `home` as the installer home.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Resolve compiler resources from embedded content only.
    pub fn without_home(mut self) -> Self {
        self.home = None;
        self
    }

    /// Build an installer of `kind`.
    pub fn with_kind(mut self, kind: InstallerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Define a property ahead of the descriptor. The first definition of a
    /// name wins.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    /// Provide the compiler resource at `rel` from memory.
    pub fn with_embedded(mut self, rel: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.embedded.insert(rel.into(), content.into());
        self
    }

    /// Also search `dir` for listener archives.
    pub fn with_listener_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.listener_search_path.push(dir.into());
        self
    }

    /// Listener implementations to instantiate from.
    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Environment for `<property environment>` instead of the process one.
    pub fn with_environment(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.environment = Some(vars.into_iter().collect());
        self
    }
}

/// Outcome of a successful compile.
#[derive(Debug)]
pub struct CompileReport {
    /// Non-fatal anomalies, in emission order.
    pub warnings: Vec<Warning>,
    /// The model handed to the packager.
    pub model: InstallerModel,
}

/// Compiles installation descriptors.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Compiler using `config` for every compile.
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the descriptor at `path` into `sink`.
    pub fn compile_file(
        &self,
        path: &Path,
        sink: &mut dyn Packager,
    ) -> Result<CompileReport, CompileError> {
        let basedir = self.resolve_basedir()?;
        let path = std::path::absolute(path)
            .map_err(|e| CompileError::io(Location::file(path), "resolving descriptor path", e))?;
        tracing::info!(descriptor = %path.display(), basedir = %basedir.display(), "compiling");
        let descriptor = Descriptor::load(&path)?;
        self.compile(&basedir, &descriptor, sink)
    }

    /// Compile descriptor text that has no file of its own.
    pub fn compile_str(
        &self,
        text: &str,
        sink: &mut dyn Packager,
    ) -> Result<CompileReport, CompileError> {
        let basedir = self.resolve_basedir()?;
        let descriptor = Descriptor::load_str(text, None)?;
        self.compile(&basedir, &descriptor, sink)
    }

    fn resolve_basedir(&self) -> Result<PathBuf, CompileError> {
        let at = Location::default();
        let basedir = std::path::absolute(&self.config.basedir)
            .map_err(|e| CompileError::io(at.clone(), "resolving base directory", e))?;
        if !basedir.is_dir() {
            return Err(CompileError::InvalidPath {
                at,
                path: basedir,
                reason: "base directory does not exist or is not a directory".into(),
            });
        }
        Ok(basedir)
    }

    fn compile(
        &self,
        basedir: &Path,
        descriptor: &Descriptor,
        sink: &mut dyn Packager,
    ) -> Result<CompileReport, CompileError> {
        let env = self
            .config
            .environment
            .clone()
            .unwrap_or_else(|| std::env::vars().collect());
        let mut ctx = BuildContext::new(&self.config, basedir, env)?;

        ctx.properties.set("basedir", basedir.to_string_lossy());
        if let Some(path) = &descriptor.path {
            ctx.properties.set("descriptor.file", path.to_string_lossy());
        }
        for (name, value) in &self.config.properties {
            ctx.properties.define(name.as_str(), value.as_str());
        }
        ctx.properties.define("uninstaller", paths::lib("uninstaller.jar"));
        ctx.properties.define("uninstaller-ext", paths::lib("uninstaller-ext.jar"));

        ctx.run(descriptor)?;
        commit(&ctx.model, sink)?;

        let warnings = ctx.diag.into_warnings();
        tracing::info!(
            packs = ctx.model.packs.len(),
            warnings = warnings.len(),
            "installer compiled"
        );
        Ok(CompileReport {
            warnings,
            model: ctx.model,
        })
    }
}
