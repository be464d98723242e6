//! Build listeners and the plugin loader that finds them.
//!
//! A listener is declared in the descriptor by class name, optionally with
//! the archive that ships it. The loader locates that archive, resolves the
//! declared name against the archive's own `.class` entries and asks the
//! [`PluginCatalog`] for an implementation registered under the resolved,
//! fully-qualified name. Names are only ever looked up inside the archive
//! they were declared with, so one plugin archive can not shadow another.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ipk_schema::{AdditionalData, InstallerModel, OsConstraint};

use crate::archive;
use crate::descriptor::{Descriptor, DescriptorNode, os_constraints};
use crate::error::{CompileError, Location};
use crate::paths;
use crate::properties::PropertyTable;
use crate::resources::{ResourceLocator, TempArtifacts};

/// Compile phases that listeners are notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `<packaging>`.
    LoadPackager,
    /// Property declarations and substitution.
    SubstituteProperties,
    /// `<variables>`.
    AddVariables,
    /// `<dynamicvariables>`.
    AddDynamicVariables,
    /// `<conditions>`.
    AddConditions,
    /// `<info>`.
    AddInfo,
    /// `<guiprefs>`.
    AddGuiPrefs,
    /// `<locale>`.
    AddLangpacks,
    /// `<resources>`.
    AddResources,
    /// `<native>`.
    AddNativeLibraries,
    /// `<jar>`.
    AddJars,
    /// `<panels>`.
    AddPanels,
    /// The whole pack graph.
    AddPacks,
    /// Packs of one descriptor (the main one or a ref-pack).
    AddPacksSingle,
    /// `<installerrequirements>`.
    AddInstallerRequirement,
}

impl Phase {
    /// Name reported to listeners.
    pub fn name(self) -> &'static str {
        match self {
            Self::LoadPackager => "loadPackager",
            Self::SubstituteProperties => "substituteProperties",
            Self::AddVariables => "addVariables",
            Self::AddDynamicVariables => "addDynamicVariables",
            Self::AddConditions => "addConditions",
            Self::AddInfo => "addInfo",
            Self::AddGuiPrefs => "addGUIPrefs",
            Self::AddLangpacks => "addLangpacks",
            Self::AddResources => "addResources",
            Self::AddNativeLibraries => "addNativeLibraries",
            Self::AddJars => "addJars",
            Self::AddPanels => "addPanels",
            Self::AddPacks => "addPacks",
            Self::AddPacksSingle => "addPacksSingle",
            Self::AddInstallerRequirement => "addInstallerRequirement",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a phase is starting or finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    /// Before the phase runs.
    Begin,
    /// After the phase ran.
    End,
}

/// Error type listeners report.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Observes the compile and contributes per-file metadata.
pub trait BuildListener {
    /// Called before and after each phase with the descriptor root being
    /// processed and the model built so far.
    fn notify(
        &mut self,
        phase: Phase,
        state: PhaseState,
        node: &DescriptorNode,
        model: &InstallerModel,
    );

    /// Revise the additional data of the file declared by `file`.
    ///
    /// Receives what earlier listeners produced (`None` for the first).
    fn revise_additional_data(
        &mut self,
        existing: Option<AdditionalData>,
        file: &DescriptorNode,
    ) -> Result<Option<AdditionalData>, ListenerError> {
        let _ = file;
        Ok(existing)
    }
}

/// Something the catalog can instantiate. Only plugins that are build
/// listeners can be declared as `compiler` listeners.
pub trait Plugin {
    /// This plugin as a build listener, if it is one.
    fn as_build_listener(self: Box<Self>) -> Option<Box<dyn BuildListener>>;
}

struct ListenerPlugin(Box<dyn BuildListener>);

impl Plugin for ListenerPlugin {
    fn as_build_listener(self: Box<Self>) -> Option<Box<dyn BuildListener>> {
        Some(self.0)
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Plugin implementations by fully-qualified name.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl PluginCatalog {
    /// Register an arbitrary plugin factory.
    pub fn register(
        &mut self,
        qualified_name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    ) {
        self.factories.insert(qualified_name.into(), Arc::new(factory));
    }

    /// Register a build listener factory.
    pub fn register_listener<L, F>(&mut self, qualified_name: impl Into<String>, factory: F)
    where
        L: BuildListener + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.register(qualified_name, move || {
            Box::new(ListenerPlugin(Box::new(factory()))) as Box<dyn Plugin>
        });
    }

    /// Fresh instance of the plugin registered as `qualified_name`.
    pub fn instantiate(&self, qualified_name: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(qualified_name).map(|f| f())
    }
}

/// A successfully loaded build listener.
pub struct LoadedListener {
    /// The instance.
    pub listener: Box<dyn BuildListener>,
    /// Resolved class name.
    pub qualified_name: String,
    /// Target OS constraints declared with it.
    pub os: Vec<OsConstraint>,
}

/// Locates plugin archives and instantiates listeners from them.
pub struct PluginLoader<'a> {
    /// Plugin implementations.
    pub catalog: &'a PluginCatalog,
    /// Resource lookup.
    pub locator: ResourceLocator<'a>,
    /// Extra directories searched for `<Class>.jar`.
    pub search_path: &'a [PathBuf],
    /// Session files.
    pub temp: &'a TempArtifacts,
}

impl PluginLoader<'_> {
    /// Find the archive of a custom action or listener class.
    ///
    /// Order: explicit `jar` (property-substituted), the conventional
    /// `bin/customActions/<Class>.jar`, then the search path.
    pub fn locate_archive(
        &self,
        jar: Option<&str>,
        class_name: &str,
        properties: &PropertyTable,
        at: &Location,
    ) -> Result<Option<PathBuf>, CompileError> {
        if let Some(jar) = jar {
            let jar = properties.substitute(jar);
            return self.locator.find_home(&jar, at, self.temp);
        }
        let conventional = paths::custom_action_jar(class_name);
        if let Some(found) = self.locator.find_home(&conventional, at, self.temp)? {
            return Ok(Some(found));
        }
        Ok(self
            .search_path
            .iter()
            .map(|dir| dir.join(format!("{class_name}.jar")))
            .find(|p| p.is_file()))
    }

    /// Load the build listener declared by the `compiler` attribute of `node`.
    ///
    /// Returns `Ok(None)` when the node declares no build listener.
    pub fn load_listener(
        &self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        properties: &PropertyTable,
    ) -> Result<Option<LoadedListener>, CompileError> {
        let Some(class_name) = node.attribute("compiler") else {
            return Ok(None);
        };
        let at = descriptor.at(node);
        let failure = |reason: String| CompileError::ListenerLoadFailure {
            at: at.clone(),
            class: class_name.to_string(),
            reason,
        };

        let archive = self
            .locate_archive(node.attribute("jar"), class_name, properties, &at)?
            .ok_or_else(|| failure("archive not found".into()))?;
        let entries = archive::list_files(&archive, &at)?;
        let qualified = archive::resolve_class_name(entries.iter().map(String::as_str), class_name, &at)?
            .ok_or_else(|| failure(format!("no such class in {}", archive.display())))?;
        let plugin = self
            .catalog
            .instantiate(&qualified)
            .ok_or_else(|| failure(format!("no implementation registered for {qualified}")))?;
        let listener = plugin
            .as_build_listener()
            .ok_or_else(|| failure(format!("{qualified} is not a build listener")))?;

        tracing::info!(class = %qualified, archive = %archive.display(), "loaded build listener");
        Ok(Some(LoadedListener {
            listener,
            qualified_name: qualified,
            os: os_constraints(node),
        }))
    }
}

/// Registered build listeners, in registration order.
#[derive(Default)]
pub struct Listeners {
    list: Vec<Box<dyn BuildListener>>,
}

impl Listeners {
    /// Append a listener.
    pub fn push(&mut self, listener: Box<dyn BuildListener>) {
        self.list.push(listener);
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Notify every listener.
    pub fn notify(
        &mut self,
        phase: Phase,
        state: PhaseState,
        node: &DescriptorNode,
        model: &InstallerModel,
    ) {
        for listener in &mut self.list {
            listener.notify(phase, state, node, model);
        }
    }

    /// Chain `revise_additional_data` through every listener.
    pub fn additional_data(
        &mut self,
        descriptor: &Descriptor,
        file: &DescriptorNode,
    ) -> Result<AdditionalData, CompileError> {
        let mut data = None;
        for listener in &mut self.list {
            data = listener
                .revise_additional_data(data, file)
                .map_err(|e| CompileError::ListenerHook {
                    at: descriptor.at(file),
                    message: e.to_string(),
                })?;
        }
        Ok(data.unwrap_or_default())
    }
}
