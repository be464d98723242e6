//! The packager sink and the hand-over of a finished model.
//!
//! The compiler never talks to the sink while it is still working. Once the
//! whole descriptor has been processed, [`commit`] replays the model into
//! the sink and asks it to create the installer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ipk_schema::{
    Condition, CustomJar, CustomListener, DynamicVariable, GuiPrefs, Info, InstallerModel,
    InstallerRequirement, NativeUninstallerLibrary, Pack, PackagingInfo, PanelEntry,
};

use crate::error::CompileError;

/// Properties the compiler owns. Sinks always receive the compiler's value
/// for these; every other property keeps a value the sink already holds.
pub const COMPILER_PROPERTIES: &[&str] = &["basedir", "descriptor.file"];

/// Error type sinks report.
pub type PackagerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the finished installer model.
///
/// Resource paths handed to the sink may point into the compile session's
/// temporary directory, which is removed after [`Packager::create_installer`]
/// returns. Sinks must read or copy them before then.
pub trait Packager {
    /// Set a property, replacing any value.
    fn set_property(&mut self, name: &str, value: &str);

    /// Add a property unless it is already set. Returns whether it was stored.
    fn add_property(&mut self, name: &str, value: &str) -> bool;

    /// Packager selection and options.
    fn configure(&mut self, packaging: &PackagingInfo) {
        let _ = packaging;
    }

    /// Product metadata.
    fn set_info(&mut self, info: &Info);

    /// Wizard preferences.
    fn set_gui_prefs(&mut self, prefs: &GuiPrefs);

    /// Static variables.
    fn set_variables(&mut self, variables: &BTreeMap<String, String>);

    /// Dynamic variables by name.
    fn set_dynamic_variables(&mut self, variables: &BTreeMap<String, Vec<DynamicVariable>>);

    /// Conditions by id.
    fn set_conditions(&mut self, conditions: &BTreeMap<String, Condition>);

    /// A finalized resource.
    fn add_resource(&mut self, id: &str, content: &Path) -> Result<(), PackagerError>;

    /// A language pack.
    fn add_lang_pack(&mut self, iso3: &str, xml: &Path, flag: &Path);

    /// An archive merged into the installer.
    fn add_jar_content(&mut self, archive: &Path);

    /// A native library.
    fn add_native_library(&mut self, name: &str, path: &Path);

    /// An archive also copied into the uninstaller.
    fn add_custom_jar(&mut self, jar: &CustomJar);

    /// A native library the uninstaller needs.
    fn add_native_uninstaller_library(&mut self, library: &NativeUninstallerLibrary);

    /// A wizard panel with the archive implementing it.
    fn add_panel_jar(&mut self, entry: &PanelEntry);

    /// An install-time listener.
    fn add_custom_listener(&mut self, listener: &CustomListener);

    /// A pack.
    fn add_pack(&mut self, pack: &Pack);

    /// All installer requirements in declaration order.
    fn add_installer_requirements(&mut self, requirements: &[InstallerRequirement]);

    /// Produce the installer.
    fn create_installer(&mut self) -> Result<(), PackagerError>;
}

/// Replay `model` into `sink` and create the installer.
pub fn commit(model: &InstallerModel, sink: &mut dyn Packager) -> Result<(), CompileError> {
    let fail = |source: PackagerError| CompileError::Packager { source };

    sink.configure(&model.packaging);
    for (name, value) in &model.properties {
        if COMPILER_PROPERTIES.contains(&name.as_str()) {
            sink.set_property(name, value);
        } else if !sink.add_property(name, value) {
            tracing::debug!(%name, "sink already defines property, keeping its value");
        }
    }
    sink.set_info(&model.info);
    sink.set_gui_prefs(&model.gui_prefs);
    sink.set_variables(&model.variables);
    sink.set_dynamic_variables(&model.dynamic_variables);
    sink.set_conditions(&model.conditions);
    for lang in &model.lang_packs {
        sink.add_lang_pack(&lang.iso3, &lang.xml, &lang.flag);
    }
    for (id, path) in &model.resources {
        sink.add_resource(id, path).map_err(fail)?;
    }
    for lib in &model.native_libraries {
        sink.add_native_library(&lib.name, &lib.path);
    }
    for lib in &model.native_uninstaller_libraries {
        sink.add_native_uninstaller_library(lib);
    }
    for jar in &model.jar_contents {
        sink.add_jar_content(jar);
    }
    for jar in &model.custom_jars {
        sink.add_custom_jar(jar);
    }
    for panel in &model.panels {
        sink.add_panel_jar(panel);
    }
    for listener in &model.custom_listeners {
        sink.add_custom_listener(listener);
    }
    for pack in &model.packs {
        sink.add_pack(pack);
    }
    sink.add_installer_requirements(&model.installer_requirements);

    tracing::info!(packs = model.packs.len(), resources = model.resources.len(), "creating installer");
    sink.create_installer().map_err(fail)
}

/// Sink that keeps everything in memory, reading resource content eagerly.
#[derive(Debug, Default)]
pub struct InMemoryPackager {
    /// Everything received, as a model.
    pub model: InstallerModel,
    /// Resource content by id.
    pub resource_content: BTreeMap<String, Vec<u8>>,
    /// Whether [`Packager::create_installer`] was called.
    pub created: bool,
}

impl Packager for InMemoryPackager {
    fn set_property(&mut self, name: &str, value: &str) {
        self.model.properties.insert(name.to_string(), value.to_string());
    }

    fn add_property(&mut self, name: &str, value: &str) -> bool {
        if self.model.properties.contains_key(name) {
            return false;
        }
        self.set_property(name, value);
        true
    }

    fn configure(&mut self, packaging: &PackagingInfo) {
        self.model.packaging = packaging.clone();
    }

    fn set_info(&mut self, info: &Info) {
        self.model.info = info.clone();
    }

    fn set_gui_prefs(&mut self, prefs: &GuiPrefs) {
        self.model.gui_prefs = prefs.clone();
    }

    fn set_variables(&mut self, variables: &BTreeMap<String, String>) {
        self.model.variables = variables.clone();
    }

    fn set_dynamic_variables(&mut self, variables: &BTreeMap<String, Vec<DynamicVariable>>) {
        self.model.dynamic_variables = variables.clone();
    }

    fn set_conditions(&mut self, conditions: &BTreeMap<String, Condition>) {
        self.model.conditions = conditions.clone();
    }

    fn add_resource(&mut self, id: &str, content: &Path) -> Result<(), PackagerError> {
        let bytes = std::fs::read(content)?;
        self.resource_content.insert(id.to_string(), bytes);
        self.model.resources.insert(id.to_string(), content.to_path_buf());
        Ok(())
    }

    fn add_lang_pack(&mut self, iso3: &str, xml: &Path, flag: &Path) {
        self.model.lang_packs.push(ipk_schema::LangPack {
            iso3: iso3.to_string(),
            xml: xml.to_path_buf(),
            flag: flag.to_path_buf(),
        });
    }

    fn add_jar_content(&mut self, archive: &Path) {
        self.model.jar_contents.push(archive.to_path_buf());
    }

    fn add_native_library(&mut self, name: &str, path: &Path) {
        self.model.native_libraries.push(ipk_schema::NativeLibrary {
            name: name.to_string(),
            path: PathBuf::from(path),
        });
    }

    fn add_custom_jar(&mut self, jar: &CustomJar) {
        self.model.custom_jars.push(jar.clone());
    }

    fn add_native_uninstaller_library(&mut self, library: &NativeUninstallerLibrary) {
        self.model.native_uninstaller_libraries.push(library.clone());
    }

    fn add_panel_jar(&mut self, entry: &PanelEntry) {
        self.model.panels.push(entry.clone());
    }

    fn add_custom_listener(&mut self, listener: &CustomListener) {
        self.model.custom_listeners.push(listener.clone());
    }

    fn add_pack(&mut self, pack: &Pack) {
        self.model.packs.push(pack.clone());
    }

    fn add_installer_requirements(&mut self, requirements: &[InstallerRequirement]) {
        self.model.installer_requirements.extend_from_slice(requirements);
    }

    fn create_installer(&mut self) -> Result<(), PackagerError> {
        self.created = true;
        Ok(())
    }
}
