//! Packager that writes the installer model as a JSON manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ipk_core::{InMemoryPackager, Packager, PackagerError};
use ipk_schema::{
    Condition, CustomJar, CustomListener, DynamicVariable, GuiPrefs, Info, InstallerModel,
    InstallerRequirement, NativeUninstallerLibrary, Pack, PackagingInfo, PanelEntry,
};

/// Writes `manifest.json` and copies resources into `resources/` under an
/// output directory.
///
/// Resources are copied as they arrive because the compiler removes its
/// session files once the installer has been created.
#[derive(Debug)]
pub struct ManifestPackager {
    out_dir: PathBuf,
    inner: InMemoryPackager,
}

impl ManifestPackager {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            inner: InMemoryPackager::default(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join("manifest.json")
    }

    pub fn model(&self) -> &InstallerModel {
        &self.inner.model
    }
}

/// Resource ids may contain characters that are unsafe in file names.
fn file_name_for(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

impl Packager for ManifestPackager {
    fn set_property(&mut self, name: &str, value: &str) {
        self.inner.set_property(name, value);
    }

    fn add_property(&mut self, name: &str, value: &str) -> bool {
        self.inner.add_property(name, value)
    }

    fn configure(&mut self, packaging: &PackagingInfo) {
        self.inner.configure(packaging);
    }

    fn set_info(&mut self, info: &Info) {
        self.inner.set_info(info);
    }

    fn set_gui_prefs(&mut self, prefs: &GuiPrefs) {
        self.inner.set_gui_prefs(prefs);
    }

    fn set_variables(&mut self, variables: &BTreeMap<String, String>) {
        self.inner.set_variables(variables);
    }

    fn set_dynamic_variables(&mut self, variables: &BTreeMap<String, Vec<DynamicVariable>>) {
        self.inner.set_dynamic_variables(variables);
    }

    fn set_conditions(&mut self, conditions: &BTreeMap<String, Condition>) {
        self.inner.set_conditions(conditions);
    }

    fn add_resource(&mut self, id: &str, content: &Path) -> Result<(), PackagerError> {
        let dir = self.out_dir.join("resources");
        fs::create_dir_all(&dir)?;
        let copy = dir.join(file_name_for(id));
        fs::copy(content, &copy)?;
        tracing::debug!(id, path = %copy.display(), "resource copied");
        self.inner.model.resources.insert(id.to_string(), copy);
        Ok(())
    }

    fn add_lang_pack(&mut self, iso3: &str, xml: &Path, flag: &Path) {
        self.inner.add_lang_pack(iso3, xml, flag);
    }

    fn add_jar_content(&mut self, archive: &Path) {
        self.inner.add_jar_content(archive);
    }

    fn add_native_library(&mut self, name: &str, path: &Path) {
        self.inner.add_native_library(name, path);
    }

    fn add_custom_jar(&mut self, jar: &CustomJar) {
        self.inner.add_custom_jar(jar);
    }

    fn add_native_uninstaller_library(&mut self, library: &NativeUninstallerLibrary) {
        self.inner.add_native_uninstaller_library(library);
    }

    fn add_panel_jar(&mut self, entry: &PanelEntry) {
        self.inner.add_panel_jar(entry);
    }

    fn add_custom_listener(&mut self, listener: &CustomListener) {
        self.inner.add_custom_listener(listener);
    }

    fn add_pack(&mut self, pack: &Pack) {
        self.inner.add_pack(pack);
    }

    fn add_installer_requirements(&mut self, requirements: &[InstallerRequirement]) {
        self.inner.add_installer_requirements(requirements);
    }

    fn create_installer(&mut self) -> Result<(), PackagerError> {
        fs::create_dir_all(&self.out_dir)?;
        let json = serde_json::to_string_pretty(&self.inner.model)?;
        fs::write(self.manifest_path(), json)?;
        self.inner.create_installer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_for() {
        assert_eq!(file_name_for("LicencePanel.licence_eng"), "LicencePanel.licence_eng");
        assert_eq!(file_name_for("a/b:c"), "a_b_c");
    }

    #[test]
    fn test_writes_manifest_and_resources() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let licence = src.path().join("licence.txt");
        fs::write(&licence, "MIT").unwrap();

        let mut model = InstallerModel::default();
        model.resources.insert("LicencePanel.licence".into(), licence);
        model.packs.push(Pack::new("core", None, "Core files", true, None));

        let mut sink = ManifestPackager::new(out.path().join("bundle"));
        ipk_core::commit(&model, &mut sink).unwrap();
        drop(src);

        let copied = &sink.model().resources["LicencePanel.licence"];
        assert_eq!(fs::read_to_string(copied).unwrap(), "MIT");

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sink.manifest_path()).unwrap()).unwrap();
        assert_eq!(manifest["packs"][0]["name"], "core");
    }
}
