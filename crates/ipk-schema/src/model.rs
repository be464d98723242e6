use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::info::{GuiPrefs, Info, InstallerRequirement};
use crate::pack::Pack;
use crate::panel::Panel;
use crate::resource::{
    CustomJar, CustomListener, LangPack, NativeLibrary, NativeUninstallerLibrary, PackagingInfo,
};
use crate::variable::DynamicVariable;

/// A panel together with the archive that provides its implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEntry {
    /// The panel.
    pub panel: Panel,
    /// Panel archive, when one was located.
    pub archive: Option<PathBuf>,
}

/// Everything one compile produces.
///
/// Built up during a single compile and handed to the packager only once the
/// whole descriptor (including every ref-pack) has been processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerModel {
    /// Build-time properties.
    pub properties: BTreeMap<String, String>,
    /// Packager selection.
    pub packaging: PackagingInfo,
    /// Product metadata.
    pub info: Info,
    /// Wizard preferences.
    pub gui_prefs: GuiPrefs,
    /// Static install-time variables.
    pub variables: BTreeMap<String, String>,
    /// Dynamic variables by name, candidates in declaration order.
    pub dynamic_variables: BTreeMap<String, Vec<DynamicVariable>>,
    /// Conditions by id.
    pub conditions: BTreeMap<String, Condition>,
    /// Language packs.
    pub lang_packs: Vec<LangPack>,
    /// Finalized resources by id.
    pub resources: BTreeMap<String, PathBuf>,
    /// Native libraries.
    pub native_libraries: Vec<NativeLibrary>,
    /// Native libraries needed by the uninstaller.
    pub native_uninstaller_libraries: Vec<NativeUninstallerLibrary>,
    /// Archives merged into the installer.
    pub jar_contents: Vec<PathBuf>,
    /// Archives also copied into the uninstaller.
    pub custom_jars: Vec<CustomJar>,
    /// Install-time listeners.
    pub custom_listeners: Vec<CustomListener>,
    /// Wizard panels in order.
    pub panels: Vec<PanelEntry>,
    /// Packs in declaration order (ref-pack contributions inlined).
    pub packs: Vec<Pack>,
    /// Requirements checked before installation.
    pub installer_requirements: Vec<InstallerRequirement>,
}

impl InstallerModel {
    /// First pack with the given name.
    pub fn pack_named(&self, name: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.name == name)
    }

    /// First pack whose name or id equals `key`.
    pub fn find_pack(&self, key: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.name == key || p.id == key)
    }
}
