use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pack::PolicyError;

/// A product author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author name.
    pub name: String,
    /// Contact address.
    pub email: String,
}

/// What the installer does when a reboot is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebootAction {
    /// Never reboot.
    #[default]
    Ignore,
    /// Tell the user a reboot is needed.
    Notice,
    /// Ask whether to reboot.
    Ask,
    /// Always reboot.
    Always,
}

impl FromStr for RebootAction {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "notice" => Ok(Self::Notice),
            "ask" => Ok(Self::Ask),
            "always" => Ok(Self::Always),
            _ => Err(PolicyError::InvalidValue {
                attribute: "rebootaction",
                value: s.to_string(),
            }),
        }
    }
}

/// Product metadata from `<info>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Installation sub path.
    pub install_subpath: Option<String>,
    /// Product URL.
    pub url: Option<String>,
    /// Authors.
    pub authors: Vec<Author>,
    /// Required runtime version.
    pub runtime_version: Option<String>,
    /// A development kit (not only a runtime) is required.
    pub requires_jdk: bool,
    /// Download location for web installers.
    pub web_dir_url: Option<String>,
    /// Use pack200 compression for archives.
    pub pack200: bool,
    /// The installer must run with elevated privileges.
    pub privileged: bool,
    /// Condition for privileged execution.
    pub privileged_condition: Option<String>,
    /// The uninstaller must run with elevated privileges.
    pub privileged_uninstaller: bool,
    /// Reboot policy.
    pub reboot_action: RebootAction,
    /// Condition for the reboot policy.
    pub reboot_condition: Option<String>,
    /// Whether an uninstaller is written.
    pub write_uninstaller: bool,
    /// Uninstaller file name.
    pub uninstaller_name: Option<String>,
    /// Uninstaller target directory.
    pub uninstaller_path: Option<String>,
    /// Condition for writing the uninstaller.
    pub uninstaller_condition: Option<String>,
    /// Summary log file path.
    pub summary_log_path: Option<String>,
    /// Write installation information for later updates.
    pub write_installation_information: bool,
    /// Unpacker implementation class.
    pub unpacker_class: Option<String>,
}

/// Wizard look-and-feel preferences from `<guiprefs>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiPrefs {
    /// Window can be resized.
    pub resizable: bool,
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
    /// Look-and-feel name per OS family (last mapping wins).
    pub look_and_feel: BTreeMap<String, String>,
    /// Parameters per look-and-feel name.
    pub look_and_feel_params: BTreeMap<String, BTreeMap<String, String>>,
    /// Free-form modifiers.
    pub modifiers: BTreeMap<String, String>,
}

/// A condition that must hold before installation proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerRequirement {
    /// Condition id.
    pub condition: Option<String>,
    /// Message shown when the requirement fails.
    pub message: Option<String>,
}
