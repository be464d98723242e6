//! Resources and the auxiliary archives bundled with an installer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::os::OsConstraint;

/// A finalized resource handed to the packager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource id (locale-indexed ids may repeat before merging).
    pub id: String,
    /// Location of the finalized content.
    pub path: PathBuf,
}

/// A language pack: translated strings plus a flag image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangPack {
    /// ISO3 language code.
    pub iso3: String,
    /// Strings resource.
    pub xml: PathBuf,
    /// Flag image.
    pub flag: PathBuf,
}

/// A native library made available to the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeLibrary {
    /// Library file name.
    pub name: String,
    /// Location of the library.
    pub path: PathBuf,
}

/// A native library that the uninstaller needs as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeUninstallerLibrary {
    /// Library file name.
    pub name: String,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
}

/// An archive whose content is also copied into the uninstaller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJar {
    /// Archive location.
    pub archive: PathBuf,
    /// File entries contained in the archive.
    pub contained_files: Vec<String>,
}

/// Which install-time runtime a listener hooks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// Runs inside the installer.
    Installer,
    /// Runs inside the uninstaller.
    Uninstaller,
}

/// An install-time listener declared in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomListener {
    /// Installer or uninstaller.
    pub kind: ListenerKind,
    /// Declared class name.
    pub class_name: String,
    /// Archive providing the listener, when one was found.
    pub archive: Option<PathBuf>,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
}

/// Packager selection from `<packaging>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingInfo {
    /// Packager implementation class.
    pub packager_class: Option<String>,
    /// Packager options, as canonical XML.
    pub options: Option<String>,
    /// Unpacker implementation class.
    pub unpacker_class: String,
}
