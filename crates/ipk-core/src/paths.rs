use dirs::home_dir;
use std::path::PathBuf;

/// Environment variable overriding the installer home.
pub const HOME_ENV: &str = "IPK_HOME";

/// Returns the installer home (compiler resources), or None if the user's home cannot be resolved.
pub fn try_ipk_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var(HOME_ENV) {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".ipk"))
}

/// Panel archives: <home>/bin/panels/<Class>.jar
pub fn panel_jar(class_name: &str) -> String {
    format!("bin/panels/{class_name}.jar")
}

/// Custom action and listener archives: <home>/bin/customActions/<Class>.jar
pub fn custom_action_jar(class_name: &str) -> String {
    format!("bin/customActions/{class_name}.jar")
}

/// Native libraries: <home>/bin/native/<type>/<name>
pub fn native_library(kind: &str, name: &str) -> String {
    format!("bin/native/{kind}/{name}")
}

/// Installer strings of a language pack: <home>/bin/langpacks/installer/<iso3>.xml
pub fn langpack_strings(iso3: &str) -> String {
    format!("bin/langpacks/installer/{iso3}.xml")
}

/// Flag image of a language pack: <home>/bin/langpacks/flags/<iso3>.gif
pub fn langpack_flag(iso3: &str) -> String {
    format!("bin/langpacks/flags/{iso3}.gif")
}

/// Look-and-feel archives: <home>/lib/<jar>
pub fn lib(jar: &str) -> String {
    format!("lib/{jar}")
}
