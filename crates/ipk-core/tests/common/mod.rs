#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use ipk_core::{CompileError, CompileReport, Compiler, CompilerConfig, InMemoryPackager};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A throwaway project directory with the compiler resources every
/// descriptor needs provided from memory.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Write a zip archive. Names ending in `/` become directory entries.
    pub fn zip(&self, rel: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
        path
    }

    pub fn config(&self) -> CompilerConfig {
        CompilerConfig::new(self.path())
            .without_home()
            .with_environment(Vec::new())
            .with_embedded("lib/uninstaller.jar", b"PK\x05\x06".to_vec())
            .with_embedded(
                "bin/langpacks/installer/eng.xml",
                r#"<langpack><str id="installer.title" txt="Install"/></langpack>"#,
            )
            .with_embedded("bin/langpacks/flags/eng.gif", b"GIF89a".to_vec())
    }

    /// Write `install.xml` and compile it with [`Project::config`].
    pub fn compile(&self, body: &str) -> (Result<CompileReport, CompileError>, InMemoryPackager) {
        self.compile_with(self.config(), body)
    }

    pub fn compile_with(
        &self,
        config: CompilerConfig,
        body: &str,
    ) -> (Result<CompileReport, CompileError>, InMemoryPackager) {
        let descriptor = self.write("install.xml", descriptor(body));
        let mut sink = InMemoryPackager::default();
        let result = Compiler::new(config).compile_file(&descriptor, &mut sink);
        (result, sink)
    }
}

/// A complete descriptor around `body`, which supplies the packs and any
/// other sections a test needs.
pub fn descriptor(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<installation version="1.0">
  <info>
    <appname>Demo</appname>
    <appversion>1.0</appversion>
  </info>
  <locale><langpack iso3="eng"/></locale>
  <panels><panel classname="HelloPanel" jar=""/></panels>
  {body}
</installation>
"#
    )
}

/// A ref-pack descriptor holding only `packs`.
pub fn refpack(packs: &str) -> String {
    format!(r#"<installation version="1.0"><packs>{packs}</packs></installation>"#)
}
