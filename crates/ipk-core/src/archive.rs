//! Zip archive access: listing, extraction and class-name lookup.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{CompileError, Location};
use crate::resources::TempArtifacts;

/// A file entry copied out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Entry name inside the archive.
    pub name: String,
    /// Session file holding the content.
    pub path: PathBuf,
}

fn open(archive: &Path, at: &Location) -> Result<ZipArchive<File>, CompileError> {
    let file = File::open(archive)
        .map_err(|e| CompileError::io(at.clone(), format!("opening {}", archive.display()), e))?;
    ZipArchive::new(file).map_err(|source| CompileError::ArchiveReadFailure {
        at: at.clone(),
        path: archive.to_path_buf(),
        source,
    })
}

fn read_failure(archive: &Path, at: &Location) -> impl Fn(zip::result::ZipError) -> CompileError {
    let at = at.clone();
    let path = archive.to_path_buf();
    move |source| CompileError::ArchiveReadFailure {
        at: at.clone(),
        path: path.clone(),
        source,
    }
}

/// Names of the file entries of `archive`, in archive order. Directories are skipped.
pub fn list_files(archive: &Path, at: &Location) -> Result<Vec<String>, CompileError> {
    let mut zip = open(archive, at)?;
    let fail = read_failure(archive, at);
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(&fail)?;
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Copy every file entry of `archive` into its own session file.
///
/// Directory entries are skipped.
pub fn extract_files(
    archive: &Path,
    temp: &TempArtifacts,
    at: &Location,
) -> Result<Vec<ExtractedEntry>, CompileError> {
    let mut zip = open(archive, at)?;
    let fail = read_failure(archive, at);
    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(&fail)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let hint = name.rsplit('/').next().unwrap_or(&name).to_string();
        let path = temp.persist_from(&hint, &mut entry).map_err(|e| {
            CompileError::io(
                at.clone(),
                format!("extracting {name} from {}", archive.display()),
                e,
            )
        })?;
        extracted.push(ExtractedEntry { name, path });
    }
    tracing::debug!(archive = %archive.display(), entries = extracted.len(), "expanded archive");
    Ok(extracted)
}

/// Read one entry as UTF-8 text, `None` when the archive has no such entry.
pub fn read_text_entry(
    archive: &Path,
    name: &str,
    at: &Location,
) -> Result<Option<String>, CompileError> {
    let mut zip = open(archive, at)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(read_failure(archive, at)(source)),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| CompileError::io(at.clone(), format!("reading {name} in {}", archive.display()), e))?;
    Ok(Some(text))
}

/// Resolve a declared class name against the `.class` entries of an archive.
///
/// `declared` may be a short name (`HelloPanel`) or partly or fully
/// qualified. The first entry whose dotted name ends with it on a segment
/// boundary wins. An entry that matches only when case is ignored is an
/// error.
pub fn resolve_class_name<'a>(
    entries: impl IntoIterator<Item = &'a str>,
    declared: &str,
    at: &Location,
) -> Result<Option<String>, CompileError> {
    let wanted = declared.to_ascii_lowercase();
    for entry in entries {
        let Some(stem) = entry.strip_suffix(".class") else {
            continue;
        };
        let dotted = stem.replace('/', ".");
        if ends_on_segment(&dotted, declared) {
            return Ok(Some(dotted));
        }
        if ends_on_segment(&dotted.to_ascii_lowercase(), &wanted) {
            return Err(CompileError::AmbiguousClassName {
                at: at.clone(),
                declared: declared.to_string(),
                found: dotted,
            });
        }
    }
    Ok(None)
}

fn ends_on_segment(qualified: &str, suffix: &str) -> bool {
    qualified == suffix
        || qualified
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'))
}
