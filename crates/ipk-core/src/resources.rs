//! Resource lookup and the resource transform pipeline.
//!
//! Resources are looked up in the project (relative to the base directory),
//! in the installer home, or among the resources embedded in the compiler
//! configuration. `<res>` entries can be re-encoded, rewritten as canonical
//! XML and have install-time variables substituted; every stage works on
//! temporary copies so the source file is never touched.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ipk_schema::SubstitutionType;
use tempfile::{NamedTempFile, TempDir};

use crate::descriptor::{Descriptor, parse_xml, write_xml};
use crate::error::{CompileError, Diagnostics, Location};
use crate::variables::VariableSubstitutor;

/// Resource id prefixes whose contributions are merged instead of replaced.
pub const LOCALIZED_PREFIXES: &[&str] = &["packsLang.xml"];

/// Whether `id` belongs to a localized resource family.
pub fn is_localized(id: &str) -> bool {
    LOCALIZED_PREFIXES.iter().any(|p| id.starts_with(p))
}

/// Temporary files of one compile session.
///
/// Everything lives under a private directory removed on drop.
#[derive(Debug)]
pub struct TempArtifacts {
    dir: TempDir,
}

impl TempArtifacts {
    /// Create the session directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("ipk-").tempdir()?,
        })
    }

    /// Session directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Scratch file for one pipeline stage, deleted when dropped.
    pub fn stage(&self) -> std::io::Result<NamedTempFile> {
        NamedTempFile::new_in(self.dir.path())
    }

    /// Write `bytes` to a file that lives as long as the session.
    pub fn persist(&self, name_hint: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let mut file = self.named(name_hint)?;
        file.write_all(bytes)?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    /// Copy `reader` to a file that lives as long as the session.
    pub fn persist_from(
        &self,
        name_hint: &str,
        reader: &mut impl std::io::Read,
    ) -> std::io::Result<PathBuf> {
        let mut file = self.named(name_hint)?;
        std::io::copy(reader, &mut file)?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    fn named(&self, name_hint: &str) -> std::io::Result<NamedTempFile> {
        let hint: String = name_hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        tempfile::Builder::new()
            .prefix(&format!("{hint}-"))
            .tempfile_in(self.dir.path())
    }
}

/// Where resources are searched for.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLocator<'a> {
    /// Project base directory.
    pub basedir: &'a Path,
    /// Installer home, when one could be determined.
    pub home: Option<&'a Path>,
    /// In-memory resources keyed by `/`-separated relative path.
    pub embedded: &'a BTreeMap<String, Vec<u8>>,
}

impl ResourceLocator<'_> {
    /// A project file: absolute, or relative to the base directory.
    pub fn project(&self, src: &str, what: &str, at: &Location) -> Result<PathBuf, CompileError> {
        let path = self.project_path(src);
        if path.exists() {
            Ok(path)
        } else {
            Err(CompileError::ResourceNotFound {
                at: at.clone(),
                what: what.to_string(),
                path,
            })
        }
    }

    /// `src` resolved against the base directory, whether or not it exists.
    pub fn project_path(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.basedir.join(path)
        }
    }

    /// A compiler resource that must exist.
    pub fn home(
        &self,
        rel: &str,
        what: &str,
        at: &Location,
        temp: &TempArtifacts,
    ) -> Result<PathBuf, CompileError> {
        self.find_home(rel, at, temp)?
            .ok_or_else(|| CompileError::ResourceNotFound {
                at: at.clone(),
                what: what.to_string(),
                path: self.home_path(rel).unwrap_or_else(|| PathBuf::from(rel)),
            })
    }

    /// A compiler resource: absolute, under the installer home, or embedded.
    ///
    /// Embedded content is copied to a session file first. A blank `rel`
    /// names nothing.
    pub fn find_home(
        &self,
        rel: &str,
        at: &Location,
        temp: &TempArtifacts,
    ) -> Result<Option<PathBuf>, CompileError> {
        if rel.trim().is_empty() {
            return Ok(None);
        }
        if let Some(path) = self.home_path(rel).filter(|p| p.exists()) {
            return Ok(Some(path));
        }
        let key = rel.trim_start_matches('/');
        match self.embedded.get(key) {
            Some(bytes) => {
                let file_name = key.rsplit('/').next().unwrap_or(key);
                let copy = temp
                    .persist(file_name, bytes)
                    .map_err(|e| CompileError::io(at.clone(), format!("copying embedded {key}"), e))?;
                tracing::debug!(resource = key, path = %copy.display(), "using embedded resource");
                Ok(Some(copy))
            }
            None => Ok(None),
        }
    }

    /// `None` for a blank path, or a relative one when there is no home.
    fn home_path(&self, rel: &str) -> Option<PathBuf> {
        let path = Path::new(rel);
        if rel.trim().is_empty() {
            None
        } else if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            self.home.map(|home| home.join(path))
        }
    }
}

/// Transformations requested for one resource.
#[derive(Debug, Clone, Default)]
pub struct Transform {
    /// Source encoding, when not UTF-8.
    pub encoding: Option<String>,
    /// Rewrite through the XML serializer.
    pub parse_xml: bool,
    /// Substitute install-time variables.
    pub substitute: bool,
    /// Placeholder syntax for substitution.
    pub kind: SubstitutionType,
}

/// Run the pipeline on `source`, returning the file to package.
///
/// When nothing needs to change the source itself is returned.
pub fn transform(
    id: &str,
    source: &Path,
    request: &Transform,
    variables: &BTreeMap<String, String>,
    temp: &TempArtifacts,
    at: &Location,
    diag: &mut Diagnostics,
) -> Result<PathBuf, CompileError> {
    let fail = |message: String| CompileError::ResourceTransform {
        at: at.clone(),
        id: id.to_string(),
        message,
    };

    // Re-encode into a stage file; later stages read from it.
    let mut current = source.to_path_buf();
    let mut recoded: Option<NamedTempFile> = None;
    if let Some(label) = request.encoding.as_deref().filter(|l| !l.is_empty()) {
        let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| fail(format!("unsupported encoding '{label}'")))?;
        if encoding != encoding_rs::UTF_8 {
            let bytes = std::fs::read(source).map_err(|e| fail(e.to_string()))?;
            let (text, _, had_errors) = encoding.decode(&bytes);
            if had_errors {
                diag.warn(at.clone(), format!("resource '{id}' has bytes invalid in {}", encoding.name()));
            }
            let mut stage = temp.stage().map_err(|e| fail(e.to_string()))?;
            stage
                .write_all(text.as_bytes())
                .map_err(|e| fail(e.to_string()))?;
            current = stage.path().to_path_buf();
            recoded = Some(stage);
        }
    }

    let needs_text = request.parse_xml || request.substitute;
    if !needs_text {
        return match recoded {
            Some(stage) => {
                let (_, path) = stage.keep().map_err(|e| fail(e.error.to_string()))?;
                Ok(path)
            }
            None => Ok(current),
        };
    }

    let mut text = std::fs::read_to_string(&current).map_err(|e| fail(e.to_string()))?;
    let mut changed = recoded.is_some();
    if request.parse_xml {
        let tree = parse_xml(&text, Some(source)).map_err(|e| fail(e.to_string()))?;
        text = write_xml(&tree);
        changed = true;
    }
    if request.substitute {
        if variables.is_empty() {
            diag.warn(
                at.clone(),
                format!("no variables defined, resource '{id}' not parsed"),
            );
        } else {
            text = VariableSubstitutor::new(variables)
                .substitute(&text, request.kind)
                .into_owned();
            changed = true;
        }
    }
    drop(recoded);

    if changed {
        temp.persist(id, text.as_bytes())
            .map_err(|e| fail(e.to_string()))
    } else {
        Ok(source.to_path_buf())
    }
}

/// One contribution to a localized resource family.
#[derive(Debug, Clone)]
pub struct LocalizedPart {
    /// Finalized content.
    pub path: PathBuf,
    /// Where it was declared.
    pub at: Location,
}

/// Finalized resources plus pending localized contributions.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, PathBuf>,
    localized: BTreeMap<String, Vec<LocalizedPart>>,
}

impl ResourceRegistry {
    /// Register a finalized resource; localized ids are held back for merging.
    pub fn add(&mut self, id: &str, path: PathBuf, at: Location) {
        if is_localized(id) {
            self.localized
                .entry(id.to_string())
                .or_default()
                .push(LocalizedPart { path, at });
        } else {
            self.resources.insert(id.to_string(), path);
        }
    }

    /// Finalized resources so far.
    pub fn resources(&self) -> &BTreeMap<String, PathBuf> {
        &self.resources
    }

    /// Pending localized contributions by id.
    pub fn localized(&self) -> &BTreeMap<String, Vec<LocalizedPart>> {
        &self.localized
    }

    /// Split into finalized resources and localized contributions.
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, PathBuf>,
        BTreeMap<String, Vec<LocalizedPart>>,
    ) {
        (self.resources, self.localized)
    }
}

/// Process the `<resources>` section of `descriptor`.
pub fn add_resources(
    descriptor: &Descriptor,
    locator: &ResourceLocator<'_>,
    variables: &BTreeMap<String, String>,
    registry: &mut ResourceRegistry,
    temp: &TempArtifacts,
    diag: &mut Diagnostics,
) -> Result<(), CompileError> {
    let Some(section) = descriptor.root.child("resources") else {
        return Ok(());
    };
    for node in section.children_named("res") {
        let id = descriptor.require_attribute(node, "id")?;
        let src = descriptor.require_attribute(node, "src")?;
        let at = descriptor.at(node);
        let kind = match node.attribute("type") {
            Some(t) => SubstitutionType::from_str(t)
                .map_err(|source| CompileError::InvalidEnumValue { at: at.clone(), source })?,
            None => SubstitutionType::default(),
        };
        let request = Transform {
            encoding: node.attribute("encoding").map(str::to_string),
            parse_xml: descriptor.yes_no_or(node, "parsexml", false, diag),
            substitute: descriptor.yes_no_or(node, "parse", false, diag),
            kind,
        };
        let source = locator.project(src, "resource", &at)?;
        let finalized = transform(id, &source, &request, variables, temp, &at, diag)?;
        tracing::debug!(%id, path = %finalized.display(), "resource");
        registry.add(id, finalized, at);
    }
    Ok(())
}
