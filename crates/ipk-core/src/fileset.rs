//! Ant-style directory scanning for `<fileset>` and `<refpackset>`.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::error::{CompileError, Location};

/// Patterns excluded from every file set unless `defaultexcludes="no"`.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/._*",
    "**/CVS",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS",
    "**/SCCS/**",
    "**/vssver.scc",
    "**/.svn",
    "**/.svn/**",
    "**/.DS_Store",
    "**/.git",
    "**/.git/**",
    "**/.gitattributes",
    "**/.gitignore",
    "**/.gitmodules",
    "**/.hg",
    "**/.hg/**",
    "**/.hgignore",
    "**/.hgsub",
    "**/.hgsubstate",
    "**/.hgtags",
    "**/.bzr",
    "**/.bzr/**",
    "**/.bzrignore",
];

/// Merge patterns given as child elements with those of a delimited attribute.
///
/// Child patterns come first; the attribute is split on commas and spaces.
pub fn merge_patterns<'a>(
    children: impl IntoIterator<Item = &'a str>,
    attribute: Option<&str>,
) -> Vec<String> {
    let mut patterns: Vec<String> = children.into_iter().map(str::to_string).collect();
    if let Some(attr) = attribute {
        patterns.extend(
            attr.split([',', ' '])
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    patterns
}

/// A directory plus include/exclude patterns.
#[derive(Debug, Clone)]
pub struct FileSet {
    /// Directory to scan.
    pub dir: PathBuf,
    /// Include patterns; empty means everything.
    pub includes: Vec<String>,
    /// Exclude patterns.
    pub excludes: Vec<String>,
    /// Match case-sensitively.
    pub case_sensitive: bool,
    /// Apply [`DEFAULT_EXCLUDES`].
    pub default_excludes: bool,
}

/// Relative paths (with `/` separators) selected by a scan, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Selected files.
    pub files: Vec<String>,
    /// Selected directories.
    pub dirs: Vec<String>,
}

impl FileSet {
    /// A case-sensitive file set with default excludes.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            includes: Vec::new(),
            excludes: Vec::new(),
            case_sensitive: true,
            default_excludes: true,
        }
    }

    /// Walk the directory and select matching entries.
    pub fn scan(&self, at: &Location) -> Result<ScanResult, CompileError> {
        let options = MatchOptions {
            case_sensitive: self.case_sensitive,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let compile = |raw: &str| {
            let normalized = normalize(raw);
            Pattern::new(&normalized).map_err(|e| CompileError::InvalidValue {
                at: at.clone(),
                message: format!("invalid pattern '{raw}': {e}"),
            })
        };
        let includes = if self.includes.is_empty() {
            vec![compile("**")?]
        } else {
            self.includes.iter().map(|p| compile(p)).collect::<Result<Vec<_>, _>>()?
        };
        let mut excludes = self
            .excludes
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        if self.default_excludes {
            for p in DEFAULT_EXCLUDES {
                excludes.push(compile(p)?);
            }
        }

        let mut result = ScanResult::default();
        for entry in WalkDir::new(&self.dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                CompileError::io(at.clone(), format!("scanning {}", self.dir.display()), e.into())
            })?;
            let rel = relative_name(&self.dir, entry.path());
            let selected = includes.iter().any(|p| p.matches_with(&rel, options))
                && !excludes.iter().any(|p| p.matches_with(&rel, options));
            if !selected {
                continue;
            }
            if entry.file_type().is_dir() {
                result.dirs.push(rel);
            } else {
                result.files.push(rel);
            }
        }
        Ok(result)
    }
}

// Backslashes become slashes; a trailing slash means "everything below".
fn normalize(pattern: &str) -> String {
    let mut p = pattern.trim().replace('\\', "/");
    if p.ends_with('/') {
        p.push_str("**");
    }
    p.trim_start_matches("./").to_string()
}

fn relative_name(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
