//! The pack graph: `<pack>`, `<refpack>` and `<refpackset>`.
//!
//! Packs are built in document order. Ref-packs are separate descriptor
//! files that go through their own version check, property substitution
//! and resource collection before their packs are added as if they were
//! written inline. Whole-graph validation runs once, after the last
//! ref-pack has been read.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ipk_schema::os::mentions_family;
use ipk_schema::{
    AdditionalData, BlockablePolicy, ExecutableFile, ExecutableKind, ExecutionStage,
    FailurePolicy, OsConstraint, OverridePolicy, Pack, PackFile, ParsableFile, PolicyError,
    SubstitutionType, UpdateCheck,
};
use walkdir::WalkDir;

use crate::archive;
use crate::context::BuildContext;
use crate::descriptor::{Descriptor, DescriptorNode, os_constraints};
use crate::error::{CompileError, Location};
use crate::fileset::{FileSet, merge_patterns};
use crate::listener::{Phase, PhaseState};
use crate::validate;
use crate::variables::VariableSubstitutor;

/// Entry holding the descriptor inside a self-contained ref-pack archive.
pub const REF_PACK_ENTRY: &str = "META-INF/izpack.xml";

/// Attributes shared by every file a `<file>`, `<singlefile>` or
/// `<fileset>` element adds.
#[derive(Debug, Clone)]
struct FileAttributes {
    os: Vec<OsConstraint>,
    override_policy: OverridePolicy,
    blockable: BlockablePolicy,
    additional: AdditionalData,
    condition: Option<String>,
}

fn keyword<T>(node: &DescriptorNode, name: &str, at: &Location) -> Result<T, CompileError>
where
    T: FromStr<Err = PolicyError> + Default,
{
    match node.attribute(name) {
        Some(value) => T::from_str(value).map_err(|source| CompileError::InvalidEnumValue {
            at: at.clone(),
            source,
        }),
        None => Ok(T::default()),
    }
}

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn join_target(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

fn execution_stage(value: &str) -> ExecutionStage {
    match value.to_ascii_lowercase().as_str() {
        "postinstall" => ExecutionStage::PostInstall,
        "uninstall" => ExecutionStage::Uninstall,
        _ => ExecutionStage::Never,
    }
}

fn failure_policy(value: &str) -> FailurePolicy {
    match value.to_ascii_lowercase().as_str() {
        "abort" => FailurePolicy::Abort,
        "warn" => FailurePolicy::Warn,
        "ignore" => FailurePolicy::Ignore,
        _ => FailurePolicy::Ask,
    }
}

fn pattern_names<'a>(
    descriptor: &Descriptor,
    node: &'a DescriptorNode,
    element: &'a str,
) -> Result<Vec<&'a str>, CompileError> {
    node.children_named(element)
        .map(|child| descriptor.require_attribute(child, "name"))
        .collect()
}

impl BuildContext<'_> {
    /// All packs of the main descriptor and its ref-packs, then validation.
    pub(crate) fn add_packs(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddPacks, descriptor, |ctx| {
            if let Some(path) = &descriptor.path {
                ctx.ref_stack.push(canonical(path));
            }
            ctx.add_packs_single(descriptor)?;
            ctx.ref_stack.clear();

            let packs = &ctx.model.packs;
            validate::check_dependencies(packs, &ctx.pack_locations)?;
            validate::check_cycles(packs, &ctx.pack_locations)?;
            validate::check_excludes(packs, &ctx.pack_locations)?;
            validate::check_parents(packs, &ctx.pack_locations, &mut ctx.diag);
            tracing::info!(packs = packs.len(), "pack graph assembled");
            Ok(())
        })
    }

    fn add_packs_single(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.notify(Phase::AddPacksSingle, PhaseState::Begin, &descriptor.root);
        let root = descriptor.require_child(&descriptor.root, "packs")?;
        let has_any = ["pack", "refpack", "refpackset"]
            .iter()
            .any(|name| root.child(name).is_some());
        if !has_any {
            return Err(CompileError::MissingRequiredChild {
                at: descriptor.at(root),
                element: root.name.clone(),
                child: "pack, refpack or refpackset".into(),
            });
        }

        for node in root.children_named("pack") {
            let pack = self.build_pack(descriptor, node)?;
            tracing::debug!(pack = %pack.name, files = pack.files.len(), "pack");
            self.pack_locations.push(descriptor.at(node));
            self.model.packs.push(pack);
        }

        for node in root.children_named("refpack") {
            let file = descriptor.require_attribute(node, "file")?;
            let self_contained = is_true(node.attribute("selfcontained"));
            let path = self.locator().project_path(file);
            self.include_ref_pack(descriptor, node, &path, self_contained)?;
        }

        for node in root.children_named("refpackset") {
            let at = descriptor.at(node);
            let dir_attr = descriptor.require_attribute(node, "dir")?;
            let includes = descriptor.require_attribute(node, "includes")?;
            let dir = self.locator().project_path(dir_attr);
            if !dir.is_dir() {
                return Err(CompileError::InvalidPath {
                    at,
                    path: dir,
                    reason: "refpackset directory does not exist".into(),
                });
            }
            let mut set = FileSet::new(&dir);
            set.includes = merge_patterns(std::iter::empty::<&str>(), Some(includes));
            set.default_excludes = false;
            for file in set.scan(&at)?.files {
                self.include_ref_pack(descriptor, node, &dir.join(&file), false)?;
            }
        }

        self.notify(Phase::AddPacksSingle, PhaseState::End, &descriptor.root);
        Ok(())
    }

    fn include_ref_pack(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        path: &Path,
        self_contained: bool,
    ) -> Result<(), CompileError> {
        let key = canonical(path);
        if self.ref_stack.contains(&key) {
            return Err(CompileError::StructuralConflict {
                at: descriptor.at(node),
                message: format!("ref-pack {} includes itself", path.display()),
            });
        }
        let refpack = self.read_ref_pack(descriptor, node, path, self_contained)?;
        self.ref_stack.push(key);
        self.add_packs_single(&refpack)?;
        self.ref_stack.pop();
        Ok(())
    }

    /// Load, check and substitute a ref-pack descriptor and collect its resources.
    fn read_ref_pack(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        path: &Path,
        self_contained: bool,
    ) -> Result<Descriptor, CompileError> {
        let at = descriptor.at(node);
        if !path.is_file() {
            return Err(CompileError::InvalidPath {
                at,
                path: path.to_path_buf(),
                reason: "ref-pack file is not readable".into(),
            });
        }

        let text = if self_contained {
            if path.extension().is_none_or(|ext| ext != "zip") {
                return Err(CompileError::InvalidPath {
                    at,
                    path: path.to_path_buf(),
                    reason: "self-contained ref-packs must be zip archives".into(),
                });
            }
            archive::read_text_entry(path, REF_PACK_ENTRY, &at)?.ok_or_else(|| {
                CompileError::ResourceNotFound {
                    at: at.clone(),
                    what: REF_PACK_ENTRY.into(),
                    path: path.to_path_buf(),
                }
            })?
        } else {
            std::fs::read_to_string(path)
                .map_err(|e| CompileError::io(at.clone(), format!("reading {}", path.display()), e))?
        };

        tracing::info!(path = %path.display(), self_contained, "reading ref-pack");
        let refpack = Descriptor::load_str(&text, Some(path))?;
        let refpack = self.substitute_properties(&refpack)?;
        self.add_resources(&refpack)?;
        Ok(refpack)
    }

    fn build_pack(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
    ) -> Result<Pack, CompileError> {
        let at = descriptor.at(node);
        let name = descriptor.require_attribute(node, "name")?;
        let description = descriptor.require_child(node, "description")?;
        let required = descriptor.require_yes_no(node, "required")?;
        let exclude_group = node.attribute("excludeGroup").map(str::to_string);

        let mut pack = Pack::new(
            name,
            node.attribute("id").map(str::to_string),
            description.content().unwrap_or_default(),
            required,
            exclude_group,
        );
        pack.validate_structure()
            .map_err(|e| CompileError::StructuralConflict {
                at: at.clone(),
                message: e.to_string(),
            })?;

        pack.image_id = node.attribute("packImgId").map(str::to_string);
        pack.loose = is_true(node.attribute("loose"));
        pack.hidden = is_true(node.attribute("hidden"));
        pack.uninstall = descriptor.yes_no_or(node, "uninstall", true, &mut self.diag);
        pack.parent = node.attribute("parent").map(str::to_string);
        pack.condition = node.attribute("condition").map(str::to_string);
        pack.group = node.attribute("group").map(str::to_string);
        if let Some(groups) = node.attribute("installGroups") {
            pack.add_install_groups(groups);
        }
        pack.os = os_constraints(node);
        let default_preselected = Pack::default_preselected(pack.exclude_group.as_deref());
        pack.preselected =
            descriptor.yes_no_or(node, "preselected", default_preselected, &mut self.diag);

        for parsable in node.children_named("parsable") {
            pack.parsables.push(ParsableFile {
                target: descriptor.require_attribute(parsable, "targetfile")?.to_string(),
                substitution: keyword::<SubstitutionType>(parsable, "type", &descriptor.at(parsable))?,
                encoding: parsable.attribute("encoding").map(str::to_string),
                os: os_constraints(parsable),
                condition: parsable.attribute("condition").map(str::to_string),
            });
        }

        for executable in node.children_named("executable") {
            pack.executables
                .push(build_executable(descriptor, executable)?);
        }

        for file in node.children_named("file") {
            self.add_file_element(descriptor, file, &mut pack)?;
        }
        for single in node.children_named("singlefile") {
            self.add_single_file(descriptor, single, &mut pack)?;
        }
        for fileset in node.children_named("fileset") {
            self.add_file_set(descriptor, fileset, &mut pack)?;
        }

        for check in node.children_named("updatecheck") {
            pack.update_checks.push(UpdateCheck {
                includes: pattern_names(descriptor, check, "include")?
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                excludes: pattern_names(descriptor, check, "exclude")?
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                case_sensitive: check.attribute("casesensitive").map(str::to_string),
            });
        }
        for depends in node.children_named("depends") {
            pack.dependencies
                .push(descriptor.require_attribute(depends, "packname")?.to_string());
        }
        for validator in node.children_named("validator") {
            pack.validators
                .push(descriptor.require_content(validator)?.to_string());
        }
        Ok(pack)
    }

    fn file_attributes(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
    ) -> Result<FileAttributes, CompileError> {
        let at = descriptor.at(node);
        let os = os_constraints(node);
        let override_policy = keyword::<OverridePolicy>(node, "override", &at)?;
        let blockable = keyword::<BlockablePolicy>(node, "blockable", &at)?;
        if blockable != BlockablePolicy::None && !mentions_family(&os, "windows") {
            self.diag.warn(
                at,
                "'blockable' will implicitly apply only on Windows target systems",
            );
        }
        let additional = self.listeners.additional_data(descriptor, node)?;
        Ok(FileAttributes {
            os,
            override_policy,
            blockable,
            additional,
            condition: node.attribute("condition").map(str::to_string),
        })
    }

    /// A source path that does not exist as written gets a second chance
    /// with properties and variables substituted.
    fn resolve_source(&self, src: &str) -> PathBuf {
        let locator = self.locator();
        let direct = locator.project_path(src);
        if direct.exists() {
            return direct;
        }
        let expanded = self.properties.substitute(src);
        let expanded = VariableSubstitutor::new(&self.model.variables)
            .substitute(&expanded, SubstitutionType::Plain)
            .into_owned();
        locator.project_path(&expanded)
    }

    fn pack_file(
        &self,
        pack: &mut Pack,
        source: &Path,
        target: String,
        attrs: &FileAttributes,
        at: &Location,
    ) -> Result<(), CompileError> {
        let meta = std::fs::metadata(source).map_err(|_| CompileError::ResourceNotFound {
            at: at.clone(),
            what: "file".into(),
            path: source.to_path_buf(),
        })?;
        let relative_source = pack
            .loose
            .then(|| source.strip_prefix(self.basedir).ok())
            .flatten()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"));
        pack.files.push(PackFile {
            source: source.to_path_buf(),
            target,
            size: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            relative_source,
            os: attrs.os.clone(),
            override_policy: attrs.override_policy,
            blockable: attrs.blockable,
            additional: attrs.additional.clone(),
            condition: attrs.condition.clone(),
        });
        Ok(())
    }

    /// `<file src targetdir [unpack]>`.
    fn add_file_element(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        pack: &mut Pack,
    ) -> Result<(), CompileError> {
        let src = descriptor.require_attribute(node, "src")?;
        let targetdir = descriptor.require_attribute(node, "targetdir")?;
        let attrs = self.file_attributes(descriptor, node)?;
        let at = descriptor.at(node);
        let source = self.resolve_source(src);

        if is_true(node.attribute("unpack")) {
            for entry in archive::extract_files(&source, &self.temp, &at)? {
                let target = join_target(targetdir, &entry.name);
                self.pack_file(pack, &entry.path, target, &attrs, &at)?;
            }
            Ok(())
        } else {
            self.add_recursively(pack, &source, targetdir, &attrs, &at)
        }
    }

    /// Add `path` below `targetdir`. Directories recurse; empty ones become
    /// entries of their own.
    fn add_recursively(
        &self,
        pack: &mut Pack,
        path: &Path,
        targetdir: &str,
        attrs: &FileAttributes,
        at: &Location,
    ) -> Result<(), CompileError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = join_target(targetdir, &name);
        if !path.is_dir() {
            return self.pack_file(pack, path, target, attrs, at);
        }

        let children = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| entry.map(walkdir::DirEntry::into_path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CompileError::io(at.clone(), format!("listing {}", path.display()), e.into()))?;
        if children.is_empty() {
            return self.pack_file(pack, path, target, attrs, at);
        }
        for child in children {
            self.add_recursively(pack, &child, &target, attrs, at)?;
        }
        Ok(())
    }

    /// `<singlefile src target>`.
    fn add_single_file(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        pack: &mut Pack,
    ) -> Result<(), CompileError> {
        let src = descriptor.require_attribute(node, "src")?;
        let target = descriptor.require_attribute(node, "target")?;
        let attrs = self.file_attributes(descriptor, node)?;
        let source = self.resolve_source(src);
        self.pack_file(pack, &source, target.to_string(), &attrs, &descriptor.at(node))
    }

    /// `<fileset dir targetdir ...>`: files first, then directories.
    fn add_file_set(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        pack: &mut Pack,
    ) -> Result<(), CompileError> {
        let at = descriptor.at(node);
        let dir_attr = descriptor.require_attribute(node, "dir")?;
        let dir = self.locator().project_path(dir_attr);
        if !dir.is_dir() {
            return Err(CompileError::InvalidPath {
                at,
                path: dir,
                reason: "fileset directory does not exist".into(),
            });
        }

        let mut set = FileSet::new(&dir);
        set.case_sensitive = descriptor.yes_no_or(node, "casesensitive", true, &mut self.diag);
        set.default_excludes = descriptor.yes_no_or(node, "defaultexcludes", true, &mut self.diag);
        let targetdir = descriptor.require_attribute(node, "targetdir")?;
        let attrs = self.file_attributes(descriptor, node)?;
        set.includes = merge_patterns(
            pattern_names(descriptor, node, "include")?,
            node.attribute("includes"),
        );
        set.excludes = merge_patterns(
            pattern_names(descriptor, node, "exclude")?,
            node.attribute("excludes"),
        );

        let scan = set.scan(&at)?;
        for rel in scan.files.iter().chain(&scan.dirs) {
            self.pack_file(pack, &dir.join(rel), join_target(targetdir, rel), &attrs, &at)?;
        }
        Ok(())
    }
}

fn build_executable(
    descriptor: &Descriptor,
    node: &DescriptorNode,
) -> Result<ExecutableFile, CompileError> {
    let kind = if node.attribute_or("type", "bin").eq_ignore_ascii_case("jar") {
        ExecutableKind::Jar
    } else {
        ExecutableKind::Bin
    };
    let args = match node.child("args") {
        Some(args) => args
            .children_named("arg")
            .map(|arg| descriptor.require_attribute(arg, "value").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(ExecutableFile {
        target: descriptor.require_attribute(node, "targetfile")?.to_string(),
        stage: execution_stage(node.attribute_or("stage", "never")),
        kind,
        main_class: (kind == ExecutableKind::Jar)
            .then(|| node.attribute("class").map(str::to_string))
            .flatten(),
        on_failure: failure_policy(node.attribute_or("failure", "ask")),
        keep: is_true(node.attribute("keep")),
        args,
        os: os_constraints(node),
        condition: node.attribute("condition").map(str::to_string),
    })
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
