//! Compile command

use anyhow::{Context, Result};
use ipk_core::{CompileReport, Compiler, CompilerConfig, InMemoryPackager, Packager};
use std::path::{Path, PathBuf};

use crate::CompileArgs;
use crate::manifest::ManifestPackager;

fn default_basedir(descriptor: &Path) -> PathBuf {
    descriptor
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Build the compiler configuration from command line arguments.
pub fn config(args: &CompileArgs) -> CompilerConfig {
    let basedir = args
        .basedir
        .clone()
        .unwrap_or_else(|| default_basedir(&args.descriptor));
    let mut config = CompilerConfig::new(basedir).with_kind(args.kind);
    if let Some(home) = &args.home {
        config = config.with_home(home);
    }
    for (name, value) in &args.define {
        config = config.with_property(name, value);
    }
    for dir in &args.listener_path {
        config = config.with_listener_path(dir);
    }
    config
}

/// Compile a descriptor, writing a manifest bundle unless `dry_run`.
pub fn compile(args: &CompileArgs, dry_run: bool) -> Result<()> {
    let compiler = Compiler::new(config(args));
    let mut memory = InMemoryPackager::default();
    let mut manifest = ManifestPackager::new(&args.output);
    let sink: &mut dyn Packager = if dry_run { &mut memory } else { &mut manifest };

    let report = compiler
        .compile_file(&args.descriptor, sink)
        .with_context(|| format!("failed to compile {}", args.descriptor.display()))?;

    print_summary(&report);
    if dry_run {
        println!("Dry run, nothing written.");
    } else {
        println!("Wrote {}", manifest.manifest_path().display());
    }
    Ok(())
}

fn print_summary(report: &CompileReport) {
    let model = &report.model;
    println!(
        "{} {}: {} packs, {} panels, {} resources",
        model.info.app_name,
        model.info.app_version,
        model.packs.len(),
        model.panels.len(),
        model.resources.len()
    );
    if !report.warnings.is_empty() {
        println!("{} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  {warning}");
        }
    }
}
