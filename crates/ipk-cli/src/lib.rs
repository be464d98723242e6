//! ipk - installation descriptor compiler
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Compiles an XML installation descriptor into an installer model and hands
//! it to a packager. The bundled packager writes the model as a JSON manifest
//! next to copies of every finalized resource:
//!
//! ```text
//! <out>/
//! ├── manifest.json   # the installer model
//! └── resources/      # one file per resource id
//! ```

pub mod cmd;
pub mod manifest;

use clap::{Parser, Subcommand};
use ipk_core::InstallerKind;
use std::path::PathBuf;

pub use manifest::ManifestPackager;

#[derive(Debug, Parser)]
#[command(name = "ipk")]
#[command(author, version, about = "ipk - compile installation descriptors")]
pub struct Cli {
    /// Compile and validate without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile an installation descriptor
    Compile(CompileArgs),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, clap::Args)]
pub struct CompileArgs {
    /// Installation descriptor
    pub descriptor: PathBuf,

    /// Base directory for relative paths (defaults to the descriptor's directory)
    #[arg(short, long)]
    pub basedir: Option<PathBuf>,

    /// Installer home holding compiler resources
    #[arg(long, env = "IPK_HOME")]
    pub home: Option<PathBuf>,

    /// Installer kind: standard or web
    #[arg(short, long, default_value = "standard")]
    pub kind: InstallerKind,

    /// Define a property before the descriptor's own (name=value)
    #[arg(short = 'D', value_name = "NAME=VALUE", value_parser = parse_define)]
    pub define: Vec<(String, String)>,

    /// Extra directory searched for listener archives
    #[arg(long = "listener-path", value_name = "DIR")]
    pub listener_path: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "ipk-out")]
    pub output: PathBuf,
}

/// Parse a `-D name=value` definition. A bare name defines an empty value.
pub fn parse_define(s: &str) -> Result<(String, String), String> {
    let (name, value) = s.split_once('=').unwrap_or((s, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("'{s}' does not name a property"));
    }
    Ok((name.to_string(), value.to_string()))
}
