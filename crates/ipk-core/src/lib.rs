//! Installation descriptor compiler.
//!
//! Reads an XML installation descriptor, resolves properties, variables,
//! conditions, resources and packs, validates the pack graph and hands the
//! finished [`ipk_schema::InstallerModel`] to a [`Packager`].

pub mod archive;
pub mod compiler;
pub mod conditions;
pub mod descriptor;
pub mod error;
pub mod fileset;
pub mod listener;
pub mod merge;
pub mod packager;
pub mod paths;
pub mod properties;
pub mod resources;
pub mod validate;
pub mod variables;

mod context;
mod packs;
mod sections;

pub use compiler::{CompileReport, Compiler, CompilerConfig, InstallerKind};
pub use descriptor::{Descriptor, DescriptorNode, XmlContent};
pub use error::{CompileError, Diagnostics, Location, Warning};
pub use listener::{BuildListener, Phase, PhaseState, PluginCatalog};
pub use packager::{InMemoryPackager, Packager, PackagerError, commit};
pub use packs::REF_PACK_ENTRY;
pub use sections::{
    DEFAULT_UNPACKER, UNINSTALLER_EXT_RESOURCE, UNINSTALLER_RESOURCE, UNPACKER_PROPERTY,
};
