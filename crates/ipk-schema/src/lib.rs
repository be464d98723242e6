//! Build model for the ipk installer compiler.
//!
//! These are the plain data types produced by the descriptor compiler and
//! consumed by packager sinks. Nothing here touches the filesystem; the
//! compiler in `ipk-core` fills them in and hands the finished
//! [`InstallerModel`] over in one piece.

pub mod condition;
pub mod info;
pub mod model;
pub mod os;
pub mod pack;
pub mod panel;
pub mod resource;
pub mod variable;

// Re-exports
pub use condition::{Condition, ConditionEnv, Rule};
pub use info::{Author, GuiPrefs, Info, InstallerRequirement, RebootAction};
pub use model::{InstallerModel, PanelEntry};
pub use os::OsConstraint;
pub use pack::*;
pub use panel::{ActionStage, Panel, PanelAction};
pub use resource::*;
pub use variable::DynamicVariable;

/// Descriptor format version understood by this compiler.
pub const DESCRIPTOR_VERSION: &str = "1.0";

/// Name of the root element of an installation descriptor.
pub const ROOT_ELEMENT: &str = "installation";
