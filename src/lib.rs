pub mod conditional;
pub mod error;
pub mod macros;
pub mod project;
pub mod script;
pub mod session;

pub use conditional::{ConditionalKind, ConditionalRegistry, evaluate, parse_condition};
pub use error::{ErrorKind, ScriptError};
pub use macros::{MacroKind, MacroTable};
pub use project::{LibKind, Library, Project, ProjectConfiguration, PropertyValue, ToolKind};
pub use session::BuildSession;
