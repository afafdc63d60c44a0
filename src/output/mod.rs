//! Output formatters.
//!
//! - [`script`]: removal scripts that move selected duplicates into a trash
//!   directory when run

pub mod script;

pub use script::{write_script_file, ScriptError, ScriptOutput, ScriptType};
