//! Builtin capabilities registered by [`super::CapabilityRegistry::with_defaults`].

mod file_read;
mod file_write;
mod search;
mod shell;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use search::SearchTool;
pub use shell::ShellTool;
