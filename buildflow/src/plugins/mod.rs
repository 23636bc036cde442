//! Plugins for the built-in stages.
//!
//! Apply them to a stage with [`crate::stages::Stage::apply_plugin`]. Taps
//! run in the order plugins are applied, so a guard must be applied before
//! the plugin it protects against.

mod delete;
mod guard;

pub use delete::FileSystemDeletePlugin;
pub use guard::BuildFolderGuardPlugin;
