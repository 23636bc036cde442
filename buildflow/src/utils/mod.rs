//! Small helpers shared across modules.

mod paths;

pub use paths::{is_under_or_equal, normalize, relative_to, resolve_path};
