//! Shared utilities

pub mod color;
pub mod path;

pub use color::{ColorParser, Rgba};
pub use path::expand_user;
