#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod eval;
pub mod filesystem;
pub mod instance;
pub mod library;
pub mod modification;
pub mod parser;
pub mod syntax;

// Re-export the main API types for convenience
pub use errors::{Error, Result};
pub use library::{Context, Library};
