#[allow(clippy::module_inception)]
pub mod error;
pub mod item;

pub use error::{BatchError, CliError, EnumerationError};
pub use item::{ItemError, StageError};
