// Utility functions
pub mod error;
pub mod validators;

pub use error::*;
