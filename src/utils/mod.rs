//! Utility functions and helpers

pub mod error;
pub mod slug;
pub mod validation;

pub use error::{AppError, AppResult, ErrorResponse};
pub use slug::slugify;
pub use validation::*;
