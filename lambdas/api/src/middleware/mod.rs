/// Error translation
pub mod errors;

/// Request DTO validation
pub mod validate;

pub use errors::{translate_errors, ApiError, ApiResult};
pub use validate::{validate_dto, ValidateLayer, ValidatedQuery, ValidationFailure};
