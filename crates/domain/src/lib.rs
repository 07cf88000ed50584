//! Products Gateway Domain Models

/// Domain errors
pub mod errors;

/// Document identifiers
pub mod ids;

/// Request DTO validation
pub mod validation;

pub use errors::{AppError, Error, ErrorKind};
pub use ids::DocumentId;
pub use validation::{FieldRule, FieldType, Schema, UnknownFields, ValidationSource, Violation};
