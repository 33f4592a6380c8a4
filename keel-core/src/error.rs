use crate::Error;
use thiserror::Error;

/// Failures raised by the mapping layer itself.
///
/// Returned wrapped in [`Error`], use [`MappingError::of`] (or `downcast_ref`) to inspect
/// the kind. Errors produced by the drivers are passed through untouched and never
/// converted into one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// Bad field annotation or unsupported declaration, raised when the type is described.
    #[error("Configuration error in `{type_name}`: {message}")]
    Configuration { type_name: String, message: String },
    /// The call was rejected before anything was sent to the database.
    #[error("Invalid argument: {0}")]
    Validation(String),
    /// A value read from the database cannot become the declared field type.
    #[error("Type mismatch for column `{column}`: {message}")]
    TypeMismatch { column: String, message: String },
    /// The session is not in a state that allows the operation.
    #[error("Session error: {0}")]
    Session(String),
}

impl MappingError {
    pub fn configuration(type_name: impl Into<String>, message: impl Into<String>) -> Error {
        Error::new(MappingError::Configuration {
            type_name: type_name.into(),
            message: message.into(),
        })
    }

    pub fn validation(message: impl Into<String>) -> Error {
        Error::new(MappingError::Validation(message.into()))
    }

    pub fn type_mismatch(column: impl Into<String>, message: impl Into<String>) -> Error {
        Error::new(MappingError::TypeMismatch {
            column: column.into(),
            message: message.into(),
        })
    }

    pub fn session(message: impl Into<String>) -> Error {
        Error::new(MappingError::Session(message.into()))
    }

    /// The mapping error carried by `error`, if any.
    pub fn of(error: &Error) -> Option<&MappingError> {
        error.downcast_ref::<MappingError>()
    }
}
