//! Error types for recurrence-engine operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecurrenceError {
    /// The operation is not valid for this item, e.g. creating an exception
    /// from an item that is not part of a recurring series.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Missing required property: {0}")]
    MissingRequiredProperty(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid {property} value: {value}")]
    InvalidValue { property: String, value: String },

    /// The calendar document cannot be turned into recurrence sets.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Tree(#[from] ical_core::TreeError),

    #[error(transparent)]
    Parse(#[from] ical_core::ParseError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl RecurrenceError {
    pub(crate) fn invalid_value(property: &str, value: &str) -> Self {
        Self::InvalidValue {
            property: property.to_string(),
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecurrenceError>;
