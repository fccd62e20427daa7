//! Error types for tree mutation and text decoding.

use thiserror::Error;

/// Errors raised when mutating a component tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The component was locked with [`crate::Component::lock`].
    #[error("component {component} is locked")]
    Locked { component: String },
}

/// Errors raised while decoding iCalendar text.
///
/// Line numbers are 1-based and refer to the physical line on which the
/// offending logical (unfolded) line started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: expected END:{expected}, found END:{found}")]
    Unbalanced {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("unexpected end of input inside {open}")]
    UnexpectedEof { open: String },

    #[error("no component found in input")]
    Empty,
}

/// Convenience alias used by the tree mutators.
pub type Result<T> = std::result::Result<T, TreeError>;
