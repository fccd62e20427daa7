//! # ical-core
//!
//! Component tree and text codec for **iCalendar** (RFC 5545) documents.
//!
//! The tree is deliberately generic: a component is a name, an ordered list of
//! properties and an ordered list of sub-components. Property values are kept
//! as raw text so that anything the codec reads can be written back unchanged.
//! Typed interpretation (dates, durations, recurrence rules) lives one layer up.
//!
//! ## Quick start
//!
//! ```rust
//! use ical_core::{decode, encode};
//!
//! let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:abc\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
//! let calendar = decode(text).unwrap();
//! assert_eq!(calendar.components("VEVENT").count(), 1);
//! assert_eq!(encode(&calendar), text);
//! ```
//!
//! ## Modules
//!
//! - [`component`] — `Component`, `Property`, `Parameter`
//! - [`decoder`] — iCalendar text → `Component`
//! - [`encoder`] — `Component` → iCalendar text (folded, CRLF)
//! - [`error`] — Error types

pub mod component;
pub mod decoder;
pub mod encoder;
pub mod error;

pub use component::{Component, Parameter, Property};
pub use decoder::decode;
pub use encoder::encode;
pub use error::{ParseError, TreeError};
