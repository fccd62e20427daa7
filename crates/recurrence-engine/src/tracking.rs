//! Change tracking for recurring items.
//!
//! Every mutation made through a [`crate::RecurringItem`] marks it dirty.
//! Mutations of a significant property additionally flag a significant
//! change, which makes the next `undirtify` increment `SEQUENCE`
//! (RFC 5546 §2.1.4).

use std::sync::Arc;

/// Properties whose modification is always significant.
pub const BASE_SIGNIFICANT_PROPERTIES: [&str; 7] = [
    "DTSTART", "DTEND", "DURATION", "RRULE", "RDATE", "EXDATE", "STATUS",
];

/// The set of property names that count as significant changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignificantProperties {
    extra: Arc<[String]>,
}

impl SignificantProperties {
    pub fn with_extra(extra: &[String]) -> Self {
        Self {
            extra: extra.iter().map(|n| n.to_ascii_uppercase()).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        BASE_SIGNIFICANT_PROPERTIES
            .iter()
            .any(|base| base.eq_ignore_ascii_case(name))
            || self.extra.iter().any(|extra| extra.eq_ignore_ascii_case(name))
    }
}

/// Dirty state of one item.
///
/// `revision` increases on every mutation, tracked or not, and lets caches
/// detect that the item changed underneath them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ChangeTracker {
    pub(crate) dirty: bool,
    pub(crate) significant: bool,
    pub(crate) revision: u64,
}

impl ChangeTracker {
    pub(crate) fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
        self.touch();
    }

    pub(crate) fn mark_significant(&mut self) {
        self.significant = true;
        self.mark_dirty();
    }

    pub(crate) fn reset(&mut self) {
        self.dirty = false;
        self.significant = false;
    }
}
