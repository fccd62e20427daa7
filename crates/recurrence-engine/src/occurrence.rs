//! Forking, and removing single occurrences or whole tails of a series.

use chrono::TimeDelta;
use tracing::debug;

use crate::datetime::DateTimeValue;
use crate::error::{RecurrenceError, Result};
use crate::item::{ItemId, RecurringItem};
use crate::manager::RecurrenceManager;
use crate::period::RecurrenceDate;
use crate::rule::RecurrenceRule;

impl RecurrenceManager {
    /// Derive the transient occurrence `rid` from the item in `primary`.
    ///
    /// The fork is a deep copy whose start is moved to `rid` (plus
    /// `start_diff`) and whose end keeps the primary's duration, unless an
    /// `RDATE` period at `rid` supplies its own end. A fork of a stored
    /// exception for that exception's own id keeps its start untouched.
    /// The fork is clean: creating it is not an edit.
    ///
    /// # Errors
    /// - `RecurrenceError::InvalidOperation` if `primary` is not a stored item.
    /// - `RecurrenceError::MissingRequiredProperty` if the primary has no `DTSTART`.
    pub fn fork_occurrence(
        &self,
        primary: ItemId,
        rid: &DateTimeValue,
        start_diff: Option<TimeDelta>,
    ) -> Result<RecurringItem> {
        let source = self.item(primary).ok_or_else(|| {
            RecurrenceError::InvalidOperation(format!("no stored item in slot {}", primary.index()))
        })?;
        let mut item = source.clone();
        item.component.unlock();
        item.primary = Some(primary);
        item.exact_fork = source.reference_recurrence_id().is_some_and(|r| r == *rid);
        let persisted_exact =
            item.exact_fork && source.is_recurrence_exception() && source.slot().is_some();
        if !persisted_exact {
            item.slot = None;
        }

        let start = item
            .start_date()
            .ok_or_else(|| RecurrenceError::MissingRequiredProperty("DTSTART".to_string()))?;

        let rid = if !rid.is_date() && !start.is_date() && rid.zone() != start.zone() {
            rid.convert_to_zone(start.zone())
        } else {
            *rid
        };
        item.set_original_recurrence_id(Some(rid));

        let end_property = item.kind().end_property();
        let had_end = end_property.is_some_and(|name| item.component.has_property(name));
        let duration = item.duration();
        let period = self.period_override(&rid);

        if !persisted_exact {
            let shift = start_diff.unwrap_or(TimeDelta::zero());
            let new_start = rid.add_duration(shift);
            let component = item.raw_mut();
            component.set_property(new_start.to_property("DTSTART"))?;

            if let Some(name) = end_property {
                if let Some(period) = period {
                    let end = period.end().convert_to_zone(new_start.zone()).add_duration(shift);
                    component.remove_properties("DURATION")?;
                    component.set_property(end.to_property(name))?;
                } else if let Some(duration) = duration.filter(|_| had_end) {
                    component.set_property(new_start.add_duration(duration).to_property(name))?;
                }
            }
            item.invalidate_id();
        }

        item.tracker.reset();
        Ok(item)
    }

    /// Whether exceptions can be derived from `item`: it recurs, it is a
    /// `THISANDFUTURE` exception, or it was derived from a recurring primary.
    pub fn can_create_exceptions(&self, item: &RecurringItem) -> bool {
        item.is_recurring()
            || item.modifies_future()
            || item
                .primary_item()
                .and_then(|p| self.item(p))
                .is_some_and(RecurringItem::is_recurring)
    }

    /// Remove the occurrence `item` from this series, or it and every later
    /// occurrence. Returns whether the series has no occurrences left.
    ///
    /// A non-recurring series always reports `true`: removing its only item
    /// empties the document.
    ///
    /// # Errors
    /// Fails if `item` has no reference id or the master's recurrence data
    /// cannot be parsed.
    pub fn remove_occurrence(&mut self, item: &RecurringItem, this_and_future: bool) -> Result<bool> {
        if !self.is_recurring() {
            return Ok(true);
        }
        let rid = item
            .reference_recurrence_id()
            .ok_or_else(|| RecurrenceError::MissingRequiredProperty("RECURRENCE-ID".to_string()))?;

        if this_and_future {
            self.truncate_at(&rid)?;
        } else {
            if item.is_recurrence_exception() && !item.modifies_future() {
                if let Some(slot) = item.slot().filter(|s| *s != self.master_id()) {
                    self.unrelate_exception(slot);
                }
            }
            if !self.remove_recurrence_date(false, &rid)? {
                self.add_recurrence_date(true, RecurrenceDate::DateTime(rid))?;
            }
            debug!(uid = item.uid().unwrap_or_default(), rid = %rid, "removed occurrence");
        }

        self.is_empty_set()
    }

    /// End the series just before `rid`: every rule's `UNTIL` becomes one
    /// second before it, and every date entry and exception from `rid` on
    /// is dropped.
    fn truncate_at(&mut self, rid: &DateTimeValue) -> Result<()> {
        let boundary = DateTimeValue::from_utc(rid.to_utc() - TimeDelta::seconds(1));
        let dtstart = self.master_item().start_date();

        let rules: Vec<RecurrenceRule> = self
            .recurrence_rules()?
            .into_iter()
            .map(|mut rule| {
                let keep_existing = dtstart
                    .as_ref()
                    .and_then(|start| rule.until_instant(start))
                    .is_some_and(|until| until <= boundary.to_utc());
                if !keep_existing {
                    rule.set_until(Some(boundary));
                }
                rule
            })
            .collect();
        if !rules.is_empty() {
            self.replace_recurrence_rules(&rules)?;
        }

        let from = *rid;
        self.retain_recurrence_dates(false, |d| d.effective_start() < from)?;
        self.retain_recurrence_dates(true, |d| d.effective_start() < from)?;

        let doomed: Vec<ItemId> = self
            .exception_ids()
            .filter(|id| {
                self.item(*id)
                    .and_then(RecurringItem::recurrence_id)
                    .is_some_and(|r| r >= from)
            })
            .collect();
        for id in doomed {
            self.unrelate_exception(id);
        }

        debug!(uid = self.master_item().uid().unwrap_or_default(), until = %boundary, "truncated series");
        Ok(())
    }
}
