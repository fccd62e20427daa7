//! Recurrence sets: one master, its exceptions, and the document around them.

use ical_core::{Component, Parameter, Property};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::datetime::DateTimeValue;
use crate::error::{RecurrenceError, Result};
use crate::item::{ItemId, ItemKind, RecurringItem};
use crate::manager::RecurrenceManager;
use crate::period::RecurrenceDate;
use crate::rule::RecurrenceRule;

/// Result of [`RecurrenceSet::create_exception`].
#[derive(Debug)]
pub enum ExceptionOutcome {
    /// A single occurrence became a stored exception of this set.
    Detached {
        previous_primary: Option<ItemId>,
        exception: ItemId,
    },
    /// The edit started at the first occurrence and was written to the
    /// master itself; the set stays one series.
    MasterUpdated { master: ItemId },
    /// This set now ends before the edited occurrence and `series` carries
    /// it and all later occurrences under a new UID.
    Split {
        previous_primary: Option<ItemId>,
        series: RecurrenceSet,
    },
}

/// The master item of one UID, its exceptions and the enclosing `VCALENDAR`.
///
/// `root` holds the calendar's own properties and non-item children such as
/// `VTIMEZONE`; items are only added to it on [`RecurrenceSet::to_component`].
#[derive(Debug)]
pub struct RecurrenceSet {
    root: Component,
    manager: RecurrenceManager,
    config: EngineConfig,
}

/// Decode a calendar and group its items into recurrence sets by `UID`.
///
/// # Errors
/// Propagates decoder errors and everything [`RecurrenceSet::from_calendar`]
/// reports.
pub fn parse_calendar(text: &str, config: &EngineConfig) -> Result<Vec<RecurrenceSet>> {
    let calendar = ical_core::decode(text)?;
    RecurrenceSet::from_calendar(&calendar, config)
}

impl RecurrenceSet {
    /// A new set in an empty calendar.
    pub fn new(master: RecurringItem, config: &EngineConfig) -> Self {
        Self {
            root: Component::calendar(&config.product_id),
            manager: RecurrenceManager::new(master, config),
            config: config.clone(),
        }
    }

    /// Split a `VCALENDAR` into one set per `UID`, in order of first appearance.
    ///
    /// Every set gets its own copy of the calendar shell. Exceptions the
    /// master does not produce are kept.
    ///
    /// # Errors
    /// - `RecurrenceError::InvalidDocument` if the root is not a `VCALENDAR`
    ///   or a `UID` has no master or several masters.
    /// - `RecurrenceError::MissingRequiredProperty` if an item has no `UID`,
    ///   or a master with exceptions has no `DTSTART`.
    pub fn from_calendar(calendar: &Component, config: &EngineConfig) -> Result<Vec<Self>> {
        if calendar.name != "VCALENDAR" {
            return Err(RecurrenceError::InvalidDocument(format!(
                "expected VCALENDAR, found {}",
                calendar.name
            )));
        }
        let mut shell = calendar.unlocked_clone();
        let children = shell.remove_components(|c| ItemKind::from_name(&c.name).is_some())?;

        let mut groups: Vec<(String, Vec<RecurringItem>)> = Vec::new();
        for child in children {
            let item = RecurringItem::from_component(child)?;
            let uid = item
                .uid()
                .ok_or_else(|| RecurrenceError::MissingRequiredProperty("UID".to_string()))?
                .to_string();
            match groups.iter_mut().find(|(existing, _)| *existing == uid) {
                Some((_, items)) => items.push(item),
                None => groups.push((uid, vec![item])),
            }
        }

        groups
            .into_iter()
            .map(|(uid, items)| Self::from_group(&shell, &uid, items, config))
            .collect()
    }

    fn from_group(shell: &Component, uid: &str, items: Vec<RecurringItem>, config: &EngineConfig) -> Result<Self> {
        let (masters, exceptions): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| !i.is_recurrence_exception());
        let [master] = <[RecurringItem; 1]>::try_from(masters).map_err(|masters| {
            RecurrenceError::InvalidDocument(format!("UID {uid} has {} master items", masters.len()))
        })?;
        if !exceptions.is_empty() && master.start_date().is_none() {
            return Err(RecurrenceError::MissingRequiredProperty("DTSTART".to_string()));
        }

        let mut manager = RecurrenceManager::new(master, config);
        for exception in exceptions {
            let rid = exception.recurrence_id();
            manager.relate_exception(exception)?;
            if let Some(rid) = rid {
                if !manager.is_occurrence(&rid)? {
                    debug!(uid, rid = %rid, "exception does not match any occurrence");
                }
            }
        }

        Ok(Self {
            root: shell.clone(),
            manager,
            config: config.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn root(&self) -> &Component {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn uid(&self) -> Option<&str> {
        self.master().uid()
    }

    pub fn master(&self) -> &RecurringItem {
        self.manager.master_item()
    }

    pub fn master_mut(&mut self) -> &mut RecurringItem {
        self.manager.master_item_mut()
    }

    pub fn item(&self, id: ItemId) -> Option<&RecurringItem> {
        self.manager.item(id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut RecurringItem> {
        self.manager.item_mut(id)
    }

    pub fn manager(&self) -> &RecurrenceManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RecurrenceManager {
        &mut self.manager
    }

    /// Write a new `DTSTART` to the master and move its dates and
    /// exceptions along.
    pub fn set_master_start_date(&mut self, start: DateTimeValue) -> Result<()> {
        let old = self.master().start_date();
        self.manager.master_item_mut().set_start_date(start)?;
        match old {
            Some(old) => self.manager.update_master_start_date(&start, &old),
            None => {
                self.manager.reset_cache();
                Ok(())
            }
        }
    }

    /// Write an edited copy of a stored item back to its slot.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidOperation` for items that are not
    /// stored in this set, such as fresh forks; those become stored through
    /// [`RecurrenceSet::create_exception`].
    pub fn store(&mut self, item: RecurringItem) -> Result<ItemId> {
        match item.slot() {
            Some(slot) if slot == self.manager.master_id() => {
                self.manager.replace_master(item);
                Ok(slot)
            }
            Some(_) => self.manager.relate_exception(item),
            None => Err(RecurrenceError::InvalidOperation(
                "item is not stored in this set".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Exceptions
    // -----------------------------------------------------------------------

    pub fn can_create_exceptions(&self, item: &RecurringItem) -> bool {
        self.manager.can_create_exceptions(item)
    }

    /// Turn an occurrence into an exception of this set, or into the start
    /// of a new series (`this_and_future`).
    ///
    /// # Errors
    /// - `RecurrenceError::InvalidOperation` if
    ///   [`RecurrenceSet::can_create_exceptions`] is false.
    /// - `RecurrenceError::MissingRequiredProperty` if the item has no
    ///   reference id.
    pub fn create_exception(&mut self, item: RecurringItem, this_and_future: bool) -> Result<ExceptionOutcome> {
        if !self.can_create_exceptions(&item) {
            return Err(RecurrenceError::InvalidOperation(format!(
                "{} is not part of a recurring series",
                item.id()
            )));
        }
        if !this_and_future {
            return self.detach_occurrence(item);
        }
        if item.is_exact_fork_of_primary() && item.primary_item() == Some(self.manager.master_id()) {
            return self.overwrite_master(item);
        }
        self.split_series(item)
    }

    fn detach_occurrence(&mut self, mut item: RecurringItem) -> Result<ExceptionOutcome> {
        let previous_primary = item.primary_item();
        let rid = item
            .reference_recurrence_id()
            .ok_or_else(|| RecurrenceError::MissingRequiredProperty("DTSTART".to_string()))?;

        let is_new = item.slot().is_none();
        item.set_recurrence_id(Some(rid));
        // A stored THISANDFUTURE exception stays one when edited in place.
        if is_new {
            item.modifies_future = false;
        }
        let component = item.raw_mut();
        for name in ["RRULE", "RDATE", "EXDATE"] {
            component.remove_properties(name)?;
        }

        // The exception now carries the period's end itself.
        if let Some(RecurrenceDate::Period(period)) = self.manager.get_recurrence_date(false, &rid)? {
            self.manager.remove_recurrence_date(false, &period.start)?;
            self.manager
                .add_recurrence_date(false, RecurrenceDate::DateTime(period.start))?;
        }

        if is_new {
            // A new exception starts at SEQUENCE 0: dirty, but nothing to bump.
            item.restamp_as_new()?;
            item.reset_dirty();
        }
        item.mark_dirty();
        let exception = self.manager.relate_exception(item)?;
        debug!(uid = self.uid().unwrap_or_default(), rid = %rid, "created exception");
        Ok(ExceptionOutcome::Detached {
            previous_primary,
            exception,
        })
    }

    /// The first occurrence was edited for all future: apply it to the master.
    fn overwrite_master(&mut self, item: RecurringItem) -> Result<ExceptionOutcome> {
        let significant = self.manager.significant_properties().clone();
        let master = self.manager.master_item_mut();
        let old_start = master.start_date();
        let new_start = item.start_date();

        let relevant = |c: &Component| -> Vec<Property> {
            c.all_properties()
                .iter()
                .filter(|p| significant.contains(&p.name))
                .cloned()
                .collect()
        };
        let significant_change = relevant(master.component()) != relevant(item.component());

        let component = master.raw_mut();
        component.replace_properties(item.component().all_properties().to_vec())?;
        component.remove_components(|_| true)?;
        for child in item.component().all_components() {
            component.add_component(child.clone())?;
        }
        master.invalidate_id();
        if significant_change {
            master.mark_significant();
        } else {
            master.mark_dirty();
        }

        self.manager.reset_cache();
        if let (Some(new), Some(old)) = (new_start, old_start) {
            if !new.is_identical(&old) {
                self.manager.update_master_start_date(&new, &old)?;
            }
        }
        debug!(uid = self.uid().unwrap_or_default(), "applied first-occurrence edit to master");
        Ok(ExceptionOutcome::MasterUpdated {
            master: self.manager.master_id(),
        })
    }

    /// End this series before `item` and start a new one from it.
    fn split_series(&mut self, mut item: RecurringItem) -> Result<ExceptionOutcome> {
        let previous_primary = item.primary_item();
        let rules = self.remaining_rules(&item)?;
        self.manager.remove_occurrence(&item, true)?;

        let old_uid = self.uid().unwrap_or_default().to_string();
        let new_uid = Uuid::new_v4().to_string();

        item.slot = None;
        item.primary = None;
        item.exact_fork = false;
        item.modifies_future = false;
        item.set_original_recurrence_id(None);
        item.set_recurrence_id(None);
        let component = item.raw_mut();
        component.set_property(Property::new("UID", new_uid.as_str()))?;
        component.remove_properties("RDATE")?;
        component.remove_properties("EXDATE")?;
        component.remove_properties("RRULE")?;
        for rule in &rules {
            component.add_property(Property::new("RRULE", rule.to_ical()))?;
        }
        component.add_property(Property::new("RELATED-TO", old_uid.as_str()).with_param("RELTYPE", "SIBLING"))?;
        component.update_properties("ATTENDEE", |attendee| {
            attendee.set_param(Parameter::new("RSVP", "TRUE"));
        })?;
        item.invalidate_id();
        item.restamp_as_new()?;
        item.reset_dirty();

        self.manager.master_item_mut().add_relation("SIBLING", &new_uid)?;

        let mut root = Component::calendar(&self.config.product_id);
        for timezone in self.root.components("VTIMEZONE") {
            root.add_component(timezone.unlocked_clone())?;
        }

        debug!(old_uid = %old_uid, new_uid = %new_uid, "split series");
        Ok(ExceptionOutcome::Split {
            previous_primary,
            series: Self {
                root,
                manager: RecurrenceManager::new(item, &self.config),
                config: self.config.clone(),
            },
        })
    }

    /// The rules `item` carries into a new series starting at its
    /// recurrence-id. A `COUNT` is reduced by the starts the old series
    /// keeps; a rule with nothing left is dropped.
    fn remaining_rules(&self, item: &RecurringItem) -> Result<Vec<RecurrenceRule>> {
        let rid = item
            .reference_recurrence_id()
            .ok_or_else(|| RecurrenceError::MissingRequiredProperty("RECURRENCE-ID".to_string()))?;
        let series_start = self.manager.master_item().start_date();

        let mut rules = Vec::new();
        for property in item.component().properties("RRULE") {
            let mut rule = RecurrenceRule::parse(&property.value)?;
            if let (Some(count), Some(start)) = (rule.count(), series_start.as_ref()) {
                let limit = u16::try_from(count).unwrap_or(u16::MAX);
                let kept = rule
                    .first_starts(start, limit)?
                    .into_iter()
                    .filter(|s| *s < rid)
                    .count() as u32;
                match count.saturating_sub(kept) {
                    0 => continue,
                    left => rule.set_count(left),
                }
            }
            rules.push(rule);
        }
        Ok(rules)
    }

    /// Remove `item`, or it and every later occurrence. Returns whether the
    /// set has no occurrences left.
    pub fn remove_occurrence(&mut self, item: &RecurringItem, this_and_future: bool) -> Result<bool> {
        self.manager.remove_occurrence(item, this_and_future)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Settle every item's pending changes and build the full `VCALENDAR`.
    pub fn to_component(&mut self) -> Result<Component> {
        for item in self.manager.items_mut() {
            item.undirtify()?;
        }
        let mut root = self.root.unlocked_clone();
        for item in self.manager.items() {
            root.add_component(item.to_component()?)?;
        }
        Ok(root)
    }

    /// [`RecurrenceSet::to_component`] encoded as iCalendar text.
    pub fn to_ics(&mut self) -> Result<String> {
        Ok(ical_core::encode(&self.to_component()?))
    }
}
