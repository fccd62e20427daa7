//! Recurring items: events, to-dos and journals with recurrence identity.
//!
//! A [`RecurringItem`] wraps the component it was read from and adds the
//! identity a recurrence set needs: the `RECURRENCE-ID` of an exception, the
//! id a transient occurrence was forked for, and the arena slot of the item
//! it was derived from. `RECURRENCE-ID` is held as a field and only written
//! back when the item is serialized.
//!
//! All public mutators go through the item so that dirty and
//! significant-change state is tracked without callbacks.

use std::cell::OnceCell;

use chrono::{TimeDelta, Utc};
use ical_core::{Component, Parameter, Property};

use crate::datetime::DateTimeValue;
use crate::duration::parse_duration;
use crate::error::{RecurrenceError, Result};
use crate::tracking::{ChangeTracker, SignificantProperties};

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Index of an item inside the arena of a [`crate::RecurrenceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) usize);

impl ItemId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The component kinds that can recur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Event,
    Todo,
    Journal,
}

/// Component name and end property for every kind.
const ITEM_KINDS: [(ItemKind, &str, Option<&str>); 3] = [
    (ItemKind::Event, "VEVENT", Some("DTEND")),
    (ItemKind::Todo, "VTODO", Some("DUE")),
    (ItemKind::Journal, "VJOURNAL", None),
];

impl ItemKind {
    /// Look up the kind for a component name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        ITEM_KINDS
            .iter()
            .find(|(_, component, _)| component.eq_ignore_ascii_case(name))
            .map(|(kind, _, _)| *kind)
    }

    pub fn component_name(self) -> &'static str {
        self.entry().1
    }

    /// `DTEND` for events, `DUE` for to-dos, nothing for journals.
    pub fn end_property(self) -> Option<&'static str> {
        self.entry().2
    }

    fn entry(self) -> &'static (ItemKind, &'static str, Option<&'static str>) {
        match self {
            Self::Event => &ITEM_KINDS[0],
            Self::Todo => &ITEM_KINDS[1],
            Self::Journal => &ITEM_KINDS[2],
        }
    }
}

/// An event, to-do or journal that may belong to a recurrence set.
#[derive(Debug, Clone)]
pub struct RecurringItem {
    kind: ItemKind,
    pub(crate) component: Component,
    pub(crate) recurrence_id: Option<DateTimeValue>,
    pub(crate) modifies_future: bool,
    pub(crate) original_recurrence_id: Option<DateTimeValue>,
    pub(crate) primary: Option<ItemId>,
    pub(crate) slot: Option<ItemId>,
    pub(crate) exact_fork: bool,
    pub(crate) tracker: ChangeTracker,
    pub(crate) significant: SignificantProperties,
    cached_id: OnceCell<String>,
}

impl RecurringItem {
    /// Create a new item with `UID`, `DTSTAMP` and `DTSTART`.
    ///
    /// New items are dirty so the first serialization stamps `SEQUENCE:0`.
    pub fn new(kind: ItemKind, uid: &str, start: DateTimeValue) -> Self {
        let mut component = Component::new(kind.component_name());
        // A fresh component is never locked.
        let _ = component.add_property(Property::new("UID", uid));
        let _ = component.add_property(Property::new("DTSTAMP", now_stamp()));
        let _ = component.add_property(start.to_property("DTSTART"));

        let mut item = Self::wrap(kind, component);
        item.tracker.mark_dirty();
        item
    }

    /// Adopt a parsed component. A `RECURRENCE-ID` property is moved into
    /// the item's identity.
    ///
    /// # Errors
    /// - `RecurrenceError::InvalidDocument` if the component is not a
    ///   `VEVENT`, `VTODO` or `VJOURNAL`.
    /// - `RecurrenceError::InvalidValue` if `RECURRENCE-ID` cannot be parsed.
    /// - `RecurrenceError::Tree` if the component is locked and carries a
    ///   `RECURRENCE-ID`.
    pub fn from_component(mut component: Component) -> Result<Self> {
        let kind = ItemKind::from_name(&component.name).ok_or_else(|| {
            RecurrenceError::InvalidDocument(format!("{} cannot recur", component.name))
        })?;

        let mut recurrence_id = None;
        let mut modifies_future = false;
        if let Some(property) = component.property("RECURRENCE-ID") {
            recurrence_id = Some(DateTimeValue::from_property(property)?);
            modifies_future = property
                .param_value("RANGE")
                .is_some_and(|r| r.eq_ignore_ascii_case("THISANDFUTURE"));
            component.remove_properties("RECURRENCE-ID")?;
        }

        let mut item = Self::wrap(kind, component);
        item.recurrence_id = recurrence_id;
        item.modifies_future = modifies_future;
        Ok(item)
    }

    fn wrap(kind: ItemKind, component: Component) -> Self {
        Self {
            kind,
            component,
            recurrence_id: None,
            modifies_future: false,
            original_recurrence_id: None,
            primary: None,
            slot: None,
            exact_fork: false,
            tracker: ChangeTracker::default(),
            significant: SignificantProperties::default(),
            cached_id: OnceCell::new(),
        }
    }

    /// The component with `RECURRENCE-ID` written back after `UID`.
    pub fn to_component(&self) -> Result<Component> {
        let mut out = self.component.unlocked_clone();
        if let Some(rid) = &self.recurrence_id {
            let mut property = rid.to_property("RECURRENCE-ID");
            if self.modifies_future {
                property.set_param(Parameter::new("RANGE", "THISANDFUTURE"));
            }
            let mut properties = out.all_properties().to_vec();
            let at = properties
                .iter()
                .position(|p| p.name == "UID")
                .map_or(0, |i| i + 1);
            properties.insert(at, property);
            out.replace_properties(properties)?;
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn uid(&self) -> Option<&str> {
        self.component.property("UID").map(|p| p.value.as_str())
    }

    /// `DTSTART`. An unparseable value is treated as absent.
    pub fn start_date(&self) -> Option<DateTimeValue> {
        self.date_property("DTSTART")
    }

    /// `DTEND`/`DUE`, or `DTSTART + DURATION` when only a duration is given.
    pub fn end_date(&self) -> Option<DateTimeValue> {
        if let Some(end) = self.kind.end_property().and_then(|name| self.date_property(name)) {
            return Some(end);
        }
        let duration = self.component.property("DURATION")?;
        let duration = parse_duration(&duration.value).ok()?;
        Some(self.start_date()?.add_duration(duration))
    }

    /// Time between start and end, if both are known.
    pub fn duration(&self) -> Option<TimeDelta> {
        Some(self.end_date()?.subtract(&self.start_date()?))
    }

    fn date_property(&self, name: &str) -> Option<DateTimeValue> {
        DateTimeValue::from_property(self.component.property(name)?).ok()
    }

    pub fn recurrence_id(&self) -> Option<DateTimeValue> {
        self.recurrence_id
    }

    /// The id this item was forked for, possibly converted into the zone
    /// of its start date.
    pub fn original_recurrence_id(&self) -> Option<DateTimeValue> {
        self.original_recurrence_id
    }

    /// `originalRecurrenceId`, else `RECURRENCE-ID`, else `DTSTART`.
    pub fn reference_recurrence_id(&self) -> Option<DateTimeValue> {
        self.original_recurrence_id
            .or(self.recurrence_id)
            .or_else(|| self.start_date())
    }

    /// Occurrence identity: `uid###unix-time-of-reference-id`.
    pub fn id(&self) -> &str {
        self.cached_id.get_or_init(|| {
            let uid = self.uid().unwrap_or_default();
            match self.reference_recurrence_id() {
                Some(reference) => format!("{uid}###{}", reference.unix_time()),
                None => format!("{uid}###"),
            }
        })
    }

    pub(crate) fn invalidate_id(&mut self) {
        self.cached_id.take();
    }

    pub(crate) fn set_recurrence_id(&mut self, rid: Option<DateTimeValue>) {
        self.recurrence_id = rid;
        self.invalidate_id();
        self.tracker.touch();
    }

    pub(crate) fn set_original_recurrence_id(&mut self, rid: Option<DateTimeValue>) {
        self.original_recurrence_id = rid;
        self.invalidate_id();
    }

    // -----------------------------------------------------------------------
    // Recurrence predicates
    // -----------------------------------------------------------------------

    /// Whether the item carries an `RRULE` or `RDATE`.
    pub fn is_recurring(&self) -> bool {
        self.component.has_property("RRULE") || self.component.has_property("RDATE")
    }

    pub fn is_recurrence_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// Whether this exception's `RECURRENCE-ID` has `RANGE=THISANDFUTURE`.
    pub fn modifies_future(&self) -> bool {
        self.modifies_future
    }

    /// Whether this item was forked for the id its primary item itself
    /// stands for.
    pub fn is_exact_fork_of_primary(&self) -> bool {
        self.exact_fork
    }

    /// The item this one was derived from.
    pub fn primary_item(&self) -> Option<ItemId> {
        self.primary
    }

    /// The arena slot this item is stored in, if it is persisted.
    pub fn slot(&self) -> Option<ItemId> {
        self.slot
    }

    // -----------------------------------------------------------------------
    // Tracked mutation
    // -----------------------------------------------------------------------

    pub fn add_property(&mut self, property: Property) -> Result<()> {
        let name = property.name.clone();
        self.component.add_property(property)?;
        self.note_change(&name);
        Ok(())
    }

    /// Replace every property with the same name.
    pub fn set_property(&mut self, property: Property) -> Result<()> {
        let name = property.name.clone();
        self.component.set_property(property)?;
        self.note_change(&name);
        Ok(())
    }

    pub fn remove_properties(&mut self, name: &str) -> Result<usize> {
        let removed = self.component.remove_properties(name)?;
        if removed > 0 {
            self.note_change(name);
        }
        Ok(removed)
    }

    /// Edit every property with the given name in place.
    pub fn update_properties<F>(&mut self, name: &str, edit: F) -> Result<usize>
    where
        F: FnMut(&mut Property),
    {
        let touched = self.component.update_properties(name, edit)?;
        if touched > 0 {
            self.note_change(name);
        }
        Ok(touched)
    }

    pub fn add_component(&mut self, component: Component) -> Result<()> {
        self.component.add_component(component)?;
        self.tracker.mark_dirty();
        Ok(())
    }

    pub fn remove_components<F>(&mut self, matches: F) -> Result<Vec<Component>>
    where
        F: FnMut(&Component) -> bool,
    {
        let removed = self.component.remove_components(matches)?;
        if !removed.is_empty() {
            self.tracker.mark_dirty();
        }
        Ok(removed)
    }

    fn note_change(&mut self, name: &str) {
        if self.significant.contains(name) {
            self.tracker.mark_significant();
        } else {
            self.tracker.mark_dirty();
        }
        if name.eq_ignore_ascii_case("UID") || name.eq_ignore_ascii_case("DTSTART") {
            self.invalidate_id();
        }
    }

    pub fn set_uid(&mut self, uid: &str) -> Result<()> {
        self.set_property(Property::new("UID", uid))
    }

    pub fn set_start_date(&mut self, start: DateTimeValue) -> Result<()> {
        self.set_property(start.to_property("DTSTART"))
    }

    /// Write `DTEND`/`DUE`, dropping any `DURATION`.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidOperation` for journals, which have no end.
    pub fn set_end_date(&mut self, end: DateTimeValue) -> Result<()> {
        let name = self.kind.end_property().ok_or_else(|| {
            RecurrenceError::InvalidOperation(format!(
                "{} has no end date",
                self.kind.component_name()
            ))
        })?;
        self.remove_properties("DURATION")?;
        self.set_property(end.to_property(name))
    }

    /// Append `RELATED-TO;RELTYPE=<reltype>:<uid>`.
    pub fn add_relation(&mut self, reltype: &str, uid: &str) -> Result<()> {
        self.add_property(Property::new("RELATED-TO", uid).with_param("RELTYPE", reltype))
    }

    pub fn attendees(&self) -> impl Iterator<Item = &Property> + '_ {
        self.component.properties("ATTENDEE")
    }

    /// Set `RSVP` on every attendee.
    pub fn set_attendees_rsvp(&mut self, rsvp: bool) -> Result<usize> {
        let value = if rsvp { "TRUE" } else { "FALSE" };
        self.update_properties("ATTENDEE", |attendee| {
            attendee.set_param(Parameter::new("RSVP", value));
        })
    }

    pub fn lock(&mut self) {
        self.component.lock();
    }

    pub fn unlock(&mut self) {
        self.component.unlock();
    }

    pub fn is_locked(&self) -> bool {
        self.component.is_locked()
    }

    /// Untracked access for recurrence bookkeeping. Bumps the revision so
    /// caches still notice.
    pub(crate) fn raw_mut(&mut self) -> &mut Component {
        self.tracker.touch();
        &mut self.component
    }

    // -----------------------------------------------------------------------
    // Dirty tracking
    // -----------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.tracker.dirty
    }

    pub fn is_significant_change(&self) -> bool {
        self.tracker.significant
    }

    pub fn mark_dirty(&mut self) {
        self.tracker.mark_dirty();
    }

    pub fn mark_significant(&mut self) {
        self.tracker.mark_significant();
    }

    /// Clear both flags without touching `SEQUENCE`.
    pub fn reset_dirty(&mut self) {
        self.tracker.reset();
    }

    /// Mutation counter, including untracked bookkeeping.
    pub fn revision(&self) -> u64 {
        self.tracker.revision
    }

    /// Settle pending changes before serialization.
    ///
    /// No-op on a clean item. Otherwise ensures `SEQUENCE` exists, refreshes
    /// `DTSTAMP` and `LAST-MODIFIED`, increments `SEQUENCE` after a
    /// significant change and clears both flags.
    pub fn undirtify(&mut self) -> Result<()> {
        if !self.tracker.dirty {
            return Ok(());
        }
        let sequence = self
            .component
            .property("SEQUENCE")
            .and_then(|p| p.value.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let sequence = if self.tracker.significant {
            sequence + 1
        } else {
            sequence
        };

        self.component
            .set_property(Property::new("SEQUENCE", sequence.to_string()))?;
        self.refresh_timestamps(false)?;
        self.tracker.reset();
        self.tracker.touch();
        Ok(())
    }

    /// Set `DTSTAMP`, `LAST-MODIFIED` (and `CREATED` if asked) to now, untracked.
    pub(crate) fn refresh_timestamps(&mut self, created: bool) -> Result<()> {
        let now = now_stamp();
        let names: &[&str] = if created {
            &["CREATED", "DTSTAMP", "LAST-MODIFIED"]
        } else {
            &["DTSTAMP", "LAST-MODIFIED"]
        };
        for name in names {
            self.component.set_property(Property::new(*name, now.clone()))?;
        }
        Ok(())
    }

    /// Restart the item as a new revision line: fresh timestamps, `SEQUENCE:0`.
    pub(crate) fn restamp_as_new(&mut self) -> Result<()> {
        self.refresh_timestamps(true)?;
        self.component.set_property(Property::new("SEQUENCE", "0"))?;
        self.tracker.touch();
        Ok(())
    }
}

fn now_stamp() -> String {
    Utc::now().format(STAMP_FORMAT).to_string()
}
