//! Per-UID recurrence state.
//!
//! A [`RecurrenceManager`] is the owning scope of one recurrence set: it
//! stores the master and every persisted exception in an arena and refers to
//! them by [`ItemId`]. `RRULE`, `RDATE` and `EXDATE` live on the master's
//! component and are read from there; every manager operation that changes
//! them goes through the master's tracked mutators.
//!
//! Enumeration works on candidate recurrence-ids:
//!
//! ```text
//! candidates = (DTSTART ∪ expand(RRULE) ∪ RDATE) − EXDATE, within [start, end)
//! ```
//!
//! Each candidate resolves to the stored exception with that exact id, or to
//! a transient occurrence forked from the latest preceding
//! `RANGE=THISANDFUTURE` exception, or from the master.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::datetime::DateTimeValue;
use crate::error::{RecurrenceError, Result};
use crate::item::{ItemId, RecurringItem};
use crate::period::{Period, RecurrenceDate};
use crate::rule::RecurrenceRule;
use crate::tracking::SignificantProperties;

/// Sorted candidate recurrence-ids of one window.
#[derive(Debug, Clone)]
struct Candidates {
    ids: Rc<[DateTimeValue]>,
    /// A rule hit the expansion limit inside the window.
    truncated: bool,
}

/// Candidate list of the last enumerated window.
#[derive(Debug)]
struct ExpansionCache {
    window: (DateTime<Utc>, DateTime<Utc>),
    master_revision: u64,
    generation: u64,
    candidates: Candidates,
}

/// Where the occurrence for a candidate id comes from.
enum Source {
    Stored(ItemId),
    /// Forked from a `THISANDFUTURE` exception, shifted by its start offset.
    Range(ItemId, Option<TimeDelta>),
    Master,
}

/// Slot of the master item.
const MASTER: ItemId = ItemId(0);

/// Recurrence rules, dates and exceptions of one UID.
#[derive(Debug)]
pub struct RecurrenceManager {
    master: RecurringItem,
    /// Exception slots; `ItemId(n)` lives at index `n - 1`.
    items: Vec<Option<RecurringItem>>,
    /// Unix time of `RECURRENCE-ID` → exception slot.
    exceptions: BTreeMap<i64, ItemId>,
    generation: u64,
    expansion_limit: u16,
    significant: SignificantProperties,
    cache: RefCell<Option<ExpansionCache>>,
}

impl RecurrenceManager {
    /// Anchor a new manager on `master`.
    pub fn new(mut master: RecurringItem, config: &EngineConfig) -> Self {
        let significant = config.significant_properties();
        master.slot = Some(MASTER);
        master.primary = None;
        master.exact_fork = false;
        master.significant = significant.clone();
        Self {
            master,
            items: Vec::new(),
            exceptions: BTreeMap::new(),
            generation: 0,
            expansion_limit: config.expansion_limit,
            significant,
            cache: RefCell::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub fn master_id(&self) -> ItemId {
        MASTER
    }

    pub fn master_item(&self) -> &RecurringItem {
        &self.master
    }

    pub fn master_item_mut(&mut self) -> &mut RecurringItem {
        &mut self.master
    }

    pub fn item(&self, id: ItemId) -> Option<&RecurringItem> {
        match id.0.checked_sub(1) {
            None => Some(&self.master),
            Some(index) => self.items.get(index)?.as_ref(),
        }
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut RecurringItem> {
        match id.0.checked_sub(1) {
            None => Some(&mut self.master),
            Some(index) => self.items.get_mut(index)?.as_mut(),
        }
    }

    /// Swap in an edited copy of the master.
    pub(crate) fn replace_master(&mut self, mut master: RecurringItem) {
        master.slot = Some(MASTER);
        master.primary = None;
        master.exact_fork = false;
        master.significant = self.significant.clone();
        self.master = master;
        self.bump();
    }

    fn exception_slot(&mut self, id: ItemId) -> Option<&mut Option<RecurringItem>> {
        self.items.get_mut(id.0.checked_sub(1)?)
    }

    /// The master followed by every exception in recurrence-id order.
    pub fn items(&self) -> impl Iterator<Item = &RecurringItem> + '_ {
        std::iter::once(self.master_item()).chain(self.exceptions())
    }

    pub(crate) fn items_mut(&mut self) -> impl Iterator<Item = &mut RecurringItem> + '_ {
        std::iter::once(&mut self.master).chain(self.items.iter_mut().flatten())
    }

    pub fn is_recurring(&self) -> bool {
        self.master_item().is_recurring()
    }

    pub fn significant_properties(&self) -> &SignificantProperties {
        &self.significant
    }

    pub fn expansion_limit(&self) -> u16 {
        self.expansion_limit
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.reset_cache();
    }

    // -----------------------------------------------------------------------
    // Recurrence rules
    // -----------------------------------------------------------------------

    /// Every `RRULE` of the master.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if a rule cannot be parsed.
    pub fn recurrence_rules(&self) -> Result<Vec<RecurrenceRule>> {
        self.master_item()
            .component()
            .properties("RRULE")
            .map(|p| RecurrenceRule::parse(&p.value))
            .collect()
    }

    pub fn add_recurrence_rule(&mut self, rule: &RecurrenceRule) -> Result<()> {
        self.master_item_mut()
            .add_property(ical_core::Property::new("RRULE", rule.to_ical()))?;
        self.bump();
        Ok(())
    }

    /// Replace every `RRULE` of the master.
    pub fn replace_recurrence_rules(&mut self, rules: &[RecurrenceRule]) -> Result<()> {
        let master = self.master_item_mut();
        master.remove_properties("RRULE")?;
        for rule in rules {
            master.add_property(ical_core::Property::new("RRULE", rule.to_ical()))?;
        }
        self.bump();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recurrence and exclusion dates
    // -----------------------------------------------------------------------

    fn date_property(is_exception: bool) -> &'static str {
        if is_exception {
            "EXDATE"
        } else {
            "RDATE"
        }
    }

    /// Every `EXDATE` (`is_exception`) or `RDATE` entry, in order.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidValue` if an entry cannot be parsed.
    pub fn recurrence_dates(&self, is_exception: bool) -> Result<Vec<RecurrenceDate>> {
        let mut dates = Vec::new();
        for property in self
            .master_item()
            .component()
            .properties(Self::date_property(is_exception))
        {
            dates.extend(RecurrenceDate::parse_property(property)?);
        }
        Ok(dates)
    }

    /// The entry whose effective start is the instant `id`.
    pub fn get_recurrence_date(&self, is_exception: bool, id: &DateTimeValue) -> Result<Option<RecurrenceDate>> {
        Ok(self
            .recurrence_dates(is_exception)?
            .into_iter()
            .find(|d| d.effective_start() == *id))
    }

    pub fn has_recurrence_date(&self, is_exception: bool, id: &DateTimeValue) -> Result<bool> {
        Ok(self.get_recurrence_date(is_exception, id)?.is_some())
    }

    /// Add an entry unless one with the same start exists. Returns whether
    /// it was added.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidOperation` for a period `EXDATE`.
    pub fn add_recurrence_date(&mut self, is_exception: bool, date: RecurrenceDate) -> Result<bool> {
        if is_exception && date.as_period().is_some() {
            return Err(RecurrenceError::InvalidOperation(
                "EXDATE cannot hold a PERIOD".to_string(),
            ));
        }
        if self.has_recurrence_date(is_exception, &date.effective_start())? {
            return Ok(false);
        }
        let name = Self::date_property(is_exception);
        self.master_item_mut().add_property(date.to_property(name))?;
        self.bump();
        Ok(true)
    }

    /// Remove every entry starting at the instant of `date`. Returns whether
    /// anything was removed.
    pub fn remove_recurrence_date(&mut self, is_exception: bool, date: &DateTimeValue) -> Result<bool> {
        let start = *date;
        self.retain_recurrence_dates(is_exception, |d| d.effective_start() != start)
    }

    /// Keep only the entries for which `keep` returns true, rewriting the
    /// master's properties when something was dropped.
    pub(crate) fn retain_recurrence_dates<F>(&mut self, is_exception: bool, mut keep: F) -> Result<bool>
    where
        F: FnMut(&RecurrenceDate) -> bool,
    {
        let dates = self.recurrence_dates(is_exception)?;
        let before = dates.len();
        let kept: Vec<_> = dates.into_iter().filter(|d| keep(d)).collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.write_recurrence_dates(is_exception, &kept)?;
        Ok(true)
    }

    fn write_recurrence_dates(&mut self, is_exception: bool, dates: &[RecurrenceDate]) -> Result<()> {
        let name = Self::date_property(is_exception);
        let master = self.master_item_mut();
        master.remove_properties(name)?;
        for date in dates {
            master.add_property(date.to_property(name))?;
        }
        self.bump();
        Ok(())
    }

    /// The `RDATE` period that starts at `id`, if any.
    pub(crate) fn period_override(&self, id: &DateTimeValue) -> Option<Period> {
        self.recurrence_dates(false)
            .ok()?
            .into_iter()
            .filter_map(|d| d.as_period().copied())
            .find(|p| p.start == *id)
    }

    // -----------------------------------------------------------------------
    // Exceptions
    // -----------------------------------------------------------------------

    /// Every stored exception in recurrence-id order.
    pub fn exceptions(&self) -> impl Iterator<Item = &RecurringItem> + '_ {
        self.exceptions.values().filter_map(|id| self.item(*id))
    }

    pub fn exception_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.exceptions.values().copied()
    }

    /// The stored exception whose recurrence-id is the instant `id`.
    pub fn exception_at(&self, id: &DateTimeValue) -> Option<ItemId> {
        self.exceptions.get(&id.unix_time()).copied()
    }

    /// Store `item` as an exception and return its slot.
    ///
    /// An item that already has a slot replaces the item there. Any other
    /// exception with the same recurrence-id is dropped.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidOperation` if the item has no
    /// `RECURRENCE-ID` or its slot is the master's.
    pub fn relate_exception(&mut self, mut item: RecurringItem) -> Result<ItemId> {
        let rid = item.recurrence_id().ok_or_else(|| {
            RecurrenceError::InvalidOperation("an exception needs a RECURRENCE-ID".to_string())
        })?;
        if item.slot == Some(MASTER) {
            return Err(RecurrenceError::InvalidOperation(
                "the master cannot be stored as an exception".to_string(),
            ));
        }
        let key = rid.unix_time();

        let existing = item
            .slot
            .filter(|slot| self.exception_slot(*slot).is_some_and(|s| s.is_some()));
        if let Some(slot) = existing {
            self.exceptions.retain(|_, id| *id != slot);
        }
        if let Some(displaced) = self.exceptions.remove(&key) {
            if Some(displaced) != existing {
                if let Some(entry) = self.exception_slot(displaced) {
                    entry.take();
                }
            }
        }

        let slot = match existing {
            Some(slot) => slot,
            None => {
                self.items.push(None);
                ItemId(self.items.len())
            }
        };
        item.slot = Some(slot);
        item.primary = Some(slot);
        item.exact_fork = false;
        item.significant = self.significant.clone();

        debug!(uid = item.uid().unwrap_or_default(), rid = %rid, slot = slot.0, "related exception");
        if let Some(entry) = self.exception_slot(slot) {
            *entry = Some(item);
        }
        self.exceptions.insert(key, slot);
        self.bump();
        Ok(slot)
    }

    /// Remove a stored exception and return it. The master cannot be unrelated.
    pub fn unrelate_exception(&mut self, id: ItemId) -> Option<RecurringItem> {
        let mut item = self.exception_slot(id)?.take()?;
        self.exceptions.retain(|_, slot| *slot != id);
        item.slot = None;
        debug!(uid = item.uid().unwrap_or_default(), slot = id.0, "unrelated exception");
        self.bump();
        Some(item)
    }

    // -----------------------------------------------------------------------
    // Set maintenance
    // -----------------------------------------------------------------------

    /// Write a new `UID` to the master and every exception.
    pub fn update_uid(&mut self, uid: &str) -> Result<()> {
        for item in self.items_mut() {
            item.set_uid(uid)?;
        }
        self.bump();
        Ok(())
    }

    /// Move everything anchored on the master's start by `new - old`.
    ///
    /// Shifts every `RDATE`, every `EXDATE` and the recurrence-id of every
    /// exception, so an excluded `RDATE` stays excluded. The master's own
    /// `DTSTART` is expected to be written already.
    pub fn update_master_start_date(&mut self, new: &DateTimeValue, old: &DateTimeValue) -> Result<()> {
        let shift = new.subtract(old);
        if shift.is_zero() {
            self.reset_cache();
            return Ok(());
        }
        debug!(uid = self.master_item().uid().unwrap_or_default(), from = %old, to = %new, "re-anchoring series");

        for is_exception in [false, true] {
            let dates = self.recurrence_dates(is_exception)?;
            if !dates.is_empty() {
                let moved: Vec<_> = dates.iter().map(|d| shift_date(d, shift)).collect();
                self.write_recurrence_dates(is_exception, &moved)?;
            }
        }

        let slots: Vec<ItemId> = self.exceptions.values().copied().collect();
        let mut keys = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(item) = self.exception_slot(slot).and_then(Option::as_mut) {
                let moved = item.recurrence_id().map(|rid| rid.add_duration(shift));
                item.set_recurrence_id(moved);
                if let Some(rid) = moved {
                    keys.push((rid.unix_time(), slot));
                }
            }
        }
        self.exceptions = keys.into_iter().collect();

        self.bump();
        Ok(())
    }

    pub fn reset_cache(&mut self) {
        self.cache.get_mut().take();
    }

    /// Whether no occurrence exists at all, without any window.
    pub fn is_empty_set(&self) -> Result<bool> {
        let master = self.master_item();
        if !master.is_recurring() {
            return Ok(false);
        }
        let Some(dtstart) = master.start_date() else {
            return Ok(true);
        };

        let rules = self.recurrence_rules()?;
        let exdates: Vec<DateTimeValue> = self
            .recurrence_dates(true)?
            .iter()
            .map(RecurrenceDate::effective_start)
            .collect();
        let excluded = |d: &DateTimeValue| exdates.contains(d);

        if start_is_member(&rules, &dtstart) && !excluded(&dtstart) {
            return Ok(false);
        }
        if self
            .recurrence_dates(false)?
            .iter()
            .any(|d| !excluded(&d.effective_start()))
        {
            return Ok(false);
        }

        let probe = u16::try_from(exdates.len() + 2).unwrap_or(u16::MAX);
        for rule in &rules {
            if rule.first_starts(&dtstart, probe)?.iter().any(|s| !excluded(s)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    /// Sorted, de-duplicated candidate recurrence-ids in `[start, end)`.
    fn compute_candidates(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Candidates> {
        let master = self.master_item();
        let Some(dtstart) = master.start_date() else {
            if master.is_recurring() {
                return Err(RecurrenceError::MissingRequiredProperty("DTSTART".to_string()));
            }
            return Ok(Candidates::complete(Vec::new()));
        };
        let in_window = |d: &DateTimeValue| {
            let instant = d.to_utc();
            instant >= start && instant < end
        };

        if !master.is_recurring() {
            let ids = if in_window(&dtstart) { vec![dtstart] } else { Vec::new() };
            return Ok(Candidates::complete(ids));
        }

        let rules = self.recurrence_rules()?;
        let mut candidates = Vec::new();
        if start_is_member(&rules, &dtstart) && in_window(&dtstart) {
            candidates.push(dtstart);
        }
        let mut truncated = false;
        for rule in &rules {
            let expansion = rule.expand(&dtstart, start, end, self.expansion_limit)?;
            truncated |= expansion.limited;
            candidates.extend(expansion.starts);
        }
        candidates.extend(
            self.recurrence_dates(false)?
                .iter()
                .map(RecurrenceDate::effective_start)
                .filter(|d| in_window(d)),
        );

        let exdates = self.recurrence_dates(true)?;
        candidates.retain(|c| !exdates.iter().any(|x| x.effective_start() == *c));
        candidates.sort();
        candidates.dedup();
        Ok(Candidates {
            ids: candidates.into(),
            truncated,
        })
    }

    fn candidates(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Candidates> {
        let revision = self.master_item().revision();
        if let Some(cache) = self.cache.borrow().as_ref() {
            if cache.window == (start, end)
                && cache.master_revision == revision
                && cache.generation == self.generation
            {
                trace!(%start, %end, "expansion cache hit");
                return Ok(cache.candidates.clone());
            }
        }

        trace!(%start, %end, "expansion cache miss");
        let candidates = self.compute_candidates(start, end)?;
        *self.cache.borrow_mut() = Some(ExpansionCache {
            window: (start, end),
            master_revision: revision,
            generation: self.generation,
            candidates: candidates.clone(),
        });
        Ok(candidates)
    }

    /// Candidate recurrence-ids in `[start, end)`, ascending.
    pub fn occurrence_ids(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DateTimeValue>> {
        Ok(self.candidates(start, end)?.ids.to_vec())
    }

    /// Whether `id` is produced by the master's recurrence data.
    pub fn is_occurrence(&self, id: &DateTimeValue) -> Result<bool> {
        let instant = id.to_utc();
        Ok(self
            .compute_candidates(instant, instant + TimeDelta::seconds(1))?
            .ids
            .contains(id))
    }

    // -----------------------------------------------------------------------
    // Lookup and enumeration
    // -----------------------------------------------------------------------

    fn source(&self, id: &DateTimeValue) -> Source {
        let key = id.unix_time();
        if let Some(slot) = self.exceptions.get(&key) {
            if self.item(*slot).is_some() {
                return Source::Stored(*slot);
            }
        }

        // The latest THISANDFUTURE exception before this id overrides the master.
        let range = self
            .exceptions
            .range(..key)
            .rev()
            .filter_map(|(_, slot)| self.item(*slot).map(|item| (*slot, item)))
            .find(|(_, item)| item.modifies_future());
        match range {
            Some((slot, exception)) => {
                let start_diff = match (exception.start_date(), exception.recurrence_id()) {
                    (Some(start), Some(rid)) => Some(start.subtract(&rid)),
                    _ => None,
                };
                Source::Range(slot, start_diff)
            }
            None => Source::Master,
        }
    }

    /// Resolve one candidate id to a stored exception or a fork.
    fn resolve(&self, id: &DateTimeValue) -> Result<Cow<'_, RecurringItem>> {
        match self.source(id) {
            Source::Stored(slot) => match self.item(slot) {
                Some(item) => Ok(Cow::Borrowed(item)),
                None => self.fork_occurrence(MASTER, id, None).map(Cow::Owned),
            },
            Source::Range(slot, start_diff) => self.fork_occurrence(slot, id, start_diff).map(Cow::Owned),
            Source::Master => self.fork_occurrence(MASTER, id, None).map(Cow::Owned),
        }
    }

    /// The start the occurrence for `id` will have, without forking it.
    fn resolved_start(&self, id: &DateTimeValue) -> DateTimeValue {
        match self.source(id) {
            Source::Stored(slot) => self
                .item(slot)
                .and_then(RecurringItem::start_date)
                .unwrap_or(*id),
            Source::Range(slot, start_diff) => {
                let primary_start = self.item(slot).and_then(RecurringItem::start_date);
                let rid = match primary_start {
                    Some(start) if !id.is_date() && !start.is_date() => id.convert_to_zone(start.zone()),
                    _ => *id,
                };
                rid.add_duration(start_diff.unwrap_or(TimeDelta::zero()))
            }
            Source::Master => *id,
        }
    }

    /// The occurrence with recurrence-id `id`, or `None` if there is none.
    ///
    /// A non-recurring set only answers for its start date. Unmatched ids
    /// are not errors; stored exceptions are found even if the rule no
    /// longer produces them.
    pub fn lookup_exact(&self, id: &DateTimeValue) -> Result<Option<Cow<'_, RecurringItem>>> {
        let master = self.master_item();
        if !master.is_recurring() {
            return Ok((master.start_date() == Some(*id)).then_some(Cow::Borrowed(master)));
        }
        if let Some(slot) = self.exception_at(id) {
            return Ok(self.item(slot).map(Cow::Borrowed));
        }
        if master.start_date().is_none() || !self.is_occurrence(id)? {
            return Ok(None);
        }
        self.resolve(id).map(Some)
    }

    /// Every occurrence whose recurrence-id lies in `[start, end)`, ordered by
    /// start with recurrence-id breaking ties.
    ///
    /// The candidate list is computed eagerly, occurrences are forked lazily.
    /// Stored exceptions moved away from their recurrence-id are yielded at
    /// their actual start.
    ///
    /// # Errors
    /// Fails if the master's recurrence data cannot be parsed or a recurring
    /// master has no `DTSTART`.
    pub fn occurrences_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Occurrences<'_>> {
        let Candidates { ids, truncated } = self.candidates(start, end)?;
        let ids = if self.exceptions.is_empty() {
            ids
        } else {
            let mut ordered: Vec<(DateTimeValue, DateTimeValue)> =
                ids.iter().map(|id| (self.resolved_start(id), *id)).collect();
            // Stable: equal starts keep recurrence-id order.
            ordered.sort_by(|a, b| a.0.cmp(&b.0));
            ordered.into_iter().map(|(_, id)| id).collect()
        };
        Ok(Occurrences {
            manager: self,
            candidates: ids,
            truncated,
            next: 0,
        })
    }
}

/// DTSTART counts as an occurrence unless every rule ends before it.
fn start_is_member(rules: &[RecurrenceRule], dtstart: &DateTimeValue) -> bool {
    rules.is_empty()
        || rules
            .iter()
            .any(|rule| rule.until_instant(dtstart).is_none_or(|until| until >= dtstart.to_utc()))
}

impl Candidates {
    fn complete(ids: Vec<DateTimeValue>) -> Self {
        Self {
            ids: ids.into(),
            truncated: false,
        }
    }
}

fn shift_date(date: &RecurrenceDate, shift: TimeDelta) -> RecurrenceDate {
    match date {
        RecurrenceDate::DateTime(value) => RecurrenceDate::DateTime(value.add_duration(shift)),
        RecurrenceDate::Period(period) => RecurrenceDate::Period(Period {
            start: period.start.add_duration(shift),
            end: match period.end {
                crate::period::PeriodEnd::End(end) => crate::period::PeriodEnd::End(end.add_duration(shift)),
                duration => duration,
            },
        }),
    }
}

/// Iterator returned by [`RecurrenceManager::occurrences_between`].
pub struct Occurrences<'a> {
    manager: &'a RecurrenceManager,
    candidates: Rc<[DateTimeValue]>,
    truncated: bool,
    next: usize,
}

impl Occurrences<'_> {
    /// Whether a rule hit the expansion limit, so occurrences late in the
    /// window are missing.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for Occurrences<'a> {
    type Item = Result<Cow<'a, RecurringItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = *self.candidates.get(self.next)?;
        self.next += 1;
        Some(self.manager.resolve(&id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.candidates.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Occurrences<'_> {}
