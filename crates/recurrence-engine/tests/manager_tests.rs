use chrono::{DateTime, TimeZone, Utc};
use recurrence_engine::{
    parse_calendar, DateTimeValue, EngineConfig, ItemKind, Period, PeriodEnd, RecurrenceDate,
    RecurrenceError, RecurrenceRule, RecurrenceSet, RecurringItem,
};

/// Helper: wrap VEVENT lines into a calendar and load its single set.
fn load(events: &[&[&str]]) -> RecurrenceSet {
    let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n");
    for event in events {
        text.push_str("BEGIN:VEVENT\r\n");
        for line in *event {
            text.push_str(line);
            text.push_str("\r\n");
        }
        text.push_str("END:VEVENT\r\n");
    }
    text.push_str("END:VCALENDAR\r\n");
    let mut sets = parse_calendar(&text, &EngineConfig::default()).unwrap();
    assert_eq!(sets.len(), 1);
    sets.remove(0)
}

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn dt(value: &str) -> DateTimeValue {
    DateTimeValue::parse(value, None).unwrap()
}

fn ids(set: &RecurrenceSet, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    set.manager()
        .occurrence_ids(start, end)
        .unwrap()
        .iter()
        .map(DateTimeValue::to_ical)
        .collect()
}

const WEEKLY: &[&str] = &[
    "UID:weekly",
    "DTSTART:20190701T100000Z",
    "DTEND:20190701T110000Z",
    "RRULE:FREQ=WEEKLY",
];

// ============================================================================
// Enumeration basics
// ============================================================================

#[test]
fn window_is_half_open_on_start() {
    let set = load(&[WEEKLY]);
    assert_eq!(
        ids(&set, utc(2019, 7, 8, 10), utc(2019, 7, 22, 10)),
        vec!["20190708T100000Z", "20190715T100000Z"]
    );
}

#[test]
fn dtstart_counts_even_when_rule_does_not_match_it() {
    // DTSTART is a Tuesday, the rule only produces Mondays.
    let set = load(&[&[
        "UID:tuesday",
        "DTSTART:20190702T100000Z",
        "RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=2",
    ]]);
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0)),
        vec!["20190702T100000Z", "20190708T100000Z", "20190715T100000Z"]
    );
}

#[test]
fn dtstart_is_dropped_when_until_precedes_it() {
    let set = load(&[&[
        "UID:dead",
        "DTSTART:20190701T100000Z",
        "RRULE:FREQ=DAILY;UNTIL=20190701T095959Z",
    ]]);
    assert!(ids(&set, utc(2019, 6, 1, 0), utc(2019, 8, 1, 0)).is_empty());
    assert!(set.manager().is_empty_set().unwrap());
}

#[test]
fn non_recurring_set_enumerates_its_master_once() {
    let set = load(&[&["UID:once", "DTSTART:20190701T100000Z"]]);
    assert_eq!(ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 2, 0)), vec!["20190701T100000Z"]);
    assert!(ids(&set, utc(2019, 7, 2, 0), utc(2019, 7, 3, 0)).is_empty());
    assert!(!set.manager().is_empty_set().unwrap());
}

#[test]
fn floating_and_all_day_series() {
    let floating = load(&[&["UID:f", "DTSTART:20190701T090000", "RRULE:FREQ=DAILY;COUNT=3"]]);
    assert_eq!(
        ids(&floating, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0)),
        vec!["20190701T090000", "20190702T090000", "20190703T090000"]
    );

    let all_day = load(&[&["UID:d", "DTSTART;VALUE=DATE:20190701", "RRULE:FREQ=WEEKLY;COUNT=2"]]);
    assert_eq!(
        ids(&all_day, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0)),
        vec!["20190701", "20190708"]
    );
}

#[test]
fn invalid_rule_is_reported_on_enumeration() {
    let set = load(&[&["UID:bad", "DTSTART:20190701T100000Z", "RRULE:INTERVAL=2"]]);
    let result = set.manager().occurrences_between(utc(2019, 7, 1, 0), utc(2019, 8, 1, 0));
    assert!(matches!(result, Err(RecurrenceError::InvalidRule(_))));
}

// ============================================================================
// Recurrence dates
// ============================================================================

#[test]
fn add_and_remove_recurrence_dates() {
    let mut set = load(&[WEEKLY]);
    let extra = dt("20190703T150000Z");
    let manager = set.manager_mut();

    assert!(manager.add_recurrence_date(false, RecurrenceDate::DateTime(extra)).unwrap());
    assert!(!manager.add_recurrence_date(false, RecurrenceDate::DateTime(extra)).unwrap());
    assert!(manager.has_recurrence_date(false, &extra).unwrap());
    assert!(manager.add_recurrence_date(true, RecurrenceDate::DateTime(dt("20190708T100000Z"))).unwrap());

    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 16, 0)),
        vec!["20190701T100000Z", "20190703T150000Z", "20190715T100000Z"]
    );

    let manager = set.manager_mut();
    assert!(manager.remove_recurrence_date(true, &dt("20190708T100000Z")).unwrap());
    assert!(manager.remove_recurrence_date(false, &extra).unwrap());
    assert!(!manager.remove_recurrence_date(false, &extra).unwrap());
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 16, 0)),
        vec!["20190701T100000Z", "20190708T100000Z", "20190715T100000Z"]
    );
}

#[test]
fn period_exdate_is_rejected() {
    let mut set = load(&[WEEKLY]);
    let period = Period::new(dt("20190708T100000Z"), PeriodEnd::Duration(chrono::TimeDelta::hours(1)));
    let result = set.manager_mut().add_recurrence_date(true, RecurrenceDate::Period(period));
    assert!(matches!(result, Err(RecurrenceError::InvalidOperation(_))));
}

#[test]
fn recurrence_date_lookup_matches_instants_across_zones() {
    let set = load(&[&[
        "UID:r",
        "DTSTART:20190701T100000Z",
        "RDATE;TZID=Europe/Berlin:20190719T100000",
    ]]);
    let same_instant = dt("20190719T080000Z");
    let found = set.manager().get_recurrence_date(false, &same_instant).unwrap().unwrap();
    assert_eq!(found.effective_start().tzid(), Some("Europe/Berlin"));
}

#[test]
fn master_edits_invalidate_the_cache() {
    let mut set = load(&[WEEKLY]);
    let window = (utc(2019, 7, 1, 0), utc(2019, 7, 16, 0));
    assert_eq!(ids(&set, window.0, window.1).len(), 3);

    set.master_mut()
        .add_property(ical_core::Property::new("EXDATE", "20190708T100000Z"))
        .unwrap();
    assert_eq!(ids(&set, window.0, window.1).len(), 2);
}

// ============================================================================
// Rules
// ============================================================================

#[test]
fn add_and_replace_rules() {
    let mut set = load(&[&["UID:r", "DTSTART:20190701T100000Z", "RRULE:FREQ=WEEKLY;COUNT=2"]]);
    let monthly = RecurrenceRule::parse("FREQ=MONTHLY;COUNT=2").unwrap();
    set.manager_mut().add_recurrence_rule(&monthly).unwrap();
    assert_eq!(set.manager().recurrence_rules().unwrap().len(), 2);
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 9, 1, 0)),
        vec!["20190701T100000Z", "20190708T100000Z", "20190801T100000Z"]
    );

    set.manager_mut().replace_recurrence_rules(&[monthly]).unwrap();
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 9, 1, 0)),
        vec!["20190701T100000Z", "20190801T100000Z"]
    );
    assert!(set.master().is_significant_change());
}

// ============================================================================
// Exceptions and lookup
// ============================================================================

#[test]
fn lookup_exact_on_non_recurring_item() {
    let set = load(&[&["UID:once", "DTSTART:20190701T100000Z"]]);
    let manager = set.manager();
    assert!(manager.lookup_exact(&dt("20190701T100000Z")).unwrap().is_some());
    let berlin = DateTimeValue::parse("20190701T120000", Some("Europe/Berlin")).unwrap();
    assert!(manager.lookup_exact(&berlin).unwrap().is_some(), "same instant, other zone");
    assert!(manager.lookup_exact(&dt("20190708T100000Z")).unwrap().is_none());
}

#[test]
fn lookup_exact_prefers_stored_exception() {
    let set = load(&[
        WEEKLY,
        &[
            "UID:weekly",
            "RECURRENCE-ID:20190708T100000Z",
            "DTSTART:20190708T140000Z",
            "DTEND:20190708T150000Z",
            "SUMMARY:Moved",
        ],
    ]);
    let found = set.manager().lookup_exact(&dt("20190708T100000Z")).unwrap().unwrap();
    assert!(found.is_recurrence_exception());
    assert_eq!(found.start_date(), Some(dt("20190708T140000Z")));

    let forked = set.manager().lookup_exact(&dt("20190715T100000Z")).unwrap().unwrap();
    assert_eq!(forked.primary_item(), Some(set.manager().master_id()));
    assert!(set.manager().lookup_exact(&dt("20190715T100001Z")).unwrap().is_none());
}

#[test]
fn orphaned_exception_is_stored_but_not_enumerated() {
    let set = load(&[
        WEEKLY,
        &["UID:weekly", "RECURRENCE-ID:20190710T100000Z", "DTSTART:20190710T100000Z"],
    ]);
    assert_eq!(set.manager().exceptions().count(), 1);
    assert!(!ids(&set, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0)).contains(&"20190710T100000Z".to_string()));
    assert!(set.manager().lookup_exact(&dt("20190710T100000Z")).unwrap().is_some());
}

#[test]
fn range_exception_overrides_later_occurrences() {
    let set = load(&[
        WEEKLY,
        &[
            "UID:weekly",
            "RECURRENCE-ID;RANGE=THISANDFUTURE:20190715T100000Z",
            "DTSTART:20190715T120000Z",
            "DTEND:20190715T130000Z",
            "SUMMARY:Later slot",
        ],
    ]);
    let occurrences: Vec<_> = set
        .manager()
        .occurrences_between(utc(2019, 7, 1, 0), utc(2019, 7, 30, 0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let starts: Vec<_> = occurrences.iter().map(|o| o.start_date().unwrap().to_ical()).collect();
    assert_eq!(
        starts,
        vec!["20190701T100000Z", "20190708T100000Z", "20190715T120000Z", "20190722T120000Z", "20190729T120000Z"]
    );
    assert_eq!(occurrences[3].component().property("SUMMARY").unwrap().value, "Later slot");
    assert_eq!(occurrences[3].end_date().unwrap().to_ical(), "20190722T130000Z");
    assert_eq!(occurrences[3].reference_recurrence_id(), Some(dt("20190722T100000Z")));
    assert!(occurrences[1].component().property("SUMMARY").is_none());
}

#[test]
fn relate_and_unrelate_exceptions() {
    let mut set = load(&[WEEKLY]);
    let mut exception = RecurringItem::new(ItemKind::Event, "weekly", dt("20190708T150000Z"));
    assert!(matches!(
        set.manager_mut().relate_exception(exception.clone()),
        Err(RecurrenceError::InvalidOperation(_))
    ));

    // Give it an identity by loading it the way the codec would.
    let mut component = exception.to_component().unwrap();
    component
        .add_property(ical_core::Property::new("RECURRENCE-ID", "20190708T100000Z"))
        .unwrap();
    exception = RecurringItem::from_component(component).unwrap();

    let slot = set.manager_mut().relate_exception(exception).unwrap();
    assert_eq!(set.manager().exception_at(&dt("20190708T100000Z")), Some(slot));
    assert_eq!(set.item(slot).unwrap().primary_item(), Some(slot));

    let removed = set.manager_mut().unrelate_exception(slot).unwrap();
    assert_eq!(removed.slot(), None);
    assert!(set.manager().exception_at(&dt("20190708T100000Z")).is_none());
    let master = set.manager().master_id();
    assert!(set.manager_mut().unrelate_exception(master).is_none());
}

// ============================================================================
// Set maintenance
// ============================================================================

#[test]
fn update_uid_reaches_every_item() {
    let mut set = load(&[
        WEEKLY,
        &["UID:weekly", "RECURRENCE-ID:20190708T100000Z", "DTSTART:20190708T100000Z"],
    ]);
    set.manager_mut().update_uid("renamed").unwrap();
    assert!(set.manager().items().all(|i| i.uid() == Some("renamed")));
    assert!(set.manager().items().all(|i| i.id().starts_with("renamed###")));
}

#[test]
fn moving_the_master_start_shifts_dates_and_exceptions() {
    let mut set = load(&[
        &[
            "UID:weekly",
            "DTSTART:20190701T100000Z",
            "RRULE:FREQ=WEEKLY",
            "EXDATE:20190715T100000Z",
            "RDATE:20190717T100000Z",
        ],
        &["UID:weekly", "RECURRENCE-ID:20190708T100000Z", "DTSTART:20190708T160000Z"],
    ]);
    set.set_master_start_date(dt("20190702T100000Z")).unwrap();

    assert!(set.manager().has_recurrence_date(true, &dt("20190716T100000Z")).unwrap());
    assert!(set.manager().has_recurrence_date(false, &dt("20190718T100000Z")).unwrap());
    assert!(set.manager().exception_at(&dt("20190709T100000Z")).is_some());
    assert!(set.manager().exception_at(&dt("20190708T100000Z")).is_none());

    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 24, 0)),
        vec!["20190702T100000Z", "20190709T100000Z", "20190718T100000Z", "20190723T100000Z"]
    );
}

#[test]
fn series_with_everything_excluded_is_empty() {
    let set = load(&[&[
        "UID:gone",
        "DTSTART:20190701T100000Z",
        "RRULE:FREQ=WEEKLY;COUNT=2",
        "EXDATE:20190701T100000Z,20190708T100000Z",
    ]]);
    assert!(set.manager().is_empty_set().unwrap());

    let open = load(&[WEEKLY]);
    assert!(!open.manager().is_empty_set().unwrap());
}

#[test]
fn moving_the_master_start_keeps_excluded_rdates_excluded() {
    let mut set = load(&[&[
        "UID:weekly",
        "DTSTART:20190701T100000Z",
        "RRULE:FREQ=WEEKLY",
        "RDATE:20190717T100000Z",
        "EXDATE:20190717T100000Z",
    ]]);
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 12, 0)),
        vec!["20190701T100000Z", "20190708T100000Z"]
    );

    set.set_master_start_date(dt("20190702T100000Z")).unwrap();

    assert!(set.manager().has_recurrence_date(false, &dt("20190718T100000Z")).unwrap());
    assert!(set.manager().has_recurrence_date(true, &dt("20190718T100000Z")).unwrap());
    assert_eq!(
        ids(&set, utc(2019, 7, 1, 0), utc(2019, 7, 12, 0)),
        vec!["20190702T100000Z", "20190709T100000Z"]
    );
    assert!(!ids(&set, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0)).contains(&"20190718T100000Z".to_string()));
}

// ============================================================================
// Ordering and limits
// ============================================================================

#[test]
fn moved_exception_is_yielded_at_its_start() {
    let set = load(&[
        &["UID:daily", "DTSTART:20190701T100000Z", "RRULE:FREQ=DAILY;COUNT=5"],
        &["UID:daily", "RECURRENCE-ID:20190702T100000Z", "DTSTART:20190704T150000Z"],
    ]);
    let occurrences: Vec<_> = set
        .manager()
        .occurrences_between(utc(2019, 7, 1, 0), utc(2019, 8, 1, 0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let starts: Vec<_> = occurrences.iter().map(|o| o.start_date().unwrap().to_ical()).collect();
    assert_eq!(
        starts,
        vec![
            "20190701T100000Z",
            "20190703T100000Z",
            "20190704T100000Z",
            "20190704T150000Z",
            "20190705T100000Z",
        ]
    );
    assert_eq!(occurrences[3].reference_recurrence_id(), Some(dt("20190702T100000Z")));

    // Candidate ids stay in recurrence-id order.
    assert_eq!(ids(&set, utc(2019, 7, 1, 0), utc(2019, 8, 1, 0))[1], "20190702T100000Z");
}

#[test]
fn equal_starts_fall_back_to_recurrence_id_order() {
    let set = load(&[
        &["UID:daily", "DTSTART:20190701T100000Z", "RRULE:FREQ=DAILY;COUNT=3"],
        &["UID:daily", "RECURRENCE-ID:20190701T100000Z", "DTSTART:20190703T100000Z"],
    ]);
    let rids: Vec<_> = set
        .manager()
        .occurrences_between(utc(2019, 7, 1, 0), utc(2019, 8, 1, 0))
        .unwrap()
        .map(|o| o.unwrap().reference_recurrence_id().unwrap().to_ical())
        .collect();
    assert_eq!(rids, vec!["20190702T100000Z", "20190701T100000Z", "20190703T100000Z"]);
}

#[test]
fn hitting_the_expansion_limit_is_reported() {
    let config = EngineConfig {
        expansion_limit: 3,
        ..EngineConfig::default()
    };
    let text = "BEGIN:VCALENDAR\r
BEGIN:VEVENT\r
UID:daily\r
DTSTART:20190701T100000Z\r
RRULE:FREQ=DAILY\r
END:VEVENT\r
END:VCALENDAR\r
";
    let set = parse_calendar(text, &config).unwrap().remove(0);
    let occurrences = set
        .manager()
        .occurrences_between(utc(2019, 7, 1, 0), utc(2019, 7, 11, 0))
        .unwrap();
    assert!(occurrences.is_truncated());
    assert_eq!(occurrences.count(), 3);

    let open = load(&[WEEKLY]);
    let within = open
        .manager()
        .occurrences_between(utc(2019, 7, 1, 0), utc(2019, 7, 11, 0))
        .unwrap();
    assert!(!within.is_truncated());
}

#[test]
fn lookup_without_dtstart_finds_nothing() {
    let set = load(&[&["UID:nostart", "RRULE:FREQ=DAILY"]]);
    assert!(set.manager().lookup_exact(&dt("20190701T100000Z")).unwrap().is_none());
}
