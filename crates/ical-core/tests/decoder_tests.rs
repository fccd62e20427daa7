use ical_core::{decode, ParseError};

/// Helper: join lines with CRLF and terminate the last one.
fn ics(lines: &[&str]) -> String {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn decode_nested_components() {
    let text = ics(&[
        "BEGIN:VCALENDAR",
        "VERSION:2.0",
        "PRODID:-//Test//EN",
        "BEGIN:VEVENT",
        "UID:event-1",
        "DTSTART:20190701T100000Z",
        "BEGIN:VALARM",
        "ACTION:DISPLAY",
        "TRIGGER:-PT15M",
        "END:VALARM",
        "END:VEVENT",
        "END:VCALENDAR",
    ]);

    let calendar = decode(&text).unwrap();
    assert_eq!(calendar.name, "VCALENDAR");
    assert_eq!(calendar.property("VERSION").unwrap().value, "2.0");

    let events: Vec<_> = calendar.components("VEVENT").collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].property("uid").unwrap().value, "event-1");
    assert_eq!(events[0].components("VALARM").count(), 1);
}

#[test]
fn decode_accepts_bare_lf_and_blank_lines() {
    let text = "BEGIN:VCALENDAR\n\nBEGIN:VTODO\nUID:t\nEND:VTODO\nEND:VCALENDAR\n";
    let calendar = decode(text).unwrap();
    assert_eq!(calendar.components("VTODO").count(), 1);
}

#[test]
fn decode_lowercase_begin_end() {
    let text = ics(&["begin:vcalendar", "begin:vevent", "end:vevent", "end:vcalendar"]);
    let calendar = decode(&text).unwrap();
    assert_eq!(calendar.components("VEVENT").count(), 1);
}

#[test]
fn decode_keeps_repeated_properties_in_order() {
    let text = ics(&[
        "BEGIN:VEVENT",
        "RDATE:20190719T100000Z",
        "SUMMARY:x",
        "RDATE;VALUE=PERIOD:20190801T100000Z/PT2H",
        "END:VEVENT",
    ]);
    let event = decode(&text).unwrap();
    let rdates: Vec<_> = event.properties("RDATE").map(|p| p.value.as_str()).collect();
    assert_eq!(rdates, vec!["20190719T100000Z", "20190801T100000Z/PT2H"]);
}

// ============================================================================
// Folding and values
// ============================================================================

#[test]
fn decode_unfolds_long_values() {
    let text = ics(&[
        "BEGIN:VEVENT",
        "DESCRIPTION:This is a lo",
        " ng description",
        "END:VEVENT",
    ]);
    let event = decode(&text).unwrap();
    assert_eq!(
        event.property("DESCRIPTION").unwrap().value,
        "This is a long description"
    );
}

#[test]
fn decode_keeps_escapes_verbatim() {
    let text = ics(&["BEGIN:VEVENT", r"SUMMARY:a\, b\; c\n", "END:VEVENT"]);
    let event = decode(&text).unwrap();
    assert_eq!(event.property("SUMMARY").unwrap().value, r"a\, b\; c\n");
}

#[test]
fn decode_value_may_contain_colons() {
    let text = ics(&["BEGIN:VEVENT", "URL:https://example.com:8080/x", "END:VEVENT"]);
    let event = decode(&text).unwrap();
    assert_eq!(event.property("URL").unwrap().value, "https://example.com:8080/x");
}

#[test]
fn decode_tzid_parameter() {
    let text = ics(&[
        "BEGIN:VEVENT",
        "DTSTART;TZID=Europe/Berlin:20190701T100000",
        "END:VEVENT",
    ]);
    let event = decode(&text).unwrap();
    let dtstart = event.property("DTSTART").unwrap();
    assert_eq!(dtstart.param_value("TZID"), Some("Europe/Berlin"));
    assert_eq!(dtstart.value, "20190701T100000");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn error_on_mismatched_end() {
    let text = ics(&["BEGIN:VCALENDAR", "BEGIN:VEVENT", "END:VTODO", "END:VCALENDAR"]);
    let err = decode(&text).unwrap_err();
    assert_eq!(
        err,
        ParseError::Unbalanced {
            line: 3,
            expected: "VEVENT".to_string(),
            found: "VTODO".to_string(),
        }
    );
}

#[test]
fn error_on_unterminated_component() {
    let text = ics(&["BEGIN:VCALENDAR", "BEGIN:VEVENT"]);
    let err = decode(&text).unwrap_err();
    assert_eq!(
        err,
        ParseError::UnexpectedEof {
            open: "VEVENT".to_string()
        }
    );
}

#[test]
fn error_on_property_outside_component() {
    let err = decode("SUMMARY:x\r\n").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
}

#[test]
fn error_line_numbers_count_physical_lines() {
    let text = ics(&["BEGIN:VEVENT", "SUMMARY:a", " b", "BROKEN", "END:VEVENT"]);
    let err = decode(&text).unwrap_err();
    assert!(
        matches!(err, ParseError::Syntax { line: 4, .. }),
        "unexpected error: {err:?}"
    );
}

#[test]
fn error_on_empty_input() {
    assert_eq!(decode("").unwrap_err(), ParseError::Empty);
    assert_eq!(decode("\r\n\r\n").unwrap_err(), ParseError::Empty);
}

#[test]
fn error_on_unterminated_quote() {
    let text = ics(&["BEGIN:VEVENT", "ATTENDEE;CN=\"Doe:mailto:x@y", "END:VEVENT"]);
    assert!(matches!(
        decode(&text).unwrap_err(),
        ParseError::Syntax { line: 2, .. }
    ));
}
