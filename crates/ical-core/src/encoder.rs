//! iCalendar encoder — converts a [`Component`] tree into RFC 5545 text.
//!
//! Output rules:
//!
//! - Components are written as `BEGIN:NAME`, properties in order,
//!   sub-components in order, `END:NAME`.
//! - Parameter values are double-quoted only when they contain `:`, `;` or `,`.
//! - Content lines longer than 75 octets are folded (RFC 5545 §3.1). A fold
//!   never splits a multi-byte UTF-8 sequence.
//! - Every line ends with CRLF.

use crate::component::{Component, Parameter, Property};

/// Maximum octets per physical line, excluding the CRLF.
const FOLD_WIDTH: usize = 75;

/// Encode a component (usually a `VCALENDAR`) as iCalendar text.
pub fn encode(component: &Component) -> String {
    let mut out = String::new();
    encode_component(component, &mut out);
    out
}

fn encode_component(component: &Component, out: &mut String) {
    push_folded(&format!("BEGIN:{}", component.name), out);
    for property in component.all_properties() {
        push_folded(&content_line(property), out);
    }
    for child in component.all_components() {
        encode_component(child, out);
    }
    push_folded(&format!("END:{}", component.name), out);
}

/// Render a property as a single unfolded content line.
pub fn content_line(property: &Property) -> String {
    let mut line = property.name.clone();
    for param in &property.params {
        line.push(';');
        push_parameter(param, &mut line);
    }
    line.push(':');
    line.push_str(&property.value);
    line
}

fn push_parameter(param: &Parameter, line: &mut String) {
    line.push_str(&param.name);
    line.push('=');
    for (i, value) in param.values.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        if value.contains([':', ';', ',']) {
            line.push('"');
            line.push_str(value);
            line.push('"');
        } else {
            line.push_str(value);
        }
    }
}

/// Append `line` to `out`, folded at [`FOLD_WIDTH`] octets.
fn push_folded(line: &str, out: &mut String) {
    let mut rest = line;
    let mut width = FOLD_WIDTH;
    let mut first = true;

    loop {
        if !first {
            out.push(' ');
        }
        if rest.len() <= width {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }

        let mut cut = width;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n");
        rest = &rest[cut..];

        // Continuation lines spend one octet on the leading space.
        first = false;
        width = FOLD_WIDTH - 1;
    }
}
