//! iCalendar decoder — converts RFC 5545 text into a [`Component`] tree.
//!
//! Decoding happens in two passes:
//!
//! 1. **Unfolding**: physical lines are joined into logical content lines. A
//!    line starting with a space or tab continues the previous one; exactly one
//!    whitespace character is removed. Each logical line remembers the physical
//!    line number it started on so errors point at the right place.
//! 2. **Structure**: every content line is split into name, parameters and raw
//!    value. `BEGIN`/`END` lines open and close components on a stack.
//!
//! Values are never unescaped. The encoder writes them back byte for byte.

use crate::component::{Component, Parameter, Property};
use crate::error::ParseError;

type Result<T> = std::result::Result<T, ParseError>;

/// A logical (unfolded) line together with its 1-based starting line number.
struct LogicalLine {
    line: usize,
    text: String,
}

/// Decode iCalendar text into its outermost component.
///
/// Accepts both CRLF and bare LF line endings. Blank lines are ignored.
pub fn decode(text: &str) -> Result<Component> {
    let lines = unfold(text);

    let mut stack: Vec<Component> = Vec::new();
    let mut root: Option<Component> = None;

    for logical in &lines {
        let property = parse_content_line(logical)?;

        if property.name == "BEGIN" {
            if root.is_some() && stack.is_empty() {
                return Err(syntax(logical.line, "more than one top-level component"));
            }
            stack.push(Component::new(property.value.trim()));
            continue;
        }

        if property.name == "END" {
            let found = property.value.trim().to_ascii_uppercase();
            let Some(closed) = stack.pop() else {
                return Err(syntax(logical.line, "END without matching BEGIN"));
            };
            if closed.name != found {
                return Err(ParseError::Unbalanced {
                    line: logical.line,
                    expected: closed.name,
                    found,
                });
            }
            match stack.last_mut() {
                Some(parent) => push_component(parent, closed, logical.line)?,
                None => root = Some(closed),
            }
            continue;
        }

        match stack.last_mut() {
            Some(current) => current
                .add_property(property)
                .map_err(|e| syntax(logical.line, &e.to_string()))?,
            None => return Err(syntax(logical.line, "property outside of any component")),
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::UnexpectedEof { open: open.name });
    }

    root.ok_or(ParseError::Empty)
}

fn push_component(parent: &mut Component, child: Component, line: usize) -> Result<()> {
    parent
        .add_component(child)
        .map_err(|e| syntax(line, &e.to_string()))
}

fn syntax(line: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Join folded physical lines into logical content lines.
fn unfold(text: &str) -> Vec<LogicalLine> {
    let mut lines: Vec<LogicalLine> = Vec::new();

    for (index, raw) in text.split('\n').enumerate() {
        let physical = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(rest) = physical
            .strip_prefix(' ')
            .or_else(|| physical.strip_prefix('\t'))
        {
            if let Some(last) = lines.last_mut() {
                last.text.push_str(rest);
                continue;
            }
        }

        if physical.trim().is_empty() {
            continue;
        }

        lines.push(LogicalLine {
            line: index + 1,
            text: physical.to_string(),
        });
    }

    lines
}

/// Split a logical line into a [`Property`].
///
/// Grammar (RFC 5545 §3.1): `name *(";" param) ":" value`, where a parameter
/// is `name "=" value *("," value)` and a parameter value may be quoted.
fn parse_content_line(logical: &LogicalLine) -> Result<Property> {
    let text = logical.text.as_str();
    let bytes = text.as_bytes();

    let name_end = text
        .find([';', ':'])
        .ok_or_else(|| syntax(logical.line, "missing ':' separator"))?;
    let name = &text[..name_end];
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(syntax(logical.line, &format!("invalid property name '{name}'")));
    }

    let mut property = Property::new(name, "");
    let mut pos = name_end;

    while bytes.get(pos) == Some(&b';') {
        let (param, next) = parse_parameter(text, pos + 1, logical.line)?;
        property.params.push(param);
        pos = next;
    }

    if bytes.get(pos) != Some(&b':') {
        return Err(syntax(logical.line, "missing ':' separator"));
    }

    property.value = text[pos + 1..].to_string();
    Ok(property)
}

/// Parse one parameter starting at `start`, returning it and the index of the
/// delimiter that ended it (`;` or `:`).
fn parse_parameter(text: &str, start: usize, line: usize) -> Result<(Parameter, usize)> {
    let bytes = text.as_bytes();

    let eq = text[start..]
        .find('=')
        .map(|offset| start + offset)
        .ok_or_else(|| syntax(line, "parameter without '='"))?;
    let name = &text[start..eq];
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(syntax(line, &format!("invalid parameter name '{name}'")));
    }

    let mut values = Vec::new();
    let mut pos = eq + 1;

    loop {
        if bytes.get(pos) == Some(&b'"') {
            let close = text[pos + 1..]
                .find('"')
                .map(|offset| pos + 1 + offset)
                .ok_or_else(|| syntax(line, "unterminated quoted parameter value"))?;
            values.push(text[pos + 1..close].to_string());
            pos = close + 1;
        } else {
            let end = text[pos..]
                .find([',', ';', ':'])
                .map_or(text.len(), |offset| pos + offset);
            values.push(text[pos..end].to_string());
            pos = end;
        }

        match bytes.get(pos) {
            Some(b',') => pos += 1,
            Some(b';') | Some(b':') => break,
            Some(_) => return Err(syntax(line, "unexpected character after quoted value")),
            None => return Err(syntax(line, "missing ':' separator")),
        }
    }

    Ok((Parameter::multi(name, values), pos))
}
