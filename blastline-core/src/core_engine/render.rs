//! Placeholder substitution
//!
//! Template content holds `{Name}` placeholders where `Name` matches
//! `[A-Za-z_][A-Za-z0-9_]*`. `{{` and `}}` produce literal braces. Content is
//! parsed in full before anything is substituted, so a malformed template
//! fails the same way whatever variables are bound. Every placeholder must
//! be bound; an unbound one is an error, never left verbatim.

use crate::core_engine::errors::{RenderError, RenderResult};
use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Brace(char),
    Placeholder(&'a str),
}

fn parse(content: &str) -> RenderResult<Vec<Segment<'_>>> {
    let bytes = content.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                if text_start < i {
                    segments.push(Segment::Text(&content[text_start..i]));
                }
                segments.push(Segment::Brace(bytes[i] as char));
                i += 2;
                text_start = i;
            }
            b'{' => {
                if text_start < i {
                    segments.push(Segment::Text(&content[text_start..i]));
                }
                let close = content[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or(RenderError::Unclosed(i))?;
                let name = &content[i + 1..close];
                validate_name(name, i)?;
                segments.push(Segment::Placeholder(name));
                i = close + 1;
                text_start = i;
            }
            b'}' => return Err(RenderError::UnmatchedClose(i)),
            _ => i += 1,
        }
    }

    if text_start < bytes.len() {
        segments.push(Segment::Text(&content[text_start..]));
    }
    Ok(segments)
}

fn validate_name(name: &str, offset: usize) -> RenderResult<()> {
    let mut chars = name.chars();
    let first = chars.next().ok_or(RenderError::Empty(offset))?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RenderError::InvalidName { name: name.to_string(), offset })
    }
}

/// Substitute every placeholder in `content` with its bound value
pub fn render(content: &str, variables: &HashMap<String, String>) -> RenderResult<String> {
    let segments = parse(content)?;
    let mut out = String::with_capacity(content.len());

    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Brace(c) => out.push(c),
            Segment::Placeholder(name) => {
                let value =
                    variables.get(name).ok_or_else(|| RenderError::Unbound(name.to_string()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Distinct placeholder names in order of first appearance
pub fn placeholders(content: &str) -> RenderResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(content)? {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}
