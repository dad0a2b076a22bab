//! Recipient list parsing
//!
//! Uploaded lists are CSV with the recipient number in the first column.
//! Everything after the first comma is ignored.

/// Extract recipient numbers from CSV text, one per non-empty record
pub fn parse_recipients(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    text.lines()
        .filter_map(|line| {
            let first = line.split(',').next().unwrap_or("").trim();
            let first = first
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(first)
                .trim();
            (!first.is_empty()).then(|| first.to_string())
        })
        .collect()
}
