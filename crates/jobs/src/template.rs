// crates/jobs/src/template.rs
//! Caption rendering.
//!
//! A template is plain text with `{field}` placeholders naming mapping target
//! fields. A line whose placeholders all render empty (and that has no other
//! text) is dropped, so optional columns do not leave blank lines behind.

use crate::types::{FieldMapping, Row};

pub const DEFAULT_TEMPLATE: &str = "{title}\n{caption}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTemplate {
    source: String,
    max_chars: usize,
}

impl CaptionTemplate {
    pub fn new(source: impl Into<String>, max_chars: usize) -> Self {
        Self {
            source: source.into(),
            max_chars,
        }
    }

    /// Render the caption for `row`, truncated to `max_chars` characters.
    pub fn render(&self, mapping: &FieldMapping, row: &Row) -> String {
        let mut lines = Vec::new();
        for line in self.source.lines() {
            let (rendered, had_placeholder) = render_line(line, mapping, row);
            if had_placeholder && rendered.trim().is_empty() {
                continue;
            }
            lines.push(rendered);
        }
        let caption = lines.join("\n");
        let caption = caption.trim();
        match caption.char_indices().nth(self.max_chars) {
            Some((cut, _)) => caption[..cut].to_string(),
            None => caption.to_string(),
        }
    }
}

fn render_line(line: &str, mapping: &FieldMapping, row: &Row) -> (String, bool) {
    let mut out = String::with_capacity(line.len());
    let mut had_placeholder = false;
    let mut rest = line;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_field_name(&after[..close]) => {
                had_placeholder = true;
                out.push_str(mapping.value(row, &after[..close]).unwrap_or(""));
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, had_placeholder)
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
