//! Ticket title annotations inside time entry notes.
//!
//! An annotated reference looks like `ABC-12[Login page]`. Brackets inside a
//! title are escaped with a backslash, so `XX-1[Bug \[blocker\]]` carries the
//! title `Bug [blocker]`.

use std::collections::HashMap;

use crate::ticket_ids::{find_ids, IdStyle};

/// Byte length of the annotation opening `rest`. The first `]` without a
/// backslash right before it closes the annotation.
fn annotation_len(rest: &str) -> Option<usize> {
    let body = rest.strip_prefix('[')?;
    let mut previous = '[';
    for (offset, c) in body.char_indices() {
        if c == ']' && previous != '\\' {
            return Some(offset + 2);
        }
        previous = c;
    }
    None
}

/// One id occurrence plus the annotation directly following it, if any.
#[derive(Debug)]
struct Reference {
    id_start: usize,
    id_end: usize,
    id: String,
    annotation: Option<(usize, usize)>,
}

/// Walks the note left to right. Ids found inside an annotation belong to the
/// title and are not references of their own.
fn references(note: &str, style: IdStyle) -> Vec<Reference> {
    let mut found = Vec::new();
    let mut cursor = 0;
    for id in find_ids(note, style) {
        if id.start < cursor {
            continue;
        }
        let annotation = annotation_len(&note[id.end..]).map(|len| (id.end, id.end + len));
        cursor = annotation.map(|(_, end)| end).unwrap_or(id.end);
        found.push(Reference {
            id_start: id.start,
            id_end: id.end,
            id: id.id,
            annotation,
        });
    }
    found
}

/// Escapes the title for use between annotation brackets.
pub fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len() + 2);
    for c in title.chars() {
        if c == '[' || c == ']' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    if escaped.ends_with('\\') {
        escaped.push(' ');
    }
    escaped
}

/// Annotates every id that has a title with `[<escaped title>]`, replacing a
/// stale annotation in place. Ids mapped to `None` or absent from `titles`
/// are left as written. Returns `None` when the note would not change.
pub fn inject_titles(
    note: &str,
    titles: &HashMap<String, Option<String>>,
    style: IdStyle,
) -> Option<String> {
    let mut result = String::with_capacity(note.len() + 32);
    let mut copied = 0;

    for reference in references(note, style) {
        let Some(Some(title)) = titles.get(&reference.id) else {
            continue;
        };
        let annotation = format!("[{}]", escape_title(title));
        let resume = reference
            .annotation
            .map(|(_, end)| end)
            .unwrap_or(reference.id_end);

        result.push_str(&note[copied..reference.id_start]);
        result.push_str(&note[reference.id_start..reference.id_end].to_uppercase());
        result.push_str(&annotation);
        copied = resume;
    }
    result.push_str(&note[copied..]);

    (result != note).then_some(result)
}

/// Removes every title annotation, leaving the bare ids.
pub fn strip_titles(note: &str, style: IdStyle) -> String {
    let mut result = String::with_capacity(note.len());
    let mut copied = 0;
    for reference in references(note, style) {
        if let Some((start, end)) = reference.annotation {
            result.push_str(&note[copied..start]);
            copied = end;
        }
    }
    result.push_str(&note[copied..]);
    result
}
