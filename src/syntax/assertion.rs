//! Recognizes assertion macro call sites in a line of host-language code.

use super::cursor::{is_blank, SourceCursor};
use super::ScanError;
use crate::ast::MacroKind;
use crate::errors::ErrorKind;

/// A recognized macro call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroMatch {
    pub kind: MacroKind,
    /// Offset of the first character of the macro name.
    pub start: usize,
    /// Offset of the opening `(`.
    pub open_paren: usize,
}

const ASSERT_PREFIX: &[u8] = b"assert_";
const FLUNK: &[u8] = b"flunk";
const ARRAY_INFIX: &[u8] = b"array_";

/// Suffixes after `assert_`, longest-first where one is a prefix of another.
const SUFFIXES: &[(&[u8], MacroKind)] = &[
    (b"true", MacroKind::True),
    (b"false", MacroKind::False),
    (b"equal_with", MacroKind::EqualWith),
    (b"equal", MacroKind::Equal),
    (b"not_equal", MacroKind::NotEqual),
];

/// Suffixes after `assert_array_`.
const ARRAY_SUFFIXES: &[(&[u8], MacroKind)] = &[
    (b"equal_with", MacroKind::ArrayEqualWith),
    (b"equal", MacroKind::ArrayEqual),
];

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Case-insensitive search for lowercase `needle` in `bytes[from..to]`.
fn find_ignore_case(bytes: &[u8], from: usize, to: usize, needle: &[u8]) -> Option<usize> {
    if to < from || to - from < needle.len() {
        return None;
    }
    (from..=to - needle.len()).find(|&i| {
        bytes[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
    })
}

fn starts_with_ignore_case(bytes: &[u8], at: usize, to: usize, prefix: &[u8]) -> bool {
    to >= at
        && to - at >= prefix.len()
        && bytes[at..at + prefix.len()]
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Classifies the text following `assert_`; returns the kind and the offset
/// just past the macro name.
fn classify_assert(bytes: &[u8], at: usize, to: usize) -> Option<(MacroKind, usize)> {
    let (table, at) = if starts_with_ignore_case(bytes, at, to, ARRAY_INFIX) {
        (ARRAY_SUFFIXES, at + ARRAY_INFIX.len())
    } else {
        (SUFFIXES, at)
    };
    table
        .iter()
        .find(|(suffix, _)| starts_with_ignore_case(bytes, at, to, suffix))
        .map(|(suffix, kind)| (*kind, at + suffix.len()))
}

/// Looks for the first assertion macro call in the current line at or after
/// `from`.
///
/// Candidates inside a `!` comment, or that are only part of a longer
/// identifier, are ordinary text. A recognized macro name must be followed,
/// after optional blanks, by `(`.
pub fn find_macro(cursor: &SourceCursor<'_>, from: usize) -> Result<Option<MacroMatch>, ScanError> {
    let bytes = cursor.bytes();
    let line_start = cursor.line_start();
    let line_end = cursor.line_end();
    let mut pos = from;

    loop {
        let assert_at = find_ignore_case(bytes, pos, line_end, ASSERT_PREFIX);
        let flunk_at = find_ignore_case(bytes, pos, line_end, FLUNK);

        let (start, found) = match (assert_at, flunk_at) {
            (None, None) => return Ok(None),
            (Some(a), Some(f)) if f < a => (f, Some((MacroKind::Flunk, f + FLUNK.len()))),
            (Some(a), _) => (a, classify_assert(bytes, a + ASSERT_PREFIX.len(), line_end)),
            (None, Some(f)) => (f, Some((MacroKind::Flunk, f + FLUNK.len()))),
        };

        if bytes[line_start..start].contains(&b'!') {
            return Ok(None);
        }

        let standalone = start == line_start || !is_ident(bytes[start - 1]);
        let Some((kind, name_end)) = found.filter(|(_, end)| {
            standalone && (*end >= line_end || !is_ident(bytes[*end]))
        }) else {
            pos = start + 1;
            continue;
        };

        let mut paren = name_end;
        while paren < line_end && is_blank(bytes[paren]) {
            paren += 1;
        }
        if paren < line_end && bytes[paren] == b'(' {
            return Ok(Some(MacroMatch {
                kind,
                start,
                open_paren: paren,
            }));
        }
        return Err(ScanError::new(ErrorKind::MissingOpenParen, paren));
    }
}
