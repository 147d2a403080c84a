//! Splits a macro call's argument list at top-level commas.
//!
//! Parentheses nest, `'`/`"` strings hide commas and parens (a doubled
//! delimiter is an escaped quote), and `&` continues an argument onto the next
//! line.

use super::cursor::{is_blank, SourceCursor};
use super::ScanError;
use crate::ast::{MacroArg, Span};
use crate::errors::ErrorKind;

/// Splits the arguments of a call whose `(` is at `open_paren` on the
/// cursor's current line.
///
/// Returns the arguments and the offset of the closing `)`. The cursor is
/// left on the line holding the `)`.
pub fn split_args(
    cursor: &mut SourceCursor<'_>,
    open_paren: usize,
) -> Result<(Vec<MacroArg>, usize), ScanError> {
    let mut args = Vec::new();
    let mut arg_start = open_paren + 1;
    let mut arg_line = cursor.line_number();
    let mut depth = 0usize;
    let mut string_delim: Option<u8> = None;
    let mut pos = arg_start;

    loop {
        let bytes = cursor.bytes();
        let line_end = cursor.line_end();
        if pos >= line_end {
            return Err(ScanError::new(ErrorKind::UnexpectedEndOfLine, line_end));
        }

        match (bytes[pos], string_delim) {
            (quote @ (b'\'' | b'"'), None) => string_delim = Some(quote),
            (quote, Some(delim)) if quote == delim => {
                if pos + 1 < line_end && bytes[pos + 1] == delim {
                    pos += 1;
                } else {
                    string_delim = None;
                }
            }
            (b'(', None) => depth += 1,
            (b')', None) if depth > 0 => depth -= 1,
            (b')', None) => {
                args.push(MacroArg {
                    span: Span::new(arg_start, pos),
                    line: arg_line,
                });
                return Ok((args, pos));
            }
            (b',', None) if depth == 0 => {
                args.push(MacroArg {
                    span: Span::new(arg_start, pos),
                    line: arg_line,
                });
                arg_start = pos + 1;
                arg_line = cursor.line_number();
            }
            (b'&', None) => {
                pos = skip_continuation(cursor, pos)?;
                continue;
            }
            (b'&', Some(_)) if ends_line(bytes, pos + 1, line_end) => {
                pos = skip_continuation(cursor, pos)?;
                continue;
            }
            _ => {}
        }
        pos += 1;
    }
}

fn ends_line(bytes: &[u8], mut pos: usize, line_end: usize) -> bool {
    while pos < line_end && is_blank(bytes[pos]) {
        pos += 1;
    }
    pos >= line_end
}

/// Consumes a `&` line continuation at `amp` and returns the offset where
/// scanning resumes on the continuation line.
///
/// Only blanks may follow the `&`. Blank and `!` comment lines between the
/// two halves are skipped. A leading `&` on the continuation line marks where
/// the continued text starts and is stepped over.
fn skip_continuation(cursor: &mut SourceCursor<'_>, amp: usize) -> Result<usize, ScanError> {
    let bytes = cursor.bytes();
    let mut pos = amp + 1;
    while pos < cursor.line_end() && is_blank(bytes[pos]) {
        pos += 1;
    }
    if pos < cursor.line_end() {
        return Err(ScanError::new(ErrorKind::TextAfterContinuation, pos));
    }

    loop {
        if cursor.advance_line().is_none() {
            return Err(ScanError::new(
                ErrorKind::UnexpectedEndOfFile,
                cursor.line_end(),
            ));
        }
        let line_end = cursor.line_end();
        let mut pos = cursor.line_start();
        while pos < line_end && is_blank(bytes[pos]) {
            pos += 1;
        }
        match bytes.get(pos) {
            _ if pos >= line_end => continue,
            Some(b'!') => continue,
            Some(b'&') => return Ok(pos + 1),
            _ => return Ok(pos),
        }
    }
}
