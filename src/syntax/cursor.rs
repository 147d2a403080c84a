//! Line-oriented cursor over a read-only source buffer.
//!
//! The cursor tracks the current physical line `[line_start, line_end)` and
//! two positions inside it: `read_pos`, where the last scanned item starts,
//! and `lookahead_pos`, just past it. At all times
//! `line_start <= read_pos <= lookahead_pos <= line_end <= source.len()`.

use crate::ast::Span;

/// Where a scanned item stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Stops at a blank, `!`, `,` or the end of the line.
    Token,
    /// Stops only at `!` or the end of the line; names may contain blanks.
    Name,
    /// Consumes a leading `"` and runs through the matching `"`. Stops early
    /// at `!` or the end of the line, leaving the string unterminated.
    QuotedString,
}

impl Boundary {
    fn scan(self, bytes: &[u8], from: usize, line_end: usize) -> usize {
        let mut pos = from;
        match self {
            Boundary::Token => {
                while pos < line_end && !matches!(bytes[pos], b' ' | b'\t' | b'!' | b',') {
                    pos += 1;
                }
            }
            Boundary::Name => {
                while pos < line_end && bytes[pos] != b'!' {
                    pos += 1;
                }
            }
            Boundary::QuotedString => {
                if pos >= line_end || bytes[pos] != b'"' {
                    return pos;
                }
                pos += 1;
                while pos < line_end {
                    match bytes[pos] {
                        b'"' => return pos + 1,
                        b'!' => return pos,
                        _ => pos += 1,
                    }
                }
            }
        }
        pos
    }
}

#[derive(Debug, Clone)]
pub struct SourceCursor<'src> {
    source: &'src str,
    line_start: usize,
    line_end: usize,
    line_number: usize,
    read_pos: usize,
    lookahead_pos: usize,
    started: bool,
    at_eof: bool,
}

pub(crate) fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

impl<'src> SourceCursor<'src> {
    /// Creates a cursor positioned before the first line; call
    /// [`advance_line`](Self::advance_line) to enter it.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            line_start: 0,
            line_end: 0,
            line_number: 0,
            read_pos: 0,
            lookahead_pos: 0,
            started: false,
            at_eof: false,
        }
    }

    pub fn bytes(&self) -> &'src [u8] {
        self.source.as_bytes()
    }

    pub fn line_start(&self) -> usize {
        self.line_start
    }

    pub fn line_end(&self) -> usize {
        self.line_end
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn lookahead_pos(&self) -> usize {
        self.lookahead_pos
    }

    /// True once an advance has run off the end of the buffer.
    pub fn is_at_eof(&self) -> bool {
        self.at_eof
    }

    /// Text of the current line, without its terminator.
    pub fn line_text(&self) -> &'src str {
        &self.source[self.line_start..self.line_end]
    }

    /// Moves to the next physical line, treating `\n`, `\r\n` and `\r` as
    /// terminators. Returns the new line's start, or `None` at the end of the
    /// buffer, in which case the position is left unchanged.
    pub fn advance_line(&mut self) -> Option<usize> {
        let bytes = self.bytes();
        let next = if self.started {
            let mut pos = self.line_end;
            match bytes.get(pos) {
                Some(b'\r') if bytes.get(pos + 1) == Some(&b'\n') => pos += 2,
                Some(b'\r') | Some(b'\n') => pos += 1,
                _ => {}
            }
            pos
        } else {
            0
        };

        if next >= bytes.len() {
            self.at_eof = true;
            return None;
        }

        self.started = true;
        self.line_start = next;
        self.line_number += 1;
        self.read_pos = next;
        self.lookahead_pos = next;
        self.line_end = bytes[next..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map_or(bytes.len(), |p| next + p);
        Some(next)
    }

    /// Advances both positions past spaces and tabs, never beyond the line end.
    pub fn skip_blank(&mut self) -> usize {
        let bytes = self.bytes();
        while self.read_pos < self.line_end && is_blank(bytes[self.read_pos]) {
            self.read_pos += 1;
        }
        self.lookahead_pos = self.lookahead_pos.max(self.read_pos);
        self.read_pos
    }

    /// Scans the next item: starts where the previous item ended, skips
    /// blanks, then runs the lookahead to `boundary`. Returns the item's span,
    /// or `None` if it is empty (end of line).
    pub fn scan(&mut self, boundary: Boundary) -> Option<Span> {
        self.read_pos = self.lookahead_pos;
        self.skip_blank();
        self.lookahead_pos = boundary.scan(self.bytes(), self.read_pos, self.line_end);

        if self.lookahead_pos > self.read_pos {
            Some(Span::new(self.read_pos, self.lookahead_pos))
        } else {
            None
        }
    }

    pub fn scan_token(&mut self) -> Option<Span> {
        self.scan(Boundary::Token)
    }

    pub fn scan_name(&mut self) -> Option<Span> {
        self.scan(Boundary::Name)
    }

    pub fn scan_quoted(&mut self) -> Option<Span> {
        self.scan(Boundary::QuotedString)
    }

    /// Takes everything from the lookahead position to the end of the line.
    pub fn take_rest_of_line(&mut self) -> Option<Span> {
        if self.lookahead_pos >= self.line_end {
            return None;
        }
        self.read_pos = self.lookahead_pos;
        self.lookahead_pos = self.line_end;
        Some(Span::new(self.read_pos, self.line_end))
    }

    /// Puts both positions back at the start of the current line.
    pub fn rewind_to_line_start(&mut self) {
        self.read_pos = self.line_start;
        self.lookahead_pos = self.line_start;
    }

    /// Re-enters the current line at `pos`, e.g. just after a macro call.
    pub fn resume_at(&mut self, pos: usize) {
        debug_assert!(pos >= self.line_start && pos <= self.line_end);
        self.read_pos = pos;
        self.lookahead_pos = pos;
    }

    /// Pushes the last scanned item back so the next scan returns it again.
    pub fn unscan(&mut self) {
        self.lookahead_pos = self.read_pos;
    }

    /// Moves the read position up to the lookahead position.
    pub fn commit(&mut self) {
        self.read_pos = self.lookahead_pos;
    }

    /// Text covered by `span`.
    pub fn text(&self, span: Span) -> &'src str {
        &self.source[span.start..span.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_normalizes_line_endings() {
        let mut cursor = SourceCursor::new("one\r\ntwo\rthree\nfour");
        let mut lines = Vec::new();
        while cursor.advance_line().is_some() {
            lines.push((cursor.line_number(), cursor.line_text()));
        }
        assert_eq!(
            lines,
            vec![(1, "one"), (2, "two"), (3, "three"), (4, "four")]
        );
        assert!(cursor.is_at_eof());
        // a failed advance leaves the cursor on the last line
        assert_eq!(cursor.line_text(), "four");
    }

    #[test]
    fn trailing_newline_does_not_add_a_line() {
        let mut cursor = SourceCursor::new("end set s\n");
        assert!(cursor.advance_line().is_some());
        assert!(cursor.advance_line().is_none());
        assert_eq!(cursor.line_number(), 1);
    }

    #[test]
    fn blank_lines_are_lines() {
        let mut cursor = SourceCursor::new("a\n\nb\n");
        cursor.advance_line();
        cursor.advance_line();
        assert_eq!(cursor.line_text(), "");
        assert_eq!(cursor.scan_token(), None);
        cursor.advance_line();
        assert_eq!(cursor.line_text(), "b");
    }

    #[test]
    fn token_stops_at_blank_comment_and_comma() {
        let mut cursor = SourceCursor::new("  use mymod, only: x ! note");
        cursor.advance_line();
        let tok = cursor.scan_token().unwrap();
        assert_eq!(cursor.text(tok), "use");
        let tok = cursor.scan_token().unwrap();
        assert_eq!(cursor.text(tok), "mymod");
        let rest = cursor.take_rest_of_line().unwrap();
        assert_eq!(cursor.text(rest), ", only: x ! note");
    }

    #[test]
    fn name_keeps_inner_blanks_and_stops_at_comment() {
        let mut cursor = SourceCursor::new("test my long name ! trailing");
        cursor.advance_line();
        cursor.scan_token();
        let name = cursor.scan_name().unwrap();
        assert_eq!(cursor.text(name), "my long name ");
    }

    #[test]
    fn quoted_string_includes_both_quotes() {
        let mut cursor = SourceCursor::new("dep \"../src/a.f90\"");
        cursor.advance_line();
        cursor.scan_token();
        let s = cursor.scan_quoted().unwrap();
        assert_eq!(cursor.text(s), "\"../src/a.f90\"");
    }

    #[test]
    fn unterminated_quoted_string_runs_to_line_end() {
        let mut cursor = SourceCursor::new("dep \"../src/a.f90\nnext");
        cursor.advance_line();
        cursor.scan_token();
        let s = cursor.scan_quoted().unwrap();
        assert_eq!(cursor.text(s), "\"../src/a.f90");
    }

    #[test]
    fn quoted_string_requires_opening_quote() {
        let mut cursor = SourceCursor::new("dep file.f90");
        cursor.advance_line();
        cursor.scan_token();
        assert_eq!(cursor.scan_quoted(), None);
        assert_eq!(cursor.read_pos(), 4);
    }

    #[test]
    fn positions_respect_invariant() {
        let mut cursor = SourceCursor::new("  set   \nx");
        cursor.advance_line();
        cursor.scan_token();
        assert_eq!(cursor.scan_token(), None);
        assert!(cursor.line_start() <= cursor.read_pos());
        assert!(cursor.read_pos() <= cursor.lookahead_pos());
        assert!(cursor.lookahead_pos() <= cursor.line_end());
    }
}
