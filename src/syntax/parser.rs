//! Structural parser for test-definition files.
//!
//! A file is a sequence of `set ... end set` blocks. Inside a set, lines whose
//! first token is a directive (`dep`, `use`, `tolerance`, `setup`, `teardown`,
//! `test`) are parsed here; everything else is host-language code, collected
//! verbatim as [`CodeNode::Literal`] runs with assertion macros cut out as
//! [`CodeNode::MacroCall`]s.
//!
//! Directive keywords are case-insensitive and recognized only as the first
//! token of a line. The first error abandons the whole file.

use std::path::Path;
use std::sync::Arc;

use super::args::split_args;
use super::assertion::find_macro;
use super::cursor::SourceCursor;
use super::ScanError;
use crate::ast::{CodeNode, Span, TestCase, TestDependency, TestFile, TestModule, TestSet};
use crate::errors::{ErrorKind, ErrorReporting, FunitError, SourceContext};

/// Leading tokens that end a run of host code.
const SECTION_KEYWORDS: &[&str] = &["test", "setup", "teardown", "dep", "tolerance"];

/// Tokens that, after `end`, end a run of host code.
const END_KEYWORDS: &[&str] = &["test", "setup", "teardown", "set"];

/// Reads and parses the test file at `path`.
pub fn parse_file(path: &Path) -> Result<TestFile, FunitError> {
    let content = std::fs::read_to_string(path).map_err(|e| FunitError::io("reading", path, e))?;
    parse_source(path, content)
}

/// Parses already-loaded source text; `path` is used for diagnostics and
/// recorded in the resulting [`TestFile`].
pub fn parse_source(path: &Path, content: impl Into<Arc<str>>) -> Result<TestFile, FunitError> {
    let content: Arc<str> = content.into();
    if content.is_empty() {
        return Err(FunitError::unspanned(
            ErrorKind::EmptyFile {
                path: path.display().to_string(),
            },
            "parse",
        ));
    }

    let source = SourceContext::from_path(path, Arc::clone(&content));
    let sets = Parser::new(&content, source).parse_sets()?;
    let file = TestFile {
        path: path.to_path_buf(),
        source: content,
        sets,
    };

    tracing::debug!(
        path = %path.display(),
        sets = file.sets.len(),
        tests = file.test_count(),
        "parsed test file"
    );
    Ok(file)
}

/// Where a run of host code sits, which decides what ends it and whether
/// assertions may appear in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeScope {
    Test,
    Support(&'static str),
    SetBody,
}

impl CodeScope {
    fn end_kind(self) -> &'static str {
        match self {
            CodeScope::Test => "test",
            CodeScope::Support(kind) => kind,
            CodeScope::SetBody => "set",
        }
    }

    fn allows_assertions(self) -> bool {
        matches!(self, CodeScope::Test)
    }
}

struct Parser<'src> {
    cursor: SourceCursor<'src>,
    source: SourceContext,
}

impl ErrorReporting for Parser<'_> {
    fn source_context(&self) -> &SourceContext {
        &self.source
    }

    fn phase(&self) -> &'static str {
        "parse"
    }
}

impl<'src> Parser<'src> {
    fn new(content: &'src str, source: SourceContext) -> Self {
        Self {
            cursor: SourceCursor::new(content),
            source,
        }
    }

    fn scan_failure(&self, err: ScanError) -> FunitError {
        self.report(err.kind, err.offset)
    }

    fn keyword_eq(&self, span: Span, keyword: &str) -> bool {
        self.cursor.text(span).eq_ignore_ascii_case(keyword)
    }

    fn is_any_keyword(&self, span: Span, keywords: &[&str]) -> bool {
        keywords.iter().any(|keyword| self.keyword_eq(span, keyword))
    }

    fn duplicate_block(&self, kind: &str, offset: usize) -> FunitError {
        self.report(ErrorKind::DuplicateBlock { kind: kind.into() }, offset)
    }

    fn parse_sets(&mut self) -> Result<Vec<TestSet>, FunitError> {
        let mut sets = Vec::new();
        self.cursor.advance_line();

        loop {
            match self.cursor.scan_token() {
                Some(tok) if self.keyword_eq(tok, "set") => sets.push(self.parse_set()?),
                Some(_) => return Err(self.expected_test_set(self.cursor.read_pos())),
                None => {
                    if self.cursor.advance_line().is_none() {
                        break;
                    }
                }
            }
        }

        if sets.is_empty() {
            return Err(self.expected_test_set(self.cursor.read_pos()));
        }
        Ok(sets)
    }

    fn expected_test_set(&self, offset: usize) -> FunitError {
        self.report(ErrorKind::ExpectedTestSet, offset)
            .with_help("test files are made of `set <name>` ... `end set` blocks")
    }

    fn parse_set(&mut self) -> Result<TestSet, FunitError> {
        let line = self.cursor.line_number();
        let name = self.expect_name("set")?;
        self.expect_eol()?;

        let mut set = TestSet::new(name, line);
        loop {
            let Some(tok) = self.cursor.scan_token() else {
                if self.cursor.advance_line().is_none() {
                    return Err(self.missing_end("set"));
                }
                continue;
            };

            match self.cursor.text(tok).to_ascii_lowercase().as_str() {
                "dep" => {
                    let dep = self.parse_dependency()?;
                    set.deps.push(dep);
                }
                "use" => {
                    let module = self.parse_module()?;
                    set.mods.push(module);
                }
                "tolerance" => {
                    let tolerance = self.parse_tolerance()?;
                    if let Some(previous) = set.tolerance.replace(tolerance) {
                        tracing::warn!(
                            set = %set.name,
                            previous,
                            tolerance,
                            "tolerance given more than once; using the last one"
                        );
                    }
                }
                "setup" => {
                    if set.setup.is_some() {
                        return Err(self.duplicate_block("setup", tok.start));
                    }
                    set.setup = Some(self.parse_support("setup")?);
                }
                "teardown" => {
                    if set.teardown.is_some() {
                        return Err(self.duplicate_block("teardown", tok.start));
                    }
                    set.teardown = Some(self.parse_support("teardown")?);
                }
                "test" => {
                    let test = self.parse_test_case()?;
                    set.tests.push(test);
                }
                "end" => {
                    self.cursor.unscan();
                    break;
                }
                _ => {
                    self.cursor.rewind_to_line_start();
                    let code = self.parse_code(CodeScope::SetBody)?;
                    set.code.extend(code);
                }
            }
        }

        self.parse_end_sequence("set", Some(&set.name))?;
        Ok(set)
    }

    fn parse_test_case(&mut self) -> Result<TestCase, FunitError> {
        let line = self.cursor.line_number();
        let name = self.expect_name("test")?;
        self.expect_eol()?;

        let code = self.parse_code(CodeScope::Test)?;
        let needs_iterator = code
            .iter()
            .any(|node| matches!(node, CodeNode::MacroCall { kind, .. } if kind.is_array()));

        self.parse_end_sequence("test", Some(&name))?;
        Ok(TestCase {
            name,
            line,
            needs_iterator,
            code,
        })
    }

    fn parse_support(&mut self, kind: &'static str) -> Result<Vec<CodeNode>, FunitError> {
        self.expect_eol()?;
        let code = self.parse_code(CodeScope::Support(kind))?;
        self.parse_end_sequence(kind, None)?;
        Ok(code)
    }

    fn parse_dependency(&mut self) -> Result<TestDependency, FunitError> {
        let line = self.cursor.line_number();
        let Some(span) = self.cursor.scan_quoted() else {
            return Err(self.report(ErrorKind::MissingOpenQuote, self.cursor.read_pos()));
        };
        let text = self.cursor.text(span);
        if text.len() < 2 || !text.ends_with('"') {
            return Err(self.report(ErrorKind::MissingCloseQuote, self.cursor.lookahead_pos()));
        }

        let filename = text[1..text.len() - 1].to_string();
        self.expect_eol()?;
        Ok(TestDependency { filename, line })
    }

    fn parse_module(&mut self) -> Result<TestModule, FunitError> {
        let Some(name) = self.cursor.scan_token() else {
            return Err(self.report(ErrorKind::MissingModuleName, self.cursor.read_pos()));
        };
        let name = self.cursor.text(name).to_string();

        // trailing text such as `, only: solve` belongs to the use statement
        let extra = self
            .cursor
            .take_rest_of_line()
            .map(|rest| self.cursor.text(rest).trim_end())
            .filter(|rest| !rest.trim_start().is_empty())
            .map(str::to_string);

        self.expect_eol()?;
        Ok(TestModule { name, extra })
    }

    /// Parses the value of a `tolerance` directive. Fortran `d` exponents are
    /// accepted; the value must be finite and positive.
    fn parse_tolerance(&mut self) -> Result<f64, FunitError> {
        let Some(span) = self.cursor.scan_token() else {
            return Err(self.report(ErrorKind::MissingToleranceValue, self.cursor.read_pos()));
        };

        let normalized = self.cursor.text(span).replace(['d', 'D'], "e");
        let value: f64 = normalized
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| self.report(ErrorKind::InvalidTolerance, span.start))?;
        if value <= 0.0 {
            return Err(self.report(ErrorKind::NonPositiveTolerance, span.start));
        }

        self.expect_eol()?;
        Ok(value)
    }

    /// Collects host code until a directive line ends it.
    ///
    /// Assertion macros found along the way split the run into literal text
    /// and macro calls. Scanning resumes right after each call's `)`, so
    /// several macros may share a line.
    fn parse_code(&mut self, scope: CodeScope) -> Result<Vec<CodeNode>, FunitError> {
        let mut nodes = Vec::new();
        let mut literal_start = self.cursor.line_start();
        let mut literal_line = self.cursor.line_number();
        let mut pos = literal_start;
        let mut fresh_line = true;

        loop {
            if self.cursor.is_at_eof() {
                return Err(self.missing_end(scope.end_kind()));
            }

            if fresh_line && self.at_code_terminator() {
                push_literal(&mut nodes, literal_start, self.cursor.line_start(), literal_line);
                return Ok(nodes);
            }

            let found = find_macro(&self.cursor, pos).map_err(|e| self.scan_failure(e))?;
            let Some(found) = found else {
                self.cursor.advance_line();
                pos = self.cursor.line_start();
                fresh_line = true;
                continue;
            };

            if !scope.allows_assertions() {
                return Err(self
                    .report(ErrorKind::AssertionNotAllowed, found.start)
                    .with_help("assertions may only appear inside `test` blocks"));
            }

            push_literal(&mut nodes, literal_start, found.start, literal_line);
            let line = self.cursor.line_number();
            let (args, close_paren) =
                split_args(&mut self.cursor, found.open_paren).map_err(|e| self.scan_failure(e))?;
            nodes.push(CodeNode::MacroCall {
                kind: found.kind,
                offset: found.start,
                line,
                args,
            });

            pos = close_paren + 1;
            self.cursor.resume_at(pos);
            literal_start = pos;
            literal_line = self.cursor.line_number();
            fresh_line = false;
        }
    }

    /// True when the current line starts with a directive or an `end <kind>`
    /// sequence. Leaves the cursor at the start of the line.
    fn at_code_terminator(&mut self) -> bool {
        self.cursor.rewind_to_line_start();
        let terminates = match self.cursor.scan_token() {
            Some(tok) if self.is_any_keyword(tok, SECTION_KEYWORDS) => true,
            Some(tok) if self.keyword_eq(tok, "end") => {
                let next = self.cursor.scan_token();
                next.is_some_and(|next| self.is_any_keyword(next, END_KEYWORDS))
            }
            _ => false,
        };

        self.cursor.rewind_to_line_start();
        terminates
    }

    /// Parses `end <kind> [name]` and the end of its line. A closing name,
    /// when present, must match `name` ignoring case.
    fn parse_end_sequence(&mut self, kind: &str, name: Option<&str>) -> Result<(), FunitError> {
        match self.cursor.scan_token() {
            Some(tok) if self.keyword_eq(tok, "end") => {}
            _ => return Err(self.missing_end_at(kind, self.cursor.read_pos())),
        }

        match self.cursor.scan_token() {
            None => return Err(self.syntax_error(self.cursor.read_pos())),
            Some(tok) if !self.keyword_eq(tok, kind) => {
                return Err(self.report(ErrorKind::WrongEnd { kind: kind.into() }, tok.start));
            }
            Some(_) => {}
        }

        if let Some(expected) = name {
            if let Some(span) = self.cursor.scan_name() {
                let found = self.cursor.text(span).trim_end();
                if !found.eq_ignore_ascii_case(expected) {
                    return Err(self
                        .report(
                            ErrorKind::MismatchedName {
                                kind: kind.into(),
                                expected: expected.into(),
                                found: found.into(),
                            },
                            span.start,
                        )
                        .with_help(format!("this {kind} was opened as `{expected}`")));
                }
            }
        }

        self.expect_eol()
    }

    /// Scans a block name; names run to the end of the line or a `!`
    /// comment and may contain blanks.
    fn expect_name(&mut self, kind: &str) -> Result<String, FunitError> {
        let Some(span) = self.cursor.scan_name() else {
            return Err(self.missing_name(kind, self.cursor.read_pos()));
        };

        let name = self.cursor.text(span).trim_end();
        if let Some(quote) = name.find('"') {
            return Err(self.report(ErrorKind::QuoteInName { kind: kind.into() }, span.start + quote));
        }
        Ok(name.to_string())
    }

    /// Requires only blanks or a comment before the end of the line, then
    /// moves to the next line. Running out of lines here is not an error.
    fn expect_eol(&mut self) -> Result<(), FunitError> {
        self.cursor.commit();
        let pos = self.cursor.skip_blank();
        if pos < self.cursor.line_end() && self.cursor.bytes()[pos] != b'!' {
            return Err(self.syntax_error(pos));
        }
        self.cursor.advance_line();
        Ok(())
    }

    fn missing_end(&self, kind: &str) -> FunitError {
        self.missing_end_at(kind, self.source.content.len())
    }

    fn missing_end_at(&self, kind: &str, offset: usize) -> FunitError {
        self.report(ErrorKind::MissingEnd { kind: kind.into() }, offset)
    }
}

fn push_literal(nodes: &mut Vec<CodeNode>, start: usize, end: usize, line: usize) {
    if end > start {
        nodes.push(CodeNode::Literal {
            span: Span::new(start, end),
            line,
        });
    }
}
