//! funit Error Handling - Unified Encapsulated API
//!
//! Every failure the parser, the code generator, the config loader and the
//! build/run pipeline can report is a [`FunitError`]. Errors carry the source
//! they came from so they can be rendered two ways: the plain
//! `<path>:<line>:` + caret format that scripts and tests match on, or a
//! `miette` graphical report.
//!
//! Build-rule template problems are never errors; they are recovered and
//! surfaced as warnings by [`crate::build_rule`].

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use unicode_width::UnicodeWidthChar;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// A named source buffer used to locate and render diagnostics.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceContext {
    /// Create a source context from real file content
    pub fn from_file(name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a source context for a path on disk whose content is already loaded
    pub fn from_path(path: &Path, content: impl Into<Arc<str>>) -> Self {
        Self::from_file(path.display().to_string(), content)
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.to_string()))
    }

    /// Finds the physical line containing `offset`.
    ///
    /// `\n`, `\r\n` and a lone `\r` all end a line. Offsets past the end of
    /// the buffer are clamped to it.
    pub fn locate(&self, offset: usize) -> Location {
        let bytes = self.content.as_bytes();
        let offset = offset.min(bytes.len());

        let mut line = 1;
        let mut line_start = 0;
        let mut i = 0;
        while i < offset {
            match bytes[i] {
                b'\n' => {
                    line += 1;
                    line_start = i + 1;
                }
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') && i + 1 < offset {
                        i += 1;
                    }
                    line += 1;
                    line_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }

        // an offset sitting right after the final terminator belongs to the last line
        if line_start == bytes.len() && line > 1 && offset == bytes.len() {
            return self.locate(offset.saturating_sub(1));
        }

        let line_end = bytes[line_start..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map_or(bytes.len(), |p| line_start + p);

        Location {
            line,
            line_text: self.content[line_start..line_end].to_string(),
            column: offset.min(line_end) - line_start,
        }
    }
}

/// A resolved position: 1-based line number, that line's text without its
/// terminator, and the byte column of the offending character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub line_text: String,
    pub column: usize,
}

impl Location {
    /// Builds the marker line printed under the offending source line.
    ///
    /// The caret sits under the offending column with a `--` lead-in, or with
    /// a `--` tail when the column is too close to the margin for the lead-in.
    pub fn caret_line(&self) -> String {
        let prefix = self
            .line_text
            .get(..self.column)
            .unwrap_or(&self.line_text);

        let mut pad = String::new();
        for ch in prefix.chars() {
            if ch == '\t' {
                pad.push('\t');
            } else {
                pad.extend(std::iter::repeat(' ').take(ch.width().unwrap_or(0)));
            }
        }

        if pad.len() > 2 && pad.ends_with("  ") {
            pad.truncate(pad.len() - 2);
            pad.push_str("--^");
        } else {
            pad.push_str("^--");
        }
        pad
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// The single error type - kind, where it happened, how to help
#[derive(Debug)]
pub struct FunitError {
    /// What went wrong
    pub kind: ErrorKind,
    /// Where it happened
    pub source_info: SourceInfo,
    /// How to help
    pub diagnostic_info: DiagnosticInfo,
}

/// All error kinds. The `Display` text is the one-line message printed after
/// `Error:` in diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Scan errors - malformed tokens inside a line
    #[error("expected a quote (\") to begin a string")]
    MissingOpenQuote,
    #[error("expected a quote (\") to end the string")]
    MissingCloseQuote,
    #[error("expected newline after '&'")]
    TextAfterContinuation,
    #[error("unexpected end of line")]
    UnexpectedEndOfLine,
    #[error("unexpected end of file")]
    UnexpectedEndOfFile,
    #[error("expected '('")]
    MissingOpenParen,

    // Structural errors - directives out of place or unmatched
    #[error("syntax error")]
    Syntax,
    #[error("expected a test set")]
    ExpectedTestSet,
    #[error("expected {kind} name")]
    MissingName { kind: String },
    #[error("\"end {kind}\" expected")]
    MissingEnd { kind: String },
    #[error("expected \"end {kind}\"")]
    WrongEnd { kind: String },
    #[error("mismatched {kind} name")]
    MismatchedName {
        kind: String,
        expected: String,
        found: String,
    },
    #[error("more than one {kind} case specified")]
    DuplicateBlock { kind: String },
    #[error("double quotes (\") not allowed in {kind} names")]
    QuoteInName { kind: String },
    #[error("expected a module name")]
    MissingModuleName,
    #[error("expected tolerance value")]
    MissingToleranceValue,
    #[error("not a floating point value")]
    InvalidTolerance,
    #[error("tolerance must be greater than zero")]
    NonPositiveTolerance,
    #[error("assertions not allowed here")]
    AssertionNotAllowed,
    #[error("file {path} is empty")]
    EmptyFile { path: String },

    // Macro errors - found while generating code
    #[error("no arguments to {macro_name}()")]
    NoArguments { macro_name: String },
    #[error("argument {index} to {macro_name}() is empty")]
    EmptyArgument { macro_name: String, index: usize },
    #[error("expected {expected} to {macro_name}()")]
    ArityMismatch {
        macro_name: String,
        expected: String,
        actual: usize,
    },
    #[error("in {macro_name}(): missing a tolerance argument or a set-level default tolerance")]
    MissingTolerance { macro_name: String },
    #[error("in {macro_name}(): parsed a tolerance <= 0.0; you need to fix that")]
    NonPositiveMacroTolerance { macro_name: String },

    // Config errors
    #[error("{message}")]
    ConfigSyntax { message: String },
    #[error("unknown config key \"{key}\"")]
    UnknownConfigKey { key: String },
    #[error("missing value")]
    MissingConfigValue,
    #[error("config file {path} not found")]
    ConfigNotFound { path: String },

    // I/O and external process errors
    #[error("{operation} {path}: {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },
    #[error("{step} command terminated with exit status {status}")]
    ProcessFailed { step: String, status: i32 },
    #[error("{step} command could not be started: {message}")]
    ProcessSpawn { step: String, message: String },
}

/// Where an error came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Option<Arc<NamedSource<String>>>,
    pub name: String,
    pub location: Option<Location>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Error taxonomy used by callers to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed string, continuation or token; fatal to the file's parse
    Scan,
    /// Directive structure violated; fatal to the file's parse
    Structure,
    /// Assertion macro misuse; fatal to generation for the file
    Macro,
    Config,
    Io,
    /// Build or run step failed; halts that file's pipeline
    Process,
}

impl ErrorKind {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingOpenQuote
            | Self::MissingCloseQuote
            | Self::TextAfterContinuation
            | Self::UnexpectedEndOfLine
            | Self::UnexpectedEndOfFile
            | Self::MissingOpenParen => ErrorCategory::Scan,

            Self::Syntax
            | Self::ExpectedTestSet
            | Self::MissingName { .. }
            | Self::MissingEnd { .. }
            | Self::WrongEnd { .. }
            | Self::MismatchedName { .. }
            | Self::DuplicateBlock { .. }
            | Self::QuoteInName { .. }
            | Self::MissingModuleName
            | Self::MissingToleranceValue
            | Self::InvalidTolerance
            | Self::NonPositiveTolerance
            | Self::AssertionNotAllowed
            | Self::EmptyFile { .. } => ErrorCategory::Structure,

            Self::NoArguments { .. }
            | Self::EmptyArgument { .. }
            | Self::ArityMismatch { .. }
            | Self::MissingTolerance { .. }
            | Self::NonPositiveMacroTolerance { .. } => ErrorCategory::Macro,

            Self::ConfigSyntax { .. }
            | Self::UnknownConfigKey { .. }
            | Self::MissingConfigValue
            | Self::ConfigNotFound { .. } => ErrorCategory::Config,

            Self::Io { .. } => ErrorCategory::Io,

            Self::ProcessFailed { .. } | Self::ProcessSpawn { .. } => ErrorCategory::Process,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::MissingOpenQuote => "missing_open_quote",
            Self::MissingCloseQuote => "missing_close_quote",
            Self::TextAfterContinuation => "text_after_continuation",
            Self::UnexpectedEndOfLine => "unexpected_end_of_line",
            Self::UnexpectedEndOfFile => "unexpected_end_of_file",
            Self::MissingOpenParen => "missing_open_paren",
            Self::Syntax => "syntax",
            Self::ExpectedTestSet => "expected_test_set",
            Self::MissingName { .. } => "missing_name",
            Self::MissingEnd { .. } => "missing_end",
            Self::WrongEnd { .. } => "wrong_end",
            Self::MismatchedName { .. } => "mismatched_name",
            Self::DuplicateBlock { .. } => "duplicate_block",
            Self::QuoteInName { .. } => "quote_in_name",
            Self::MissingModuleName => "missing_module_name",
            Self::MissingToleranceValue => "missing_tolerance_value",
            Self::InvalidTolerance => "invalid_tolerance",
            Self::NonPositiveTolerance => "non_positive_tolerance",
            Self::AssertionNotAllowed => "assertion_not_allowed",
            Self::EmptyFile { .. } => "empty_file",
            Self::NoArguments { .. } => "no_arguments",
            Self::EmptyArgument { .. } => "empty_argument",
            Self::ArityMismatch { .. } => "arity_mismatch",
            Self::MissingTolerance { .. } => "missing_tolerance",
            Self::NonPositiveMacroTolerance { .. } => "non_positive_macro_tolerance",
            Self::ConfigSyntax { .. } => "config_syntax",
            Self::UnknownConfigKey { .. } => "unknown_config_key",
            Self::MissingConfigValue => "missing_config_value",
            Self::ConfigNotFound { .. } => "config_not_found",
            Self::Io { .. } => "io",
            Self::ProcessFailed { .. } => "process_failed",
            Self::ProcessSpawn { .. } => "process_spawn",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Scan => "malformed here",
            ErrorCategory::Structure => "unexpected here",
            ErrorCategory::Macro => "in this assertion",
            ErrorCategory::Config => "in this setting",
            ErrorCategory::Io | ErrorCategory::Process => "here",
        }
    }
}

impl std::error::Error for FunitError {}

impl fmt::Display for FunitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_info.location {
            Some(loc) => write!(f, "{}:{}: {}", self.source_info.name, loc.line, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Diagnostic for FunitError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.source_info.source.as_ref()?;
        let label = LabeledSpan::new_with_span(
            Some(self.kind.primary_label().to_string()),
            self.source_info.primary_span,
        );
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_info
            .source
            .as_deref()
            .map(|s| s as &dyn miette::SourceCode)
    }
}

impl FunitError {
    /// Creates an error that is not tied to a location in any source file,
    /// such as an I/O failure or a failing external command.
    pub fn unspanned(kind: ErrorKind, phase: &str) -> Self {
        let error_code = format!("funit::{}::{}", phase, kind.code_suffix());
        Self {
            kind,
            source_info: SourceInfo {
                source: None,
                name: String::new(),
                location: None,
                primary_span: unspanned(),
                phase: phase.to_string(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }

    /// Wraps an `std::io::Error` raised while operating on `path`.
    pub fn io(operation: &str, path: &Path, err: std::io::Error) -> Self {
        Self::unspanned(
            ErrorKind::Io {
                operation: operation.to_string(),
                path: path.display().to_string(),
                message: err.to_string(),
            },
            "io",
        )
    }

    /// Attaches a help message shown by the graphical renderer.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.diagnostic_info.help = Some(help.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Line number of the offending source line, if the error has one.
    pub fn line(&self) -> Option<usize> {
        self.source_info.location.as_ref().map(|l| l.line)
    }

    /// Renders the plain diagnostic:
    ///
    /// ```text
    /// tests/sample.fun:3:
    ///
    ///     dep "missing.f90
    ///       --^
    /// Error: expected a quote (") to end the string
    /// ```
    pub fn render_plain(&self) -> String {
        match &self.source_info.location {
            Some(loc) => format!(
                "{}:{}:\n\n{}\n{}\nError: {}\n",
                self.source_info.name,
                loc.line,
                loc.line_text,
                loc.caret_line(),
                self.kind
            ),
            None => format!("Error: {}\n", self.kind),
        }
    }
}

/// Context-aware error creation - each context knows its source and phase
pub trait ErrorReporting {
    /// The source buffer errors are located in
    fn source_context(&self) -> &SourceContext;

    /// The pipeline phase used in error codes
    fn phase(&self) -> &'static str;

    /// Create an error pointing at byte `offset` of the source
    fn report(&self, kind: ErrorKind, offset: usize) -> FunitError {
        let source = self.source_context();
        let location = source.locate(offset);
        let len = source.content.len();
        let start = offset.min(len);
        let end = (start + 1).min(len);
        let error_code = format!("funit::{}::{}", self.phase(), kind.code_suffix());

        FunitError {
            kind,
            source_info: SourceInfo {
                source: Some(source.to_named_source()),
                name: source.name.clone(),
                location: Some(location),
                primary_span: SourceSpan::from(start..end),
                phase: self.phase().to_string(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }

    fn missing_name(&self, kind: &str, offset: usize) -> FunitError {
        self.report(ErrorKind::MissingName { kind: kind.into() }, offset)
    }

    fn syntax_error(&self, offset: usize) -> FunitError {
        self.report(ErrorKind::Syntax, offset)
    }
}

/// General-purpose reporter for a source and phase, for callers that have no
/// richer context of their own.
pub struct PhaseContext {
    pub source: SourceContext,
    pub phase: &'static str,
}

impl PhaseContext {
    pub fn new(source: SourceContext, phase: &'static str) -> Self {
        Self { source, phase }
    }
}

impl ErrorReporting for PhaseContext {
    fn source_context(&self) -> &SourceContext {
        &self.source
    }

    fn phase(&self) -> &'static str {
        self.phase
    }
}

/// Creates a placeholder span for errors not tied to a specific source code
/// location.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

/// Prints a FunitError to stderr, either as the plain caret diagnostic or as
/// a full miette report.
pub fn print_error(error: FunitError, fancy: bool) {
    if fancy {
        let report = miette::Report::new(error);
        eprintln!("{report:?}");
    } else {
        eprint!("{}", error.render_plain());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(src: &str) -> PhaseContext {
        PhaseContext::new(SourceContext::from_file("t.fun", src), "parse")
    }

    #[test]
    fn locate_handles_all_line_endings() {
        let source = SourceContext::from_file("t", "a\r\nbb\rccc\nd");
        assert_eq!(source.locate(0).line, 1);
        assert_eq!(source.locate(3).line, 2);
        assert_eq!(source.locate(3).line_text, "bb");
        assert_eq!(source.locate(7).line, 3);
        assert_eq!(source.locate(7).line_text, "ccc");
        assert_eq!(source.locate(11).line, 4);
    }

    #[test]
    fn locate_past_final_newline_stays_on_last_line() {
        let source = SourceContext::from_file("t", "end set s\n");
        let loc = source.locate(10);
        assert_eq!(loc.line, 1);
        assert_eq!(loc.line_text, "end set s");
    }

    #[test]
    fn caret_leads_with_dashes_after_the_margin() {
        let loc = Location {
            line: 1,
            line_text: "  dep \"x".into(),
            column: 6,
        };
        assert_eq!(loc.caret_line(), "    --^");
    }

    #[test]
    fn caret_trails_dashes_near_the_margin() {
        let loc = Location {
            line: 1,
            line_text: "x".into(),
            column: 0,
        };
        assert_eq!(loc.caret_line(), "^--");
    }

    #[test]
    fn plain_render_matches_compatibility_format() {
        let err = ctx("set s\n  test \"t\n").report(
            ErrorKind::QuoteInName {
                kind: "test".into(),
            },
            13,
        );
        assert_eq!(
            err.render_plain(),
            "t.fun:2:\n\n  test \"t\n     --^\nError: double quotes (\") not allowed in test names\n"
        );
        assert_eq!(err.category(), ErrorCategory::Structure);
        assert_eq!(err.diagnostic_info.error_code, "funit::parse::quote_in_name");
    }

    #[test]
    fn fancy_report_includes_label_and_help() {
        let err = ctx("set s\n")
            .report(ErrorKind::ExpectedTestSet, 0)
            .with_help("files must start with a `set` block");
        let output = format!("{:?}", miette::Report::new(err));
        assert!(output.contains("expected a test set"));
        assert!(output.contains("files must start with a `set` block"));
    }
}
