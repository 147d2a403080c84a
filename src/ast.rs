//! The parsed form of a test-definition file.
//!
//! All text is kept as byte spans into the file's source buffer, which the
//! [`TestFile`] owns. Every list is stored in declaration order.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A half-open byte range `[start, end)` into a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The assertion macros the generator knows how to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MacroKind {
    True,
    False,
    Equal,
    NotEqual,
    EqualWith,
    ArrayEqual,
    ArrayEqualWith,
    Flunk,
}

impl MacroKind {
    /// The name the macro is written with in test files.
    pub const fn name(self) -> &'static str {
        match self {
            MacroKind::True => "assert_true",
            MacroKind::False => "assert_false",
            MacroKind::Equal => "assert_equal",
            MacroKind::NotEqual => "assert_not_equal",
            MacroKind::EqualWith => "assert_equal_with",
            MacroKind::ArrayEqual => "assert_array_equal",
            MacroKind::ArrayEqualWith => "assert_array_equal_with",
            MacroKind::Flunk => "flunk",
        }
    }

    /// Accepted argument count as an inclusive `(min, max)` range.
    pub const fn arity(self) -> (usize, usize) {
        match self {
            MacroKind::True | MacroKind::False | MacroKind::Flunk => (1, 1),
            MacroKind::Equal | MacroKind::NotEqual | MacroKind::ArrayEqual => (2, 2),
            MacroKind::EqualWith | MacroKind::ArrayEqualWith => (2, 3),
        }
    }

    /// Array assertions need the `funit_i_` loop variable in their test.
    pub const fn is_array(self) -> bool {
        matches!(self, MacroKind::ArrayEqual | MacroKind::ArrayEqualWith)
    }
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One macro argument's raw source text. The span may cross `&` line
/// continuations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroArg {
    pub span: Span,
    pub line: usize,
}

/// A piece of a code chain: verbatim host-language text or an assertion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CodeNode {
    Literal {
        span: Span,
        line: usize,
    },
    MacroCall {
        kind: MacroKind,
        /// Offset of the macro name, used to point diagnostics at the call.
        offset: usize,
        line: usize,
        args: Vec<MacroArg>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub name: String,
    pub line: usize,
    /// True iff an array assertion appears in `code`.
    pub needs_iterator: bool,
    pub code: Vec<CodeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDependency {
    pub filename: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestModule {
    pub name: String,
    /// Same-line text after the module name, e.g. `, only: solve`.
    pub extra: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSet {
    pub name: String,
    pub line: usize,
    /// `None` until a `tolerance` directive is seen.
    pub tolerance: Option<f64>,
    pub deps: Vec<TestDependency>,
    pub mods: Vec<TestModule>,
    pub setup: Option<Vec<CodeNode>>,
    pub teardown: Option<Vec<CodeNode>>,
    pub tests: Vec<TestCase>,
    /// Set-level host code, emitted in the set driver.
    pub code: Vec<CodeNode>,
}

impl TestSet {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            tolerance: None,
            deps: Vec::new(),
            mods: Vec::new(),
            setup: None,
            teardown: None,
            tests: Vec::new(),
            code: Vec::new(),
        }
    }

    /// Width passed to `pass_fail` so test names line up in the report.
    pub fn name_width(&self) -> usize {
        self.tests.iter().map(|t| t.name.len()).max().unwrap_or(0) + 2
    }
}

/// A parsed test file: its path, its source and its test sets.
#[derive(Debug, Clone, Serialize)]
pub struct TestFile {
    pub path: PathBuf,
    #[serde(skip)]
    pub source: Arc<str>,
    pub sets: Vec<TestSet>,
}

impl TestFile {
    /// Source text covered by `span`.
    pub fn text(&self, span: Span) -> &str {
        &self.source[span.start..span.end]
    }

    pub fn test_count(&self) -> usize {
        self.sets.iter().map(|s| s.tests.len()).sum()
    }

    /// Dependency filenames across all sets, first-seen order, duplicates dropped.
    pub fn unique_deps(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for dep in self.sets.iter().flat_map(|s| &s.deps) {
            if !seen.contains(&dep.filename.as_str()) {
                seen.push(&dep.filename);
            }
        }
        seen
    }

    /// Module names across all sets, first-seen order, duplicates dropped.
    pub fn unique_mods(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for module in self.sets.iter().flat_map(|s| &s.mods) {
            if !seen.contains(&module.name.as_str()) {
                seen.push(&module.name);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(name: &str, deps: &[&str], mods: &[&str]) -> TestSet {
        let mut set = TestSet::new(name, 1);
        set.deps = deps
            .iter()
            .map(|d| TestDependency {
                filename: d.to_string(),
                line: 1,
            })
            .collect();
        set.mods = mods
            .iter()
            .map(|m| TestModule {
                name: m.to_string(),
                extra: None,
            })
            .collect();
        set
    }

    #[test]
    fn unique_deps_keep_first_seen_order() {
        let file = TestFile {
            path: "t.fun".into(),
            source: Arc::from(""),
            sets: vec![
                set_with("a", &["a", "b"], &[]),
                set_with("b", &["b", "c"], &[]),
                set_with("c", &["d"], &[]),
            ],
        };
        assert_eq!(file.unique_deps(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn unique_mods_drop_repeats_within_and_across_sets() {
        let file = TestFile {
            path: "t.fun".into(),
            source: Arc::from(""),
            sets: vec![
                set_with("a", &[], &["a", "b", "b"]),
                set_with("b", &[], &["d", "c"]),
                set_with("c", &[], &["c", "f", "e"]),
            ],
        };
        assert_eq!(file.unique_mods(), vec!["a", "b", "d", "c", "f", "e"]);
    }

    #[test]
    fn arity_ranges() {
        assert_eq!(MacroKind::Flunk.arity(), (1, 1));
        assert_eq!(MacroKind::NotEqual.arity(), (2, 2));
        assert_eq!(MacroKind::ArrayEqualWith.arity(), (2, 3));
        assert!(MacroKind::ArrayEqual.is_array());
        assert!(!MacroKind::EqualWith.is_array());
    }
}
