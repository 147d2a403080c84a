//! User-facing output for the CLI: per-file status lines, the run summary
//! and the `ast` outline.

use std::fmt::Write as _;
use std::io::{IsTerminal, Write as _};
use std::path::Path;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::ast::{CodeNode, TestFile};
use crate::errors::{print_error, FunitError};
use crate::pipeline::{RunObserver, RunSummary};

// ============================================================================
// RUN STATUS
// ============================================================================

/// `Auto` still colors a pipe when `TERM` is set, so redirected output is
/// always plain.
fn color_choice(stdout_is_terminal: bool) -> ColorChoice {
    if stdout_is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Prints one colored status line per test file; failures are followed by
/// their diagnostic.
pub struct StatusPrinter {
    stdout: StandardStream,
    fancy: bool,
}

impl StatusPrinter {
    pub fn new(fancy: bool) -> Self {
        Self {
            stdout: StandardStream::stdout(color_choice(std::io::stdout().is_terminal())),
            fancy,
        }
    }

    fn tagged(&mut self, tag: &str, color: Color, text: &str) {
        let _ = self
            .stdout
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.stdout, "{tag}");
        let _ = self.stdout.reset();
        let _ = writeln!(self.stdout, " {text}");
        let _ = self.stdout.flush();
    }

    pub fn print_summary(&mut self, summary: &RunSummary) {
        let _ = writeln!(self.stdout);
        let _ = self.stdout.set_color(ColorSpec::new().set_bold(true));
        let _ = write!(self.stdout, "{} files: ", summary.total());
        let _ = self.stdout.reset();

        let color = if summary.is_success() {
            Color::Green
        } else {
            Color::Red
        };
        let _ = self.stdout.set_color(ColorSpec::new().set_fg(Some(color)));
        let _ = writeln!(
            self.stdout,
            "{} passed, {} failed",
            summary.passed, summary.failed
        );
        let _ = self.stdout.reset();
    }
}

impl RunObserver for StatusPrinter {
    fn file_started(&mut self, path: &Path) {
        self.tagged("  RUN", Color::Blue, &path.display().to_string());
    }

    fn file_finished(&mut self, path: &Path, result: Result<(), FunitError>) {
        match result {
            Ok(()) => self.tagged("   OK", Color::Green, &path.display().to_string()),
            Err(e) => {
                self.tagged(" FAIL", Color::Red, &path.display().to_string());
                print_error(e, self.fancy);
            }
        }
    }
}

// ============================================================================
// AST OUTLINE
// ============================================================================

/// Indented summary of a parsed file, one line per directive or code node.
pub fn outline(file: &TestFile) -> String {
    let mut out = String::new();
    let sets = file.sets.len();
    let tests = file.test_count();
    let _ = writeln!(
        out,
        "{}: {} {}, {} {}",
        file.path.display(),
        sets,
        plural(sets, "set"),
        tests,
        plural(tests, "test")
    );

    for set in &file.sets {
        let _ = writeln!(out, "set {} (line {})", set.name, set.line);
        if let Some(tolerance) = set.tolerance {
            let _ = writeln!(out, "  tolerance {tolerance}");
        }
        for dep in &set.deps {
            let _ = writeln!(out, "  dep {} (line {})", dep.filename, dep.line);
        }
        for module in &set.mods {
            let _ = writeln!(out, "  use {}{}", module.name, module.extra.as_deref().unwrap_or(""));
        }
        if let Some(setup) = &set.setup {
            outline_block(&mut out, "setup", setup, file);
        }
        if let Some(teardown) = &set.teardown {
            outline_block(&mut out, "teardown", teardown, file);
        }
        if !set.code.is_empty() {
            outline_block(&mut out, "code", &set.code, file);
        }
        for test in &set.tests {
            let _ = writeln!(out, "  test {} (line {})", test.name, test.line);
            outline_nodes(&mut out, &test.code, file, "    ");
        }
    }
    out
}

fn outline_block(out: &mut String, label: &str, nodes: &[CodeNode], file: &TestFile) {
    let _ = writeln!(out, "  {label}");
    outline_nodes(out, nodes, file, "    ");
}

fn outline_nodes(out: &mut String, nodes: &[CodeNode], file: &TestFile, indent: &str) {
    for node in nodes {
        match node {
            CodeNode::Literal { span, line } => {
                let lines = file.text(*span).lines().filter(|l| !l.trim().is_empty()).count();
                if lines == 0 {
                    continue;
                }
                let _ = writeln!(out, "{indent}code (line {line}, {lines} {})", plural(lines, "line"));
            }
            CodeNode::MacroCall {
                kind, line, args, ..
            } => {
                let texts: Vec<&str> = args.iter().map(|a| file.text(a.span).trim()).collect();
                let _ = writeln!(out, "{indent}{kind}({}) (line {line})", texts.join(", "));
            }
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn outline_lists_directives_and_macros() {
        let source = "set numbers\n  tolerance 1e-6\n  use solver, only: solve\n  test adds\n    x = 1\n    assert_equal(x, 1)\n  end test\nend set\n";
        let file = crate::syntax::parse_source(Path::new("n.fun"), source).unwrap();
        assert_eq!(
            outline(&file),
            "n.fun: 1 set, 1 test\n\
             set numbers (line 1)\n  \
             tolerance 0.000001\n  \
             use solver, only: solve\n  \
             test adds (line 4)\n    \
             code (line 5, 1 line)\n    \
             assert_equal(x, 1) (line 6)\n"
        );
    }
    #[test]
    fn piped_output_is_never_colored() {
        assert_eq!(color_choice(false), ColorChoice::Never);
        assert_eq!(color_choice(true), ColorChoice::Auto);
    }
}
