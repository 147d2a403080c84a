//! Fortran code generation.
//!
//! The output is one self-contained program: the `funit` support module, one
//! driver subroutine `funit_set<N>` per test set (with the set's tests,
//! setup and teardown as internal subroutines) and a `program main` that runs
//! the sets in declaration order.
//!
//! The whole program is built in memory; nothing is returned unless every
//! macro in the file expands cleanly.

pub mod assertions;

use std::sync::Arc;

use crate::ast::{CodeNode, MacroArg, MacroKind, TestCase, TestFile, TestSet};
use crate::errors::{ErrorKind, ErrorReporting, FunitError, SourceContext};
use assertions::{parse_real_literal, ArgText, Assertion, Tolerance};

/// Runtime support emitted ahead of the generated sets.
pub const SUPPORT_MODULE: &str = include_str!("codegen/funit_module.f90");

/// Generates the complete Fortran program for a parsed test file.
pub fn generate(file: &TestFile) -> Result<String, FunitError> {
    let mut generator = Generator::new(file);
    generator.emit_program()?;

    tracing::debug!(
        path = %file.path.display(),
        sets = file.sets.len(),
        tests = file.test_count(),
        bytes = generator.out.len(),
        "generated fortran"
    );
    Ok(generator.out)
}

struct Generator<'a> {
    file: &'a TestFile,
    source: SourceContext,
    out: String,
}

impl ErrorReporting for Generator<'_> {
    fn source_context(&self) -> &SourceContext {
        &self.source
    }

    fn phase(&self) -> &'static str {
        "generate"
    }
}

impl<'a> Generator<'a> {
    fn new(file: &'a TestFile) -> Self {
        Self {
            file,
            source: SourceContext::from_path(&file.path, Arc::clone(&file.source)),
            out: String::with_capacity(SUPPORT_MODULE.len() + file.source.len() * 4),
        }
    }

    fn emit_program(&mut self) -> Result<(), FunitError> {
        let file = self.file;
        self.out.push_str(SUPPORT_MODULE);
        for (index, set) in file.sets.iter().enumerate() {
            self.emit_set(set, index + 1)?;
        }
        self.emit_main();
        Ok(())
    }

    fn emit_set(&mut self, set: &TestSet, number: usize) -> Result<(), FunitError> {
        self.out.push_str(&format!("subroutine funit_set{number}\n  use funit\n"));
        for module in &set.mods {
            self.out.push_str("  use ");
            self.out.push_str(&module.name);
            if let Some(extra) = &module.extra {
                self.out.push_str(extra);
            }
            self.out.push('\n');
        }
        self.out.push_str(concat!(
            "\n",
            "  implicit none\n\n",
            "  character*1024 :: funit_message_\n",
            "  logical :: funit_passed_\n\n",
        ));

        self.emit_code(&set.code, set)?;

        let width = set.name_width();
        for (index, test) in set.tests.iter().enumerate() {
            self.out.push('\n');
            if set.setup.is_some() {
                self.out.push_str("  call funit_setup\n");
            }
            self.out.push_str(&format!(
                "  call funit_test{n}(funit_passed_, funit_message_)\n  call pass_fail(funit_passed_, funit_message_, \"{name}\", {width})\n",
                n = index + 1,
                name = test.name,
            ));
            if set.teardown.is_some() {
                self.out.push_str("  call funit_teardown\n\n");
            }
        }

        self.out.push_str("contains\n\n");
        if let Some(setup) = &set.setup {
            self.emit_support("setup", setup, set)?;
        }
        if let Some(teardown) = &set.teardown {
            self.emit_support("teardown", teardown, set)?;
        }
        for (index, test) in set.tests.iter().enumerate() {
            self.emit_test(test, index + 1, set)?;
        }

        self.out.push_str(&format!("end subroutine funit_set{number}\n"));
        Ok(())
    }

    fn emit_support(&mut self, kind: &str, code: &[CodeNode], set: &TestSet) -> Result<(), FunitError> {
        self.out.push_str(&format!("  subroutine funit_{kind}\n"));
        self.emit_code(code, set)?;
        self.out.push_str(&format!("  end subroutine funit_{kind}\n\n"));
        Ok(())
    }

    fn emit_test(&mut self, test: &TestCase, number: usize, set: &TestSet) -> Result<(), FunitError> {
        self.out.push_str(&format!(
            concat!(
                "  subroutine funit_test{n}(funit_passed_, funit_message_)\n",
                "    implicit none\n\n",
                "    logical, intent(out) :: funit_passed_\n",
                "    character(*), intent(out) :: funit_message_\n",
            ),
            n = number
        ));
        if test.needs_iterator {
            self.out.push_str("    integer :: funit_i_\n");
        }
        self.out.push('\n');

        self.emit_code(&test.code, set)?;

        self.out.push_str(&format!(
            "\n    funit_passed_ = .true.\n  end subroutine funit_test{number}\n\n"
        ));
        Ok(())
    }

    fn emit_main(&mut self) {
        let file = self.file;
        self.out.push_str("\n\nprogram main\n  use funit\n\n  call clear_stats\n");
        for (index, set) in file.sets.iter().enumerate() {
            self.out.push_str(&format!(
                "\n  call start_set(\"{name}\")\n  call funit_set{n}\n",
                name = set.name,
                n = index + 1,
            ));
        }
        self.out.push_str("\n  call report_stats\nend program main\n");
    }

    fn emit_code(&mut self, code: &[CodeNode], set: &TestSet) -> Result<(), FunitError> {
        for node in code {
            match node {
                CodeNode::Literal { span, .. } => {
                    let text = self.file.text(*span);
                    self.out.push_str(text);
                }
                CodeNode::MacroCall {
                    kind, offset, args, ..
                } => {
                    let expanded = self.expand_macro(*kind, *offset, args, set)?;
                    self.out.push_str(&expanded);
                }
            }
        }
        Ok(())
    }

    fn expand_macro(
        &self,
        kind: MacroKind,
        offset: usize,
        args: &[MacroArg],
        set: &TestSet,
    ) -> Result<String, FunitError> {
        let texts: Vec<ArgText<'_>> = args
            .iter()
            .map(|arg| ArgText::new(self.file.text(arg.span)))
            .collect();
        self.check_arity(kind, offset, &texts)?;
        if let Some(index) = texts.iter().position(|text| text.code.is_empty()) {
            return Err(self.report(
                ErrorKind::EmptyArgument {
                    macro_name: kind.name().into(),
                    index: index + 1,
                },
                args[index].span.start,
            ));
        }

        let assertion = match (kind, texts.as_slice()) {
            (MacroKind::True, [a]) => Assertion::True(a.clone()),
            (MacroKind::False, [a]) => Assertion::False(a.clone()),
            (MacroKind::Equal, [a, b]) => Assertion::Equal(a.clone(), b.clone()),
            (MacroKind::NotEqual, [a, b]) => Assertion::NotEqual(a.clone(), b.clone()),
            (MacroKind::ArrayEqual, [a, b]) => Assertion::ArrayEqual(a.clone(), b.clone()),
            (MacroKind::EqualWith, [a, b, rest @ ..]) => Assertion::EqualWith {
                actual: a.clone(),
                expected: b.clone(),
                tolerance: self.tolerance(kind, offset, args, rest, set)?,
            },
            (MacroKind::ArrayEqualWith, [a, b, rest @ ..]) => Assertion::ArrayEqualWith {
                actual: a.clone(),
                expected: b.clone(),
                tolerance: self.tolerance(kind, offset, args, rest, set)?,
            },
            (MacroKind::Flunk, [message]) => Assertion::Flunk(message.clone()),
            _ => return Err(self.arity_error(kind, offset, texts.len())),
        };
        Ok(assertion.expand())
    }

    /// The third argument if there is one, otherwise the set's `tolerance`.
    fn tolerance(
        &self,
        kind: MacroKind,
        offset: usize,
        args: &[MacroArg],
        rest: &[ArgText<'_>],
        set: &TestSet,
    ) -> Result<Tolerance, FunitError> {
        match rest {
            [] => {
                let value = set.tolerance.ok_or_else(|| {
                    self.report(
                        ErrorKind::MissingTolerance {
                            macro_name: kind.name().into(),
                        },
                        offset,
                    )
                    .with_help(format!(
                        "pass a third argument or add `tolerance <value>` to set `{}`",
                        set.name
                    ))
                })?;
                Ok(Tolerance::from_value(value))
            }
            [explicit] => self.explicit_tolerance(kind, &args[2], explicit),
            _ => Err(self.arity_error(kind, offset, args.len())),
        }
    }

    /// A numeric tolerance argument must be positive; anything else is a
    /// Fortran expression passed through as written.
    fn explicit_tolerance(
        &self,
        kind: MacroKind,
        arg: &MacroArg,
        text: &ArgText<'_>,
    ) -> Result<Tolerance, FunitError> {
        match parse_real_literal(text.code) {
            Some(value) if value <= 0.0 => {
                let raw = self.file.text(arg.span);
                let leading = raw.len() - raw.trim_start().len();
                Err(self.report(
                    ErrorKind::NonPositiveMacroTolerance {
                        macro_name: kind.name().into(),
                    },
                    arg.span.start + leading,
                ))
            }
            _ => Ok(Tolerance::from_argument(text)),
        }
    }

    fn check_arity(&self, kind: MacroKind, offset: usize, args: &[ArgText<'_>]) -> Result<(), FunitError> {
        if let [only] = args {
            if only.code.is_empty() {
                return Err(self.report(
                    ErrorKind::NoArguments {
                        macro_name: kind.name().into(),
                    },
                    offset,
                ));
            }
        }
        let (min, max) = kind.arity();
        if args.len() < min || args.len() > max {
            return Err(self.arity_error(kind, offset, args.len()));
        }
        Ok(())
    }

    fn arity_error(&self, kind: MacroKind, offset: usize, actual: usize) -> FunitError {
        let expected = match kind.arity() {
            (1, 1) => "1 argument".to_string(),
            (n, m) if n == m => format!("{n} arguments"),
            (n, m) => format!("{n} or {m} arguments"),
        };
        self.report(
            ErrorKind::ArityMismatch {
                macro_name: kind.name().into(),
                expected,
                actual,
            },
            offset,
        )
    }
}
