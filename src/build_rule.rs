//! Build-rule templates.
//!
//! A build rule is a shell command template such as
//! `gfortran -o {{EXE}} {{PREREQ}}`. It is compiled once per configuration
//! into a list of [`Fragment`]s and rendered once per test file.
//!
//! - `${NAME}` is replaced at compile time with the environment variable's
//!   value (empty when unset).
//! - `{{NAME}}` names an [`InternalVar`], expanded at render time from the
//!   parsed test file.
//! - `\` escapes a following `$`, `{`, `}` or `\`.
//!
//! Malformed references are never fatal: they are copied through literally
//! and recorded as warnings.

use std::path::Path;

use crate::ast::TestFile;
use crate::config::Config;

/// One piece of a compiled build rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(String),
    Variable(InternalVar),
}

/// The `{{NAME}}` variables a build rule may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalVar {
    /// Dependency files across all sets, duplicates dropped.
    Deps,
    /// Path of the test executable.
    Exe,
    /// Module names across all sets, duplicates dropped.
    Mods,
    /// `MODS` with the Fortran extension appended to each.
    ModsF,
    /// `SRC.F`, `DEPS` and `MODS.F` together.
    Prereq,
    /// Name of the first test set.
    Set,
    /// Names of all test sets.
    Sets,
    /// Test file path without its template extension.
    Src,
    /// `SRC` with the Fortran extension; where the generated program goes.
    SrcF,
}

impl InternalVar {
    pub const ALL: [InternalVar; 9] = [
        InternalVar::Deps,
        InternalVar::Exe,
        InternalVar::Mods,
        InternalVar::ModsF,
        InternalVar::Prereq,
        InternalVar::Set,
        InternalVar::Sets,
        InternalVar::Src,
        InternalVar::SrcF,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            InternalVar::Deps => "DEPS",
            InternalVar::Exe => "EXE",
            InternalVar::Mods => "MODS",
            InternalVar::ModsF => "MODS.F",
            InternalVar::Prereq => "PREREQ",
            InternalVar::Set => "SET",
            InternalVar::Sets => "SETS",
            InternalVar::Src => "SRC",
            InternalVar::SrcF => "SRC.F",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|var| var.name() == name)
    }

    fn expand(self, ctx: &RenderContext<'_>, out: &mut String) {
        match self {
            InternalVar::Deps => out.push_str(&ctx.file.unique_deps().join(" ")),
            InternalVar::Exe => out.push_str(&ctx.exe.display().to_string()),
            InternalVar::Mods => out.push_str(&ctx.file.unique_mods().join(" ")),
            InternalVar::ModsF => out.push_str(&ctx.mods_with_extension()),
            InternalVar::Prereq => {
                let parts = [
                    ctx.source_with_extension(),
                    ctx.file.unique_deps().join(" "),
                    ctx.mods_with_extension(),
                ];
                let parts: Vec<&str> = parts.iter().map(String::as_str).filter(|p| !p.is_empty()).collect();
                out.push_str(&parts.join(" "));
            }
            InternalVar::Set => {
                if let Some(first) = ctx.file.sets.first() {
                    out.push_str(&first.name);
                }
            }
            InternalVar::Sets => {
                let names: Vec<&str> = ctx.file.sets.iter().map(|s| s.name.as_str()).collect();
                out.push_str(&names.join(" "));
            }
            InternalVar::Src => out.push_str(&ctx.source_stem()),
            InternalVar::SrcF => out.push_str(&ctx.source_with_extension()),
        }
    }
}

/// Everything a render needs for one test file.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub file: &'a TestFile,
    pub exe: &'a Path,
    pub config: &'a Config,
}

impl<'a> RenderContext<'a> {
    pub fn new(file: &'a TestFile, exe: &'a Path, config: &'a Config) -> Self {
        Self { file, exe, config }
    }

    /// The test file's path with the template extension removed. A path
    /// without that extension is used whole, with a warning.
    pub fn source_stem(&self) -> String {
        let path = self.file.path.display().to_string();
        let ext = &self.config.template_ext;
        match path.strip_suffix(ext.as_str()) {
            Some(stem) if !ext.is_empty() => stem.to_string(),
            _ => {
                tracing::warn!(
                    path = %path,
                    extension = %ext,
                    "test file is missing the template extension"
                );
                path
            }
        }
    }

    /// Where the generated Fortran for this test file is written.
    pub fn source_with_extension(&self) -> String {
        format!("{}{}", self.source_stem(), self.config.fortran_ext)
    }

    fn mods_with_extension(&self) -> String {
        self.file
            .unique_mods()
            .iter()
            .map(|m| format!("{m}{}", self.config.fortran_ext))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A compiled build rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRule {
    fragments: Vec<Fragment>,
    warnings: Vec<String>,
}

impl BuildRule {
    /// Compiles `rule`, reading `${NAME}` references from the process
    /// environment.
    pub fn compile(rule: &str) -> Self {
        Self::compile_with_env(rule, |name| std::env::var(name).ok())
    }

    /// Compiles `rule`, resolving `${NAME}` references through `env`.
    pub fn compile_with_env(rule: &str, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut compiler = Compiler {
            rule,
            env,
            fragments: Vec::new(),
            literal: String::new(),
            warnings: Vec::new(),
        };
        compiler.run();

        for warning in &compiler.warnings {
            tracing::warn!(rule, "{warning}");
        }
        Self {
            fragments: compiler.fragments,
            warnings: compiler.warnings,
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Problems found while compiling; each was recovered from by copying
    /// the offending text through.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Renders the command for one test file.
    pub fn render(&self, ctx: &RenderContext<'_>) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Variable(var) => var.expand(ctx, &mut out),
            }
        }
        out
    }
}

struct Compiler<'r, E> {
    rule: &'r str,
    env: E,
    fragments: Vec<Fragment>,
    literal: String,
    warnings: Vec<String>,
}

impl<E: Fn(&str) -> Option<String>> Compiler<'_, E> {
    fn run(&mut self) {
        let bytes = self.rule.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            pos = match (bytes[pos], bytes.get(pos + 1)) {
                (b'$', Some(b'{')) => self.env_reference(pos),
                (b'{', Some(b'{')) => self.internal_reference(pos),
                (b'\\', Some(&escaped @ (b'$' | b'{' | b'}' | b'\\'))) => {
                    self.literal.push(escaped as char);
                    pos + 2
                }
                _ => self.copy_char(pos),
            };
        }

        self.close_literal();
    }

    fn copy_char(&mut self, pos: usize) -> usize {
        match self.rule[pos..].chars().next() {
            Some(ch) => {
                self.literal.push(ch);
                pos + ch.len_utf8()
            }
            None => self.rule.len(),
        }
    }

    fn close_literal(&mut self) {
        if !self.literal.is_empty() {
            self.fragments
                .push(Fragment::Literal(std::mem::take(&mut self.literal)));
        }
    }

    /// Copies an unusable `${` or `{{` through and resumes after it.
    fn recover(&mut self, pos: usize, warning: String) -> usize {
        self.warnings.push(warning);
        self.literal.push_str(&self.rule[pos..pos + 2]);
        pos + 2
    }

    fn env_reference(&mut self, pos: usize) -> usize {
        let rest = &self.rule[pos + 2..];
        let name_len = rest
            .find(['}', ' ', '\t', '$', '{'])
            .unwrap_or(rest.len());

        if !rest[name_len..].starts_with('}') {
            let warning = format!(
                "no closing brace ('}}') after `{}` in build rule; write `\\$\\{{` for a literal `${{`",
                &self.rule[pos..]
            );
            return self.recover(pos, warning);
        }
        if name_len == 0 {
            let warning = format!(
                "no name in environment variable reference at `{}` in build rule",
                &self.rule[pos..]
            );
            return self.recover(pos, warning);
        }

        if let Some(value) = (self.env)(&rest[..name_len]) {
            self.literal.push_str(&value);
        }
        pos + 2 + name_len + 1
    }

    fn internal_reference(&mut self, pos: usize) -> usize {
        let rest = &self.rule[pos + 2..];
        let name_len = rest.find('}').unwrap_or(rest.len());

        if name_len == 0 {
            let warning = format!(
                "no name given in build variable reference at `{}`; write `\\{{\\{{` for literal braces",
                &self.rule[pos..]
            );
            return self.recover(pos, warning);
        }
        if !rest[name_len..].starts_with("}}") {
            let warning = format!(
                "no closing braces ('}}}}') after `{}`; write `\\{{\\{{` for literal braces",
                &self.rule[pos..]
            );
            return self.recover(pos, warning);
        }

        let name = &rest[..name_len];
        let Some(var) = InternalVar::from_name(name) else {
            let warning = format!("no such build variable `{name}`");
            return self.recover(pos, warning);
        };

        self.close_literal();
        self.fragments.push(Fragment::Variable(var));
        pos + 2 + name_len + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(rule: &str) -> BuildRule {
        BuildRule::compile_with_env(rule, |name| match name {
            "FC" => Some("gfortran".to_string()),
            _ => None,
        })
    }

    #[test]
    fn plain_text_is_one_literal() {
        let rule = compile("make all");
        assert_eq!(rule.fragments(), &[Fragment::Literal("make all".into())]);
        assert!(rule.warnings().is_empty());
    }

    #[test]
    fn empty_rule_has_no_fragments() {
        assert!(compile("").fragments().is_empty());
    }

    #[test]
    fn variables_split_literals() {
        let rule = compile("make {{EXE}} && run {{SRC.F}}");
        assert_eq!(
            rule.fragments(),
            &[
                Fragment::Literal("make ".into()),
                Fragment::Variable(InternalVar::Exe),
                Fragment::Literal(" && run ".into()),
                Fragment::Variable(InternalVar::SrcF),
            ]
        );
    }

    #[test]
    fn env_vars_expand_at_compile_time() {
        let rule = compile("${FC} -o x ${UNSET}y");
        assert_eq!(rule.fragments(), &[Fragment::Literal("gfortran -o x y".into())]);
    }

    #[test]
    fn escapes_produce_literal_characters() {
        let rule = compile(r"echo \$\{FC\} \{\{EXE\}\} \\ \n");
        assert_eq!(
            rule.fragments(),
            &[Fragment::Literal(r"echo ${FC} {{EXE}} \ \n".into())]
        );
        assert!(rule.warnings().is_empty());
    }

    #[test]
    fn malformed_env_reference_is_copied_with_warning() {
        let rule = compile("a ${} b ${FC c");
        assert_eq!(rule.fragments(), &[Fragment::Literal("a ${} b ${FC c".into())]);
        assert_eq!(rule.warnings().len(), 2);
    }

    #[test]
    fn unknown_internal_var_is_copied_with_warning() {
        let rule = compile("x {{NOPE}} {{}} {{EXE");
        assert_eq!(
            rule.fragments(),
            &[Fragment::Literal("x {{NOPE}} {{}} {{EXE".into())]
        );
        assert_eq!(rule.warnings().len(), 3);
        assert!(rule.warnings()[0].contains("NOPE"));
    }

    #[test]
    fn every_variable_name_resolves() {
        for var in InternalVar::ALL {
            assert_eq!(InternalVar::from_name(var.name()), Some(var));
        }
        assert_eq!(InternalVar::from_name("exe"), None);
    }
}
