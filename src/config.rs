//! Configuration loading.
//!
//! Settings live in a small `key = value` file (see `config/config.pest`).
//! Known keys are `build`, `tempdir`, `fortran_ext` and `template_ext`; any
//! key left out keeps its default. Without `--config`, the first non-empty
//! file among `./.funit`, `$HOME/.funit` and `/etc/funitrc` is used, and when
//! none exists the defaults apply.

use std::path::{Path, PathBuf};

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::build_rule::BuildRule;
use crate::errors::{ErrorKind, ErrorReporting, FunitError, PhaseContext, SourceContext};

#[derive(Parser)]
#[grammar = "config/config.pest"]
struct ConfigParser;

pub const DEFAULT_BUILD_RULE: &str = "make {{EXE}}";
pub const DEFAULT_FORTRAN_EXT: &str = ".F90";
pub const DEFAULT_TEMPLATE_EXT: &str = ".fun";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Build-rule template rendered for each test file.
    pub build: String,
    /// Directory test executables are built into.
    pub tempdir: PathBuf,
    pub fortran_ext: String,
    pub template_ext: String,
    /// The file the settings were read from, if any.
    pub origin: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: DEFAULT_BUILD_RULE.to_string(),
            tempdir: default_tempdir(),
            fortran_ext: DEFAULT_FORTRAN_EXT.to_string(),
            template_ext: DEFAULT_TEMPLATE_EXT.to_string(),
            origin: None,
        }
    }
}

/// `$TMPDIR`, then `$TEMP`, then the first of `/tmp` and `/var/tmp` that
/// exists.
fn default_tempdir() -> PathBuf {
    for var in ["TMPDIR", "TEMP"] {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => return PathBuf::from(value),
            _ => {}
        }
    }
    ["/tmp", "/var/tmp"]
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.is_dir())
        .unwrap_or_else(std::env::temp_dir)
}

impl Config {
    /// Loads `explicit` if given, otherwise searches the standard locations.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FunitError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(FunitError::unspanned(
                    ErrorKind::ConfigNotFound {
                        path: path.display().to_string(),
                    },
                    "config",
                ));
            }
            return Self::from_file(path);
        }

        for candidate in Self::search_paths() {
            let non_empty = std::fs::metadata(&candidate).is_ok_and(|m| m.is_file() && m.len() > 0);
            if non_empty {
                return Self::from_file(&candidate);
            }
        }

        tracing::debug!("no config file found; using defaults");
        Ok(Self::default())
    }

    /// Standard config locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".funit")];
        match std::env::var_os("HOME") {
            Some(home) => paths.push(PathBuf::from(home).join(".funit")),
            None => tracing::warn!("HOME is not set; skipping ~/.funit"),
        }
        paths.push(PathBuf::from("/etc/funitrc"));
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, FunitError> {
        let content = std::fs::read_to_string(path).map_err(|e| FunitError::io("reading", path, e))?;
        let mut config = Self::parse(path, &content)?;
        config.origin = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parses config text, applying each setting over the defaults. `path`
    /// only names the source in diagnostics.
    pub fn parse(path: &Path, content: &str) -> Result<Self, FunitError> {
        let ctx = PhaseContext::new(SourceContext::from_path(path, content), "config");
        let pairs = ConfigParser::parse(Rule::config, content).map_err(|e| {
            let offset = match e.location {
                pest::error::InputLocation::Pos(pos) => pos,
                pest::error::InputLocation::Span((start, _)) => start,
            };
            ctx.report(
                ErrorKind::ConfigSyntax {
                    message: "config key or comment ('#') expected".into(),
                },
                offset,
            )
        })?;

        let mut config = Self::default();
        for entry in pairs.flatten().filter(|p| p.as_rule() == Rule::entry) {
            config.apply(entry, &ctx)?;
        }
        Ok(config)
    }

    fn apply(&mut self, entry: Pair<'_, Rule>, ctx: &PhaseContext) -> Result<(), FunitError> {
        let entry_end = entry.as_span().end();
        let mut key = None;
        let mut assign = None;
        let mut junk = None;
        for part in entry.into_inner() {
            match part.as_rule() {
                Rule::key => key = Some(part),
                Rule::assign => assign = Some(part),
                Rule::junk => junk = Some(part),
                _ => {}
            }
        }

        let syntax = |message: &str, offset: usize| {
            ctx.report(
                ErrorKind::ConfigSyntax {
                    message: message.into(),
                },
                offset,
            )
        };

        let Some(key) = key else {
            return Err(syntax("config key or comment ('#') expected", entry_end));
        };
        let Some(assign) = assign else {
            let offset = junk.map_or(key.as_span().end(), |j| j.as_span().start());
            return Err(syntax("'=' expected after config key", offset));
        };

        let assign_end = assign.as_span().end();
        let value = assign.into_inner().find(|p| p.as_rule() == Rule::value);
        let (value, value_start) = match (value, junk) {
            (None, Some(junk)) if junk.as_str().starts_with(['"', '\'']) => {
                return Err(syntax("expected close quote at end of string", junk.as_span().end()));
            }
            (None, _) => return Err(ctx.report(ErrorKind::MissingConfigValue, assign_end)),
            (Some(_), Some(junk)) => {
                return Err(syntax("unexpected text after config value", junk.as_span().start()));
            }
            (Some(value), None) => {
                let start = value.as_span().start();
                (value_text(value), start)
            }
        };
        if value.is_empty() {
            return Err(ctx.report(ErrorKind::MissingConfigValue, value_start));
        }

        match key.as_str() {
            "build" => self.build = value,
            "tempdir" => self.tempdir = PathBuf::from(value),
            "fortran_ext" => self.fortran_ext = value,
            "template_ext" => self.template_ext = value,
            other => {
                return Err(ctx
                    .report(
                        ErrorKind::UnknownConfigKey { key: other.into() },
                        key.as_span().start(),
                    )
                    .with_help("known keys are build, tempdir, fortran_ext and template_ext"));
            }
        }
        Ok(())
    }

    /// Compiles the build rule; done once and reused for every test file.
    pub fn compiled_rule(&self) -> BuildRule {
        BuildRule::compile(&self.build)
    }

    /// Where the executable for `test_file` is built: the file name without
    /// its template extension, inside `tempdir`.
    pub fn exe_path(&self, test_file: &Path) -> PathBuf {
        let name = test_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = match name.strip_suffix(self.template_ext.as_str()) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => test_file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(name),
        };
        self.tempdir.join(stem)
    }
}

fn value_text(value: Pair<'_, Rule>) -> String {
    let Some(inner) = value.into_inner().next() else {
        return String::new();
    };
    match inner.as_rule() {
        Rule::quoted => inner
            .into_inner()
            .next()
            .map(|text| text.as_str().to_string())
            .unwrap_or_default(),
        _ => inner.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config, FunitError> {
        Config::parse(Path::new(".funit"), text)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.build, DEFAULT_BUILD_RULE);
        assert_eq!(config.fortran_ext, ".F90");
        assert_eq!(config.template_ext, ".fun");
    }

    #[test]
    fn reads_bare_and_quoted_values() {
        let text = "# funit settings\n\nbuild = \"gfortran -o {{EXE}} {{PREREQ}}\"  # compile\ntempdir=/scratch\nfortran_ext = '.f90'\n";
        let config = parse(text).unwrap();
        assert_eq!(config.build, "gfortran -o {{EXE}} {{PREREQ}}");
        assert_eq!(config.tempdir, PathBuf::from("/scratch"));
        assert_eq!(config.fortran_ext, ".f90");
        assert_eq!(config.template_ext, ".fun");
    }

    #[test]
    fn crlf_line_endings() {
        let config = parse("template_ext = .pf\r\nfortran_ext = .f\r\n").unwrap();
        assert_eq!(config.template_ext, ".pf");
        assert_eq!(config.fortran_ext, ".f");
    }

    #[test]
    fn unknown_key() {
        let err = parse("\nbiuld = make\n").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownConfigKey {
                key: "biuld".into()
            }
        );
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn missing_value() {
        assert_eq!(parse("build =\n").unwrap_err().kind, ErrorKind::MissingConfigValue);
        assert_eq!(parse("build = \"\"\n").unwrap_err().kind, ErrorKind::MissingConfigValue);
    }

    #[test]
    fn syntax_errors() {
        let message = |text: &str| match parse(text).unwrap_err().kind {
            ErrorKind::ConfigSyntax { message } => message,
            other => panic!("unexpected error {other:?}"),
        };
        assert_eq!(message("build make\n"), "'=' expected after config key");
        assert_eq!(message("build = make all\n"), "unexpected text after config value");
        assert_eq!(message("build = \"make\n"), "expected close quote at end of string");
        assert_eq!(message("= make\n"), "config key or comment ('#') expected");
    }

    #[test]
    fn exe_path_drops_template_extension() {
        let config = Config {
            tempdir: PathBuf::from("/scratch"),
            ..Config::default()
        };
        assert_eq!(
            config.exe_path(Path::new("tests/solver.fun")),
            PathBuf::from("/scratch/solver")
        );
        assert_eq!(
            config.exe_path(Path::new("tests/solver.pf")),
            PathBuf::from("/scratch/solver")
        );
    }
}
