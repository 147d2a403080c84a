//! Runs test files end to end: parse, generate, build, run.
//!
//! Each step's failure ends processing of that file only; `run_all` carries
//! on with the next one and tallies the outcome.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;

use crate::ast::TestFile;
use crate::build_rule::{BuildRule, RenderContext};
use crate::codegen;
use crate::config::Config;
use crate::discovery::TestDiscoverer;
use crate::errors::{ErrorKind, FunitError};
use crate::syntax;

/// Receives per-file progress from [`Pipeline::run_all`].
pub trait RunObserver {
    fn file_started(&mut self, _path: &Path) {}
    fn file_finished(&mut self, path: &Path, result: Result<(), FunitError>);
}

/// Files that made it through every step, and files that did not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    rule: BuildRule,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let rule = config.compiled_rule();
        Self { config, rule }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rule(&self) -> &BuildRule {
        &self.rule
    }

    /// The build command for `file`, as the shell will see it.
    pub fn build_command(&self, file: &TestFile) -> String {
        let exe = self.config.exe_path(&file.path);
        self.rule
            .render(&RenderContext::new(file, &exe, &self.config))
    }

    /// Where the generated Fortran for `file` goes.
    pub fn generated_path(&self, file: &TestFile) -> PathBuf {
        let exe = self.config.exe_path(&file.path);
        PathBuf::from(RenderContext::new(file, &exe, &self.config).source_with_extension())
    }

    /// Generates Fortran for `file` and writes it beside the test file.
    ///
    /// The text goes to a temporary file in the same directory that is only
    /// renamed into place once complete.
    pub fn write_generated(&self, file: &TestFile) -> Result<PathBuf, FunitError> {
        let code = codegen::generate(file)?;
        let target = self.generated_path(file);
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut staged =
            NamedTempFile::new_in(&dir).map_err(|e| FunitError::io("creating temporary file in", &dir, e))?;
        staged
            .write_all(code.as_bytes())
            .map_err(|e| FunitError::io("writing", staged.path(), e))?;
        staged
            .persist(&target)
            .map_err(|e| FunitError::io("writing", &target, e.error))?;

        tracing::debug!(path = %target.display(), bytes = code.len(), "wrote generated source");
        Ok(target)
    }

    /// Parses, generates, builds and runs one test file.
    pub fn process_file(&self, path: &Path) -> Result<(), FunitError> {
        let file = syntax::parse_file(path)?;
        self.write_generated(&file)?;

        let command = self.build_command(&file);
        tracing::debug!(command = %command, "building");
        run_step("build", shell_command(&command))?;

        let exe = self.config.exe_path(&file.path);
        tracing::debug!(exe = %exe.display(), "running");
        run_step("test", Command::new(&exe))
    }

    /// Processes every file named by `paths`, walking directories for test
    /// files. Only discovery errors abort the run.
    pub fn run_all(
        &self,
        paths: &[PathBuf],
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary, FunitError> {
        let files = TestDiscoverer::new(&self.config.template_ext).expand(paths)?;
        let mut summary = RunSummary::default();

        for path in &files {
            observer.file_started(path);
            let result = self.process_file(path);
            match &result {
                Ok(()) => summary.passed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::debug!(path = %path.display(), category = ?e.category(), "file failed");
                }
            }
            observer.file_finished(path, result);
        }

        Ok(summary)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Runs `cmd` to completion with inherited stdio; a non-zero exit is an error.
fn run_step(step: &str, mut cmd: Command) -> Result<(), FunitError> {
    let status = cmd.status().map_err(|e| {
        FunitError::unspanned(
            ErrorKind::ProcessSpawn {
                step: step.into(),
                message: e.to_string(),
            },
            "pipeline",
        )
    })?;
    tracing::debug!(step, status = ?status.code(), "step finished");

    if status.success() {
        return Ok(());
    }
    // Killed by a signal: no exit code.
    let code = status.code().unwrap_or(-1);
    Err(FunitError::unspanned(
        ErrorKind::ProcessFailed {
            step: step.into(),
            status: code,
        },
        "pipeline",
    ))
}
