// tests/config_tests.rs

use std::fs;
use std::path::{Path, PathBuf};

use funit::build_rule::Fragment;
use funit::config::{Config, DEFAULT_BUILD_RULE};
use funit::errors::{ErrorCategory, ErrorKind};

#[test]
fn explicit_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ci.funit");
    fs::write(
        &path,
        "# CI settings\nbuild = 'gfortran -o {{EXE}} {{PREREQ}}'\ntempdir = /scratch/funit # shared\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.build, "gfortran -o {{EXE}} {{PREREQ}}");
    assert_eq!(config.tempdir, PathBuf::from("/scratch/funit"));
    assert_eq!(config.fortran_ext, ".F90");
    assert_eq!(config.template_ext, ".fun");
    assert_eq!(config.origin.as_deref(), Some(path.as_path()));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/funit.cfg"))).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ConfigNotFound {
            path: "/nonexistent/funit.cfg".into()
        }
    );
    assert_eq!(err.category(), ErrorCategory::Config);
}

#[test]
fn errors_point_at_the_offending_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.funit");
    fs::write(&path, "build = make\nfortan_ext = .f90\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::UnknownConfigKey {
            key: "fortan_ext".into()
        }
    );
    let rendered = err.render_plain();
    assert!(rendered.starts_with(&format!("{}:2:\n\nfortan_ext = .f90\n", path.display())));
    assert!(rendered.ends_with("Error: unknown config key \"fortan_ext\"\n"));
}

#[test]
fn bare_values_stop_at_blanks() {
    let err = Config::parse(Path::new("x"), "build = make {{EXE}}\n").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ConfigSyntax {
            message: "unexpected text after config value".into()
        }
    );
}

#[test]
fn defaults() {
    let config = Config::parse(Path::new("empty"), "\n# nothing here\n\n").unwrap();
    assert_eq!(config.build, DEFAULT_BUILD_RULE);
    assert!(!config.tempdir.as_os_str().is_empty());
    assert_eq!(config.origin, None);
}

#[test]
fn compiled_rule_uses_build_setting() {
    let config = Config::parse(Path::new("x"), "build = \"make {{EXE}} check\"").unwrap();
    assert_eq!(
        config.compiled_rule().fragments()[0],
        Fragment::Literal("make ".into())
    );
    assert_eq!(config.compiled_rule().fragments().len(), 3);
}

#[test]
fn search_paths_start_in_working_directory() {
    let paths = Config::search_paths();
    assert_eq!(paths.first(), Some(&PathBuf::from(".funit")));
    assert_eq!(paths.last(), Some(&PathBuf::from("/etc/funitrc")));
}
