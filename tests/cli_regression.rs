// Regression tests driving the funit binary.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn funit() -> Command {
    let mut cmd = Command::cargo_bin("funit").unwrap();
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

fn write_config(dir: &Path, build: &str) -> PathBuf {
    let path = dir.join("test.funit");
    fs::write(
        &path,
        format!("build = \"{build}\"\ntempdir = {}\n", dir.display()),
    )
    .unwrap();
    path
}

#[test]
fn generate_prints_fortran() {
    funit()
        .arg("generate")
        .arg(fixture("minimal.fun"))
        .assert()
        .success()
        .stdout(contains("module funit").and(contains("if ((1) /= (2)) then")))
        .stdout(contains("call start_set(\"s\")"));
}

#[test]
fn generate_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("minimal.F90");
    funit()
        .args(["generate", "-o"])
        .arg(&out)
        .arg(fixture("minimal.fun"))
        .assert()
        .success();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.ends_with("end program main\n"));
}

#[test]
fn parse_errors_use_the_caret_format() {
    let path = fixture("bad_dep.fun");
    funit()
        .arg("generate")
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(contains(format!("{}:2:\n\n  dep \"missing.f90\n", path.display())))
        .stderr(contains("Error: expected a quote (\") to end the string"));
}

#[test]
fn fancy_errors_carry_a_code() {
    funit()
        .args(["--fancy", "generate"])
        .arg(fixture("no_tolerance.fun"))
        .assert()
        .failure()
        .stderr(contains("funit::generate").and(contains("help:")));
}

#[test]
fn ast_outline_and_json() {
    funit()
        .arg("ast")
        .arg(fixture("ordering.fun"))
        .assert()
        .success()
        .stdout(contains("3 sets, 6 tests").and(contains("  test fourth (line 14)")));

    let output = funit()
        .args(["ast", "--json"])
        .arg(fixture("solver.fun"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["sets"][0]["name"], "solver");
    assert_eq!(json["sets"][0]["deps"][1]["filename"], "linalg.f90");
    assert_eq!(json["sets"][1]["tests"][0]["name"], "identity");
}

#[test]
fn build_command_renders_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "gfortran -o {{EXE}} {{PREREQ}}");
    let src = fixture("minimal.fun");
    let expected = format!(
        "gfortran -o {} {}\n",
        dir.path().join("minimal").display(),
        fixture("minimal.F90").display()
    );
    funit()
        .arg("-c")
        .arg(&config)
        .arg("build-command")
        .arg(&src)
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn bad_config_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.funit");
    fs::write(&config, "colour = yes\n").unwrap();
    funit()
        .arg("--config")
        .arg(&config)
        .arg("build-command")
        .arg(fixture("minimal.fun"))
        .assert()
        .failure()
        .stderr(contains("Error: unknown config key \"colour\""));
}

#[cfg(unix)]
#[test]
fn run_reports_each_file_and_a_summary() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let stub = dir.path().join("pass.sh");
    fs::write(&stub, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();
    let config = write_config(dir.path(), &format!("cp {} {{{{EXE}}}}", stub.display()));

    let suite = dir.path().join("suite");
    fs::create_dir(&suite).unwrap();
    fs::copy(fixture("minimal.fun"), suite.join("good.fun")).unwrap();
    fs::copy(fixture("bad_dep.fun"), suite.join("bad.fun")).unwrap();

    funit()
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg(&suite)
        .assert()
        .failure()
        .stdout(contains("FAIL").and(contains("OK")))
        .stdout(contains("2 files: 1 passed, 1 failed"))
        .stderr(contains("Error: expected a quote (\") to end the string"));

    assert!(suite.join("good.F90").exists());
    assert!(!suite.join("bad.F90").exists());
    assert!(dir.path().join("good").exists());
}

#[cfg(unix)]
#[test]
fn run_succeeds_when_every_step_passes() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "printf '#!/bin/sh\\\\nexit 0\\\\n' > {{EXE}} && chmod +x {{EXE}}",
    );
    let src = dir.path().join("one.fun");
    fs::copy(fixture("solver.fun"), &src).unwrap();

    funit()
        .arg("run")
        .arg(&src)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("1 files: 1 passed, 0 failed"));
}

#[cfg(unix)]
#[test]
fn failing_build_names_the_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "exit 2");
    let src = dir.path().join("m.fun");
    fs::copy(fixture("minimal.fun"), &src).unwrap();

    funit()
        .args(["-c"])
        .arg(&config)
        .arg("run")
        .arg(&src)
        .assert()
        .failure()
        .stderr(contains("build command terminated with exit status 2"));
}

#[cfg(unix)]
#[test]
fn piped_status_lines_carry_no_color_codes() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "exit 2");
    let src = dir.path().join("m.fun");
    fs::copy(fixture("minimal.fun"), &src).unwrap();

    let output = Command::cargo_bin("funit")
        .unwrap()
        .env_remove("RUST_LOG")
        .env_remove("NO_COLOR")
        .env("TERM", "xterm-256color")
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg(&src)
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(" FAIL "), "{stdout}");
    assert!(stdout.contains("1 files: 0 passed, 1 failed"), "{stdout}");
    assert!(!stdout.contains('\x1b'), "{stdout:?}");
}
