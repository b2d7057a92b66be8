//! CLI-level integration tests, driving the compiled binary with
//! `assert_cmd` the way `MystenLabs-sui`'s CLI test suites do. Kept to
//! cases that don't require an actual cross-compiler toolchain to be
//! installed on the test machine: a single entry point taking a C file
//! path, exit 0 on success, non-zero with a message on failure.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("dvfs-cfg-analyzer").unwrap()
}

#[test]
fn help_lists_the_input_argument() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("INPUT"));
}

#[test]
fn version_flag_succeeds() {
    cmd().arg("--version").assert().success();
}

#[test]
fn missing_input_file_fails_with_a_message() {
    cmd()
        .arg("does-not-exist.c")
        .assert()
        .failure()
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn no_arguments_fails_with_usage() {
    cmd().assert().failure();
}
