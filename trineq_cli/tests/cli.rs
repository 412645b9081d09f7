use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help() {
    Command::cargo_bin("trineq").unwrap().arg("--help").assert().success();
}

#[test]
fn unknown_application_fails_with_a_listing() {
    Command::cargo_bin("trineq")
        .unwrap()
        .arg("not_a_real_application")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown application"));
}

#[test]
fn ejm_vis_222_weak_reports_the_known_minimum_nonlocal_visibility() {
    Command::cargo_bin("trineq")
        .unwrap()
        .arg("ejm_vis_222_weak")
        .assert()
        .success()
        .stdout(predicate::str::contains("467"));
}
