use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_process_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("process")
        .arg("tests/fixtures/actions.csv")
        .arg("--roster")
        .arg("tests/fixtures/roster.json")
        .arg("--payments")
        .arg("tests/fixtures/payments.json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "reference,student,teacher,subject,level,requested_time,duration_minutes,end_time,price,status,rating",
        ))
        .stdout(predicate::str::contains(
            "ref-1,student-1,teacher-ada,math,SS2,2026-03-02T10:00:00+00:00,60,2026-03-02T11:00:00+00:00,5000,COMPLETED,5",
        ))
        .stdout(predicate::str::contains(
            "ref-2,student-2,teacher-ada,math,SS2,2026-03-02T14:00:00+00:00,60,,5000,DECLINED,",
        ))
        // Abandoned payments never become bookings.
        .stdout(predicate::str::contains("ref-3").not())
        .stderr(predicate::str::contains("Payment verification failed"))
        .stderr(predicate::str::contains("booking not found: ref-404"))
        .stderr(predicate::str::contains("has not reached its scheduled end"));

    Ok(())
}

#[test]
fn test_cli_search_ranks_teachers() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.args([
        "search",
        "--roster",
        "tests/fixtures/roster.json",
        "--subject",
        "math",
        "--level",
        "ss2",
        "--at",
        "2026-03-02T10:00:00Z",
        "--clock",
        "2026-03-01T08:00:00Z",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "rank,teacher,name,score,total_price,average_rating,subjects,available_now",
        ))
        .stdout(predicate::str::contains(
            "1,teacher-bola,Bola Ade,67.00,6000,4.5,Mathematics,",
        ))
        .stdout(predicate::str::contains(
            "2,teacher-ada,Ada Obi,64.00,5000,4.0,Mathematics;Physics,",
        ))
        .stdout(predicate::str::contains("teacher-chidi").not());

    Ok(())
}

#[test]
fn test_cli_search_reports_empty_reason() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.args([
        "search",
        "--roster",
        "tests/fixtures/roster.json",
        "--subject",
        "math",
        "--level",
        "SS2",
        "--at",
        "2026-03-02T10:00:00Z",
        "--clock",
        "2026-03-01T08:00:00Z",
        "--max-price",
        "1000",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("teacher-").not())
        .stderr(predicate::str::contains(
            "No teachers found: matching teachers exist but all exceed the budget",
        ));

    Ok(())
}

#[test]
fn test_cli_search_rejects_past_time() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.args([
        "search",
        "--roster",
        "tests/fixtures/roster.json",
        "--subject",
        "math",
        "--level",
        "SS2",
        "--at",
        "2026-03-01T07:00:00Z",
        "--clock",
        "2026-03-01T08:00:00Z",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("requested time must be in the future"));
}

#[test]
fn test_cli_config_file_allows_early_completion() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "early_completion = \"warn\"").unwrap();

    let mut actions = tempfile::NamedTempFile::new().unwrap();
    writeln!(actions, "action, actor, reference, at, rating").unwrap();
    writeln!(actions, "pay, student-1, ref-1, 2026-03-01T08:00:00Z,").unwrap();
    writeln!(actions, "accept, teacher-ada, ref-1, 2026-03-01T12:00:00Z,").unwrap();
    writeln!(actions, "complete, student-1, ref-1, 2026-03-02T10:30:00Z,").unwrap();

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("--config")
        .arg(config.path())
        .arg("process")
        .arg(actions.path())
        .arg("--roster")
        .arg("tests/fixtures/roster.json")
        .arg("--payments")
        .arg("tests/fixtures/payments.json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",COMPLETED,"));
}

#[test]
fn test_cli_rejects_inconsistent_config() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "min_duration_minutes = 120").unwrap();
    writeln!(config, "max_duration_minutes = 60").unwrap();

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("--config")
        .arg(config.path())
        .arg("process")
        .arg("tests/fixtures/actions.csv")
        .arg("--roster")
        .arg("tests/fixtures/roster.json");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("session durations must satisfy"));
}

#[test]
fn test_cli_missing_roster_fails() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.args([
        "process",
        "tests/fixtures/actions.csv",
        "--roster",
        "tests/fixtures/missing.json",
    ]);

    cmd.assert().failure();
}
