use std::error::Error;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use serde_json::Value;

type TestResult = Result<(), Box<dyn Error>>;

const COMPLETE: &str = include_str!("fixtures/complete_answers.json");
const MISSING_NAMES: &str = include_str!("fixtures/missing_names.json");

fn intake(temp: &TempDir) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("clinic-intake")?;
    cmd.current_dir(temp.path())
        .env("CLINIC_INTAKE_STORE", temp.child("store.json").path())
        .env_remove("LINE_CHANNEL_ACCESS_TOKEN")
        .env_remove("LINE_CHANNEL_SECRET")
        .env_remove("RUST_LOG")
        .args(["--today", "2024-06-14"]);
    Ok(cmd)
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Registers a guest born 1990-01-01 and returns the access code.
fn register(temp: &TempDir, first_test: &str) -> Result<String, Box<dyn Error>> {
    let output = intake(temp)?
        .args([
            "register",
            "--phone",
            "090-1234-5678",
            "--birth-date",
            "1990-01-01",
            "--first-test",
            first_test,
        ])
        .output()?;
    assert!(output.status.success());
    let text = stdout(&output);
    let code = text
        .lines()
        .find_map(|line| line.trim().strip_prefix("access code: "))
        .ok_or("no access code printed")?;
    Ok(code.to_string())
}

fn read_store(temp: &TempDir) -> Result<Value, Box<dyn Error>> {
    let text = std::fs::read_to_string(temp.child("store.json").path())?;
    Ok(serde_json::from_str(&text)?)
}

#[test]
fn schema_command_prints_json_schema() -> TestResult {
    let temp = TempDir::new()?;
    let output = intake(&temp)?.arg("schema").output()?;
    assert!(output.status.success());
    let schema: Value = serde_json::from_str(&stdout(&output))?;
    assert!(schema.to_string().contains("sections"));
    Ok(())
}

#[test]
fn validate_lists_every_missing_answer() -> TestResult {
    let temp = TempDir::new()?;
    let answers = temp.child("answers.json");
    answers.write_str(MISSING_NAMES)?;

    let output = intake(&temp)?
        .args(["validate", "--answers"])
        .arg(answers.path())
        .output()?;
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Validation result: invalid"));
    assert!(text.contains("wife.name - Wife: Name is required"));
    assert!(text.contains("husband.name - Husband: Name is required"));
    Ok(())
}

#[test]
fn render_shows_conditional_year_once_married() -> TestResult {
    let temp = TempDir::new()?;
    let answers = temp.child("answers.json");
    answers.write_str(COMPLETE)?;

    let output = intake(&temp)?
        .args(["render", "--answers"])
        .arg(answers.path())
        .output()?;
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Year of marriage (marriageYear) [required] = 2015"));

    let output = intake(&temp)?.arg("render").args(["--format", "json"]).output()?;
    let ui: Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(ui["status"], "need_input");
    Ok(())
}

#[test]
fn register_login_submit_round_trip() -> TestResult {
    let temp = TempDir::new()?;
    let code = register(&temp, "2024-06-20")?;

    intake(&temp)?
        .args(["login", "--code", &code.to_lowercase(), "--birth-date", "1990-01-01"])
        .assert()
        .success();
    intake(&temp)?
        .args(["login", "--code", &code, "--birth-date", "1991-01-01"])
        .assert()
        .failure();

    let answers = temp.child("answers.json");
    answers.write_str(COMPLETE)?;
    let cbor = temp.child("record.cbor");
    let output = intake(&temp)?
        .args(["submit", "--code", &code, "--birth-date", "1990-01-01", "--answers"])
        .arg(answers.path())
        .arg("--cbor")
        .arg(cbor.path())
        .output()?;
    assert!(output.status.success());

    let record: Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(record["answers"]["wife"]["birthDate"], "1990-01-01");
    assert_eq!(record["answers"]["wife"]["age"], 34);
    assert_eq!(record["answers"]["wife"]["marriageAge"], 25);
    assert!(cbor.path().exists());

    let store = read_store(&temp)?;
    assert_eq!(store["records"].as_array().map(Vec::len), Some(1));
    assert_eq!(store["guests"][0]["isCompleted"], true);
    assert_eq!(store["guests"][0]["completedOn"], "2024-06-14");
    Ok(())
}

#[test]
fn submit_with_missing_answers_stores_nothing() -> TestResult {
    let temp = TempDir::new()?;
    let answers = temp.child("answers.json");
    answers.write_str(MISSING_NAMES)?;

    let output = intake(&temp)?
        .args(["submit", "--answers"])
        .arg(answers.path())
        .output()?;
    assert!(!output.status.success());
    assert!(stdout(&output).contains("Wife: Name is required"));
    assert!(!temp.child("store.json").path().exists());
    Ok(())
}

#[test]
fn remind_sends_to_linked_completed_guests_due_tomorrow() -> TestResult {
    let temp = TempDir::new()?;
    let code = register(&temp, "2024-06-15")?;
    intake(&temp)?
        .args([
            "login",
            "--code",
            &code,
            "--birth-date",
            "1990-01-01",
            "--line-user",
            "U4af4980629a1b2c3d4e5f60718293a4b",
        ])
        .assert()
        .success();

    let output = intake(&temp)?.arg("remind").output()?;
    assert!(stdout(&output).contains("Reminders sent: 0/0"));

    let answers = temp.child("answers.json");
    answers.write_str(COMPLETE)?;
    intake(&temp)?
        .args(["submit", "--code", &code, "--birth-date", "1990-01-01", "--answers"])
        .arg(answers.path())
        .assert()
        .success();

    let output = intake(&temp)?.arg("remind").output()?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("Reminders sent: 1/1"));
    Ok(())
}

#[test]
fn verify_webhook_checks_signature() -> TestResult {
    let temp = TempDir::new()?;
    let body = temp.child("body.json");
    let payload = r#"{"destination":"U0","events":[{"type":"follow","source":{"type":"user","userId":"U1"}}]}"#;
    body.write_str(payload)?;
    let signature = intake_line::sign("secret", payload.as_bytes());

    let output = intake(&temp)?
        .env("LINE_CHANNEL_SECRET", "secret")
        .args(["verify-webhook", "--signature", &signature, "--body"])
        .arg(body.path())
        .output()?;
    assert!(output.status.success());
    let summary: Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(summary["follows"], 1);

    intake(&temp)?
        .env("LINE_CHANNEL_SECRET", "other")
        .args(["verify-webhook", "--signature", &signature, "--body"])
        .arg(body.path())
        .assert()
        .failure();
    Ok(())
}
