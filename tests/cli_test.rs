use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn script(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "action, target, field, value").unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

fn replay(file: &NamedTempFile) -> Command {
    let mut cmd = Command::new(cargo_bin!("checkout-sync"));
    cmd.arg(file.path()).arg("--debounce-ms").arg("50");
    cmd
}

#[test]
fn test_country_change_and_checkout() {
    let file = script(&[
        "edit, shipping, country, CA",
        "wait, , , 200",
        "notes,,,\"Ring twice, please\"",
        "blur",
        "submit",
    ]);

    replay(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#""endpoint":"PUT /cart/update-customer""#,
        ))
        .stdout(predicate::str::contains(r#""shipping_rates_changed":true"#))
        .stdout(predicate::str::contains(r#""country":"CA""#))
        .stdout(predicate::str::contains(r#""postcode":"""#))
        .stdout(predicate::str::contains(
            r#""body":{"order_notes":"Ring twice, please"}"#,
        ))
        .stdout(predicate::str::contains(r#""status":"complete""#));
}

#[test]
fn test_invalid_field_blocks_push_and_submission() {
    let file = script(&[
        "invalid, billing_postcode, , Invalid postcode",
        "edit, billing, postcode, 1",
        "blur",
        "submit",
    ]);

    replay(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("update-customer").not())
        .stdout(predicate::str::contains(
            "notice: Please fix the highlighted fields.",
        ))
        .stdout(predicate::str::contains(r#""status":"idle""#))
        .stdout(predicate::str::contains(r#""has_error":true"#));
}

#[test]
fn test_failed_push_is_retried_with_next_edit() {
    let file = script(&[
        "fail-next, , , 1",
        "edit, billing, city, Boston",
        "blur",
        "edit, billing, phone, 555-0199",
        "blur",
    ]);

    let output = replay(&file).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    let pushes: Vec<&str> = stdout
        .lines()
        .filter(|line| line.contains("update-customer"))
        .collect();
    assert_eq!(pushes.len(), 2);
    assert!(pushes[1].contains(r#""city":"Boston""#));
    assert!(pushes[1].contains(r#""phone":"555-0199""#));
    assert!(stdout.contains("notice: Transport error: Unable to reach the store"));
}

#[test]
fn test_malformed_rows_are_reported_and_skipped() {
    let file = script(&[
        "teleport, , , ",
        "edit, postal, city, Paris",
        "edit, billing, city, Paris",
        "blur",
    ]);

    replay(&file)
        .assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains(r#""city":"Paris""#));
}

#[test]
fn test_missing_script_fails() {
    let mut cmd = Command::new(cargo_bin!("checkout-sync"));
    cmd.arg("does/not/exist.csv");
    cmd.assert().failure();
}

#[test]
fn test_config_file_is_applied() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"generic_error_message": "Custom failure"}}"#).unwrap();
    let file = script(&["submit"]);

    let mut cmd = Command::new(cargo_bin!("checkout-sync"));
    cmd.arg(file.path()).arg("--config").arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"complete""#));
}
