use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tally(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tally").unwrap();
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("TALLY_API_URL")
        .env_remove("TALLY_API_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn preview_csv_lists_records() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "jan.csv",
        "date,amount,description\n2024-01-05,100.00,Deposit\n2024-01-06,-50.00,Withdrawal\n",
    );
    tally(dir.path())
        .args(["preview", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready to import"))
        .stdout(predicate::str::contains("2024-01-05"))
        .stdout(predicate::str::contains("100.00"))
        .stdout(predicate::str::contains("50.00"))
        .stdout(predicate::str::contains("2 transactions"));
}

#[test]
fn preview_reports_missing_mapping_and_accepts_overrides() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "odd.csv", "When,How Much\n2024-01-05,10\n");
    tally(dir.path())
        .args(["preview", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("Date column is required"));

    tally(dir.path())
        .args(["preview", &file, "--map", "date=When", "--map", "amount=How Much"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready to import"))
        .stdout(predicate::str::contains("1 transactions"));
}

#[test]
fn preview_unknown_column_fails() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "jan.csv", "date,amount\n2024-01-05,1\n");
    tally(dir.path())
        .args(["preview", &file, "--map", "date=Posted"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown column: Posted"));
}

#[test]
fn header_only_csv_is_an_error() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "empty.csv", "date,amount\n");
    tally(dir.path())
        .args(["preview", &file])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("no data rows"));
}

#[test]
fn unsupported_extension_is_an_error() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "statement.pdf", "%PDF-1.4");
    tally(dir.path())
        .args(["preview", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file type"));
}

#[test]
fn preview_ofx_without_transactions_reports_problem() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "feb.ofx",
        "OFXHEADER:100\nDATA:OFXSGML\nVERSION:102\n\n<OFX><BANKMSGSRSV1><STMTTRNRS><STMTRS>\
         <CURDEF>USD<BANKACCTFROM><ACCTID>1234</BANKACCTFROM>\
         <BANKTRANLIST><DTSTART>20240201<DTEND>20240229</BANKTRANLIST>\
         </STMTRS></STMTTRNRS></BANKMSGSRSV1></OFX>\n",
    );
    tally(dir.path())
        .args(["preview", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("1234"))
        .stdout(predicate::str::contains("no transactions"));
}

#[test]
fn contacts_map_prints_detected_fields() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "people.csv",
        "Full Name,E-mail,Phone Number,Favourite Colour\nAda,ada@example.com,555-0100,green\n",
    );
    tally(dir.path())
        .args(["contacts", "map", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("email"))
        .stdout(predicate::str::contains("phone"))
        .stdout(predicate::str::contains("3 of 4 columns mapped"));
}

#[test]
fn init_writes_settings() {
    let dir = TempDir::new().unwrap();
    tally(dir.path())
        .args(["init", "--api-url", "https://books.example.com/api/", "--currency", "eur"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Settings saved"));

    let saved = std::fs::read_to_string(dir.path().join(".config/tally/settings.json")).unwrap();
    assert!(saved.contains("\"api_url\": \"https://books.example.com/api\""));
    assert!(saved.contains("\"default_currency\": \"EUR\""));
}

#[test]
fn init_rejects_bad_currency() {
    let dir = TempDir::new().unwrap();
    tally(dir.path())
        .args(["init", "--currency", "dollars"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("three-letter code"));
}

#[test]
fn import_without_backend_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "jan.csv", "date,amount\n2024-01-05,1\n");
    tally(dir.path())
        .env("TALLY_API_URL", "http://127.0.0.1:9/api")
        .args(["import", &file, "--account", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not reach the import service"));
}
