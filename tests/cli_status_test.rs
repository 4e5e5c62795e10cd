use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn status_on_fresh_home_reports_nothing_yet() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");

    assert_cmd::cargo::cargo_bin_cmd!("stubsync")
        .current_dir(tmp.path())
        .env("STUBSYNC_HOME", &home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("stubs.total=0"))
        .stdout(predicate::str::contains("last_sync=never"))
        .stdout(predicate::str::contains("last_sweep=never"));

    assert!(!home.join("data/stub_registry.json").exists());
}

#[test]
fn status_counts_messages_per_folder() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    for (folder, stem) in [("inbox", "a"), ("inbox", "b"), ("processed", "c")] {
        let dir = home.join("mailbox").join(folder);
        fs::create_dir_all(&dir).expect("mkdir folder");
        let doc = serde_json::json!({
            "subject": format!("Story {stem}"),
            "body": "(Bloomberg) -- Text.",
            "received_at": "2024-01-15T09:00:00Z",
        });
        fs::write(dir.join(format!("{stem}.json")), doc.to_string()).expect("write message");
    }

    assert_cmd::cargo::cargo_bin_cmd!("stubsync")
        .current_dir(tmp.path())
        .env("STUBSYNC_HOME", &home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("folder.inbox.messages=2"))
        .stdout(predicate::str::contains("folder.processed.messages=1"))
        .stdout(predicate::str::contains("folder.stubs=missing"));
}

#[test]
fn classify_reports_rule_for_a_message_file() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("alert.json");
    let doc = serde_json::json!({
        "subject": "Fed Raises Rates",
        "body": "Alert:\nX\nSource: Y\nTickers\nAAPL",
        "received_at": "2024-01-15T09:00:00Z",
    });
    fs::write(&file, doc.to_string()).expect("write message");

    assert_cmd::cargo::cargo_bin_cmd!("stubsync")
        .current_dir(tmp.path())
        .env("STUBSYNC_HOME", tmp.path().join("home"))
        .arg("classify")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("tag=STUB rule=thin-alert"))
        .stdout(predicate::str::contains("classified=1 stubs=1"));
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    fs::create_dir_all(&home).expect("mkdir home");
    fs::write(home.join("stubsync.toml"), "[connector]\ntimeout_secs = 0\n").expect("config");

    assert_cmd::cargo::cargo_bin_cmd!("stubsync")
        .current_dir(tmp.path())
        .env("STUBSYNC_HOME", &home)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E005_CONFIG_INVALID"));
}
