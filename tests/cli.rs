use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn relay(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("audio-relay").unwrap();
    cmd.current_dir(workdir.path())
        .env("XDG_CONFIG_HOME", workdir.path().join("xdg"))
        .env("HOME", workdir.path())
        .env_remove("AUDIO_RELAY_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_options() {
    let workdir = TempDir::new().unwrap();
    relay(&workdir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--downloads-dir"))
        .stdout(predicate::str::contains("setup"));
}

#[test]
fn missing_config_file_is_an_error() {
    let workdir = TempDir::new().unwrap();
    relay(&workdir)
        .args(["--config", "does-not-exist.yaml", "setup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file does not exist"));
}

#[test]
fn setup_creates_directories_without_tools() {
    let workdir = TempDir::new().unwrap();
    let downloads = workdir.path().join("dl");
    let public = workdir.path().join("web");

    relay(&workdir)
        .arg("setup")
        .arg("--downloads-dir")
        .arg(&downloads)
        .arg("--public-dir")
        .arg(&public)
        .args(["--yt-dlp", "definitely-not-a-real-yt-dlp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("yt-dlp"));

    assert!(downloads.is_dir());
    assert!(public.is_dir());
}

#[test]
fn invalid_port_is_rejected() {
    let workdir = TempDir::new().unwrap();
    relay(&workdir)
        .args(["--port", "not-a-port", "setup"])
        .assert()
        .failure();
}
