use assert_cmd::Command;
use std::fs;
use tempfile::tempdir;
use url::Url;

const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

fn toolpin(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("toolpin").unwrap();
    cmd.arg("--config").arg(config_dir.join("toolpin.toml"));
    cmd
}

#[test]
fn test_verify_matching_checksum() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("hello.txt");
    fs::write(&file, b"hello world").unwrap();

    let output = toolpin(dir.path())
        .arg("verify")
        .arg(&file)
        .arg(HELLO_SHA256.to_uppercase())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("OK"));
}

#[test]
fn test_verify_mismatch_fails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("hello.txt");
    fs::write(&file, b"hello world!").unwrap();

    toolpin(dir.path())
        .arg("verify")
        .arg(&file)
        .arg(HELLO_SHA256)
        .assert()
        .failure();
}

#[test]
fn test_verify_malformed_checksum_fails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("hello.txt");
    fs::write(&file, b"hello world").unwrap();

    toolpin(dir.path())
        .args(["verify"])
        .arg(&file)
        .arg("xyz")
        .assert()
        .failure();
}

#[cfg(test)]
mod cli_integration_tests {
    use super::*;

    /// A descriptor with one plain (non archive) tool available on every platform.
    fn setup(dir: &std::path::Path) -> String {
        setup_with(dir, true)
    }

    fn setup_with(dir: &std::path::Path, silent: bool) -> String {
        let artifact = dir.join("hello-tool");
        fs::write(&artifact, b"#!/bin/sh\necho hello\n").unwrap();
        let url = Url::from_file_path(&artifact).unwrap();
        let descriptor = format!(
            r#"tools:
  hello:
    version: 2.0.0
    baseDir: $HOME/.hello
    silentMode: {silent}
    platforms:
      lnx: {{ url: "{url}", cmdFileName: hello }}
      osx: {{ url: "{url}", cmdFileName: hello }}
      win: {{ url: "{url}", cmdFileName: hello.exe }}
"#
        );
        let path = dir.join("tools.yaml");
        fs::write(&path, descriptor).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_list() {
        let dir = tempdir().unwrap();
        let descriptor = setup(dir.path());

        let output = toolpin(dir.path())
            .args(["list", "--descriptor", &descriptor])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let output = String::from_utf8_lossy(&output);
        assert!(output.contains("2.0.0"));
        assert!(output.contains("lnx"));
        assert!(output.contains("win"));
    }

    #[test]
    fn test_acquire_which_and_clean() {
        let dir = tempdir().unwrap();
        let descriptor = setup(dir.path());
        let home = dir.path().join("home");
        let version_dir = home.join(".hello").join("cache").join("2.0.0");

        toolpin(dir.path())
            .args(["acquire", "hello", "--headless", "--descriptor", &descriptor])
            .arg("--download-dir")
            .arg(&home)
            .assert()
            .success();
        assert!(version_dir.exists());

        let output = toolpin(dir.path())
            .args(["which", "hello", "--descriptor", &descriptor])
            .arg("--download-dir")
            .arg(&home)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert!(String::from_utf8_lossy(&output).contains("Found executable at"));

        toolpin(dir.path())
            .args(["clean", "hello", "--descriptor", &descriptor])
            .arg("--download-dir")
            .arg(&home)
            .assert()
            .success();
        assert!(!version_dir.exists());
    }

    #[test]
    fn test_acquire_unknown_tool_fails() {
        let dir = tempdir().unwrap();
        let descriptor = setup(dir.path());

        toolpin(dir.path())
            .args(["acquire", "missing", "--headless", "--descriptor", &descriptor])
            .arg("--download-dir")
            .arg(dir.path().join("home"))
            .assert()
            .failure();
    }

    #[test]
    fn test_acquire_asks_before_downloading() {
        let dir = tempdir().unwrap();
        let descriptor = setup_with(dir.path(), false);
        let home = dir.path().join("home");

        let output = toolpin(dir.path())
            .args(["acquire", "hello", "--descriptor", &descriptor])
            .arg("--download-dir")
            .arg(&home)
            .env("NO_COLOR", "1")
            .write_stdin("n\n")
            .assert()
            .failure()
            .get_output()
            .stderr
            .clone();

        let stderr = String::from_utf8_lossy(&output);
        assert!(stderr.contains("hello tool required"));
        assert!(stderr.contains("hello not found, do you want to download hello 2.0.0?"));
        assert!(!home.join(".hello").join("cache").join("2.0.0").exists());
    }
}
