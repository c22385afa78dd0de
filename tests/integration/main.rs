//! Integration tests for crac

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// crac with config and credentials isolated under `home`
    fn crac(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("crac");
        cmd.env("CRAC_CONFIG", home.join("config.toml"))
            .env("CRAC_AUTH_FILE", home.join("auth.json"))
            .env_remove("CRAC_USERNAME")
            .env_remove("CRAC_PASSWORD")
            .env_remove("RUST_LOG");
        cmd
    }

    fn layout_repo(dir: &Path) -> String {
        format!("oci:{}", dir.join("store").display())
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("container registry as cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("crac"));
    }

    #[test]
    fn key_prints_eight_hex_chars() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        fs::write(work.path().join("Cargo.lock"), "lock").unwrap();

        crac(home.path())
            .args(["key", "-d", "Cargo.lock", "-k", "stable", "--unknown-platform", "-w"])
            .arg(work.path())
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[0-9a-f]{8}\n$").unwrap());
    }

    #[test]
    fn key_changes_with_dependency_contents() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let lock = work.path().join("Cargo.lock");

        let tag = |contents: &str| {
            fs::write(&lock, contents).unwrap();
            let output = crac(home.path())
                .args(["key", "-d", "Cargo.lock", "--unknown-platform", "-w"])
                .arg(work.path())
                .output()
                .unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap()
        };

        assert_ne!(tag("v1"), tag("v2"));
    }

    #[test]
    fn push_pull_round_trip_through_layout() {
        let home = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let repo = layout_repo(home.path());

        fs::create_dir_all(src.path().join("target/debug")).unwrap();
        fs::write(src.path().join("target/debug/app"), b"binary").unwrap();
        fs::write(src.path().join("notes.txt"), b"hello").unwrap();
        fs::write(src.path().join("Cargo.lock"), "lock").unwrap();
        fs::write(dest.path().join("Cargo.lock"), "lock").unwrap();

        crac(home.path())
            .args(["push", &repo, "-f", "target/**/*", "-f", "notes.txt"])
            .args(["-d", "Cargo.lock", "--unknown-platform", "--chunk-size", "1"])
            .arg("-w")
            .arg(src.path())
            .assert()
            .success()
            .stdout(predicate::str::is_match(":[0-9a-f]{8}\n$").unwrap());

        crac(home.path())
            .args(["pull", &repo, "-d", "Cargo.lock", "--unknown-platform", "--perm", "0644"])
            .arg("-w")
            .arg(dest.path())
            .assert()
            .success();

        assert_eq!(
            fs::read(dest.path().join("target/debug/app")).unwrap(),
            b"binary"
        );
        assert_eq!(fs::read(dest.path().join("notes.txt")).unwrap(), b"hello");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.path().join("notes.txt"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o7777, 0o644);
        }
    }

    #[test]
    fn pull_missing_tag_fails() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let repo = layout_repo(home.path());

        crac(home.path())
            .args(["pull", &repo, "-t", "nothing-here", "-w"])
            .arg(work.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn push_without_files_fails() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let repo = layout_repo(home.path());

        crac(home.path())
            .args(["push", &repo, "-f", "missing/*", "-w"])
            .arg(work.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("empty cache image"));

        assert!(!home.path().join("store").exists());
    }

    #[test]
    fn push_rejects_tagged_repository() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .args(["push", "ghcr.io/org/cache:v1", "-f", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid repository reference"));
    }

    #[test]
    fn login_and_logout() {
        let home = TempDir::new().unwrap();

        crac(home.path())
            .args(["login", "ghcr.io", "-u", "ci", "-p", "token"])
            .assert()
            .success();

        let auth = fs::read_to_string(home.path().join("auth.json")).unwrap();
        assert!(auth.contains("ghcr.io"));

        crac(home.path())
            .args(["logout", "ghcr.io"])
            .assert()
            .success();

        let auth = fs::read_to_string(home.path().join("auth.json")).unwrap();
        assert!(!auth.contains("ghcr.io"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let home = TempDir::new().unwrap();

        crac(home.path()).args(["config", "init"]).assert().success();
        assert!(home.path().join("config.toml").exists());

        crac(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn key_reads_profile_from_stdin() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        fs::write(work.path().join("Cargo.lock"), "lock").unwrap();

        let flags = crac(home.path())
            .args(["key", "-d", "Cargo.lock", "-k", "stable", "--unknown-platform", "-w"])
            .arg(work.path())
            .output()
            .unwrap();
        assert!(flags.status.success());

        // stdin wins over a named profile, so the missing profile is never looked up
        let piped = crac(home.path())
            .args(["key", "--profile", "nope", "--profile-stdin", "--unknown-platform", "-w"])
            .arg(work.path())
            .write_stdin("keys = [\"stable\"]\ndeps = [\"Cargo.lock\"]\n")
            .output()
            .unwrap();
        assert!(piped.status.success());

        assert_eq!(piped.stdout, flags.stdout);
    }

    #[test]
    fn malformed_stdin_profile_fails() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .args(["key", "--profile-stdin"])
            .write_stdin("keys = ")
            .assert()
            .failure()
            .stderr(predicate::str::contains("<stdin>"));
    }

    #[test]
    fn unknown_profile_shows_hint() {
        let home = TempDir::new().unwrap();
        crac(home.path())
            .args(["key", "--profile", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Profile not found"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
