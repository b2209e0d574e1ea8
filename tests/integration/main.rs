//! Integration tests for npm-accel

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Binary isolated from the user's config and cache
    fn npm_accel(temp: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("npm-accel");
        cmd.env("NPM_ACCEL_CONFIG", temp.join("config.toml"))
            .env("NPM_ACCEL_CACHE_DIR", temp.join("cache"))
            .env_remove("NPM_ACCEL_CACHE_LIMIT")
            .env_remove("NODE_ENV");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Accelerator for npm"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("npm-accel"));
    }

    #[test]
    fn install_help_lists_options() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["install", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--production"))
            .stdout(predicate::str::contains("--no-cache"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No archives"));
    }

    #[test]
    fn cache_list_empty_json() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_list_shows_archives() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let fingerprint = "0123456789abcdef0123456789abcdef01234567";
        std::fs::write(cache.join(format!("{fingerprint}.tar")), b"").unwrap();
        std::fs::write(
            cache.join(format!("{fingerprint}.json")),
            br#"{"date-created": 0, "last-accessed": 60, "cache-hits": 4}"#,
        )
        .unwrap();
        std::fs::write(cache.join("notes.txt"), b"ignored").unwrap();

        npm_accel(temp.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains(fingerprint))
            .stdout(predicate::str::contains("1970-01-01 00:01"))
            .stdout(predicate::str::contains("Total: 1 archive(s)"));
    }

    #[test]
    fn cache_clean_within_limit() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["cache", "clean"])
            .assert()
            .success()
            .stdout(predicate::str::contains("within the limit of 20"));
    }

    #[test]
    fn cache_clean_evicts_oldest() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        for (name, accessed) in [("a", 1), ("b", 2), ("c", 3)] {
            let fingerprint = name.repeat(40);
            std::fs::write(cache.join(format!("{fingerprint}.tar")), b"").unwrap();
            std::fs::write(
                cache.join(format!("{fingerprint}.json")),
                format!(r#"{{"last-accessed": {accessed}}}"#),
            )
            .unwrap();
        }

        npm_accel(temp.path())
            .args(["cache", "clean", "--cache-limit", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 1 archive(s), 2 kept"));

        assert!(!cache.join(format!("{}.tar", "a".repeat(40))).exists());
        assert!(cache.join(format!("{}.tar", "c".repeat(40))).exists());
    }

    #[test]
    fn cache_clean_bounds_uppercase_archives() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let old = "A".repeat(40);
        let new = "b".repeat(40);
        std::fs::write(cache.join(format!("{old}.TAR")), b"").unwrap();
        std::fs::write(cache.join(format!("{old}.json")), br#"{"last-accessed": 1}"#).unwrap();
        std::fs::write(cache.join(format!("{new}.tar")), b"").unwrap();
        std::fs::write(cache.join(format!("{new}.json")), br#"{"last-accessed": 2}"#).unwrap();

        npm_accel(temp.path())
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("a".repeat(40)));

        npm_accel(temp.path())
            .args(["cache", "clean", "--cache-limit", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 1 archive(s), 1 kept"));

        let mut left: Vec<_> = std::fs::read_dir(&cache)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec![format!("{new}.json"), format!("{new}.tar")]);
    }

    #[test]
    fn cache_clear_with_yes() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join(format!("{}.tar", "d".repeat(40))), b"").unwrap();

        npm_accel(temp.path())
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 1 archive(s)"));

        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn cache_clear_aborts_without_confirmation() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join(format!("{}.tar", "e".repeat(40))), b"").unwrap();

        npm_accel(temp.path())
            .args(["cache", "clear"])
            .write_stdin("n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted."));

        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 1);
    }

    #[test]
    fn install_without_package_file_fails() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["install"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Missing package.json file"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn install_without_dependencies_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("package.json"), br#"{"name": "empty"}"#).unwrap();

        npm_accel(temp.path())
            .arg("install")
            .arg(&project)
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to do"));

        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn unknown_installer_is_rejected() {
        let temp = TempDir::new().unwrap();
        npm_accel(temp.path())
            .args(["install", "--installer", "bower"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("bower"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[cache]\nlimit = 0\n").unwrap();

        npm_accel(temp.path())
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

mod cache_tests {
    use npm_accel::cache::{CacheStore, EvictionPolicy, Fingerprint, NativeTar};
    use npm_accel::clock::{ManualClock, SystemClock};
    use npm_accel::context::LocalContext;
    use npm_accel::AccelError;
    use std::num::NonZeroUsize;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(root: &Path) -> CacheStore {
        CacheStore::new(
            root,
            Arc::new(LocalContext::new()),
            Arc::new(NativeTar),
            Arc::new(SystemClock),
        )
    }

    fn node_modules(root: &Path, marker: &str) {
        std::fs::create_dir_all(root.join("left-pad")).unwrap();
        std::fs::write(root.join("left-pad/index.js"), marker).unwrap();
        std::fs::write(root.join("left-pad/big.bin"), vec![7u8; 256 * 1024]).unwrap();
    }

    #[test]
    fn fingerprint_scenario() {
        let toolchain = ["node-14", "npmv7"];
        let a = Fingerprint::compute([("left-pad", "1.0.0")], &toolchain);
        let b = Fingerprint::compute([("left-pad", "1.0.0")], &toolchain);
        let c = Fingerprint::compute([("left-pad", "1.0.1")], &toolchain);

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 40);
        assert!(a.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn bounded_size_keeps_most_recent() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = CacheStore::new(
            temp.path().join("cache"),
            Arc::new(LocalContext::new()),
            Arc::new(NativeTar),
            clock.clone(),
        );
        let source = temp.path().join("node_modules");
        node_modules(&source, "x");

        let limit = NonZeroUsize::new(3).unwrap();
        let mut keys = Vec::new();
        for i in 0..5 {
            let key = Fingerprint::compute([("pkg", i.to_string())], &["v20"]);
            clock.set(i);
            store.store(&key, &source).await.unwrap();
            keys.push(key);
        }

        let report = EvictionPolicy::new(&store).enforce(limit).await.unwrap();
        assert_eq!(report.removed.len(), 2);

        let mut remaining: Vec<_> = store.list_entries().await.unwrap().collect();
        remaining.sort();
        let mut expected = keys[2..].to_vec();
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[tokio::test]
    async fn concurrent_stores_of_one_fingerprint_both_succeed() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp.path().join("cache"));
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        node_modules(&first, "first");
        node_modules(&second, "second");
        let key = Fingerprint::compute([("left-pad", "1.0.0")], &["v20"]);

        let (a, b) = tokio::join!(store.store(&key, &first), store.store(&key, &second));
        a.unwrap();
        b.unwrap();

        let dest = temp.path().join("dest");
        store.retrieve(&key, &dest).await.unwrap();
        let marker = std::fs::read_to_string(dest.join("left-pad/index.js")).unwrap();
        assert!(marker == "first" || marker == "second");
        assert_eq!(store.list_entries().await.unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_never_see_partial_archives() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp.path().join("cache"));
        let source = temp.path().join("node_modules");
        node_modules(&source, "stable");
        let key = Fingerprint::compute([("left-pad", "1.0.0")], &["v20"]);
        store.store(&key, &source).await.unwrap();

        let writer = {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    store.store(&key, &source).await.unwrap();
                }
            })
        };

        for i in 0..10 {
            let dest = temp.path().join(format!("reader-{i}"));
            store.retrieve(&key, &dest).await.unwrap();
            assert_eq!(
                std::fs::metadata(dest.join("left-pad/big.bin")).unwrap().len(),
                256 * 1024
            );
        }

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn miss_leaves_destination_alone() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp.path().join("cache"));
        let dest = temp.path().join("dest");
        node_modules(&dest, "keep");
        let key = Fingerprint::compute([("absent", "0.0.1")], &["v20"]);

        let err = store.retrieve(&key, &dest).await.unwrap_err();

        assert!(matches!(err, AccelError::NotFound { .. }));
        assert_eq!(
            std::fs::read_to_string(dest.join("left-pad/index.js")).unwrap(),
            "keep"
        );
        assert_eq!(store.list_entries().await.unwrap().count(), 0);
    }
}
