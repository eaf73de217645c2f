use std::path::PathBuf;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use treesync_core::{CoreError, Manifest, RetryPolicy, SyncContext, SyncOptions};

#[test]
fn yaml_config_resolves_into_context() {
    let tmp = TempDir::new().unwrap();
    tmp.child("out").create_dir_all().unwrap();
    let config = tmp.child("treesync.yaml");
    config
        .write_str(&format!(
            "from: {}\nto: {}\nignore_manifest: true\nignore: \".git;*.pdb\"\n\
             full_compare: \"*.config\"\nretry:\n  attempts: 3\n  delay_ms: 10\n",
            tmp.child("out").path().display(),
            tmp.child("site").path().display(),
        ))
        .unwrap();

    let opts = SyncOptions::load_yaml(config.path()).unwrap();
    assert_eq!(
        opts.retry,
        Some(RetryPolicy {
            attempts: 3,
            delay_ms: 10
        })
    );

    let ctx = SyncContext::from_options(&opts).unwrap();
    assert!(ctx.ignore.is_ignored(".GIT"));
    assert!(ctx.full_compare.matches("app.config"));
    assert_eq!(ctx.retry.attempts, 3);
}

#[test]
fn unknown_config_keys_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.child("treesync.yaml");
    config.write_str("form: ./typo\n").unwrap();

    let err = SyncOptions::load_yaml(config.path()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }));
    assert!(err.to_string().contains("treesync.yaml"));
}

#[test]
fn command_line_values_override_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.child("treesync.yaml");
    config
        .write_str("from: ./a\nto: ./b\ncopy_metadata: true\n")
        .unwrap();

    let file = SyncOptions::load_yaml(config.path()).unwrap();
    let merged = file.overlay(SyncOptions {
        to: Some(PathBuf::from("./c")),
        ..SyncOptions::default()
    });
    assert_eq!(merged.from, Some(PathBuf::from("./a")));
    assert_eq!(merged.to, Some(PathBuf::from("./c")));
    assert!(merged.copy_metadata);
}

#[test]
fn manifest_is_written_one_path_per_line() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.child("state").child("manifest");

    let mut manifest = Manifest::new();
    manifest.insert("bin");
    manifest.insert("bin\\app.dll");
    manifest.save(path.path()).unwrap();

    path.assert("bin\nbin/app.dll\n");
    tmp.child("state")
        .child("manifest.tmp")
        .assert(predicate::path::missing());
}
