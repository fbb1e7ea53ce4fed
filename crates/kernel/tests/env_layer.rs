//! Process environment variables are global, so everything that sets them
//! lives in this one test binary and runs in a single test.

use std::fs;

use changeapp_kernel::settings::{Environment, LoadOptions, Settings};

const OVERRIDES: [(&str, &str); 3] = [
    ("CHANGEAPP_MONGO__URI", "mongodb://envhost:1"),
    ("CHANGEAPP_MONGO__CONNECT_TIMEOUT_MS", "42"),
    ("CHANGEAPP_PROVISION__USER__SYNC_ROLES", "true"),
];

#[test]
fn prefixed_variables_override_files_and_env_defaults_to_development() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.toml"),
        r#"
        [mongo]
        uri = "mongodb://base:27017"
        connect_timeout_ms = 1000

        [provision.user]
        sync_roles = false
        "#,
    )
    .unwrap();
    fs::write(
        dir.path().join("development.toml"),
        r#"
        [mongo]
        uri = "mongodb://overlay:27017"
        "#,
    )
    .unwrap();

    std::env::remove_var("CHANGEAPP_ENV");
    for (key, _) in OVERRIDES {
        std::env::remove_var(key);
    }
    let options = || LoadOptions {
        config_dir: Some(dir.path().to_path_buf()),
        environment: None,
    };

    let settings = Settings::load_with(options()).unwrap();
    assert_eq!(settings.environment, Environment::Development);
    assert_eq!(settings.mongo.uri, "mongodb://overlay:27017");
    assert_eq!(settings.mongo.connect_timeout_ms, 1000);
    assert!(!settings.provision.user.sync_roles);

    for (key, value) in OVERRIDES {
        std::env::set_var(key, value);
    }
    let settings = Settings::load_with(options());
    for (key, _) in OVERRIDES {
        std::env::remove_var(key);
    }

    let settings = settings.unwrap();
    assert_eq!(settings.environment, Environment::Development);
    assert_eq!(settings.mongo.uri, "mongodb://envhost:1");
    assert_eq!(settings.mongo.connect_timeout_ms, 42);
    assert!(settings.provision.user.sync_roles);
    // Untouched keys still come from the files and defaults.
    assert_eq!(settings.mongo.server_selection_timeout_ms, 5000);
    assert_eq!(settings.provision.user.name, "changeapp");
}
