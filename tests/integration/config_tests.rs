use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use safedupe::config::Config;
use safedupe::rollback::RetentionPolicy;
use safedupe::scanner::HashAlgorithm;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Defaults only, so environment variables from other tests cannot leak in
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
    assert!(config.expand_archives);
    assert_eq!(config.snapshot_retention, RetentionPolicy::Retain { hours: 168 });
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("SAFEDUPE_HASH_ALGORITHM", "sha256");
    std::env::set_var("SAFEDUPE_EXPAND_ARCHIVES", "false");
    std::env::set_var("SAFEDUPE_SNAPSHOT_RETENTION__RETAIN__HOURS", "12");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("SAFEDUPE_").split("__"))
        .extract()
        .unwrap();

    assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
    assert!(!config.expand_archives);
    assert_eq!(config.snapshot_retention, RetentionPolicy::Retain { hours: 12 });

    std::env::remove_var("SAFEDUPE_HASH_ALGORITHM");
    std::env::remove_var("SAFEDUPE_EXPAND_ARCHIVES");
    std::env::remove_var("SAFEDUPE_SNAPSHOT_RETENTION__RETAIN__HOURS");
}

#[test]
fn test_config_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
hash_algorithm = "sha512"
ignore_patterns = ["*.tmp", "node_modules/"]
data_dir = "/var/lib/safedupe"
snapshot_retention = "delete"
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();

    assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
    assert_eq!(config.ignore_patterns, vec!["*.tmp", "node_modules/"]);
    assert_eq!(config.snapshot_retention, RetentionPolicy::Delete);
    assert_eq!(config.checkpoint_dir(), PathBuf::from("/var/lib/safedupe/checkpoints"));
    assert_eq!(config.database_path(), PathBuf::from("/var/lib/safedupe/safedupe.db"));

    let walker = config.walker_config();
    assert_eq!(walker.ignore_patterns.len(), 2);
}

#[test]
fn test_config_rejects_unknown_algorithm() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "hash_algorithm = \"md5\"\n").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract();
    assert!(result.is_err());
}
