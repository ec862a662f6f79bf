use hive_analysis::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("HIVE_SERVER__PORT");
        env::remove_var("HIVE_SECURITY__JWT_REQUIRED");
        env::remove_var("HIVE_UPLOAD__SESSION_TTL_SECS");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["hive-analysis"]).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert!(config.security.jwt_required);
    assert_eq!(config.limits.max_analysis_calls, 10);
    assert_eq!(config.limits.max_upload_mib, 100);
    assert_eq!(config.upload.max_chunk_size, 1024 * 1024);
    assert_eq!(config.upload.session_ttl_secs, 600);
    assert!(!config.resilience.timeout_disabled);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("HIVE_SERVER__PORT", "9090");
        env::set_var("HIVE_UPLOAD__SESSION_TTL_SECS", "120");
    }

    let config = AppConfig::load_from_args(["hive-analysis"]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.upload.session_ttl_secs, 120);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_override_wins() {
    clear_env_vars();
    unsafe {
        env::set_var("HIVE_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args(["hive-analysis", "--port", "7070"])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 7070);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let config_content = r#"
server:
  port: 7070
upload:
  session_ttl_secs: 300
    "#;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = dir.path().join("test_config.yaml");
    fs::write(&file_path, config_content).expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", file_path.to_str().unwrap());
    }

    let config =
        AppConfig::load_from_args(["hive-analysis"]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.upload.session_ttl_secs, 300);

    clear_env_vars();
}
