//! Configuration resolution tests
//!
//! Tests that touch process environment variables are marked #[serial] so
//! they never run concurrently.

use serial_test::serial;
use std::env;
use std::io::Write;
use survey_common::config::{
    ConfigOverrides, SurveyConfig, TomlConfig, DEFAULT_BIND_ADDR, DEFAULT_GITHUB_API_URL,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_SQLITE_FILENAME,
    ENV_APP_URL, ENV_GITHUB_TOKEN, ENV_REPO_NAME, ENV_RETRY_MAX_ATTEMPTS, ENV_SQLITE_FILENAME,
};
use survey_common::Error;

const ALL_ENV: &[&str] = &[
    "SURVEY_GITHUB_TOKEN",
    "SURVEY_REPO_NAME",
    "SURVEY_APP_URL",
    "SQLITE_FILENAME",
    "SURVEY_GITHUB_API_URL",
    "SURVEY_BIND_ADDR",
    "SURVEY_RETRY_MAX_ATTEMPTS",
    "SURVEY_RETRY_BASE_DELAY_MS",
    "SURVEY_COMMIT_MESSAGE",
];

fn clear_env() {
    for name in ALL_ENV {
        env::remove_var(name);
    }
}

fn toml_with_required() -> TomlConfig {
    TomlConfig::parse(
        r#"
        github_token = "toml-token"
        repo_name = "acme/survey-responses"
        app_url = "https://survey.example.org/"
        "#,
    )
    .unwrap()
}

#[test]
#[serial]
fn test_defaults_fill_optional_settings() {
    clear_env();

    let config = SurveyConfig::from_sources(&ConfigOverrides::default(), &toml_with_required()).unwrap();

    assert_eq!(config.github_token, "toml-token");
    assert_eq!(config.repo_name, "acme/survey-responses");
    // Trailing slash trimmed so query strings append cleanly
    assert_eq!(config.app_url, "https://survey.example.org");
    assert_eq!(config.sqlite_filename, DEFAULT_SQLITE_FILENAME);
    assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
    assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    assert_eq!(config.retry_max_attempts, DEFAULT_RETRY_MAX_ATTEMPTS);
    assert_eq!(config.retry_base_delay_ms, DEFAULT_RETRY_BASE_DELAY_MS);
}

#[test]
#[serial]
fn test_missing_required_settings_listed_together() {
    clear_env();

    let err = SurveyConfig::from_sources(&ConfigOverrides::default(), &TomlConfig::default())
        .unwrap_err();

    match err {
        Error::Config(msg) => {
            assert!(msg.contains("github_token"));
            assert!(msg.contains("repo_name"));
            assert!(msg.contains("app_url"));
        }
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(ENV_GITHUB_TOKEN, "env-token");
    env::set_var(ENV_SQLITE_FILENAME, "from-env.db");
    env::set_var(ENV_RETRY_MAX_ATTEMPTS, "5");

    let config = SurveyConfig::from_sources(&ConfigOverrides::default(), &toml_with_required()).unwrap();

    assert_eq!(config.github_token, "env-token");
    assert_eq!(config.sqlite_filename, "from-env.db");
    assert_eq!(config.retry_max_attempts, 5);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_REPO_NAME, "env/repo");
    env::set_var(ENV_APP_URL, "https://env.example.org");

    let overrides = ConfigOverrides {
        repo_name: Some("cli/repo".to_string()),
        ..Default::default()
    };
    let config = SurveyConfig::from_sources(&overrides, &toml_with_required()).unwrap();

    assert_eq!(config.repo_name, "cli/repo");
    assert_eq!(config.app_url, "https://env.example.org");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_numeric_env_rejected() {
    clear_env();
    env::set_var(ENV_RETRY_MAX_ATTEMPTS, "three");

    let result = SurveyConfig::from_sources(&ConfigOverrides::default(), &toml_with_required());
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_repo_name_shape_checked() {
    clear_env();
    let overrides = ConfigOverrides {
        repo_name: Some("just-a-name".to_string()),
        ..Default::default()
    };

    let result = SurveyConfig::from_sources(&overrides, &toml_with_required());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_token_redacted_in_debug() {
    clear_env();
    let config = SurveyConfig::from_sources(&ConfigOverrides::default(), &toml_with_required()).unwrap();

    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("toml-token"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
#[serial]
fn test_resolve_reads_named_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "github_token = \"file-token\"\nrepo_name = \"acme/repo\"\napp_url = \"http://localhost:8501\"\nretry_base_delay_ms = 50"
    )
    .unwrap();

    let config = SurveyConfig::resolve(&ConfigOverrides::default(), Some(file.path())).unwrap();
    assert_eq!(config.github_token, "file-token");
    assert_eq!(config.retry_base_delay_ms, 50);
}

#[test]
#[serial]
fn test_resolve_missing_named_file_fails() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let result = SurveyConfig::resolve(&ConfigOverrides::default(), Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_toml_rejected() {
    assert!(matches!(TomlConfig::parse("github_token = "), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_database_path_relative_to_working_dir() {
    clear_env();
    let config = SurveyConfig::from_sources(&ConfigOverrides::default(), &toml_with_required()).unwrap();

    let path = config.database_path();
    assert!(path.is_absolute());
    assert!(path.ends_with(DEFAULT_SQLITE_FILENAME));
}
