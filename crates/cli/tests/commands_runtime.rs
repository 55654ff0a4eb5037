use std::env;
use std::sync::{Mutex, OnceLock};

use scoop_cli::commands::{config, doctor, migrate};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SCOOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_creates_schema_in_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("scoop.db").display());

    with_env(&[("SCOOP_DATABASE_URL", url.as_str())], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected first migrate run success");

        let second = migrate::run();
        assert_eq!(second.exit_code, 0, "expected repeated migrate run to be a no-op");

        let report = parse_payload(&doctor::run(true));
        let database = &report["checks"][2];
        assert_eq!(database["name"], "database_connectivity");
        assert!(database["details"].as_str().unwrap_or_default().contains("schema present"));
    });
}

#[test]
fn migrate_returns_config_failure_for_partial_nlu_settings() {
    with_env(
        &[("SCOOP_DATABASE_URL", "sqlite::memory:"), ("SCOOP_NLU_APP_ID", "app-only")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn migrate_rejects_non_sqlite_urls() {
    with_env(&[("SCOOP_DATABASE_URL", "postgres://localhost/scoop")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_without_nlu_and_skips_recognition_check() {
    with_env(&[("SCOOP_DATABASE_URL", "sqlite::memory:")], || {
        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().expect("checks array");
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(names, vec!["config_validation", "nlu_readiness", "database_connectivity"]);
        assert_eq!(checks[1]["status"], "skipped");
        assert_eq!(checks[2]["status"], "pass");
    });
}

#[test]
fn doctor_reports_configured_recognition_from_legacy_variables() {
    with_env(
        &[
            ("SCOOP_DATABASE_URL", "sqlite::memory:"),
            ("LuisAppId", "app-1"),
            ("LuisAPIKey", "key-1"),
            ("LuisAPIHostName", "westus.api.cognitive.microsoft.com"),
        ],
        || {
            let report = parse_payload(&doctor::run(true));

            assert_eq!(report["overall_status"], "pass");
            assert_eq!(report["checks"][1]["status"], "pass");
        },
    );
}

#[test]
fn doctor_fails_and_skips_dependents_when_config_is_invalid() {
    with_env(&[("SCOOP_DATABASE_TIMEOUT_SECS", "0")], || {
        let human = doctor::run(false);

        assert!(human.starts_with("doctor: one or more readiness checks failed"));
        assert!(human.contains("- [fail] config_validation:"));
        assert!(human.contains("- [skip] nlu_readiness:"));
        assert!(human.contains("- [skip] database_connectivity:"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_the_api_key() {
    with_env(
        &[
            ("SCOOP_DATABASE_URL", "sqlite::memory:"),
            ("SCOOP_NLU_APP_ID", "app-1"),
            ("SCOOP_NLU_API_KEY", "0123456789abcdef"),
            ("LuisAPIHostName", "westus.api.cognitive.microsoft.com"),
            ("SCOOP_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(output
                .contains("- database.url = sqlite::memory: (source: env (SCOOP_DATABASE_URL))"));
            assert!(output.contains("- nlu.api_key = ***cdef (source: env (SCOOP_NLU_API_KEY))"));
            assert!(output.contains("(source: env (LuisAPIHostName))"));
            assert!(output.contains("- logging.level = debug (source: env (SCOOP_LOG_LEVEL))"));
            assert!(output.contains("- database.max_connections = 5 (source: default)"));
            assert!(output.contains("- order recognition: enabled"));
            assert!(!output.contains("0123456789abcdef"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SCOOP_DATABASE_URL",
        "SCOOP_DATABASE_MAX_CONNECTIONS",
        "SCOOP_DATABASE_TIMEOUT_SECS",
        "SCOOP_NLU_APP_ID",
        "SCOOP_NLU_API_KEY",
        "SCOOP_NLU_HOST_NAME",
        "SCOOP_NLU_TIMEOUT_SECS",
        "LuisAppId",
        "LuisAPIKey",
        "LuisAPIHostName",
        "SCOOP_LOGGING_LEVEL",
        "SCOOP_LOGGING_FORMAT",
        "SCOOP_LOG_LEVEL",
        "SCOOP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
