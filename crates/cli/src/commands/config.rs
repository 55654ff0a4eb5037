use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use scoop_core::config::{
    resolve_config_path, AppConfig, LoadOptions, NLU_API_KEY_VARS, NLU_APP_ID_VARS,
    NLU_HOST_NAME_VARS,
};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct FieldView {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in field_views(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.push(format!(
        "- order recognition: {}",
        if config.nlu.is_configured() { "enabled" } else { "disabled" }
    ));

    lines.join("\n")
}

fn field_views(config: &AppConfig) -> Vec<FieldView> {
    vec![
        FieldView {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["SCOOP_DATABASE_URL"],
        },
        FieldView {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["SCOOP_DATABASE_MAX_CONNECTIONS"],
        },
        FieldView {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["SCOOP_DATABASE_TIMEOUT_SECS"],
        },
        FieldView {
            key: "nlu.app_id",
            value: config.nlu.app_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &NLU_APP_ID_VARS,
        },
        FieldView {
            key: "nlu.api_key",
            value: redact_secret(config.nlu.api_key.as_ref()),
            env_keys: &NLU_API_KEY_VARS,
        },
        FieldView {
            key: "nlu.host_name",
            value: config.nlu.host_name.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &NLU_HOST_NAME_VARS,
        },
        FieldView {
            key: "nlu.timeout_secs",
            value: config.nlu.timeout_secs.to_string(),
            env_keys: &["SCOOP_NLU_TIMEOUT_SECS"],
        },
        FieldView {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["SCOOP_LOGGING_LEVEL", "SCOOP_LOG_LEVEL"],
        },
        FieldView {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["SCOOP_LOGGING_FORMAT", "SCOOP_LOG_FORMAT"],
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the last four characters of long keys so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() < 12 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
