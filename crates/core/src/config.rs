use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "scoop.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub nlu: NluConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Intent recognition endpoint. Either all of `app_id`, `api_key` and `host_name` are set, or
/// none of them is.
#[derive(Clone, Debug)]
pub struct NluConfig {
    pub app_id: Option<String>,
    pub api_key: Option<SecretString>,
    pub host_name: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub nlu_app_id: Option<String>,
    pub nlu_api_key: Option<String>,
    pub nlu_host_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Environment variables read for the NLU section, preferred name first.
pub const NLU_APP_ID_VARS: [&str; 2] = ["SCOOP_NLU_APP_ID", "LuisAppId"];
pub const NLU_API_KEY_VARS: [&str; 2] = ["SCOOP_NLU_API_KEY", "LuisAPIKey"];
pub const NLU_HOST_NAME_VARS: [&str; 2] = ["SCOOP_NLU_HOST_NAME", "LuisAPIHostName"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://scoop.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            nlu: NluConfig { app_id: None, api_key: None, host_name: None, timeout_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl NluConfig {
    /// True when every credential needed to call the prediction endpoint is present.
    pub fn is_configured(&self) -> bool {
        self.present_fields() == 3
    }

    fn present_fields(&self) -> usize {
        let app_id = self.app_id.as_deref().is_some_and(|value| !value.trim().is_empty());
        let api_key = self
            .api_key
            .as_ref()
            .is_some_and(|value| !value.expose_secret().trim().is_empty());
        let host_name = self.host_name.as_deref().is_some_and(|value| !value.trim().is_empty());
        [app_id, api_key, host_name].into_iter().filter(|present| *present).count()
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(nlu) = patch.nlu {
            if let Some(app_id) = nlu.app_id {
                self.nlu.app_id = Some(app_id);
            }
            if let Some(nlu_api_key_value) = nlu.api_key {
                self.nlu.api_key = Some(secret_value(nlu_api_key_value));
            }
            if let Some(host_name) = nlu.host_name {
                self.nlu.host_name = Some(host_name);
            }
            if let Some(timeout_secs) = nlu.timeout_secs {
                self.nlu.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SCOOP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SCOOP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SCOOP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SCOOP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SCOOP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_first_env(&NLU_APP_ID_VARS) {
            self.nlu.app_id = Some(value);
        }
        if let Some(value) = read_first_env(&NLU_API_KEY_VARS) {
            self.nlu.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_first_env(&NLU_HOST_NAME_VARS) {
            self.nlu.host_name = Some(value);
        }
        if let Some(value) = read_env("SCOOP_NLU_TIMEOUT_SECS") {
            self.nlu.timeout_secs = parse_u64("SCOOP_NLU_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("SCOOP_LOGGING_LEVEL").or_else(|| read_env("SCOOP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SCOOP_LOGGING_FORMAT").or_else(|| read_env("SCOOP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(app_id) = overrides.nlu_app_id {
            self.nlu.app_id = Some(app_id);
        }
        if let Some(api_key) = overrides.nlu_api_key {
            self.nlu.api_key = Some(secret_value(api_key));
        }
        if let Some(host_name) = overrides.nlu_host_name {
            self.nlu.host_name = Some(host_name);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_nlu(&self.nlu)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Explicit path if it exists, else `scoop.toml`, else `config/scoop.toml`.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    if nlu.timeout_secs == 0 || nlu.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "nlu.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match nlu.present_fields() {
        0 | 3 => {}
        _ => {
            return Err(ConfigError::Validation(
                "nlu.app_id, nlu.api_key and nlu.host_name must be set together \
                 (or SCOOP_NLU_APP_ID, SCOOP_NLU_API_KEY, SCOOP_NLU_HOST_NAME)"
                    .to_string(),
            ));
        }
    }

    if let Some(host_name) = nlu.host_name.as_deref() {
        if host_name.contains("://") || host_name.contains('/') {
            return Err(ConfigError::Validation(
                "nlu.host_name must be a bare host name, without scheme or path".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    nlu: Option<NluPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    app_id: Option<String>,
    api_key: Option<String>,
    host_name: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
