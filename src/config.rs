use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 64;

const SETTINGS_PATH_ENV: &str = "PATHOLOGY_ASSIST_SETTINGS";
const DEFAULT_SETTINGS_REL_PATH: &str = "config/pathology-assist.settings.toml";

/// Provider and server configuration, resolved once at startup and passed
/// down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: Url,
    pub request_timeout_secs: u64,
    pub bind: SocketAddr,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API_KEY environment variable is not set")]
    MissingApiKey,
    #[error("failed to read settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("invalid provider base URL '{value}': {message}")]
    InvalidBaseUrl { value: String, message: String },
    #[error("invalid bind address '{0}'")]
    InvalidBind(String),
    #[error("setting '{key}' must be a positive integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub model: Option<String>,
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub bind: Option<String>,
    pub max_upload_mb: Option<usize>,
}

/// Key lookup over process env, then `.env`, then the TOML settings file.
struct ConfigSources<'a> {
    env: &'a dyn Fn(&str) -> Option<String>,
    dotenv: HashMap<String, String>,
}

impl ConfigSources<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.env)(key)
            .or_else(|| self.dotenv.get(key).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl AppConfig {
    pub fn load(app_root: &Path) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        Self::load_with(app_root, &env)
    }

    pub fn load_with(
        app_root: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let dotenv = load_dotenv_map(app_root).map_err(|e| ConfigError::ReadFile {
            path: app_root.join(".env").display().to_string(),
            message: e.to_string(),
        })?;
        let sources = ConfigSources { env, dotenv };
        let settings = load_settings_file(app_root, sources.get(SETTINGS_PATH_ENV).as_deref())?;
        resolve_config(&sources, &settings)
    }
}

fn resolve_config(
    sources: &ConfigSources<'_>,
    settings: &SettingsFile,
) -> Result<AppConfig, ConfigError> {
    let api_key = sources
        .get("API_KEY")
        .or_else(|| sources.get("GEMINI_API_KEY"))
        .ok_or(ConfigError::MissingApiKey)?;

    let model = sources
        .get("PATHOLOGY_ASSIST_MODEL")
        .or_else(|| settings.model.clone())
        .unwrap_or_else(|| String::from(DEFAULT_MODEL));

    let base_raw = sources
        .get("PATHOLOGY_ASSIST_API_BASE_URL")
        .or_else(|| settings.api_base_url.clone())
        .unwrap_or_else(|| String::from(DEFAULT_API_BASE_URL));
    let api_base_url = Url::parse(base_raw.as_str()).map_err(|e| ConfigError::InvalidBaseUrl {
        value: base_raw.clone(),
        message: e.to_string(),
    })?;
    if !matches!(api_base_url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: base_raw,
            message: String::from("scheme must be http or https"),
        });
    }

    let request_timeout_secs = match sources.get("PATHOLOGY_ASSIST_TIMEOUT_SECS") {
        Some(raw) => parse_positive("PATHOLOGY_ASSIST_TIMEOUT_SECS", raw.as_str())?,
        None => settings.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    let bind_raw = sources
        .get("PATHOLOGY_ASSIST_BIND")
        .or_else(|| settings.bind.clone())
        .unwrap_or_else(|| String::from(DEFAULT_BIND));
    let bind = bind_raw
        .parse::<SocketAddr>()
        .map_err(|_| ConfigError::InvalidBind(bind_raw.clone()))?;

    let max_upload_mb = match sources.get("PATHOLOGY_ASSIST_MAX_UPLOAD_MB") {
        Some(raw) => parse_positive("PATHOLOGY_ASSIST_MAX_UPLOAD_MB", raw.as_str())?,
        None => settings.max_upload_mb.unwrap_or(DEFAULT_MAX_UPLOAD_MB),
    };

    Ok(AppConfig {
        api_key,
        model,
        api_base_url,
        request_timeout_secs,
        bind,
        max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
    })
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
        .ok_or_else(|| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

pub fn load_settings_file(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<SettingsFile, ConfigError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) })
    {
        return load_settings_from_toml_path(path.as_path());
    }

    let default_path = app_root.join(DEFAULT_SETTINGS_REL_PATH);
    if !default_path.exists() {
        return Ok(SettingsFile::default());
    }
    load_settings_from_toml_path(default_path.as_path())
}

fn load_settings_from_toml_path(path: &Path) -> Result<SettingsFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    toml::from_str::<SettingsFile>(raw.as_str()).map_err(|e| ConfigError::ParseToml {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

pub fn default_app_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn load_dotenv_map(app_root: &Path) -> Result<HashMap<String, String>, std::io::Error> {
    let path = app_root.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path)?;
    Ok(parse_dotenv_content(raw.as_str()))
}

/// Only keys this crate reads are kept.
fn parse_dotenv_content(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(parse_dotenv_line)
        .filter(|(key, _)| is_config_key(key))
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn is_config_key(key: &str) -> bool {
    matches!(key, "API_KEY" | "GEMINI_API_KEY") || key.starts_with("PATHOLOGY_ASSIST_")
}

/// `KEY=value`, optionally prefixed by `export`. Quoted values are taken
/// verbatim; unquoted ones lose a trailing ` #` comment.
fn parse_dotenv_line(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q));
    let value = match unquoted {
        Some(inner) => inner,
        None => value.split_once(" #").map_or(value, |(v, _)| v.trim_end()),
    };
    Some((key, value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "pathology_assist_config_test_{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(root.as_path()).expect("temp root should be created");
        root
    }

    fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let root = temp_root();
        let env = env_from(&[]);
        let err = AppConfig::load_with(root.as_path(), &env).expect_err("key should be required");
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let root = temp_root();
        let env = env_from(&[("API_KEY", "   ")]);
        let err = AppConfig::load_with(root.as_path(), &env).expect_err("blank key is missing");
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let root = temp_root();
        let env = env_from(&[("API_KEY", "k-123")]);
        let config = AppConfig::load_with(root.as_path(), &env).expect("config should load");
        assert_eq!(config.api_key, "k-123");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base_url.as_str(), "https://generativelanguage.googleapis.com/");
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_MB * 1024 * 1024);
    }

    #[test]
    fn dotenv_supplies_key_and_env_wins_over_settings_file() {
        let root = temp_root();
        fs::write(
            root.join(".env"),
            "export GEMINI_API_KEY=\"from-dotenv\"\nPATHOLOGY_ASSIST_MODEL=env-model # comment\n",
        )
        .expect("dotenv should write");
        fs::create_dir_all(root.join("config")).expect("config dir");
        fs::write(
            root.join(DEFAULT_SETTINGS_REL_PATH),
            "model = \"toml-model\"\nrequest_timeout_secs = 30\nmax_upload_mb = 8\n",
        )
        .expect("settings should write");

        let env = env_from(&[]);
        let config = AppConfig::load_with(root.as_path(), &env).expect("config should load");
        assert_eq!(config.api_key, "from-dotenv");
        assert_eq!(config.model, "env-model");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn unknown_settings_keys_are_rejected() {
        let root = temp_root();
        let path = root.join("custom.toml");
        fs::write(path.as_path(), "temperature = 0.2\n").expect("settings should write");
        let err = load_settings_file(root.as_path(), Some("custom.toml"))
            .expect_err("unknown key should fail");
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn invalid_numbers_and_urls_are_reported() {
        let root = temp_root();
        let env = env_from(&[("API_KEY", "k"), ("PATHOLOGY_ASSIST_TIMEOUT_SECS", "0")]);
        let err = AppConfig::load_with(root.as_path(), &env).expect_err("zero timeout rejected");
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let env = env_from(&[("API_KEY", "k"), ("PATHOLOGY_ASSIST_API_BASE_URL", "ftp://x")]);
        let err = AppConfig::load_with(root.as_path(), &env).expect_err("ftp scheme rejected");
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn dotenv_supports_export_quotes_and_comments() {
        let parsed = parse_dotenv_content(concat!(
            "# comment\n",
            "export API_KEY=1\n",
            "PATHOLOGY_ASSIST_MODEL='two # kept'\n",
            "PATHOLOGY_ASSIST_BIND=0.0.0.0:9 # trailing\n",
            "=skipped\n",
            "noequals\n",
        ));
        assert_eq!(parsed.get("API_KEY").map(String::as_str), Some("1"));
        assert_eq!(
            parsed.get("PATHOLOGY_ASSIST_MODEL").map(String::as_str),
            Some("two # kept")
        );
        assert_eq!(
            parsed.get("PATHOLOGY_ASSIST_BIND").map(String::as_str),
            Some("0.0.0.0:9")
        );
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn dotenv_ignores_keys_the_service_does_not_read() {
        let parsed = parse_dotenv_content("AWS_SECRET_ACCESS_KEY=nope\nGEMINI_API_KEY=g\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("GEMINI_API_KEY").map(String::as_str), Some("g"));
    }
}
