//! Service configuration
//!
//! Read once from the environment at startup, validated, and then shared
//! read-only. Nothing else in the crate looks at environment variables.

use crate::filters::IngestFilters;
use crate::logging::{LogFormat, SensitiveToken};
use crate::query::DEFAULT_MAX_PAGE_SIZE;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DB_CONN_STR_ENV: &str = "LOGSEARCH_DB_CONN_STR";
pub const AUDIT_AUTH_TOKEN_ENV: &str = "LOGSEARCH_AUDIT_AUTH_TOKEN";
pub const QUERY_AUTH_TOKEN_ENV: &str = "MINIO_LOG_QUERY_AUTH_TOKEN";
pub const DISK_CAPACITY_ENV: &str = "LOGSEARCH_DISK_CAPACITY_GB";
pub const API_NAME_INCLUDE_FILTER_ENV: &str = "LOGSEARCH_INGEST_FILTER_APINAME_INCLUDE";
pub const API_NAME_EXCLUDE_FILTER_ENV: &str = "LOGSEARCH_INGEST_FILTER_APINAME_EXCLUDE";
pub const LISTEN_ADDR_ENV: &str = "LOGSEARCH_LISTEN_ADDR";
pub const LOG_FORMAT_ENV: &str = "LOGSEARCH_LOG_FORMAT";
pub const MAX_PAGE_SIZE_ENV: &str = "LOGSEARCH_MAX_PAGE_SIZE";
pub const INGEST_TIMEOUT_ENV: &str = "LOGSEARCH_INGEST_TIMEOUT_SECS";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_INGEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub ingest_filters: IngestFilters,
}

impl Config {
    /// Settings that are accepted but probably a mistake.
    ///
    /// Loading happens before logging is set up, so callers report these.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.auth.ingest_token == self.auth.query_token {
            warnings.push("Ingest and query auth tokens are identical");
        }
        warnings
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub log_format: LogFormat,
    pub max_page_size: u32,
    pub ingest_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub conn_str: String,
    /// Zero or negative means unlimited
    pub disk_capacity_gb: i64,
}

/// Shared secrets for the two API entry points
#[derive(Clone)]
pub struct AuthConfig {
    pub ingest_token: String,
    pub query_token: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("ingest_token", &SensitiveToken::new(&self.ingest_token))
            .field("query_token", &SensitiveToken::new(&self.query_token))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env variable is required.")]
    Missing(&'static str),

    #[error("{0} env variable is required and must be an integer.")]
    NotAnInteger(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Environment values keyed by their lowercased, prefix-stripped names
#[derive(Debug, Default, Deserialize)]
struct EnvValues {
    db_conn_str: Option<String>,
    audit_auth_token: Option<String>,
    query_auth_token: Option<String>,
    disk_capacity_gb: Option<String>,
    ingest_filter_apiname_include: Option<String>,
    ingest_filter_apiname_exclude: Option<String>,
    listen_addr: Option<String>,
    log_format: Option<String>,
    max_page_size: Option<String>,
    ingest_timeout_secs: Option<String>,
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    build_config(None)
}

/// Load configuration from an explicit variable map instead of the process
/// environment.
pub fn load_config_from(vars: HashMap<String, String>) -> Result<Config, ConfigError> {
    build_config(Some(vars))
}

fn build_config(vars: Option<HashMap<String, String>>) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Environment::with_prefix("LOGSEARCH").source(vars.clone()))
        .add_source(config::Environment::with_prefix("MINIO_LOG").source(vars))
        .build()?;

    let env: EnvValues = settings.try_deserialize()?;
    let config = from_env_values(env)?;
    validate_config(&config)?;
    Ok(config)
}

fn from_env_values(env: EnvValues) -> Result<Config, ConfigError> {
    let conn_str = required(env.db_conn_str, DB_CONN_STR_ENV)?;
    let ingest_token = required(env.audit_auth_token, AUDIT_AUTH_TOKEN_ENV)?;
    let query_token = required(env.query_auth_token, QUERY_AUTH_TOKEN_ENV)?;

    let disk_capacity_gb = env
        .disk_capacity_gb
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or(ConfigError::NotAnInteger(DISK_CAPACITY_ENV))?;

    let listen_addr = env
        .listen_addr
        .as_deref()
        .unwrap_or(DEFAULT_LISTEN_ADDR)
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::Invalid {
            var: LISTEN_ADDR_ENV,
            reason: e.to_string(),
        })?;

    let log_format = match env.log_format.as_deref() {
        Some(raw) => raw.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
            var: LOG_FORMAT_ENV,
            reason,
        })?,
        None => LogFormat::default(),
    };

    let max_page_size = optional_positive(env.max_page_size, MAX_PAGE_SIZE_ENV)?
        .unwrap_or(u64::from(DEFAULT_MAX_PAGE_SIZE));
    let max_page_size = u32::try_from(max_page_size).map_err(|_| ConfigError::Invalid {
        var: MAX_PAGE_SIZE_ENV,
        reason: "value too large".to_string(),
    })?;

    let ingest_timeout = optional_positive(env.ingest_timeout_secs, INGEST_TIMEOUT_ENV)?
        .unwrap_or(DEFAULT_INGEST_TIMEOUT_SECS);

    let ingest_filters = IngestFilters::from_lists(
        env.ingest_filter_apiname_include.as_deref(),
        env.ingest_filter_apiname_exclude.as_deref(),
    );

    Ok(Config {
        server: ServerConfig {
            listen_addr,
            log_format,
            max_page_size,
            ingest_timeout: Duration::from_secs(ingest_timeout),
        },
        storage: StorageConfig {
            conn_str,
            disk_capacity_gb,
        },
        auth: AuthConfig {
            ingest_token,
            query_token,
        },
        ingest_filters,
    })
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn optional_positive(value: Option<String>, var: &'static str) -> Result<Option<u64>, ConfigError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ConfigError::Invalid {
                var,
                reason: format!("expected a positive integer, got {:?}", raw),
            }),
        },
    }
}

fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if !cfg.storage.conn_str.starts_with("sqlite:") {
        return Err(ConfigError::Invalid {
            var: DB_CONN_STR_ENV,
            reason: "expected a sqlite: connection URL".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            (DB_CONN_STR_ENV, "sqlite:///tmp/logsearch.db"),
            (AUDIT_AUTH_TOKEN_ENV, "ingest-secret-1234"),
            (QUERY_AUTH_TOKEN_ENV, "query-secret-5678"),
            (DISK_CAPACITY_ENV, "50"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn with(mut vars: HashMap<String, String>, key: &str, value: &str) -> HashMap<String, String> {
        vars.insert(key.to_string(), value.to_string());
        vars
    }

    fn without(mut vars: HashMap<String, String>, key: &str) -> HashMap<String, String> {
        vars.remove(key);
        vars
    }

    #[test]
    fn test_load_minimal_config() {
        let cfg = load_config_from(base_vars()).unwrap();
        assert_eq!(cfg.storage.conn_str, "sqlite:///tmp/logsearch.db");
        assert_eq!(cfg.storage.disk_capacity_gb, 50);
        assert_eq!(cfg.auth.ingest_token, "ingest-secret-1234");
        assert_eq!(cfg.auth.query_token, "query-secret-5678");
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.server.log_format, LogFormat::Text);
        assert_eq!(cfg.server.max_page_size, 1000);
        assert_eq!(cfg.server.ingest_timeout, Duration::from_secs(30));
        assert!(cfg.ingest_filters.is_empty());
    }

    #[test]
    fn test_required_variables() {
        for var in [DB_CONN_STR_ENV, AUDIT_AUTH_TOKEN_ENV, QUERY_AUTH_TOKEN_ENV] {
            let err = load_config_from(without(base_vars(), var)).unwrap_err();
            assert!(matches!(err, ConfigError::Missing(v) if v == var), "{}: {}", var, err);

            let err = load_config_from(with(base_vars(), var, "")).unwrap_err();
            assert!(matches!(err, ConfigError::Missing(_)));
        }
    }

    #[test]
    fn test_disk_capacity_must_be_integer() {
        let err = load_config_from(without(base_vars(), DISK_CAPACITY_ENV)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "LOGSEARCH_DISK_CAPACITY_GB env variable is required and must be an integer."
        );

        let err = load_config_from(with(base_vars(), DISK_CAPACITY_ENV, "lots")).unwrap_err();
        assert!(matches!(err, ConfigError::NotAnInteger(_)));

        let cfg = load_config_from(with(base_vars(), DISK_CAPACITY_ENV, "-1")).unwrap();
        assert_eq!(cfg.storage.disk_capacity_gb, -1);
    }

    #[test]
    fn test_ingest_filters_from_env() {
        let vars = with(base_vars(), API_NAME_INCLUDE_FILTER_ENV, "GetObject;Put*");
        let vars = with(vars, API_NAME_EXCLUDE_FILTER_ENV, "ListObjects");
        let cfg = load_config_from(vars).unwrap();

        assert_eq!(cfg.ingest_filters.api_name_include.len(), 2);
        assert_eq!(cfg.ingest_filters.api_name_exclude.len(), 1);
        assert!(cfg.ingest_filters.accept_api_name("PutObject"));
        assert!(!cfg.ingest_filters.accept_api_name("ListObjects"));
    }

    #[test]
    fn test_optional_server_settings() {
        let vars = with(base_vars(), LISTEN_ADDR_ENV, "127.0.0.1:9999");
        let vars = with(vars, LOG_FORMAT_ENV, "json");
        let vars = with(vars, MAX_PAGE_SIZE_ENV, "250");
        let vars = with(vars, INGEST_TIMEOUT_ENV, "5");
        let cfg = load_config_from(vars).unwrap();

        assert_eq!(cfg.server.listen_addr.port(), 9999);
        assert_eq!(cfg.server.log_format, LogFormat::Json);
        assert_eq!(cfg.server.max_page_size, 250);
        assert_eq!(cfg.server.ingest_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_optional_settings() {
        assert!(load_config_from(with(base_vars(), LISTEN_ADDR_ENV, "not-an-addr")).is_err());
        assert!(load_config_from(with(base_vars(), LOG_FORMAT_ENV, "xml")).is_err());
        assert!(load_config_from(with(base_vars(), MAX_PAGE_SIZE_ENV, "0")).is_err());
        assert!(load_config_from(with(base_vars(), INGEST_TIMEOUT_ENV, "-3")).is_err());
        assert!(load_config_from(with(base_vars(), DB_CONN_STR_ENV, "postgres://db")).is_err());
    }

    #[test]
    fn test_identical_tokens_are_a_warning() {
        let cfg = load_config_from(base_vars()).unwrap();
        assert!(cfg.warnings().is_empty());

        let vars = with(base_vars(), QUERY_AUTH_TOKEN_ENV, "ingest-secret-1234");
        let cfg = load_config_from(vars).unwrap();
        assert_eq!(cfg.warnings(), vec!["Ingest and query auth tokens are identical"]);
    }

    #[test]
    fn test_debug_masks_tokens() {
        let cfg = load_config_from(base_vars()).unwrap();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("ingest-secret-1234"));
        assert!(!debug.contains("query-secret-5678"));
        assert!(debug.contains("inge***"));
    }
}
