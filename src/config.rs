//! Service configuration read from `.env` and the process environment.

use crate::client::ClientConfig;
use crate::oauth::{OAuthConfig, DEFAULT_AUTH_SERVER_URL};
use axum::http::Uri;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:3000";
/// Time API queried by the `get-time` worker unless `TIME_API_URL` is set.
pub const DEFAULT_TIME_API_URL: &str = "https://json-api.joshwulf.com/time";
const DEFAULT_PROCESS_FILE: &str = "test-process.bpmn";
const DEFAULT_START_CONCURRENCY: usize = 32;

/// Errors raised while loading the configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The `.env` file could not be found or read.
    #[error("could not load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
    /// A required variable is not set.
    #[error("{0} is not set")]
    Missing(&'static str),
    /// A variable is set but its value cannot be used.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        /// Name of the variable
        name: &'static str,
        /// The rejected value
        value: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Everything the service needs to start.
#[derive(Clone, Debug)]
pub struct Config {
    /// Gateway URI, always carrying a scheme
    pub zeebe_address: String,
    /// OAuth client credentials, when configured
    pub oauth: Option<OAuthConfig>,
    /// Address the HTTP listener binds to
    pub http_address: SocketAddr,
    /// URL of the time API
    pub time_api_url: String,
    /// Bound on a time API request, none by default
    pub time_api_timeout: Option<Duration>,
    /// Path of the process definition deployed at startup
    pub process_file: String,
    /// Upper bound on concurrent `/start` calls
    pub start_concurrency: usize,
    /// How long the gateway waits for a started instance, zero for its default
    pub start_request_timeout: Duration,
}

impl Config {
    /// Load `.env` into the environment and read the configuration from it.
    ///
    /// A missing `.env` file is an error, variables already present in the
    /// environment take precedence over the file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = dotenvy::dotenv()?;
        tracing::debug!(path = %path.display(), "loaded .env file");

        Config::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], reading the variables file at `path`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        dotenvy::from_path(path)?;
        tracing::debug!(path = %path.display(), "loaded .env file");

        Config::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let insecure = match var("ZEEBE_INSECURE_CONNECTION") {
            Some(value) => parse_bool("ZEEBE_INSECURE_CONNECTION", &value)?,
            None => false,
        };
        let address = var("ZEEBE_ADDRESS").ok_or(ConfigError::Missing("ZEEBE_ADDRESS"))?;
        let zeebe_address = gateway_uri(address.trim(), insecure);

        let oauth = match (var("ZEEBE_CLIENT_ID"), var("ZEEBE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => {
                let audience = var("ZEEBE_TOKEN_AUDIENCE")
                    .unwrap_or_else(|| gateway_host(&zeebe_address));
                let auth_url = var("ZEEBE_AUTHORIZATION_SERVER_URL")
                    .unwrap_or_else(|| DEFAULT_AUTH_SERVER_URL.to_string());
                Some(
                    OAuthConfig::new(client_id, client_secret, audience)
                        .with_authorization_server_url(auth_url),
                )
            }
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ZEEBE_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("ZEEBE_CLIENT_ID")),
        };

        let http_address = parse_or("HTTP_ADDRESS", var("HTTP_ADDRESS"), DEFAULT_HTTP_ADDRESS)?;
        let start_concurrency = match var("START_CONCURRENCY") {
            Some(value) => parse("START_CONCURRENCY", &value)?,
            None => DEFAULT_START_CONCURRENCY,
        };
        if start_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "START_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let start_request_timeout = match var("START_REQUEST_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(parse("START_REQUEST_TIMEOUT_MS", &value)?),
            None => Duration::ZERO,
        };
        let time_api_timeout = match var("TIME_API_TIMEOUT_MS") {
            Some(value) => Some(Duration::from_millis(parse("TIME_API_TIMEOUT_MS", &value)?)),
            None => None,
        }
        .filter(|timeout| !timeout.is_zero());

        Ok(Config {
            zeebe_address,
            oauth,
            http_address,
            time_api_url: var("TIME_API_URL").unwrap_or_else(|| DEFAULT_TIME_API_URL.to_string()),
            time_api_timeout,
            process_file: var("PROCESS_FILE").unwrap_or_else(|| DEFAULT_PROCESS_FILE.to_string()),
            start_concurrency,
            start_request_timeout,
        })
    }

    /// The broker client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::with_endpoint(self.zeebe_address.clone());
        match &self.oauth {
            Some(oauth) => config.with_auth(oauth.clone()),
            None => config,
        }
    }
}

fn gateway_uri(address: &str, insecure: bool) -> String {
    if address.contains("://") {
        address.to_string()
    } else if insecure {
        format!("http://{}", address)
    } else {
        format!("https://{}", address)
    }
}

/// Host part of the gateway URI, falling back to the whole URI when it does
/// not parse.
fn gateway_host(uri: &str) -> String {
    uri.parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(|host| host.to_string()))
        .unwrap_or_else(|| uri.to_string())
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse(name, value.as_deref().unwrap_or(default))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
