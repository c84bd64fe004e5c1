//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default OAuth scopes requested from Slack.
fn default_slack_scopes() -> String {
    "chat:write,chat:write.customize,channels:read,groups:read,files:write".to_string()
}

/// Default upstream events endpoint.
fn default_events_url() -> String {
    "https://pepito-api.onrender.com/api/v1/events".to_string()
}

/// Default address for the installation front end.
fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

/// Default database endpoint (persists on local disk).
fn default_db_endpoint() -> String {
    "surrealkv://data/installations".to_string()
}

fn default_db_namespace() -> String {
    "pepito".to_string()
}

fn default_db_database() -> String {
    "bot".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_stream_idle_timeout_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_oauth_state_expiration_secs() -> u64 {
    600
}

fn default_image_filename() -> String {
    "pepito_image.jpg".to_string()
}

/// Configuration for the pepito-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    /// The shared configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The configuration values, as loaded from the environment and config file.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app client ID (`SLACK_CLIENT_ID`).
    pub slack_client_id: String,
    /// Slack app client secret (`SLACK_CLIENT_SECRET`).
    pub slack_client_secret: String,
    /// Comma separated bot scopes requested during installation (`SLACK_SCOPES`).
    #[serde(default = "default_slack_scopes")]
    pub slack_scopes: String,
    /// OAuth redirect URI, when it differs from the one registered with the app (`SLACK_REDIRECT_URI`).
    #[serde(default)]
    pub slack_redirect_uri: Option<String>,
    /// Slack Web API base URL, when not talking to `https://slack.com/api` (`SLACK_API_URL`).
    #[serde(default)]
    pub slack_api_url: Option<String>,
    /// Upstream server-sent events endpoint (`EVENTS_URL`).
    #[serde(default = "default_events_url")]
    pub events_url: String,
    /// Address the installation front end listens on (`LISTEN_ADDRESS`).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `mem://`, `surrealkv://path` or `ws://host:port`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Database root username, for remote endpoints (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database root password, for remote endpoints (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Timeout for establishing connections (`CONNECT_TIMEOUT_SECS`).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum silence on the event stream before it is considered dead, `0` disables (`STREAM_IDLE_TIMEOUT_SECS`).
    /// The upstream sends heartbeats, so a healthy stream is never silent for long.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Timeout for image downloads and Slack API calls (`HTTP_TIMEOUT_SECS`).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Consecutive reconnect attempts after the stream fails, `0` lets the session die (`RECONNECT_MAX_ATTEMPTS`).
    #[serde(default)]
    pub reconnect_max_attempts: u32,
    /// First reconnect delay, doubled on every attempt (`RECONNECT_BASE_DELAY_MS`).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the reconnect delay (`RECONNECT_MAX_DELAY_MS`).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// How long an OAuth state stays valid (`OAUTH_STATE_EXPIRATION_SECS`).
    #[serde(default = "default_oauth_state_expiration_secs")]
    pub oauth_state_expiration_secs: u64,
    /// File name given to uploaded images (`IMAGE_FILENAME`).
    #[serde(default = "default_image_filename")]
    pub image_filename: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_client_id: String::new(),
            slack_client_secret: String::new(),
            slack_scopes: default_slack_scopes(),
            slack_redirect_uri: None,
            slack_api_url: None,
            events_url: default_events_url(),
            listen_address: default_listen_address(),
            db_endpoint: default_db_endpoint(),
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            db_username: None,
            db_password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            reconnect_max_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            oauth_state_expiration_secs: default_oauth_state_expiration_secs(),
            image_filename: default_image_filename(),
        }
    }
}

impl ConfigInner {
    /// Timeout for establishing connections.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Idle timeout for the event stream, if enabled.
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_secs > 0).then(|| Duration::from_secs(self.stream_idle_timeout_secs))
    }

    /// Timeout for image downloads and Slack API calls.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// How long an OAuth state stays valid.
    pub fn oauth_state_expiration(&self) -> Duration {
        Duration::from_secs(self.oauth_state_expiration_secs)
    }

    /// The bot scopes, split and trimmed.
    pub fn scopes(&self) -> Vec<&str> {
        self.slack_scopes.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }

    /// Check the values that `serde` cannot.
    pub fn validate(&self) -> Res<()> {
        let events_url = reqwest::Url::parse(&self.events_url).map_err(|e| anyhow::anyhow!("Events URL is invalid: {}.", e))?;

        if !matches!(events_url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("Events URL must use http or https."));
        }

        if let Some(redirect_uri) = &self.slack_redirect_uri {
            reqwest::Url::parse(redirect_uri).map_err(|e| anyhow::anyhow!("Slack redirect URI is invalid: {}.", e))?;
        }

        if let Some(api_url) = &self.slack_api_url {
            let api_url = reqwest::Url::parse(api_url).map_err(|e| anyhow::anyhow!("Slack API URL is invalid: {}.", e))?;

            if !matches!(api_url.scheme(), "http" | "https") {
                return Err(anyhow::anyhow!("Slack API URL must use http or https."));
            }
        }

        if self.connect_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be greater than 0."));
        }

        if self.http_timeout_secs == 0 {
            return Err(anyhow::anyhow!("HTTP timeout must be greater than 0."));
        }

        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(anyhow::anyhow!("Reconnect base delay must not exceed the max delay."));
        }

        if self.oauth_state_expiration_secs == 0 {
            return Err(anyhow::anyhow!("OAuth state expiration must be greater than 0."));
        }

        Ok(())
    }
}

impl Config {
    /// Load the configuration from the environment, overlaid by `explicit_path`
    /// or `.hidden/config.toml` if present, and validate it.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("PEPITO_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

// Tests.
