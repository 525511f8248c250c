use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

/// Why the config on disk couldn't be used as-is.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("could not write default config to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("could not serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub irrops: IrropsConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>, // Exact Origin header values
    pub allow_localhost: bool,        // Also accept http://localhost[:port]
    pub irrops_rate_limit: u32,       // Requests per IP per minute
    pub schedule_rate_limit: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub operator_iata: String, // Only this carrier's flights are kept
    pub page_size: u32,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub throttle_backoff_ms: u64, // After 429/403
    pub error_backoff_ms: u64,    // After any other failure
    pub min_request_interval_ms: u64, // 0 disables spacing
    pub inter_page_delay_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub code: String,
    pub timezone: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IrropsConfig {
    pub default_timezone: String, // Used for hubs with no or an invalid zone
    pub max_pages: u32,
    pub inter_hub_delay_ms: u64,
    pub result_ttl_secs: u64,
    pub hub_cache_max_age_secs: u64,
    pub hubs: Vec<HubConfig>, // Fetched in this order
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub max_pages: u32,
    pub cache_capacity: usize,
    pub live_ttl_secs: u64,
    pub archive_ttl_secs: u64, // Days that started more than 24h ago
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            allowed_origins: vec!["https://theblueboard.co".to_string()],
            allow_localhost: true,
            irrops_rate_limit: 60,
            schedule_rate_limit: 60,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.flightradar24.com".to_string(),
            operator_iata: "UA".to_string(),
            page_size: 100,
            request_timeout_ms: 8_000,
            retries: 1,
            throttle_backoff_ms: 1_500,
            error_backoff_ms: 1_000,
            min_request_interval_ms: 0,
            inter_page_delay_ms: 800,
        }
    }
}

impl Default for IrropsConfig {
    fn default() -> Self {
        let hubs = [
            ("ORD", "America/Chicago"),
            ("DEN", "America/Denver"),
            ("IAH", "America/Chicago"),
            ("EWR", "America/New_York"),
            ("SFO", "America/Los_Angeles"),
            ("IAD", "America/New_York"),
            ("LAX", "America/Los_Angeles"),
            ("NRT", "Asia/Tokyo"),
            ("GUM", "Pacific/Guam"),
        ]
        .into_iter()
        .map(|(code, timezone)| HubConfig {
            code: code.to_string(),
            timezone: timezone.to_string(),
        })
        .collect();

        Self {
            default_timezone: "America/New_York".to_string(),
            max_pages: 5,
            inter_hub_delay_ms: 1_500,
            result_ttl_secs: 15 * 60,
            hub_cache_max_age_secs: 60 * 60,
            hubs,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_pages: 20,
            cache_capacity: 200,
            live_ttl_secs: 5 * 60,
            archive_ttl_secs: 10 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_name: "irrops.log".to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl IrropsConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn hub_cache_max_age(&self) -> Duration {
        Duration::from_secs(self.hub_cache_max_age_secs)
    }
}

impl Config {
    /// Path from `IRROPS_CONFIG`, falling back to `config.toml` in the working directory.
    pub fn path() -> String {
        std::env::var("IRROPS_CONFIG").unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Loads the config file at `path`.
    /// If it doesn't exist, writes the defaults there.
    ///
    /// Runs before logging is set up, so a problem that made it fall back to
    /// defaults is handed back for the caller to report.
    pub fn load(path: &str) -> (Self, Option<ConfigError>) {
        if let Ok(content) = fs::read_to_string(path) {
            return match toml::from_str(&content) {
                Ok(config) => (config, None),
                Err(source) => (
                    Config::default(),
                    Some(ConfigError::Parse {
                        path: path.to_string(),
                        source,
                    }),
                ),
            };
        }

        let default_config = Config::default();

        // Save default config to disk for the operator to edit later
        let problem = match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => fs::write(path, toml_string)
                .err()
                .map(|source| ConfigError::Write {
                    path: path.to_string(),
                    source,
                }),
            Err(e) => Some(ConfigError::Serialize(e)),
        };

        (default_config, problem)
    }
}
