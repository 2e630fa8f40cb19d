use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "NIMBUS_API_URL";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Backend API settings
    pub api: ApiConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Weather loading behaviour
    #[serde(default)]
    pub weather: WeatherConfig,

    /// UI hints
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the weather backend (no trailing path)
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached responses, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// City loaded when no location can be determined
    #[serde(default = "default_city")]
    pub default_city: String,

    /// Days requested from the forecast endpoint
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u8,

    /// Past days requested from the history endpoint
    #[serde(default = "default_history_days")]
    pub history_days: u8,

    /// Fetch current, forecast and history up front instead of on tab switch
    #[serde(default = "default_eager_fetch")]
    pub eager_fetch: bool,

    /// How long to wait for device geolocation before falling back
    #[serde(default = "default_geolocation_timeout_secs")]
    pub geolocation_timeout_secs: u64,

    /// Age after which the displayed data is refreshed on return
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            default_city: default_city(),
            forecast_days: default_forecast_days(),
            history_days: default_history_days(),
            eager_fetch: default_eager_fetch(),
            geolocation_timeout_secs: default_geolocation_timeout_secs(),
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// System colour-scheme hint used when no theme was saved
    #[serde(default)]
    pub prefer_dark: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_city() -> String {
    "London".to_string()
}

fn default_forecast_days() -> u8 {
    5
}

fn default_history_days() -> u8 {
    3
}

fn default_eager_fetch() -> bool {
    true
}

fn default_geolocation_timeout_secs() -> u64 {
    10
}

fn default_stale_after_minutes() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            api: ApiConfig {
                base_url: default_base_url(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            cache: CacheConfig::default(),
            weather: WeatherConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating a default file if missing
    ///
    /// `NIMBUS_API_URL` applies to the returned value only; it never reaches disk.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    fn with_api_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            tracing::debug!("Overriding api.base_url from {}", API_URL_ENV);
            self.api.base_url = url;
        }
        self
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api.base_url, "api.base_url", &mut result);

        if self.api.request_timeout_secs == 0 {
            result.add_error("api.request_timeout_secs", "Request timeout must be greater than 0");
        } else if self.api.request_timeout_secs > 120 {
            result.add_warning(
                "api.request_timeout_secs",
                "Request timeout is unusually long (>120s)",
            );
        }

        if self.cache.ttl_secs == 0 {
            result.add_warning("cache.ttl_secs", "Response caching disabled (0 seconds)");
        }

        if self.weather.default_city.trim().is_empty() {
            result.add_error("weather.default_city", "Default city cannot be empty");
        }

        if !(1..=10).contains(&self.weather.forecast_days) {
            result.add_error("weather.forecast_days", "Forecast days must be between 1 and 10");
        }

        if !(1..=7).contains(&self.weather.history_days) {
            result.add_error("weather.history_days", "History days must be between 1 and 7");
        }

        if self.weather.geolocation_timeout_secs == 0 {
            result.add_warning(
                "weather.geolocation_timeout_secs",
                "Geolocation disabled (0 seconds); IP lookup will be used",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.weather.geolocation_timeout_secs)
    }

    /// Path of the preference file kept next to the config
    pub fn preferences_path(&self) -> PathBuf {
        self.config_dir.join("preferences.json")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
