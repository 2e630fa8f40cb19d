//! The weather session aggregate and the small state types around it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nimbus_weather::{
    Coordinates, CurrentConditions, CurrentWeather, FetchError, FetchErrorKind, Forecast,
    ForecastDay, History, HistoryDay, Location, LocationKey, LocationQuery,
};
use serde::{Deserialize, Serialize};

/// Dashboard tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Current,
    Forecast,
    History,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
            Self::History => "history",
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Self::Current),
            "forecast" => Ok(Self::Forecast),
            "history" => Ok(Self::History),
            other => Err(format!("unknown tab: {}", other)),
        }
    }
}

/// Load state machine.
///
/// `Idle -> Loading -> {PartiallyLoaded, Loaded, Failed}`; any settled state
/// may go back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    /// Current weather is present; a sub-resource failed or is still missing.
    PartiallyLoaded,
    /// Current weather and everything the active tab needs are present.
    Loaded,
    /// Current weather failed. The previous session, if any, is kept.
    Failed,
}

impl LoadStatus {
    /// True once current weather has been applied.
    pub fn has_data(self) -> bool {
        matches!(self, LoadStatus::PartiallyLoaded | LoadStatus::Loaded)
    }

    /// State after a load was issued.
    pub fn on_start(self) -> Self {
        LoadStatus::Loading
    }

    /// State after the current-weather call failed.
    pub fn on_current_failed(self) -> Self {
        LoadStatus::Failed
    }

    /// State for a session that was just (re)applied.
    ///
    /// `eager` means every sub-resource was requested, so any gap counts.
    pub fn settle(session: &WeatherSession, active_tab: Tab, eager: bool) -> Self {
        let missing_requested = eager && (session.forecast.is_none() || session.history.is_none());
        if session.has_field_failure() || missing_requested || !session.has(active_tab) {
            LoadStatus::PartiallyLoaded
        } else {
            LoadStatus::Loaded
        }
    }
}

/// A user intent, kept so a failed operation can be re-issued verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadIntent {
    City(String),
    Coordinates(Coordinates),
    Ip,
    /// Geolocation, then IP, then the default city.
    CurrentLocation,
    Refresh,
}

impl fmt::Display for LoadIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(city) => write!(f, "search '{}'", city),
            Self::Coordinates(c) => write!(f, "coordinates {}", c),
            Self::Ip => f.write_str("IP location"),
            Self::CurrentLocation => f.write_str("current location"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Surfaced when current weather fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDescriptor {
    pub kind: FetchErrorKind,
    pub message: String,
    pub retryable: bool,
    /// Intent re-issued by `WeatherOrchestrator::retry`.
    pub intent: LoadIntent,
}

impl ErrorDescriptor {
    pub fn new(error: &FetchError, intent: LoadIntent) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message().to_string(),
            retryable: error.is_retryable(),
            intent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient toast message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Everything known about the displayed location.
///
/// `current` is mandatory; `forecast` and `history` fill in independently and
/// each records its own failure.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSession {
    pub key: LocationKey,
    /// Query that reloads this session (IP sessions reload by resolved name).
    pub query: LocationQuery,
    pub location: Location,
    pub current: CurrentConditions,
    pub current_fetched_at: DateTime<Utc>,
    pub forecast: Option<Vec<ForecastDay>>,
    pub forecast_fetched_at: Option<DateTime<Utc>>,
    pub forecast_error: Option<FetchError>,
    pub history: Option<Vec<HistoryDay>>,
    pub history_fetched_at: Option<DateTime<Utc>>,
    pub history_error: Option<FetchError>,
}

impl WeatherSession {
    pub fn new(
        key: LocationKey,
        query: LocationQuery,
        weather: CurrentWeather,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            query,
            location: weather.location,
            current: weather.current,
            current_fetched_at: fetched_at,
            forecast: None,
            forecast_fetched_at: None,
            forecast_error: None,
            history: None,
            history_fetched_at: None,
            history_error: None,
        }
    }

    /// Whether the data `tab` shows is present.
    pub fn has(&self, tab: Tab) -> bool {
        match tab {
            Tab::Current => true,
            Tab::Forecast => self.forecast.is_some(),
            Tab::History => self.history.is_some(),
        }
    }

    pub fn has_field_failure(&self) -> bool {
        self.forecast_error.is_some() || self.history_error.is_some()
    }

    pub fn apply_forecast(&mut self, result: Result<(Forecast, DateTime<Utc>), FetchError>) {
        match result {
            Ok((forecast, fetched_at)) => {
                self.forecast = Some(forecast.days);
                self.forecast_fetched_at = Some(fetched_at);
                self.forecast_error = None;
            }
            Err(e) => {
                self.forecast = None;
                self.forecast_fetched_at = None;
                self.forecast_error = Some(e);
            }
        }
    }

    pub fn apply_history(&mut self, result: Result<(History, DateTime<Utc>), FetchError>) {
        match result {
            Ok((history, fetched_at)) => {
                self.history = Some(history.days);
                self.history_fetched_at = Some(fetched_at);
                self.history_error = None;
            }
            Err(e) => {
                self.history = None;
                self.history_fetched_at = None;
                self.history_error = Some(e);
            }
        }
    }
}
