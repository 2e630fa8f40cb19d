use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key used for IP-resolved lookups before the backend names the place.
pub const IP_LOOKUP_KEY: &str = "auto:ip";

/// Decimal places kept when keying a session by coordinates.
const COORDINATE_PRECISION: f64 = 10_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Rounded to the session key precision; `-0.0` collapses to `0.0`.
    pub fn rounded(&self) -> Self {
        let round = |v: f64| (v * COORDINATE_PRECISION).round() / COORDINATE_PRECISION + 0.0;
        Self {
            lat: round(self.lat),
            lon: round(self.lon),
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.rounded();
        write!(f, "{:.4},{:.4}", r.lat, r.lon)
    }
}

/// Normalized identifier of a weather session.
///
/// Lowercased, trimmed city name or `"lat,lon"` at four decimals. Cache keys
/// are built from it, so session identity and cache identity coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn for_city(city: &str) -> Self {
        Self(city.trim().to_lowercase())
    }

    pub fn for_coordinates(coords: Coordinates) -> Self {
        Self(coords.to_string())
    }

    pub fn ip() -> Self {
        Self(IP_LOOKUP_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ip(&self) -> bool {
        self.0 == IP_LOOKUP_KEY
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a location is addressed when talking to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    City(String),
    Coordinates(Coordinates),
    /// Let the backend resolve the caller's IP address.
    Ip,
}

impl LocationQuery {
    pub fn city(name: impl Into<String>) -> Self {
        Self::City(name.into())
    }

    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Self::Coordinates(Coordinates::new(lat, lon))
    }

    pub fn key(&self) -> LocationKey {
        match self {
            Self::City(name) => LocationKey::for_city(name),
            Self::Coordinates(c) => LocationKey::for_coordinates(*c),
            Self::Ip => LocationKey::ip(),
        }
    }

    /// Value for endpoints that only take a `city` parameter.
    pub fn as_city_param(&self) -> String {
        match self {
            Self::City(name) => name.trim().to_string(),
            Self::Coordinates(c) => c.to_string(),
            Self::Ip => IP_LOOKUP_KEY.to_string(),
        }
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(name) => write!(f, "{}", name.trim()),
            Self::Coordinates(c) => write!(f, "{}", c),
            Self::Ip => f.write_str("current IP location"),
        }
    }
}

/// Resolved place returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    pub country: String,
    /// Wall-clock time at the location when the response was produced
    pub local_time: Option<NaiveDateTime>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Location {
    pub fn key(&self) -> LocationKey {
        LocationKey::for_city(&self.name)
    }

    /// "Name, Region, Country" with empty parts skipped.
    pub fn display_name(&self) -> String {
        [&self.name, &self.region, &self.country]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Textual condition with an icon reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    /// Icon URL as sent by the backend, possibly protocol-relative
    pub icon: String,
    pub code: Option<i32>,
}

impl Condition {
    /// Icon URL with protocol-relative references resolved to https.
    pub fn icon_url(&self) -> String {
        normalize_icon_url(&self.icon)
    }
}

pub fn normalize_icon_url(icon: &str) -> String {
    if icon.starts_with("//") {
        format!("https:{}", icon)
    } else {
        icon.to_string()
    }
}

/// Air quality readings attached to current conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    /// US EPA index, 1 (good) to 6 (hazardous)
    pub us_epa_index: Option<u8>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
}

impl AirQuality {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Current weather conditions in canonical metric units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub last_updated: Option<NaiveDateTime>,
    pub temp_c: f64,
    pub feelslike_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_dir: Option<String>,
    pub uv: Option<f64>,
    pub visibility_km: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub condition: Condition,
    pub air_quality: Option<AirQuality>,
}

/// Daily aggregate shared by forecast and history days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub avg_temp_c: Option<f64>,
    pub condition: Condition,
    pub chance_of_rain: Option<f64>,
    pub max_wind_kph: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub uv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Astro {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub moon_phase: Option<String>,
}

/// Hourly forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyConditions {
    pub time: NaiveDateTime,
    pub temp_c: f64,
    pub feelslike_c: Option<f64>,
    pub condition: Condition,
    pub wind_kph: Option<f64>,
    pub humidity: Option<f64>,
    pub chance_of_rain: Option<f64>,
}

/// Daily forecast entry with its hourly breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub summary: DaySummary,
    pub astro: Option<Astro>,
    pub hourly: Vec<HourlyConditions>,
}

/// A past day; kept in the order the backend sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub summary: DaySummary,
}

/// Response of the current-weather endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location: Location,
    pub current: CurrentConditions,
}

/// Response of the forecast endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub location: Location,
    pub days: Vec<ForecastDay>,
}

/// Response of the history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub location: Location,
    pub days: Vec<HistoryDay>,
}
