//! Scripted weather backend shared by the dashboard integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nimbus_weather::{
    Condition, CurrentConditions, CurrentWeather, DaySummary, FetchError, Forecast, ForecastDay,
    History, HistoryDay, Location, LocationQuery, WeatherApi,
};
use parking_lot::Mutex;

/// Every call sleeps at least this long so concurrent callers overlap.
const BASE_DELAY: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct MockApi {
    pub current_calls: AtomicUsize,
    pub forecast_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    /// Lowercased city name -> (display name, temperature, humidity)
    cities: Mutex<HashMap<String, (String, f64, f64)>>,
    delays: Mutex<HashMap<String, Duration>>,
    coordinates_city: Mutex<Option<String>>,
    ip_city: Mutex<Option<String>>,
    /// Location key -> failure for current weather at that location.
    current_errors: Mutex<HashMap<String, FetchError>>,
    forecast_error: Mutex<Option<FetchError>>,
    history_error: Mutex<Option<FetchError>>,
    /// Extra latency for history requests only.
    history_delay: Mutex<Duration>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(self, name: &str, temp_c: f64, humidity: f64) -> Self {
        self.add_city(name, temp_c, humidity);
        self
    }

    pub fn add_city(&self, name: &str, temp_c: f64, humidity: f64) {
        self.cities
            .lock()
            .insert(name.to_lowercase(), (name.to_string(), temp_c, humidity));
    }

    /// Extra latency for requests addressed by `key` (lowercased city,
    /// `"lat,lon"` or `"auto:ip"`).
    pub fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().insert(key.to_lowercase(), delay);
        self
    }

    /// Coordinates resolve to this known city.
    pub fn with_coordinates_city(self, name: &str) -> Self {
        *self.coordinates_city.lock() = Some(name.to_string());
        self
    }

    /// IP lookups resolve to this known city.
    pub fn with_ip_city(self, name: &str) -> Self {
        *self.ip_city.lock() = Some(name.to_string());
        self
    }

    /// Current weather for `key` fails with `error`.
    pub fn with_current_error(self, key: &str, error: FetchError) -> Self {
        self.current_errors.lock().insert(key.to_lowercase(), error);
        self
    }

    pub fn with_history_delay(self, delay: Duration) -> Self {
        *self.history_delay.lock() = delay;
        self
    }

    pub fn with_forecast_error(self, error: FetchError) -> Self {
        *self.forecast_error.lock() = Some(error);
        self
    }

    pub fn with_history_error(self, error: FetchError) -> Self {
        *self.history_error.lock() = Some(error);
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.current_calls.load(Ordering::SeqCst),
            self.forecast_calls.load(Ordering::SeqCst),
            self.history_calls.load(Ordering::SeqCst),
        )
    }

    async fn pause(&self, key: &str) {
        let extra = self
            .delays
            .lock()
            .get(&key.to_lowercase())
            .copied()
            .unwrap_or_default();
        tokio::time::sleep(BASE_DELAY + extra).await;
    }

    fn resolve(&self, query: &LocationQuery) -> Result<Location, FetchError> {
        let name = match query {
            LocationQuery::City(city) => Some(city.trim().to_string()),
            LocationQuery::Coordinates(_) => self.coordinates_city.lock().clone(),
            LocationQuery::Ip => self.ip_city.lock().clone(),
        };
        let not_found = || FetchError::NotFound("City not found".to_string());
        let name = name.ok_or_else(not_found)?;
        let cities = self.cities.lock();
        let (display, _, _) = cities.get(&name.to_lowercase()).ok_or_else(not_found)?;
        Ok(location(display))
    }

    fn current_for(&self, query: &LocationQuery) -> Result<CurrentWeather, FetchError> {
        if let Some(e) = self.current_errors.lock().get(query.key().as_str()) {
            return Err(e.clone());
        }
        let location = self.resolve(query)?;
        let (_, temp_c, humidity) = self.cities.lock()[&location.name.to_lowercase()].clone();
        Ok(current_weather(location, temp_c, humidity))
    }
}

#[async_trait]
impl WeatherApi for MockApi {
    async fn fetch_current_by_city(&self, city: &str) -> Result<CurrentWeather, FetchError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let query = LocationQuery::city(city);
        self.pause(query.key().as_str()).await;
        self.current_for(&query)
    }

    async fn fetch_current_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<CurrentWeather, FetchError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let query = LocationQuery::coordinates(lat, lon);
        self.pause(query.key().as_str()).await;
        self.current_for(&query)
    }

    async fn fetch_current_by_ip(&self) -> Result<CurrentWeather, FetchError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let query = LocationQuery::Ip;
        self.pause(query.key().as_str()).await;
        self.current_for(&query).map_err(|e| match e {
            FetchError::NotFound(_) => FetchError::NetworkUnavailable("ip lookup failed".into()),
            other => other,
        })
    }

    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        days: u8,
    ) -> Result<Forecast, FetchError> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(query.key().as_str()).await;
        if let Some(e) = self.forecast_error.lock().clone() {
            return Err(e);
        }
        let location = self.resolve(query)?;
        Ok(Forecast {
            location,
            days: (0..days).map(|i| forecast_day(date(20 + u32::from(i)))).collect(),
        })
    }

    async fn fetch_history(&self, query: &LocationQuery, days: u8) -> Result<History, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(query.key().as_str()).await;
        let extra = *self.history_delay.lock();
        tokio::time::sleep(extra).await;
        if let Some(e) = self.history_error.lock().clone() {
            return Err(e);
        }
        let location = self.resolve(query)?;
        Ok(History {
            location,
            days: (1..=days)
                .map(|i| HistoryDay {
                    date: date(20 - u32::from(i)),
                    summary: summary("Cloudy"),
                })
                .collect(),
        })
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

pub fn location(name: &str) -> Location {
    Location {
        name: name.to_string(),
        region: String::new(),
        country: "Testland".to_string(),
        local_time: date(20).and_hms_opt(12, 0, 0),
        lat: None,
        lon: None,
    }
}

pub fn condition(text: &str) -> Condition {
    Condition {
        text: text.to_string(),
        icon: "//cdn.example.com/icon.png".to_string(),
        code: None,
    }
}

pub fn current_weather(location: Location, temp_c: f64, humidity: f64) -> CurrentWeather {
    CurrentWeather {
        location,
        current: CurrentConditions {
            last_updated: None,
            temp_c,
            feelslike_c: Some(temp_c),
            humidity: Some(humidity),
            wind_kph: Some(10.0),
            wind_dir: Some("W".to_string()),
            uv: Some(3.0),
            visibility_km: Some(10.0),
            pressure_mb: Some(1015.0),
            condition: condition("Partly cloudy"),
            air_quality: None,
        },
    }
}

pub fn summary(text: &str) -> DaySummary {
    DaySummary {
        max_temp_c: 20.0,
        min_temp_c: 10.0,
        avg_temp_c: Some(15.0),
        condition: condition(text),
        chance_of_rain: Some(30.0),
        max_wind_kph: Some(20.0),
        total_precip_mm: Some(1.2),
        avg_humidity: Some(65.0),
        uv: Some(4.0),
    }
}

pub fn forecast_day(date: NaiveDate) -> ForecastDay {
    ForecastDay {
        date,
        summary: summary("Sunny"),
        astro: None,
        hourly: Vec::new(),
    }
}
