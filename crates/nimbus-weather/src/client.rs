//! HTTP client for the weather backend.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::FetchError;
use crate::types::*;
use crate::wire::{ApiCurrentResponse, ApiErrorBody, ApiForecastResponse, ApiHistoryResponse};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend caps on `days`.
pub const MAX_FORECAST_DAYS: u8 = 10;
pub const MAX_HISTORY_DAYS: u8 = 7;

/// Weather backend operations used by the dashboard.
///
/// Implemented by [`WeatherClient`]; tests substitute their own.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn fetch_current_by_city(&self, city: &str) -> Result<CurrentWeather, FetchError>;

    async fn fetch_current_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<CurrentWeather, FetchError>;

    async fn fetch_current_by_ip(&self) -> Result<CurrentWeather, FetchError>;

    async fn fetch_forecast(&self, query: &LocationQuery, days: u8)
        -> Result<Forecast, FetchError>;

    async fn fetch_history(&self, query: &LocationQuery, days: u8) -> Result<History, FetchError>;

    /// Dispatches to the current-weather call matching `query`.
    async fn fetch_current(&self, query: &LocationQuery) -> Result<CurrentWeather, FetchError> {
        match query {
            LocationQuery::City(city) => self.fetch_current_by_city(city).await,
            LocationQuery::Coordinates(c) => self.fetch_current_by_coordinates(c.lat, c.lon).await,
            LocationQuery::Ip => self.fetch_current_by_ip().await,
        }
    }
}

/// Stateless client; caching is the caller's concern.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl WeatherClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn validate_city(city: &str) -> Result<&str, FetchError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(FetchError::NotFound("City name is empty".to_string()));
        }
        Ok(city)
    }

    fn validate_coordinates(lat: f64, lon: f64) -> Result<Coordinates, FetchError> {
        let coords = Coordinates::new(lat, lon);
        if !coords.is_finite() {
            return Err(FetchError::NotFound(format!("Invalid coordinates: {}, {}", lat, lon)));
        }
        Ok(coords)
    }

    /// Query parameters addressing `query` on endpoints that accept coordinates.
    fn location_params(query: &LocationQuery) -> Result<Vec<(&'static str, String)>, FetchError> {
        match query {
            LocationQuery::City(city) => Ok(vec![("city", Self::validate_city(city)?.to_string())]),
            LocationQuery::Coordinates(c) => {
                let c = Self::validate_coordinates(c.lat, c.lon)?;
                Ok(vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())])
            }
            LocationQuery::Ip => Ok(vec![("city", IP_LOOKUP_KEY.to_string())]),
        }
    }

    fn build_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }

    /// GET `path` and decode the body, bounded by the request timeout.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.build_url(path, params);
        tracing::debug!("GET {}", url);

        let request = async {
            let response = self.client.get(&url).send().await?;
            self.handle_response(response).await
        };

        tokio::time::timeout(self.timeout, request).await?
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, FetchError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(ApiErrorBody::detail)
            .or_else(|| (!text.is_empty()).then_some(text));

        let err = FetchError::from_status(status.as_u16(), retry_after, detail);
        tracing::warn!("Weather backend returned {}: {}", status, err);
        Err(err)
    }
}

#[async_trait]
impl WeatherApi for WeatherClient {
    #[instrument(skip(self), level = "info")]
    async fn fetch_current_by_city(&self, city: &str) -> Result<CurrentWeather, FetchError> {
        let city = Self::validate_city(city)?;
        let resp: ApiCurrentResponse = self
            .get_json("/weather/current", &[("city", city.to_string())])
            .await?;
        Ok(resp.into_domain())
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_current_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<CurrentWeather, FetchError> {
        let c = Self::validate_coordinates(lat, lon)?;
        let resp: ApiCurrentResponse = self
            .get_json(
                "/weather/coordinates",
                &[("lat", c.lat.to_string()), ("lon", c.lon.to_string())],
            )
            .await?;
        Ok(resp.into_domain())
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_current_by_ip(&self) -> Result<CurrentWeather, FetchError> {
        let resp: ApiCurrentResponse = self.get_json("/weather/location", &[]).await?;
        Ok(resp.into_domain())
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        days: u8,
    ) -> Result<Forecast, FetchError> {
        let mut params = Self::location_params(query)?;
        params.push(("days", days.clamp(1, MAX_FORECAST_DAYS).to_string()));

        let resp: ApiForecastResponse = self.get_json("/weather/forecast", &params).await?;
        resp.into_domain()
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_history(&self, query: &LocationQuery, days: u8) -> Result<History, FetchError> {
        // History only takes `city`; coordinates travel as "lat,lon".
        let city = match query {
            LocationQuery::City(city) => Self::validate_city(city)?.to_string(),
            LocationQuery::Coordinates(c) => {
                Self::validate_coordinates(c.lat, c.lon)?;
                query.as_city_param()
            }
            LocationQuery::Ip => query.as_city_param(),
        };

        let params = [
            ("city", city),
            ("days", days.clamp(1, MAX_HISTORY_DAYS).to_string()),
        ];
        let resp: ApiHistoryResponse = self.get_json("/weather/history", &params).await?;
        Ok(resp.into_domain())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::error::FetchErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn london_current() -> serde_json::Value {
        serde_json::json!({
            "location": {
                "name": "London",
                "region": "City of London, Greater London",
                "country": "United Kingdom",
                "localtime": "2024-01-15 14:30"
            },
            "current": {
                "temp_c": 15.0,
                "feelslike_c": 13.2,
                "condition": {"text": "Partly cloudy", "icon": "//cdn.weatherapi.com/weather/64x64/day/116.png", "code": 1003},
                "humidity": 70,
                "wind_kph": 14.4,
                "wind_dir": "WSW",
                "uv": 3.0
            },
            "air_quality": {"us-epa-index": 1}
        })
    }

    #[tokio::test]
    async fn test_fetch_current_by_city() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .and(query_param("city", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let weather = client.fetch_current_by_city("  London ").await.unwrap();

        assert_eq!(weather.location.name, "London");
        assert_eq!(weather.current.temp_c, 15.0);
        assert_eq!(weather.current.humidity, Some(70.0));
        assert!(weather.current.visibility_km.is_none());
        assert_eq!(weather.current.air_quality.unwrap().us_epa_index, Some(1));
    }

    #[tokio::test]
    async fn test_not_found_carries_detail() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"detail": "City not found"})),
            )
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let err = client.fetch_current_by_city("Atlantis").await.unwrap_err();

        assert_eq!(err, FetchError::NotFound("City not found".to_string()));
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let err = client.fetch_current_by_city("London").await.unwrap_err();

        assert_eq!(err, FetchError::RateLimited { retry_after: Some(30) });
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let err = client.fetch_current_by_city("London").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(london_current())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = WeatherClient::with_timeout(&mock_server.uri(), Duration::from_millis(50));
        let err = client.fetch_current_by_city("London").await.unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/current"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let err = client.fetch_current_by_city("London").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_network_unavailable() {
        // Nothing listens on port 1.
        let client = WeatherClient::with_timeout("http://127.0.0.1:1", Duration::from_secs(5));
        let err = client.fetch_current_by_city("London").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::NetworkUnavailable);
    }

    #[tokio::test]
    async fn test_invalid_input_never_hits_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        assert_eq!(
            client.fetch_current_by_city("   ").await.unwrap_err().kind(),
            FetchErrorKind::NotFound
        );
        assert_eq!(
            client
                .fetch_current_by_coordinates(f64::NAN, 0.0)
                .await
                .unwrap_err()
                .kind(),
            FetchErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_forecast_days_are_clamped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather/forecast"))
            .and(query_param("city", "Oslo"))
            .and(query_param("days", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": {"name": "Oslo", "region": "", "country": "Norway"},
                "forecast": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = WeatherClient::new(&mock_server.uri());
        let forecast = client
            .fetch_forecast(&LocationQuery::city("Oslo"), 14)
            .await
            .unwrap();
        assert!(forecast.days.is_empty());
    }
}
