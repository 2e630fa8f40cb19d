//! Backend JSON shapes and their conversion into the domain model.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::FetchError;
use crate::types::*;

#[derive(Debug, Deserialize)]
pub(crate) struct ApiLocation {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    localtime: Option<String>,
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "longitude")]
    lon: Option<f64>,
}

impl From<ApiLocation> for Location {
    fn from(api: ApiLocation) -> Self {
        Self {
            name: api.name,
            region: api.region,
            country: api.country,
            local_time: api.localtime.as_deref().and_then(parse_local_datetime),
            lat: api.lat,
            lon: api.lon,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiCondition {
    #[serde(default)]
    text: String,
    #[serde(default)]
    icon: String,
    code: Option<i32>,
}

impl From<ApiCondition> for Condition {
    fn from(api: ApiCondition) -> Self {
        Self {
            text: api.text,
            icon: api.icon,
            code: api.code,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiAirQuality {
    #[serde(alias = "us-epa-index")]
    us_epa_index: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    o3: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
}

impl ApiAirQuality {
    fn into_domain(self) -> Option<AirQuality> {
        let aq = AirQuality {
            us_epa_index: self
                .us_epa_index
                .filter(|i| i.is_finite() && (1.0..=6.0).contains(i))
                .map(|i| i.round() as u8),
            pm2_5: self.pm2_5,
            pm10: self.pm10,
            o3: self.o3,
            no2: self.no2,
            co: self.co,
        };
        (!aq.is_empty()).then_some(aq)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCurrent {
    last_updated: Option<String>,
    temp_c: f64,
    feelslike_c: Option<f64>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    wind_dir: Option<String>,
    uv: Option<f64>,
    #[serde(alias = "vis_km")]
    visibility_km: Option<f64>,
    pressure_mb: Option<f64>,
    #[serde(default)]
    condition: ApiCondition,
    air_quality: Option<ApiAirQuality>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
    air_quality: Option<ApiAirQuality>,
}

impl ApiCurrentResponse {
    pub(crate) fn into_domain(self) -> CurrentWeather {
        let current = self.current;
        // Nested placement wins when both are present.
        let air_quality = current
            .air_quality
            .and_then(ApiAirQuality::into_domain)
            .or_else(|| self.air_quality.and_then(ApiAirQuality::into_domain));

        CurrentWeather {
            location: self.location.into(),
            current: CurrentConditions {
                last_updated: current.last_updated.as_deref().and_then(parse_local_datetime),
                temp_c: current.temp_c,
                feelslike_c: current.feelslike_c,
                humidity: current.humidity,
                wind_kph: current.wind_kph,
                wind_dir: current.wind_dir,
                uv: current.uv,
                visibility_km: current.visibility_km,
                pressure_mb: current.pressure_mb,
                condition: current.condition.into(),
                air_quality,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    avgtemp_c: Option<f64>,
    #[serde(default)]
    condition: ApiCondition,
    #[serde(alias = "chance_of_rain")]
    daily_chance_of_rain: Option<f64>,
    maxwind_kph: Option<f64>,
    totalprecip_mm: Option<f64>,
    avghumidity: Option<f64>,
    uv: Option<f64>,
}

impl From<ApiDay> for DaySummary {
    fn from(api: ApiDay) -> Self {
        Self {
            max_temp_c: api.maxtemp_c,
            min_temp_c: api.mintemp_c,
            avg_temp_c: api.avgtemp_c,
            condition: api.condition.into(),
            chance_of_rain: api.daily_chance_of_rain,
            max_wind_kph: api.maxwind_kph,
            total_precip_mm: api.totalprecip_mm,
            avg_humidity: api.avghumidity,
            uv: api.uv,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiAstro {
    sunrise: Option<String>,
    sunset: Option<String>,
    moon_phase: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiHour {
    time: String,
    temp_c: f64,
    feelslike_c: Option<f64>,
    #[serde(default)]
    condition: ApiCondition,
    wind_kph: Option<f64>,
    humidity: Option<f64>,
    chance_of_rain: Option<f64>,
}

impl ApiHour {
    fn into_domain(self) -> Result<HourlyConditions, FetchError> {
        let time = parse_local_datetime(&self.time).ok_or_else(|| {
            FetchError::MalformedResponse(format!("invalid hourly time: {}", self.time))
        })?;

        Ok(HourlyConditions {
            time,
            temp_c: self.temp_c,
            feelslike_c: self.feelslike_c,
            condition: self.condition.into(),
            wind_kph: self.wind_kph,
            humidity: self.humidity,
            chance_of_rain: self.chance_of_rain,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiForecastDay {
    date: NaiveDate,
    day: ApiDay,
    astro: Option<ApiAstro>,
    #[serde(default, alias = "hourly")]
    hour: Vec<ApiHour>,
}

/// The backend sends a bare list; the upstream provider nests it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ApiForecastDays {
    List(Vec<ApiForecastDay>),
    Nested { forecastday: Vec<ApiForecastDay> },
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiForecastResponse {
    location: ApiLocation,
    forecast: ApiForecastDays,
}

impl ApiForecastResponse {
    pub(crate) fn into_domain(self) -> Result<Forecast, FetchError> {
        let days = match self.forecast {
            ApiForecastDays::List(days) => days,
            ApiForecastDays::Nested { forecastday } => forecastday,
        };

        let days = days
            .into_iter()
            .map(|d| {
                Ok(ForecastDay {
                    date: d.date,
                    summary: d.day.into(),
                    astro: d.astro.map(|a| Astro {
                        sunrise: a.sunrise,
                        sunset: a.sunset,
                        moon_phase: a.moon_phase,
                    }),
                    hourly: d
                        .hour
                        .into_iter()
                        .map(ApiHour::into_domain)
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        Ok(Forecast {
            location: self.location.into(),
            days,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiHistoryDay {
    date: NaiveDate,
    day: ApiDay,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiHistoryResponse {
    location: ApiLocation,
    #[serde(default)]
    history: Vec<ApiHistoryDay>,
}

impl ApiHistoryResponse {
    pub(crate) fn into_domain(self) -> History {
        History {
            location: self.location.into(),
            days: self
                .history
                .into_iter()
                .map(|d| HistoryDay {
                    date: d.date,
                    summary: d.day.into(),
                })
                .collect(),
        }
    }
}

/// Error body of non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub(crate) fn detail(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

/// Parses the backend's local timestamps ("2024-01-15 14:00", hour may be unpadded).
pub(crate) fn parse_local_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
