//! Display derivation.
//!
//! Builds a [`DashboardView`] from the session snapshot and presentation
//! state. Everything unit-dependent is recomputed from canonical metric
//! values on every call.

use chrono::{NaiveDate, NaiveDateTime};
use nimbus_weather::units::{
    to_display_distance, to_display_pressure, to_display_temp, to_display_wind,
};
use nimbus_weather::{
    AirQuality, CurrentConditions, DaySummary, ForecastDay, HistoryDay, Reading, UnitSystem,
};

use crate::orchestrator::SessionSnapshot;
use crate::presentation::{PresentationState, Theme};
use crate::session::{ErrorDescriptor, LoadStatus, Tab, WeatherSession};

const FORECAST_CARDS: usize = 5;
const HOURLY_SLOTS: usize = 12;
const UNAVAILABLE: &str = "--";

/// Visual class derived from the condition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionClass {
    Sunny,
    Cloudy,
    Rainy,
    Snowy,
    Stormy,
}

impl ConditionClass {
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["sun", "clear"]) {
            Self::Sunny
        } else if has(&["cloud", "overcast"]) {
            Self::Cloudy
        } else if has(&["rain", "drizzle"]) {
            Self::Rainy
        } else if has(&["snow", "blizzard"]) {
            Self::Snowy
        } else if has(&["thunder", "storm"]) {
            Self::Stormy
        } else {
            Self::Cloudy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
            Self::Snowy => "snowy",
            Self::Stormy => "stormy",
        }
    }
}

/// How pleasant the current conditions feel, 0-100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comfort {
    pub description: String,
    pub level: u8,
}

impl Comfort {
    /// Temperature sets the base; humidity and wind prepend qualifiers.
    pub fn assess(temp_c: f64, humidity: Option<f64>, wind_kph: Option<f64>) -> Self {
        let (mut description, mut level): (String, u8) = if temp_c < 10.0 {
            ("very cold".into(), 15)
        } else if temp_c < 18.0 {
            ("cold".into(), 30)
        } else if temp_c > 30.0 {
            ("very hot".into(), 20)
        } else if temp_c > 26.0 {
            ("warm".into(), 35)
        } else {
            ("comfortable".into(), 50)
        };

        match humidity {
            Some(h) if h > 70.0 => {
                description = format!("humid and {}", description);
                level = level.saturating_sub(15).max(10);
            }
            Some(h) if h < 30.0 => {
                description = format!("dry and {}", description);
                level = level.saturating_sub(10).max(15);
            }
            _ => {}
        }

        if wind_kph.is_some_and(|w| w > 30.0) {
            description = format!("windy and {}", description);
            level = level.saturating_sub(10).max(10);
        }

        Self { description, level }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentView {
    pub location_name: String,
    pub location_details: String,
    pub local_time: String,
    pub temperature: Reading,
    pub feels_like: Reading,
    pub temp_unit: &'static str,
    pub condition: String,
    pub icon_url: String,
    pub condition_class: ConditionClass,
    pub humidity: String,
    pub wind: String,
    pub wind_direction: String,
    pub uv_index: String,
    pub visibility: String,
    pub pressure: String,
    pub air_quality: String,
    pub comfort: Comfort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastCard {
    pub day_name: String,
    pub date: String,
    pub icon_url: String,
    pub condition: String,
    pub high: Reading,
    pub low: Reading,
    pub chance_of_rain: String,
    pub max_wind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyCard {
    pub time: String,
    pub icon_url: String,
    pub condition: String,
    pub temperature: Reading,
    pub chance_of_rain: String,
    pub wind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCard {
    pub day_name: String,
    pub date: String,
    pub icon_url: String,
    pub condition: String,
    pub condition_class: ConditionClass,
    pub high: Reading,
    pub low: Reading,
    pub precipitation: String,
    pub max_wind: String,
    pub humidity: String,
    pub uv_index: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstroView {
    pub sunrise: String,
    pub sunset: String,
    pub moon_phase: String,
}

impl Default for AstroView {
    fn default() -> Self {
        Self {
            sunrise: UNAVAILABLE.to_string(),
            sunset: UNAVAILABLE.to_string(),
            moon_phase: UNAVAILABLE.to_string(),
        }
    }
}

/// A section that is fetched separately from current conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    /// Not requested yet, or still loading.
    Pending,
    /// The fetch failed; render a placeholder with this message.
    Unavailable(String),
    Ready(T),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(v) => Some(v),
            _ => None,
        }
    }
}

/// Everything a renderer needs to paint one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub status: LoadStatus,
    pub unit: UnitSystem,
    pub theme: Theme,
    pub active_tab: Tab,
    pub current: Option<CurrentView>,
    pub hourly: Vec<HourlyCard>,
    pub forecast: Section<Vec<ForecastCard>>,
    pub history: Section<Vec<HistoryCard>>,
    pub astro: AstroView,
    pub error: Option<ErrorDescriptor>,
}

impl DashboardView {
    pub fn build(snapshot: &SessionSnapshot, presentation: &PresentationState) -> Self {
        let unit = presentation.unit;
        let session = snapshot.session.as_deref();

        Self {
            status: snapshot.status,
            unit,
            theme: presentation.theme,
            active_tab: snapshot.active_tab,
            current: session.map(|s| current_view(s, unit)),
            hourly: session.map(|s| hourly_cards(s, unit)).unwrap_or_default(),
            forecast: session.map_or(Section::Pending, |s| forecast_section(s, unit)),
            history: session.map_or(Section::Pending, |s| history_section(s, unit)),
            astro: session.map(astro_view).unwrap_or_default(),
            error: snapshot.error.clone(),
        }
    }
}

fn or_unavailable(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNAVAILABLE.to_string())
}

fn percent(value: Option<f64>) -> String {
    or_unavailable(
        value
            .filter(|v| v.is_finite())
            .map(|v| format!("{}%", v.round())),
    )
}

fn uv(value: Option<f64>) -> String {
    or_unavailable(value.filter(|v| v.is_finite() && *v > 0.0).map(|v| v.to_string()))
}

fn air_quality(aq: Option<&AirQuality>) -> String {
    or_unavailable(aq.and_then(|a| a.us_epa_index).map(|i| i.to_string()))
}

fn today(session: &WeatherSession) -> NaiveDate {
    session
        .location
        .local_time
        .map(|t| t.date())
        .unwrap_or_else(|| chrono::Local::now().date_naive())
}

/// "Today", "Tomorrow", or the full weekday name.
pub fn day_name(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.succ_opt() {
        "Tomorrow".to_string()
    } else {
        date.format("%A").to_string()
    }
}

fn short_date(date: NaiveDate) -> String {
    date.format("%a, %b %-d").to_string()
}

fn current_view(session: &WeatherSession, unit: UnitSystem) -> CurrentView {
    let location = &session.location;
    let current: &CurrentConditions = &session.current;

    let details = [location.region.as_str(), location.country.as_str()]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");

    CurrentView {
        location_name: location.name.clone(),
        location_details: details,
        local_time: or_unavailable(
            location
                .local_time
                .map(|t| t.format("%a, %b %-d %H:%M").to_string()),
        ),
        temperature: to_display_temp(current.temp_c, unit),
        feels_like: to_display_temp(current.feelslike_c, unit),
        temp_unit: unit.temp_label(),
        condition: current.condition.text.clone(),
        icon_url: current.condition.icon_url(),
        condition_class: ConditionClass::from_text(&current.condition.text),
        humidity: percent(current.humidity),
        wind: to_display_wind(current.wind_kph, unit).with_label(unit.wind_label()),
        wind_direction: or_unavailable(current.wind_dir.clone()),
        uv_index: uv(current.uv),
        visibility: to_display_distance(current.visibility_km, unit)
            .with_label(unit.distance_label()),
        pressure: to_display_pressure(current.pressure_mb, unit)
            .with_label(unit.pressure_label()),
        air_quality: air_quality(current.air_quality.as_ref()),
        comfort: Comfort::assess(current.temp_c, current.humidity, current.wind_kph),
    }
}

fn forecast_card(day: &ForecastDay, today: NaiveDate, unit: UnitSystem) -> ForecastCard {
    let summary: &DaySummary = &day.summary;
    ForecastCard {
        day_name: day_name(day.date, today),
        date: short_date(day.date),
        icon_url: summary.condition.icon_url(),
        condition: summary.condition.text.clone(),
        high: to_display_temp(summary.max_temp_c, unit),
        low: to_display_temp(summary.min_temp_c, unit),
        chance_of_rain: percent(summary.chance_of_rain),
        max_wind: to_display_wind(summary.max_wind_kph, unit).with_label(unit.wind_label()),
    }
}

fn forecast_section(session: &WeatherSession, unit: UnitSystem) -> Section<Vec<ForecastCard>> {
    match (&session.forecast, &session.forecast_error) {
        (Some(days), _) => {
            let today = today(session);
            Section::Ready(
                days.iter()
                    .take(FORECAST_CARDS)
                    .map(|d| forecast_card(d, today, unit))
                    .collect(),
            )
        }
        (None, Some(e)) => Section::Unavailable(e.user_message().to_string()),
        (None, None) => Section::Pending,
    }
}

/// Next twelve hourly entries, starting with the one covering the
/// location's current time.
fn hourly_cards(session: &WeatherSession, unit: UnitSystem) -> Vec<HourlyCard> {
    let Some(days) = &session.forecast else {
        return Vec::new();
    };

    let now: NaiveDateTime = session
        .location
        .local_time
        .unwrap_or_else(|| chrono::Local::now().naive_local());

    let entries: Vec<_> = days.iter().flat_map(|d| d.hourly.iter()).collect();
    let start = entries.iter().rposition(|h| h.time <= now).unwrap_or(0);

    entries
        .into_iter()
        .skip(start)
        .take(HOURLY_SLOTS)
        .map(|h| HourlyCard {
            time: h.time.format("%H:%M").to_string(),
            icon_url: h.condition.icon_url(),
            condition: h.condition.text.clone(),
            temperature: to_display_temp(h.temp_c, unit),
            chance_of_rain: percent(h.chance_of_rain),
            wind: to_display_wind(h.wind_kph, unit).with_label(unit.wind_label()),
        })
        .collect()
}

fn history_card(day: &HistoryDay, today: NaiveDate, unit: UnitSystem) -> HistoryCard {
    let summary = &day.summary;
    HistoryCard {
        day_name: day_name(day.date, today),
        date: short_date(day.date),
        icon_url: summary.condition.icon_url(),
        condition: summary.condition.text.clone(),
        condition_class: ConditionClass::from_text(&summary.condition.text),
        high: to_display_temp(summary.max_temp_c, unit),
        low: to_display_temp(summary.min_temp_c, unit),
        precipitation: or_unavailable(
            summary
                .total_precip_mm
                .filter(|p| p.is_finite())
                .map(|p| format!("{} mm", p)),
        ),
        max_wind: to_display_wind(summary.max_wind_kph, unit).with_label(unit.wind_label()),
        humidity: percent(summary.avg_humidity),
        uv_index: uv(summary.uv),
    }
}

fn history_section(session: &WeatherSession, unit: UnitSystem) -> Section<Vec<HistoryCard>> {
    match (&session.history, &session.history_error) {
        (Some(days), _) => {
            let today = today(session);
            Section::Ready(days.iter().map(|d| history_card(d, today, unit)).collect())
        }
        (None, Some(e)) => Section::Unavailable(e.user_message().to_string()),
        (None, None) => Section::Pending,
    }
}

fn astro_view(session: &WeatherSession) -> AstroView {
    let astro = session
        .forecast
        .as_ref()
        .and_then(|days| days.first())
        .and_then(|d| d.astro.as_ref());

    match astro {
        Some(a) => AstroView {
            sunrise: or_unavailable(a.sunrise.clone()),
            sunset: or_unavailable(a.sunset.clone()),
            moon_phase: or_unavailable(a.moon_phase.clone()),
        },
        None => AstroView::default(),
    }
}
