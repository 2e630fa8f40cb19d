//! Metric/imperial display conversion.
//!
//! Weather values are stored in canonical metric units (°C, km/h, km, mb) and
//! converted on read. Missing or non-finite inputs become
//! [`Reading::Unavailable`] rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KPH_PER_MPH: f64 = 1.60934;
const MILES_PER_KM: f64 = 0.621371;
const INHG_PER_MB: f64 = 0.02953;

/// Display unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    /// Value written to the preference store.
    pub fn as_pref_str(&self) -> &'static str {
        match self {
            Self::Metric => "celsius",
            Self::Imperial => "fahrenheit",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Self::Metric => Self::Imperial,
            Self::Imperial => Self::Metric,
        }
    }

    pub fn temp_label(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn wind_label(&self) -> &'static str {
        match self {
            Self::Metric => "km/h",
            Self::Imperial => "mph",
        }
    }

    pub fn distance_label(&self) -> &'static str {
        match self {
            Self::Metric => "km",
            Self::Imperial => "mi",
        }
    }

    pub fn pressure_label(&self) -> &'static str {
        match self {
            Self::Metric => "mb",
            Self::Imperial => "inHg",
        }
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" | "celsius" | "c" => Ok(Self::Metric),
            "imperial" | "fahrenheit" | "f" => Ok(Self::Imperial),
            other => Err(format!("unknown unit system: {}", other)),
        }
    }
}

/// A converted value ready for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    Unavailable,
}

impl Reading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// `"59°F"`, `"12 km/h"`, or `"--"` when unavailable.
    pub fn with_label(&self, label: &str) -> String {
        match self {
            Self::Value(_) if label.starts_with('°') => format!("{}{}", self, label),
            Self::Value(_) => format!("{} {}", self, label),
            Self::Unavailable => self.to_string(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Unavailable => f.write_str("--"),
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn round0(v: f64) -> f64 {
    v.round() + 0.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0 + 0.0
}

/// Temperature rounded to the nearest degree.
pub fn to_display_temp(celsius: impl Into<Option<f64>>, unit: UnitSystem) -> Reading {
    match finite(celsius.into()) {
        Some(c) => Reading::Value(round0(match unit {
            UnitSystem::Metric => c,
            UnitSystem::Imperial => c * 9.0 / 5.0 + 32.0,
        })),
        None => Reading::Unavailable,
    }
}

/// Inverse of [`to_display_temp`], unrounded.
pub fn from_display_temp(value: f64, unit: UnitSystem) -> f64 {
    match unit {
        UnitSystem::Metric => value,
        UnitSystem::Imperial => (value - 32.0) * 5.0 / 9.0,
    }
}

/// Wind speed rounded to the nearest integer.
pub fn to_display_wind(kph: impl Into<Option<f64>>, unit: UnitSystem) -> Reading {
    match finite(kph.into()) {
        Some(k) => Reading::Value(round0(match unit {
            UnitSystem::Metric => k,
            UnitSystem::Imperial => k / KPH_PER_MPH,
        })),
        None => Reading::Unavailable,
    }
}

/// Distance rounded to one decimal.
pub fn to_display_distance(km: impl Into<Option<f64>>, unit: UnitSystem) -> Reading {
    match finite(km.into()) {
        Some(d) => Reading::Value(round1(match unit {
            UnitSystem::Metric => d,
            UnitSystem::Imperial => d * MILES_PER_KM,
        })),
        None => Reading::Unavailable,
    }
}

/// Pressure rounded to the nearest integer.
pub fn to_display_pressure(mb: impl Into<Option<f64>>, unit: UnitSystem) -> Reading {
    match finite(mb.into()) {
        Some(p) => Reading::Value(round0(match unit {
            UnitSystem::Metric => p,
            UnitSystem::Imperial => p * INHG_PER_MB,
        })),
        None => Reading::Unavailable,
    }
}
