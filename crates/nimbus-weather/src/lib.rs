//! Weather data layer for Nimbus
//!
//! Provides the canonical weather model, metric/imperial display conversion,
//! a time-boxed response cache and the HTTP client for the weather backend.

pub mod cache;
pub mod client;
pub mod error;
pub mod location;
pub mod types;
pub mod units;
mod wire;

pub use cache::{TimeBoxedCache, DEFAULT_TTL};
pub use client::{WeatherApi, WeatherClient};
pub use error::{FetchError, FetchErrorKind};
pub use location::{FixedGeolocation, GeolocationProvider, LocationError, UnavailableGeolocation};
pub use types::*;
pub use units::{Reading, UnitSystem};
