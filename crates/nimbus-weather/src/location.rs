//! Device geolocation seam.
//!
//! The host supplies a [`GeolocationProvider`]; failures here are never fatal
//! because callers fall back to IP lookup and then the default city.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::Coordinates;

/// Location service errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

/// Single-shot source of the device position.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;

    /// Like [`current_position`](Self::current_position) but bounded by `timeout`.
    async fn position_within(&self, timeout: Duration) -> Result<Coordinates, LocationError> {
        match tokio::time::timeout(timeout, self.current_position()).await {
            Ok(Ok(coords)) if coords.is_finite() => Ok(coords),
            Ok(Ok(coords)) => Err(LocationError::Other(format!(
                "provider returned invalid coordinates {}, {}",
                coords.lat, coords.lon
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LocationError::Timeout),
        }
    }
}

/// Provider for hosts without a location service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGeolocation;

#[async_trait]
impl GeolocationProvider for UnavailableGeolocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::ServiceUnavailable)
    }
}

/// Provider that always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocation(pub Coordinates);

impl FixedGeolocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self(Coordinates::new(lat, lon))
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}
