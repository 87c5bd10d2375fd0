//! Location provider seam

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::permission::Permission;

/// A position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::Invalid(format!("{latitude},{longitude}")));
        }
        Ok(Self { latitude, longitude })
    }

    /// Link to the position on a public map
    pub fn map_url(&self) -> String {
        format!(
            "https://maps.google.com/maps?q={},{}",
            self.latitude, self.longitude
        )
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Parses `"lat,lon"`
impl FromStr for Coordinates {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LocationError::Invalid(s.to_string());
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
        let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;
        Self::new(latitude, longitude)
    }
}

/// Errors from a location request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid coordinates: {0}")]
    Invalid(String),
}

/// Platform positioning service
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> Permission;

    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Provider answering a configured position, or nothing
#[derive(Debug, Clone, Default)]
pub struct FixedLocation {
    position: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        self.position
            .ok_or_else(|| LocationError::Unavailable("no position configured".to_string()))
    }
}
