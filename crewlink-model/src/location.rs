use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::JobId;

/// Who produced a location sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmitterRole {
    Contractor,
    Worker,
}

impl EmitterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmitterRole::Contractor => "contractor",
            EmitterRole::Worker => "worker",
        }
    }
}

impl Display for EmitterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmitterRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contractor" => Ok(EmitterRole::Contractor),
            "worker" => Ok(EmitterRole::Worker),
            other => Err(ModelError::UnknownVariant {
                kind: "emitter role",
                value: other.to_string(),
            }),
        }
    }
}

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> crate::error::Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ModelError::InvalidCoordinate(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ModelError::InvalidCoordinate(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Most recent position reported for a job. Only one is retained per job.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationSample {
    pub job_id: JobId,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
    pub emitter_role: EmitterRole,
}

/// Operations a scoped location token may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum LocationCapability {
    StartTravel,
    EndTravel,
    UpdateLocation,
}

impl LocationCapability {
    pub const WORKER_DEFAULT: [LocationCapability; 3] = [
        LocationCapability::StartTravel,
        LocationCapability::EndTravel,
        LocationCapability::UpdateLocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationCapability::StartTravel => "start-travel",
            LocationCapability::EndTravel => "end-travel",
            LocationCapability::UpdateLocation => "update-location",
        }
    }
}

impl Display for LocationCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationCapability {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationCapability::WORKER_DEFAULT
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "location capability",
                value: s.to_string(),
            })
    }
}

/// Snapshot of a job's travel session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TravelStatus {
    pub job_id: JobId,
    pub active: bool,
    pub emitter_role: Option<EmitterRole>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sample: Option<LocationSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_out_of_range_values() {
        assert!(Coordinates::new(12.9, 77.6).is_ok());
        assert!(Coordinates::new(90.0, -180.0).is_ok());
        assert!(Coordinates::new(90.5, 0.0).is_err());
        assert!(Coordinates::new(0.0, 181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn capabilities_parse_from_wire_names() {
        assert_eq!(
            "update-location".parse::<LocationCapability>().unwrap(),
            LocationCapability::UpdateLocation
        );
        assert!("teleport".parse::<LocationCapability>().is_err());
    }
}
