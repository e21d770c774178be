//! Persisted park flag and park position of a mount.
//!
//! The mount itself forgets whether it was parked when it loses power, so the
//! driver keeps this record on disk and consults it on the next connect.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Park record for one device.
///
/// Axis values are in degrees: azimuth/altitude for alt-az and Synscan
/// mounts, the same pair interpreted as the park target for equatorial ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkState {
    /// Whether the mount was left parked
    pub parked: bool,
    /// Park position, first axis (azimuth), degrees
    pub axis1_deg: f64,
    /// Park position, second axis (altitude), degrees
    pub axis2_deg: f64,
    /// Timestamp of the last update (Unix epoch seconds)
    pub timestamp: u64,
}

impl ParkState {
    pub fn new(parked: bool, axis1_deg: f64, axis2_deg: f64) -> Self {
        Self {
            parked,
            axis1_deg,
            axis2_deg,
            timestamp: unix_seconds(),
        }
    }

    /// Copy of this record with a new park flag and a fresh timestamp.
    pub fn with_parked(&self, parked: bool) -> Self {
        Self::new(parked, self.axis1_deg, self.axis2_deg)
    }

    /// Copy of this record with a new park position and a fresh timestamp.
    pub fn with_position(&self, axis1_deg: f64, axis2_deg: f64) -> Self {
        Self::new(self.parked, axis1_deg, axis2_deg)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_with_parked_keeps_position() {
        let state = ParkState::new(false, 359.0, 40.5);
        let parked = state.with_parked(true);
        assert!(parked.parked);
        assert_relative_eq!(parked.axis1_deg, 359.0);
        assert_relative_eq!(parked.axis2_deg, 40.5);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("park.json");

        let state = ParkState::new(true, 12.25, -3.5);
        state.save_to_file(&path).unwrap();
        let loaded = ParkState::load_from_file(&path).unwrap();

        assert_eq!(loaded, state);
    }

    #[test]
    fn test_load_garbage_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("park.json");
        std::fs::write(&path, "not json").unwrap();

        let err = ParkState::load_from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
