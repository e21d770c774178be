//! Configuration storage for mount drivers.
//!
//! Provides centralized storage for saved mount configurations and the
//! per-device park record. All files live in ~/.mount_config/ by default:
//!
//! ```text
//! ~/.mount_config/
//!   mounts/<name>.json     saved connection/site configuration
//!   park/<device>.json     park flag and park position
//! ```

use crate::park_state::ParkState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration storage manager for mount drivers.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.mount_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.mount_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".mount_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    // =========================================================================
    // Park state
    // =========================================================================

    fn park_dir(&self) -> PathBuf {
        self.root_path.join("park")
    }

    /// Park file for a device. Device names are free text from the user, so
    /// anything outside `[A-Za-z0-9_.]` becomes `_`.
    fn park_state_path(&self, device: &str) -> PathBuf {
        self.park_dir()
            .join(format!("{}.json", sanitize_file_stem(device)))
    }

    /// Get the park record for a device.
    ///
    /// Returns None if the device has never been parked or had a park
    /// position saved. Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_park_state(&self, device: &str) -> Option<Result<ParkState, std::io::Error>> {
        let path = self.park_state_path(device);

        if !path.exists() {
            return None;
        }

        Some(ParkState::load_from_file(&path))
    }

    /// Save the park record for a device.
    ///
    /// Creates the park directory if it doesn't exist.
    /// Returns the path where the record was saved.
    pub fn save_park_state(&self, device: &str, state: &ParkState) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(self.park_dir())?;

        let path = self.park_state_path(device);
        state.save_to_file(&path)?;
        debug!("Saved park state for {device} to {}", path.display());
        Ok(path)
    }

    /// Delete the park record for a device.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_park_state(&self, device: &str) -> std::io::Result<bool> {
        let path = self.park_state_path(device);

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(path)?;
        Ok(true)
    }

    // =========================================================================
    // Mount configurations
    // =========================================================================

    fn mounts_dir(&self) -> PathBuf {
        self.root_path.join("mounts")
    }

    fn mount_config_path(&self, name: &str) -> PathBuf {
        self.mounts_dir()
            .join(format!("{}.json", sanitize_file_stem(name)))
    }

    /// Get a saved mount configuration by name.
    ///
    /// Returns None if no configuration with that name exists.
    /// Returns Some(Err) if the file exists but cannot be parsed.
    pub fn get_mount_config<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Option<Result<T, std::io::Error>> {
        let path = self.mount_config_path(name);

        if !path.exists() {
            return None;
        }

        Some(load_json(&path))
    }

    /// Save a mount configuration under a name.
    pub fn save_mount_config<T: Serialize>(
        &self,
        name: &str,
        config: &T,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(self.mounts_dir())?;

        let path = self.mount_config_path(name);
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// List the names of all saved mount configurations.
    pub fn list_mount_configs(&self) -> std::io::Result<Vec<String>> {
        let dir = self.mounts_dir();

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".mount_config")))
    }
}

fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, std::io::Error> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde::Deserialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn create_test_storage() -> ConfigStorage {
        let temp_dir = std::env::temp_dir().join(format!(
            "mount_config_test_{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        ConfigStorage::with_path(temp_dir)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Site {
        port: String,
        latitude: f64,
    }

    #[test]
    fn test_park_state_path_sanitized() {
        let storage = create_test_storage();
        let path = storage.park_state_path("EQMod Mount/1");
        assert!(path.to_str().unwrap().contains("park"));
        assert!(path.to_str().unwrap().ends_with("EQMod_Mount_1.json"));
    }

    #[test]
    fn test_save_and_load_park_state() {
        let storage = create_test_storage();

        let state = ParkState::new(true, 359.0, 51.5);
        let path = storage.save_park_state("Synscan", &state).unwrap();
        assert!(path.exists());

        let loaded = storage
            .get_park_state("Synscan")
            .expect("Park state should exist")
            .expect("Park state should load successfully");

        assert!(loaded.parked);
        assert_relative_eq!(loaded.axis1_deg, 359.0, epsilon = 1e-10);
        assert_relative_eq!(loaded.axis2_deg, 51.5, epsilon = 1e-10);

        std::fs::remove_dir_all(storage.root_path()).ok();
    }

    #[test]
    fn test_get_nonexistent_park_state() {
        let storage = create_test_storage();
        assert!(storage.get_park_state("Nothing").is_none());
    }

    #[test]
    fn test_delete_park_state() {
        let storage = create_test_storage();

        storage
            .save_park_state("iEQ", &ParkState::new(false, 0.0, 90.0))
            .unwrap();
        assert!(storage.get_park_state("iEQ").is_some());

        assert!(storage.delete_park_state("iEQ").unwrap());
        assert!(storage.get_park_state("iEQ").is_none());
        assert!(!storage.delete_park_state("iEQ").unwrap());

        std::fs::remove_dir_all(storage.root_path()).ok();
    }

    #[test]
    fn test_save_load_and_list_mount_configs() {
        let storage = create_test_storage();

        let site = Site {
            port: "/dev/ttyUSB0".to_string(),
            latitude: -31.25,
        };
        storage.save_mount_config("observatory", &site).unwrap();
        storage.save_mount_config("backyard", &site).unwrap();

        let loaded: Site = storage
            .get_mount_config("observatory")
            .expect("Config should exist")
            .expect("Config should parse");
        assert_eq!(loaded, site);

        let names = storage.list_mount_configs().unwrap();
        assert_eq!(names, vec!["backyard".to_string(), "observatory".to_string()]);

        std::fs::remove_dir_all(storage.root_path()).ok();
    }

    #[test]
    fn test_list_mount_configs_empty() {
        let storage = create_test_storage();
        assert!(storage.list_mount_configs().unwrap().is_empty());
    }
}
