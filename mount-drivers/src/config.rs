//! Connection and site configuration for one mount.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sky_math::ObserverLocation;

use crate::codec::MountFamily;
use crate::transport::DEFAULT_TIMEOUT;

/// How to reach the mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial { port: String, baud: u32 },
    Tcp { address: String },
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Name the park record is stored under
    pub device_name: String,
    pub family: MountFamily,
    pub transport: TransportConfig,
    /// Status poll period in milliseconds
    pub poll_period_ms: u64,
    /// Per-reply read timeout in milliseconds
    pub read_timeout_ms: u64,
    pub location: ObserverLocation,
    /// Local offset east of Greenwich in hours
    pub utc_offset_hours: f64,
    /// Run against the built-in protocol simulator
    pub simulate: bool,
    /// Treat the iOptron mount as this `:MountInfo#` code
    pub ieq_model_override: Option<String>,
    /// Synscan custom slew rates per axis in arcsec/s
    pub custom_rates_arcsec: [f64; 2],
    /// Initial slew rate index
    pub slew_rate_index: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            device_name: "mount".to_string(),
            family: MountFamily::Synscan,
            transport: TransportConfig::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud: MountFamily::Synscan.default_baud(),
            },
            poll_period_ms: 1000,
            read_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            location: ObserverLocation::default(),
            utc_offset_hours: 0.0,
            simulate: false,
            ieq_model_override: None,
            custom_rates_arcsec: [15.0, 15.0],
            slew_rate_index: 8,
        }
    }
}

impl MountConfig {
    /// Defaults for `family`, including its serial baud rate.
    pub fn for_family(family: MountFamily) -> Self {
        let mut config = Self {
            family,
            ..Self::default()
        };
        if let TransportConfig::Serial { baud, .. } = &mut config.transport {
            *baud = family.default_baud();
        }
        config
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
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
