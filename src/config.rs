use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RipitError};
use crate::slots::SlotLayout;

// Default values for optional configuration entries
fn default_not_mounted_code() -> i32 {
    1
}

fn default_cassette_size() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Print commands instead of running them
    #[serde(default)]
    pub dry_run: bool,
    pub carousel: CarouselConfig,
    pub drives: DrivesConfig,
    pub slots: SlotsConfig,
    pub extractor: ExtractorConfig,
    pub mount: MountConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselConfig {
    /// Path to the changer control binary (e.g., mtx)
    pub binary_path: String,
    /// SCSI generic device of the changer
    pub device: String,
    /// stderr marker reported when the source element holds nothing
    pub empty_marker: String,
    /// stderr marker reported when the destination element is occupied
    pub full_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivesConfig {
    /// Block device of each drive, indexed by drive number
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// First slot of the input bank
    pub input_first: u32,
    /// Last slot of the input bank
    pub input_last: u32,
    /// First slot of the output bank; the bank is as large as the input bank
    pub output_first: u32,
    /// First slot of the error bank
    pub error_first: u32,
    /// Last slot of the error bank
    pub error_last: u32,
    /// Number of consecutive slots in one cassette
    #[serde(default = "default_cassette_size")]
    pub cassette_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the extraction binary (e.g., dvdbackup)
    pub binary_path: String,
    /// Directory receiving mirrored discs
    pub output_dir: PathBuf,
    /// Exit code meaning the disc title collides with an earlier extraction
    pub name_collision_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Path to the mount probe binary (e.g., findmnt)
    pub probe_binary: String,
    /// Arguments placed before the drive device path
    pub probe_args: Vec<String>,
    /// Exit code of the probe when nothing is mounted from the device
    #[serde(default = "default_not_mounted_code")]
    pub not_mounted_code: i32,
    /// Seconds between mount probes
    pub poll_interval_secs: u64,
    /// Give up waiting for a mount after this many seconds; unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for the operational log, per-disc logs and batch reports
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            carousel: CarouselConfig {
                binary_path: "mtx".to_string(),
                device: "/dev/sg8".to_string(),
                empty_marker: "Empty".to_string(),
                full_marker: "Full".to_string(),
            },
            drives: DrivesConfig {
                devices: vec!["/dev/sr1".to_string(), "/dev/sr2".to_string()],
            },
            slots: SlotsConfig {
                input_first: 1,
                input_last: 350,
                output_first: 351,
                error_first: 701,
                error_last: 720,
                cassette_size: default_cassette_size(),
            },
            extractor: ExtractorConfig {
                binary_path: "dvdbackup".to_string(),
                output_dir: PathBuf::from("/rip"),
                name_collision_code: 2,
            },
            mount: MountConfig {
                probe_binary: "findmnt".to_string(),
                probe_args: vec![
                    "--noheadings".to_string(),
                    "--output".to_string(),
                    "TARGET".to_string(),
                    "--source".to_string(),
                ],
                not_mounted_code: default_not_mounted_code(),
                poll_interval_secs: 10,
                timeout_secs: Some(1800),
            },
            output: OutputConfig {
                log_dir: PathBuf::from("/rip"),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RipitError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| RipitError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RipitError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RipitError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Check the parts of the configuration that later code relies on
    pub fn validate(&self) -> Result<()> {
        if self.drives.devices.is_empty() {
            return Err(RipitError::Config("At least one drive must be configured".to_string()));
        }
        if self.carousel.empty_marker.is_empty() || self.carousel.full_marker.is_empty() {
            return Err(RipitError::Config("Carousel stderr markers must not be empty".to_string()));
        }
        SlotLayout::from_config(&self.slots)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.mount.poll_interval_secs)
    }

    pub fn mount_timeout(&self) -> Option<Duration> {
        self.mount.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drives.devices.len(), 2);
        assert_eq!(config.mount_timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ripit.toml");

        let mut config = Config::default();
        config.mount.timeout_secs = None;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.carousel.device, "/dev/sg8");
        assert_eq!(loaded.slots.output_first, 351);
        assert_eq!(loaded.mount.timeout_secs, None);
    }

    #[test]
    fn test_overlapping_banks_rejected() {
        let mut config = Config::default();
        config.slots.output_first = 300;
        assert!(matches!(config.validate(), Err(RipitError::Config(_))));
    }

    #[test]
    fn test_no_drives_rejected() {
        let mut config = Config::default();
        config.drives.devices.clear();
        assert!(config.validate().is_err());
    }
}
