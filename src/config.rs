// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use crate::analysis::DEFAULT_ACTIVE_THRESHOLD;
use crate::calibration::CalibrationTiming;
use crate::codec::FrameCodec;
use crate::drivers::{LinkError, MAX_DATAGRAM};
use crate::engine::LoopTiming;
use crate::visualizer::RingLayout;

/// Tunables for both nodes. Every field has a default, so a config file only lists overrides.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of touch channels along the shaft.
    pub channel_count: usize,
    /// Delay between two transmitted samples.
    pub refresh_interval_ms: u64,
    /// Pause after a transport fault before streaming resumes.
    pub fault_cooldown_ms: u64,
    /// Frames averaged by the display node into its reference baseline.
    pub baseline_frames: usize,
    /// Rest phase of the calibration: device down, untouched.
    pub rest_ms: u64,
    /// Handle phase of the calibration: device used naturally.
    pub handle_ms: u64,
    pub calibration_interval_ms: u64,
    /// Normalized level at which a channel counts as engaged.
    pub active_threshold: f32,
    /// Delta that maps to full LED brightness.
    pub led_max_value: u32,
    pub led_count: usize,
    /// Ring position of channel 0 on the top arc.
    pub first_led: usize,
    /// Where the calibration profile is persisted.
    pub calibration_path: PathBuf,
    pub serial_baud: u32,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            channel_count: 9,
            refresh_interval_ms: 100,
            fault_cooldown_ms: 2000,
            baseline_frames: 10,
            rest_ms: 3000,
            handle_ms: 10_000,
            calibration_interval_ms: 50,
            active_threshold: DEFAULT_ACTIVE_THRESHOLD,
            led_max_value: 30_000,
            led_count: 32,
            first_led: 4,
            calibration_path: PathBuf::from("calibration.json"),
            serial_baud: 115_200,
        }
    }
}
impl Config {
    /// Reads a JSON config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, LinkError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| LinkError::Config(format!("{}: {e}", path.display())))?;
                serde_json::from_str(&text)
                    .map_err(|e| LinkError::Config(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.channel_count == 0 {
            return Err(LinkError::Config("channel_count must be at least 1".into()));
        }
        let frame_len = FrameCodec::new(self.channel_count).frame_len();
        if frame_len > MAX_DATAGRAM {
            return Err(LinkError::Config(format!(
                "{} channels need {frame_len} byte frames, above the {MAX_DATAGRAM} byte datagram limit",
                self.channel_count
            )));
        }
        if self.baseline_frames == 0 {
            return Err(LinkError::Config("baseline_frames must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.active_threshold) {
            return Err(LinkError::Config(format!(
                "active_threshold {} is outside [0, 1]",
                self.active_threshold
            )));
        }
        if self.led_max_value == 0 {
            return Err(LinkError::Config("led_max_value must be positive".into()));
        }
        if !self.ring_layout().fits(self.channel_count) {
            return Err(LinkError::Config(format!(
                "{} channels starting at LED {} overflow a {}-LED arc",
                self.channel_count,
                self.first_led,
                self.led_count / 2
            )));
        }
        Ok(())
    }
    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            fault_cooldown: Duration::from_millis(self.fault_cooldown_ms),
        }
    }
    pub fn calibration_timing(&self) -> CalibrationTiming {
        CalibrationTiming {
            rest: Duration::from_millis(self.rest_ms),
            handle: Duration::from_millis(self.handle_ms),
            interval: Duration::from_millis(self.calibration_interval_ms),
        }
    }
    pub fn ring_layout(&self) -> RingLayout {
        RingLayout {
            led_count: self.led_count,
            first_led: self.first_led,
        }
    }
    /// Store directory and key for the calibration profile.
    pub fn calibration_location(&self) -> (PathBuf, String) {
        let dir = self
            .calibration_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let key = self
            .calibration_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "calibration.json".to_owned());
        (dir, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn defaults_match_the_reference_device() {
        let config = Config::default();
        assert_eq!(config.channel_count, 9);
        assert_eq!(config.loop_timing(), LoopTiming::default());
        assert_eq!(config.calibration_timing(), CalibrationTiming::default());
        assert_eq!(config.ring_layout(), RingLayout::default());
        assert!(config.validate().is_ok());
    }
    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"channel_count": 6, "refresh_interval_ms": 50}"#).unwrap();
        assert_eq!(config.channel_count, 6);
        assert_eq!(config.refresh_interval_ms, 50);
        assert_eq!(config.baseline_frames, 10);
        assert_eq!(config.led_max_value, 30_000);
    }
    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            Config { channel_count: 0, ..Config::default() },
            Config { baseline_frames: 0, ..Config::default() },
            Config { active_threshold: 1.5, ..Config::default() },
            Config { led_max_value: 0, ..Config::default() },
            Config { channel_count: 13, ..Config::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(LinkError::Config(_))));
        }
    }
    #[test]
    fn frames_must_fit_one_datagram() {
        let wide_ring = Config {
            led_count: 2_000,
            first_led: 0,
            ..Config::default()
        };
        let fits = Config { channel_count: 375, ..wide_ring.clone() };
        assert!(fits.validate().is_ok());
        let too_wide = Config { channel_count: 376, ..wide_ring };
        match too_wide.validate() {
            Err(LinkError::Config(msg)) => assert!(msg.contains("datagram")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }
    #[test]
    fn calibration_location_splits_dir_and_key() {
        let config = Config {
            calibration_path: PathBuf::from("/var/lib/touchlink/profile.json"),
            ..Config::default()
        };
        assert_eq!(
            config.calibration_location(),
            (PathBuf::from("/var/lib/touchlink"), "profile.json".to_owned())
        );
        let (dir, key) = Config::default().calibration_location();
        assert_eq!(dir, PathBuf::new());
        assert_eq!(key, "calibration.json");
    }
    #[test]
    fn missing_file_is_a_config_error() {
        let missing = std::env::temp_dir().join("touchlink-no-such-config.json");
        assert!(matches!(Config::load(Some(&missing)), Err(LinkError::Config(_))));
    }
}
