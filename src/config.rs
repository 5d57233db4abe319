// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::drivers::negotiator::{CONFIRMATION, CONFIRMATION_FALLBACK};
use crate::drivers::{
    sample_count, CalibrationProfile, DriverError, Handshake, ManualPolicy, NegotiationProfile,
    SignalConditioner,
};
use crate::engine::EngineTiming;
use crate::types::ZeroMode;
use crate::waveform::segment::CONNECT_WAVEFORM;
use crate::waveform::{Sheet, VoltageScaling};

pub const DEFAULT_CONFIG_PATH: &str = "wavedrive.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub driver: DriverConfig,
    pub daq: DaqConfig,
}
impl AppConfig {
    /// Reads and validates the file at `path`. A missing file yields the
    /// built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to load {}", path.display()))
    }
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("malformed configuration JSON")?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), DriverError> {
        self.driver.validate()?;
        self.daq.validate()
    }
}

/// One tab of the test plan, exported as CSV.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetSource {
    pub name: String,
    pub path: PathBuf,
}

/// Actuator driver side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub manual_port: Option<String>,
    pub manual_port_file: Option<PathBuf>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub handshake: String,
    pub confirmation: String,
    pub confirmation_fallback: Option<String>,
    pub voltage_scaler_base: f64,
    pub max_voltage: f64,
    pub dual_actuator_scaler: f64,
    pub header_rows: usize,
    /// First entry is the main sheet.
    pub sheets: Vec<SheetSource>,
    pub playback_limit_ms: u64,
    pub verify_poll_ms: u64,
}
impl Default for DriverConfig {
    fn default() -> Self {
        let scaling = VoltageScaling::default();
        Self {
            manual_port: None,
            manual_port_file: Some(PathBuf::from("COM_PORT.txt")),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            handshake: (*CONNECT_WAVEFORM).clone(),
            confirmation: CONFIRMATION.to_string(),
            confirmation_fallback: Some(CONFIRMATION_FALLBACK.to_string()),
            voltage_scaler_base: scaling.scaler_base,
            max_voltage: scaling.max_voltage,
            dual_actuator_scaler: scaling.dual_actuator_scaler,
            header_rows: 2,
            sheets: vec![SheetSource {
                name: "Standard".to_string(),
                path: PathBuf::from("Waveform_Excel/Standard.csv"),
            }],
            playback_limit_ms: 90_000,
            verify_poll_ms: 300,
        }
    }
}
impl DriverConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        require(self.baud_rate > 0, "driver.baud_rate must be positive")?;
        require(
            self.voltage_scaler_base > 0.0,
            "driver.voltage_scaler_base must be positive",
        )?;
        require(self.max_voltage > 0.0, "driver.max_voltage must be positive")?;
        require(
            self.dual_actuator_scaler > 0.0,
            "driver.dual_actuator_scaler must be positive",
        )?;
        require(self.verify_poll_ms > 0, "driver.verify_poll_ms must be positive")?;
        Ok(())
    }
    pub fn scaling(&self) -> VoltageScaling {
        VoltageScaling {
            scaler_base: self.voltage_scaler_base,
            max_voltage: self.max_voltage,
            dual_actuator_scaler: self.dual_actuator_scaler,
        }
    }
    /// The driver's manual port must answer the handshake too.
    pub fn negotiation_profile(&self) -> NegotiationProfile {
        NegotiationProfile {
            baud_rate: self.baud_rate,
            handshake: Some(Handshake {
                message: self.handshake.clone(),
                confirmation: self.confirmation.clone(),
                fallback_phrase: self.confirmation_fallback.clone(),
            }),
            manual: ManualPolicy::Verify,
        }
    }
    pub fn engine_timing(&self) -> EngineTiming {
        EngineTiming {
            playback_limit: Duration::from_millis(self.playback_limit_ms),
            verify_poll: Duration::from_millis(self.verify_poll_ms),
        }
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    pub fn manual_hint(&self) -> Option<String> {
        resolve_manual_hint(self.manual_port.as_deref(), self.manual_port_file.as_deref())
    }
    pub fn load_sheets(&self) -> Result<Vec<Sheet>> {
        self.sheets
            .iter()
            .map(|source| {
                Sheet::from_path(&source.name, &source.path, self.header_rows).with_context(|| {
                    format!(
                        "failed to read sheet `{}` from {}",
                        source.name,
                        source.path.display()
                    )
                })
            })
            .collect()
    }
}

/// Calibration of the three accelerometer axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    pub x: CalibrationProfile,
    pub y: CalibrationProfile,
    pub z: CalibrationProfile,
}
impl Default for CalibrationSet {
    fn default() -> Self {
        Self {
            x: CalibrationProfile::new(-1.25, 31.5),
            y: CalibrationProfile::new(-0.5, 31.75),
            z: CalibrationProfile::new(0.125, 31.0),
        }
    }
}
impl CalibrationSet {
    pub fn profiles(&self) -> [CalibrationProfile; 3] {
        [self.x, self.y, self.z]
    }
}

/// Accelerometer acquisition side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    pub manual_port: Option<String>,
    pub manual_port_file: Option<PathBuf>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub sample_rate_hz: f64,
    pub duration_s: f64,
    pub zero_mode: ZeroMode,
    /// `null` disables the deadband.
    pub noise_margin: Option<f64>,
    pub calibration: CalibrationSet,
    pub export_enabled: bool,
    pub export_dir: PathBuf,
    pub export_prefix: String,
    pub simulate: bool,
    /// Uniform noise amplitude of the simulated sensor, in raw counts.
    pub simulated_noise: f64,
}
impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            manual_port: None,
            manual_port_file: Some(PathBuf::from("COM_PORT_2.txt")),
            baud_rate: 921_600,
            read_timeout_ms: 1000,
            sample_rate_hz: 3200.0,
            duration_s: 2.0,
            zero_mode: ZeroMode::Shaking,
            noise_margin: Some(1.0),
            calibration: CalibrationSet::default(),
            export_enabled: true,
            export_dir: PathBuf::from("Acceleration_Data"),
            export_prefix: "acc_data".to_string(),
            simulate: false,
            simulated_noise: 0.5,
        }
    }
}
impl DaqConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        require(self.baud_rate > 0, "daq.baud_rate must be positive")?;
        require(
            self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0,
            "daq.sample_rate_hz must be positive",
        )?;
        require(
            self.duration_s.is_finite() && self.duration_s > 0.0,
            "daq.duration_s must be positive",
        )?;
        for (axis, calib) in ["x", "y", "z"].iter().zip(self.calibration.profiles()) {
            if calib.inverse_gain == 0.0 || !calib.inverse_gain.is_finite() {
                return Err(DriverError::InvalidConfig(format!(
                    "daq.calibration.{axis}.inverse_gain must be non-zero"
                )));
            }
        }
        if let Some(margin) = self.noise_margin {
            require(margin >= 0.0, "daq.noise_margin must not be negative")?;
        }
        require(
            self.simulated_noise >= 0.0,
            "daq.simulated_noise must not be negative",
        )?;
        Ok(())
    }
    /// Any port that opens is accepted; the accelerometer starts streaming
    /// without a handshake.
    pub fn negotiation_profile(&self) -> NegotiationProfile {
        NegotiationProfile {
            baud_rate: self.baud_rate,
            handshake: None,
            manual: ManualPolicy::Unconditional,
        }
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    pub fn manual_hint(&self) -> Option<String> {
        resolve_manual_hint(self.manual_port.as_deref(), self.manual_port_file.as_deref())
    }
    pub fn sample_count(&self) -> usize {
        sample_count(self.sample_rate_hz, self.duration_s)
    }
    pub fn conditioner(&self) -> SignalConditioner {
        SignalConditioner::new(
            self.calibration.profiles(),
            self.zero_mode,
            self.noise_margin,
        )
    }
}

fn require(ok: bool, message: &str) -> Result<(), DriverError> {
    if ok {
        Ok(())
    } else {
        Err(DriverError::InvalidConfig(message.to_string()))
    }
}

/// An explicit port wins; otherwise the first line of the hint file, if it
/// exists and is not blank.
pub fn resolve_manual_hint(explicit: Option<&str>, file: Option<&Path>) -> Option<String> {
    if let Some(port) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        return Some(port.to_string());
    }
    let file = file?;
    match fs::read_to_string(file) {
        Ok(text) => text
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string),
        Err(err) => {
            debug!("no port hint from {}: {err}", file.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn empty_document_gives_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.driver.baud_rate, 9600);
        assert_eq!(config.daq.baud_rate, 921_600);
        assert_eq!(config.daq.sample_count(), 6400);
        assert_eq!(config.driver.handshake.len(), 83);
    }
    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "driver": { "manual_port": "COM7", "sheets": [{ "name": "Main", "path": "main.csv" }] },
                "daq": { "zero_mode": "still", "noise_margin": null, "duration_s": 0.5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.driver.manual_port.as_deref(), Some("COM7"));
        assert_eq!(config.driver.sheets[0].name, "Main");
        assert_eq!(config.driver.header_rows, 2);
        assert_eq!(config.daq.zero_mode, ZeroMode::Still);
        assert_eq!(config.daq.noise_margin, None);
        assert_eq!(config.daq.sample_count(), 1600);
        assert_eq!(config.daq.calibration, CalibrationSet::default());
    }
    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            r#"{ "daq": { "sample_rate_hz": 0 } }"#,
            r#"{ "daq": { "duration_s": -1 } }"#,
            r#"{ "daq": { "calibration": { "x": { "offset": 0, "inverse_gain": 0 },
                 "y": { "offset": 0, "inverse_gain": 1 }, "z": { "offset": 0, "inverse_gain": 1 } } } }"#,
            r#"{ "driver": { "max_voltage": 0 } }"#,
            r#"{ "driver": { "dual_actuator_scaler": -0.5 } }"#,
        ] {
            let err = AppConfig::from_json(text).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<DriverError>(),
                    Some(DriverError::InvalidConfig(_))
                ),
                "{text}: {err:?}"
            );
        }
    }
    #[test]
    fn profiles_follow_the_device_role() {
        let config = AppConfig::default();
        let driver = config.driver.negotiation_profile();
        assert_eq!(driver.manual, ManualPolicy::Verify);
        let handshake = driver.handshake.unwrap();
        assert!(handshake.accepts("TEENSY CONNECTION CONFIRM"));
        assert!(handshake.message.starts_with('2'));
        let daq = config.daq.negotiation_profile();
        assert_eq!(daq.manual, ManualPolicy::Unconditional);
        assert!(daq.handshake.is_none());
        assert_eq!(config.driver.engine_timing().playback_limit, Duration::from_secs(90));
    }
    #[test]
    fn manual_hint_prefers_explicit_port_then_file() {
        let path = std::env::temp_dir().join(format!("wavedrive_hint_{}.txt", std::process::id()));
        fs::write(&path, "  COM5 \nignored\n").unwrap();
        assert_eq!(resolve_manual_hint(Some("COM9"), Some(&path)).as_deref(), Some("COM9"));
        assert_eq!(resolve_manual_hint(Some("  "), Some(&path)).as_deref(), Some("COM5"));
        fs::write(&path, "\n").unwrap();
        assert_eq!(resolve_manual_hint(None, Some(&path)), None);
        fs::remove_file(&path).unwrap();
        assert_eq!(resolve_manual_hint(None, Some(&path)), None);
        assert_eq!(resolve_manual_hint(None, None), None);
    }
}
