use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt;
use crate::scpi::Coupling;
use crate::spectrum::FftWindow;

pub const BODE_CONFIG_FILE: &str = "bode_config.json";
pub const SPECTRUM_CONFIG_FILE: &str = "spectrum_config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stop frequency ({stop} Hz) must be above start frequency ({start} Hz)")]
    StopNotAboveStart { start: f64, stop: f64 },
    #[error("start frequency must be above zero on a logarithmic scale (got {start} Hz)")]
    LogScaleNeedsPositiveStart { start: f64 },
    #[error("at least one sweep point is required")]
    NoPoints,
    #[error("at least one average per point is required")]
    NoAverages,
    #[error("generator amplitude must be above zero (got {vpp} Vpp)")]
    NonPositiveAmplitude { vpp: f64 },
    #[error("frequency resolution must be above zero (got {resolution} Hz)")]
    NonPositiveResolution { resolution: f64 },
    #[error("channel must be 1 or 2 (got {channel})")]
    BadChannel { channel: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreqScale {
    Lin,
    Log,
}

impl fmt::Display for FreqScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreqScale::Lin => write!(f, "lin"),
            FreqScale::Log => write!(f, "log"),
        }
    }
}

/// Bode sweep parameters. Loaded from persisted defaults, optionally
/// overridden at the prompt, validated before the instruments are touched,
/// and never mutated during a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub f_start_hz: f64,
    pub f_stop_hz: f64,
    pub num_points: u32,
    pub scale: FreqScale,
    pub num_averages: u32,
    pub gen_amplitude_vpp: f64,
    pub y_mag_min_db: f64,
    pub y_mag_max_db: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            f_start_hz: 1.0,
            f_stop_hz: 100_000.0,
            num_points: 20,
            scale: FreqScale::Log,
            num_averages: 3,
            gen_amplitude_vpp: 1.0,
            y_mag_min_db: -100.0,
            y_mag_max_db: 10.0,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale == FreqScale::Log && self.f_start_hz <= 0.0 {
            return Err(ConfigError::LogScaleNeedsPositiveStart {
                start: self.f_start_hz,
            });
        }
        if self.f_stop_hz <= self.f_start_hz {
            return Err(ConfigError::StopNotAboveStart {
                start: self.f_start_hz,
                stop: self.f_stop_hz,
            });
        }
        if self.num_points == 0 {
            return Err(ConfigError::NoPoints);
        }
        if self.num_averages == 0 {
            return Err(ConfigError::NoAverages);
        }
        if self.gen_amplitude_vpp <= 0.0 {
            return Err(ConfigError::NonPositiveAmplitude {
                vpp: self.gen_amplitude_vpp,
            });
        }
        Ok(())
    }

    /// Walk every field at the prompt, using the current values as
    /// defaults and re-asking until the cross-field invariants hold.
    pub fn prompt_overrides(&self) -> Result<Self> {
        println!("\n--- Sweep configuration ---");
        let mut next = self.clone();
        loop {
            let answer = prompt::ask_string("Frequency scale, lin or log", &next.scale.to_string())?;
            match answer.to_lowercase().as_str() {
                "lin" => {
                    next.scale = FreqScale::Lin;
                    break;
                }
                "log" => {
                    next.scale = FreqScale::Log;
                    break;
                }
                _ => println!("Please answer 'lin' or 'log'."),
            }
        }
        loop {
            let start = prompt::ask_f64("Start frequency (Hz)", next.f_start_hz)?;
            if next.scale == FreqScale::Log && start <= 0.0 {
                println!("A logarithmic sweep needs a start frequency above zero.");
                continue;
            }
            next.f_start_hz = start;
            break;
        }
        loop {
            let stop = prompt::ask_f64("Stop frequency (Hz)", next.f_stop_hz)?;
            if stop <= next.f_start_hz {
                println!("Stop frequency must be above the start frequency.");
                continue;
            }
            next.f_stop_hz = stop;
            break;
        }
        next.num_points = prompt::ask_u32("Number of points", next.num_points)?.max(1);
        next.num_averages = prompt::ask_u32("Averages per point", next.num_averages)?.max(1);
        next.gen_amplitude_vpp =
            prompt::ask_f64("Generator amplitude (Vpp)", next.gen_amplitude_vpp)?;
        next.y_mag_min_db = prompt::ask_f64("Plot magnitude floor (dB)", next.y_mag_min_db)?;
        next.y_mag_max_db = prompt::ask_f64("Plot magnitude ceiling (dB)", next.y_mag_max_db)?;
        Ok(next)
    }

    pub fn print_summary(&self, gen_desc: &str, scope_desc: &str) {
        println!("\n--- Sweep configuration ---");
        println!("  Generator:     {gen_desc}");
        println!("  Oscilloscope:  {scope_desc}");
        println!(
            "  Frequency:     {} Hz to {} Hz, {} points ({} scale)",
            self.f_start_hz, self.f_stop_hz, self.num_points, self.scale
        );
        println!("  Amplitude:     {} Vpp", self.gen_amplitude_vpp);
        println!("  Averages:      {}", self.num_averages);
        println!(
            "  Plot range:    {} dB to {} dB",
            self.y_mag_min_db, self.y_mag_max_db
        );
        println!("---------------------------");
    }
}

/// Spectrum analysis parameters, same lifecycle as `SweepConfig`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub f_start_hz: f64,
    pub f_stop_hz: f64,
    pub resolution_hz: f64,
    pub num_averages: u32,
    pub channel: u8,
    pub coupling: Coupling,
    pub window: FftWindow,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            f_start_hz: 0.0,
            f_stop_hz: 100_000.0,
            resolution_hz: 100.0,
            num_averages: 3,
            channel: 1,
            coupling: Coupling::Dc,
            window: FftWindow::Hann,
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution_hz <= 0.0 {
            return Err(ConfigError::NonPositiveResolution {
                resolution: self.resolution_hz,
            });
        }
        if self.num_averages == 0 {
            return Err(ConfigError::NoAverages);
        }
        if !matches!(self.channel, 1 | 2) {
            return Err(ConfigError::BadChannel {
                channel: self.channel,
            });
        }
        Ok(())
    }

    pub fn prompt_overrides(&self) -> Result<Self> {
        println!("\n--- Spectrum configuration ---");
        let mut next = self.clone();
        next.f_start_hz = prompt::ask_f64("Display start frequency (Hz)", next.f_start_hz)?;
        next.f_stop_hz = prompt::ask_f64("Display stop frequency (Hz)", next.f_stop_hz)?;
        loop {
            let resolution = prompt::ask_f64("Target resolution (Hz)", next.resolution_hz)?;
            if resolution <= 0.0 {
                println!("Resolution must be above zero.");
                continue;
            }
            next.resolution_hz = resolution;
            break;
        }
        next.num_averages = prompt::ask_u32("Number of averages", next.num_averages)?.max(1);
        loop {
            let channel = prompt::ask_u32("Channel (1 or 2)", next.channel as u32)?;
            if matches!(channel, 1 | 2) {
                next.channel = channel as u8;
                break;
            }
            println!("Channel must be 1 or 2.");
        }
        loop {
            let current = match next.coupling {
                Coupling::Ac => "AC",
                Coupling::Dc => "DC",
            };
            let answer = prompt::ask_string("Coupling, AC or DC", current)?;
            match answer.to_uppercase().as_str() {
                "AC" => {
                    next.coupling = Coupling::Ac;
                    break;
                }
                "DC" => {
                    next.coupling = Coupling::Dc;
                    break;
                }
                _ => println!("Please answer AC or DC."),
            }
        }
        loop {
            let answer =
                prompt::ask_string("FFT window, hann or rect", &next.window.to_string())?;
            match answer.to_lowercase().as_str() {
                "hann" | "hanning" => {
                    next.window = FftWindow::Hann;
                    break;
                }
                "rect" | "rectangle" | "rectangular" => {
                    next.window = FftWindow::Rect;
                    break;
                }
                _ => println!("Please answer 'hann' or 'rect'."),
            }
        }
        Ok(next)
    }

    pub fn print_summary(&self, scope_desc: &str) {
        let coupling = match self.coupling {
            Coupling::Ac => "AC",
            Coupling::Dc => "DC",
        };
        println!("\n--- Spectrum configuration ---");
        println!("  Oscilloscope:  {scope_desc}");
        println!("  Channel:       CH{} ({coupling})", self.channel);
        println!("  Resolution:    ~{} Hz (target)", self.resolution_hz);
        println!("  Averages:      {}", self.num_averages);
        println!("  Window:        {}", self.window);
        println!(
            "  Display range: {} Hz to {} Hz",
            self.f_start_hz, self.f_stop_hz
        );
        println!("------------------------------");
    }
}

/// Persisted defaults: a missing file yields the factory defaults, a
/// corrupt file warns and yields the factory defaults, and fields absent
/// from an older file are filled from the defaults.
pub fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return T::default(),
    };
    match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            warn!("config file '{}' is corrupt ({e}), using factory defaults", path.display());
            T::default()
        }
    }
}

pub fn save<T: Serialize>(path: &Path, config: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(config).context("failed to encode configuration")?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write configuration to '{}'", path.display()))?;
    println!("Configuration saved to '{}'.", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_scale_rejects_non_positive_start() {
        let config = SweepConfig {
            f_start_hz: 0.0,
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LogScaleNeedsPositiveStart { .. })
        ));
        let config = SweepConfig {
            f_start_hz: 0.0,
            f_stop_hz: 10.0,
            scale: FreqScale::Lin,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stop_must_exceed_start() {
        let config = SweepConfig {
            f_start_hz: 1000.0,
            f_stop_hz: 1000.0,
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StopNotAboveStart { .. })
        ));
    }

    #[test]
    fn spectrum_resolution_must_be_positive() {
        let config = SpectrumConfig {
            resolution_hz: 0.0,
            ..SpectrumConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveResolution { .. })
        ));
    }

    #[test]
    fn persisted_defaults_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BODE_CONFIG_FILE);
        let config = SweepConfig {
            f_start_hz: 10.0,
            num_points: 7,
            ..SweepConfig::default()
        };
        save(&path, &config).unwrap();
        let loaded: SweepConfig = load_or_default(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn corrupt_file_falls_back_to_factory_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BODE_CONFIG_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let loaded: SweepConfig = load_or_default(&path);
        assert_eq!(loaded, SweepConfig::default());
    }

    #[test]
    fn missing_fields_are_filled_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BODE_CONFIG_FILE);
        std::fs::write(&path, r#"{"f_start_hz": 5.0}"#).unwrap();
        let loaded: SweepConfig = load_or_default(&path);
        assert_eq!(loaded.f_start_hz, 5.0);
        assert_eq!(loaded.num_points, SweepConfig::default().num_points);
    }

    #[test]
    fn spectrum_config_serializes_enums_as_instrument_tokens() {
        let json = serde_json::to_string(&SpectrumConfig::default()).unwrap();
        assert!(json.contains(r#""coupling":"DC""#));
        assert!(json.contains(r#""window":"hann""#));
    }
}
