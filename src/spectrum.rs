use std::fmt;

use log::{error, info, warn};
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::config::SpectrumConfig;
use crate::scpi::{
    AcquireType, Channel, Scope, ScpiError, ScpiLink, TriggerMode, ADC_SAMPLE_COUNT,
};
use crate::sweep::timebase::{timebase_for_resolution, Timebase, HORIZONTAL_DIVISIONS};
use crate::sweep::{InterruptFlag, Pacing};

/// ADC codes span 0..=255 with the trace centered between 127 and 128.
const CODE_MIDPOINT: f64 = 127.5;
const CODE_RANGE: f64 = 255.0;
/// Full vertical span of the screen in divisions.
const VERTICAL_DIVISIONS: f64 = 8.0;
/// Keeps the dB conversion finite on an empty bin.
const DB_EPSILON: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FftWindow {
    Hann,
    #[serde(alias = "rectangle", alias = "rectangular")]
    Rect,
}

impl FftWindow {
    /// Window coefficients for an `n`-sample capture.
    pub fn coefficients(self, n: usize) -> Vec<f64> {
        match self {
            FftWindow::Rect => vec![1.0; n],
            FftWindow::Hann => (0..n)
                .map(|i| {
                    let x = i as f64 / (n - 1) as f64;
                    0.5 - 0.5 * (2.0 * std::f64::consts::PI * x).cos()
                })
                .collect(),
        }
    }
}

impl fmt::Display for FftWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FftWindow::Hann => write!(f, "hann"),
            FftWindow::Rect => write!(f, "rect"),
        }
    }
}

/// Capture geometry implied by the requested frequency resolution.
#[derive(Clone, Copy, Debug)]
pub struct SpectrumSetup {
    pub timebase: Timebase,
    pub window_secs: f64,
    pub sample_rate_hz: f64,
    pub resolution_hz: f64,
    pub nyquist_hz: f64,
}

impl SpectrumSetup {
    pub fn from_resolution(resolution_hz: f64) -> Self {
        let timebase = timebase_for_resolution(resolution_hz);
        let window_secs = timebase.seconds * HORIZONTAL_DIVISIONS;
        let sample_rate_hz = ADC_SAMPLE_COUNT as f64 / window_secs;
        Self {
            timebase,
            window_secs,
            sample_rate_hz,
            resolution_hz: 1.0 / window_secs,
            nyquist_hz: sample_rate_hz / 2.0,
        }
    }
}

/// Averaged spectrum: Nyquist-limited frequency axis with RMS and dB
/// amplitude per bin.
#[derive(Clone, Debug)]
pub struct SpectrumResult {
    pub frequencies_hz: Vec<f64>,
    pub v_rms: Vec<f64>,
    pub v_db: Vec<f64>,
}

/// Capture `num_averages` raw waveforms, FFT each one, and average the
/// complex spectra. `Ok(None)` when the analysis produced nothing (operator
/// declined, calibration unreadable, or every acquisition was discarded);
/// the scope is returned to RUN on every exit path so the live display
/// stays usable.
pub fn run_spectrum_analysis<L, F>(
    scope: &mut Scope<L>,
    config: &SpectrumConfig,
    pacing: &Pacing,
    interrupt: &InterruptFlag,
    confirm_vertical: F,
) -> Result<Option<SpectrumResult>, ScpiError>
where
    L: ScpiLink,
    F: FnOnce() -> bool,
{
    let outcome = drive_analysis(scope, config, pacing, interrupt, confirm_vertical);
    let _ = scope.run();
    outcome
}

fn drive_analysis<L, F>(
    scope: &mut Scope<L>,
    config: &SpectrumConfig,
    pacing: &Pacing,
    interrupt: &InterruptFlag,
    confirm_vertical: F,
) -> Result<Option<SpectrumResult>, ScpiError>
where
    L: ScpiLink,
    F: FnOnce() -> bool,
{
    // Validated before we get here; out-of-range channels never reach the
    // instrument.
    let channel = Channel::from_number(config.channel).unwrap_or(Channel::Ch1);
    let setup = SpectrumSetup::from_resolution(config.resolution_hz);

    println!("\n--- Acquisition setup ---");
    println!("  Target resolution: {:.2} Hz", config.resolution_hz);
    println!("  Timebase:          {}/div", setup.timebase.token);
    println!("  Actual resolution: {:.2} Hz", setup.resolution_hz);
    println!("  Nyquist frequency: {:.2} Hz", setup.nyquist_hz);
    if config.f_stop_hz > setup.nyquist_hz {
        warn!(
            "display stop frequency ({} Hz) is beyond Nyquist ({:.2} Hz)",
            config.f_stop_hz, setup.nyquist_hz
        );
    }

    prepare_scope(scope, config, channel, pacing)?;

    // Automated vertical ranging is unreliable on this instrument, so the
    // operator confirms the gain by eye before anything is captured.
    println!("\n------------------------------------------------------------");
    println!("  Adjust CH{} volts/div so the signal is visible", channel.number());
    println!("  and NOT clipped, then confirm to continue.");
    println!("------------------------------------------------------------");
    if !confirm_vertical() {
        info!("analysis cancelled at the vertical adjustment step");
        return Ok(None);
    }

    scope.stop()?;
    pacing.pause(pacing.reconfigure);
    scope.set_timebase_scale(setup.timebase.token)?;
    pacing.pause(pacing.reconfigure);

    // Read the scale back only now, after the stop settled, so the value
    // reflects the operator's final adjustment.
    let (v_div, probe) = match read_vertical_calibration(scope, channel) {
        Ok(calibration) => calibration,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!("could not read back vertical calibration: {e}");
            return Ok(None);
        }
    };
    println!("  Read {v_div} V/div (probe {probe}X)");
    let volts_per_code = VERTICAL_DIVISIONS * v_div * probe as f64 / CODE_RANGE;

    let window = config.window.coefficients(ADC_SAMPLE_COUNT);
    let window_sum: f64 = window.iter().sum();

    let mut spectra: Vec<Vec<Complex64>> = Vec::new();
    for rep in 1..=config.num_averages {
        if interrupt.is_set() {
            println!("\n--- Analysis interrupted after {} acquisitions ---", spectra.len());
            break;
        }
        println!("  Acquisition {rep}/{}...", config.num_averages);

        scope.run()?;
        pacing.pause(pacing.dynamic(setup.timebase.seconds * 5.0 + 1.0));
        scope.stop()?;
        pacing.pause(pacing.buffer_ready);

        let raw = match scope.adc_data(channel) {
            Ok(raw) => raw,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("acquisition {rep} discarded: {e}");
                continue;
            }
        };

        let volts: Vec<f64> = raw
            .iter()
            .map(|&code| (code as f64 - CODE_MIDPOINT) * volts_per_code)
            .collect();
        spectra.push(windowed_fft(&volts, &window));
    }

    if spectra.is_empty() {
        error!("no acquisition succeeded");
        return Ok(None);
    }
    Ok(Some(average_and_scale(
        &spectra,
        window_sum,
        setup.sample_rate_hz,
    )))
}

fn prepare_scope<L: ScpiLink>(
    scope: &mut Scope<L>,
    config: &SpectrumConfig,
    channel: Channel,
    pacing: &Pacing,
) -> Result<(), ScpiError> {
    scope.set_channel_display(channel, true)?;
    pacing.pause(pacing.command);
    scope.set_coupling(channel, config.coupling)?;
    pacing.pause(pacing.command);
    scope.set_probe_attenuation(channel, 1)?;
    pacing.pause(pacing.command);
    scope.set_acquire_type(AcquireType::Sample)?;
    pacing.pause(pacing.command);
    scope.set_trigger_mode(TriggerMode::Auto)?;
    pacing.pause(pacing.command);
    scope.run()?;
    info!("scope running in AUTO/SAMPle for spectrum capture");
    Ok(())
}

fn read_vertical_calibration<L: ScpiLink>(
    scope: &mut Scope<L>,
    channel: Channel,
) -> Result<(f64, u32), ScpiError> {
    let v_div = scope.channel_scale(channel)?;
    let probe = scope.probe_attenuation(channel)?;
    Ok((v_div, probe))
}

/// Window, transform, and keep the full complex spectrum of one capture.
fn windowed_fft(volts: &[f64], window: &[f64]) -> Vec<Complex64> {
    let mut buffer: Vec<Complex64> = volts
        .iter()
        .zip(window)
        .map(|(&v, &w)| Complex64::new(v * w, 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);
    buffer
}

/// Average complex spectra elementwise (so uncorrelated noise cancels),
/// keep the non-negative frequency half, and rescale to peak, RMS and dB
/// amplitudes. The zero-frequency bin carries no factor of two and no RMS
/// division.
fn average_and_scale(
    spectra: &[Vec<Complex64>],
    window_sum: f64,
    sample_rate_hz: f64,
) -> SpectrumResult {
    let n = spectra[0].len();
    let half = n / 2;
    let count = spectra.len() as f64;

    let mut frequencies_hz = Vec::with_capacity(half);
    let mut v_rms = Vec::with_capacity(half);
    let mut v_db = Vec::with_capacity(half);

    for k in 0..half {
        let sum: Complex64 = spectra.iter().map(|s| s[k]).sum();
        let magnitude = (sum / count).norm();
        let rms = if k == 0 {
            magnitude / window_sum
        } else {
            (magnitude * 2.0 / window_sum) / 2.0_f64.sqrt()
        };
        frequencies_hz.push(k as f64 * sample_rate_hz / n as f64);
        v_rms.push(rms);
        v_db.push(20.0 * (rms + DB_EPSILON).log10());
    }

    SpectrumResult {
        frequencies_hz,
        v_rms,
        v_db,
    }
}
