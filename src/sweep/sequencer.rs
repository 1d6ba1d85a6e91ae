use log::{info, warn};

use crate::config::{FreqScale, SweepConfig};
use crate::scpi::{
    AcquireType, Channel, Coupling, Generator, Scope, ScpiError, ScpiLink, TriggerMode, Waveform,
};
use crate::sweep::sampler::{sample_point, MIN_DETECTABLE_VPP};
use crate::sweep::timebase::optimal_timebase;
use crate::sweep::{InterruptFlag, Pacing};

/// Vertical scale pinned for the whole sweep. Adaptive per-point ranging
/// proved unstable on this instrument, so channel 1 is fixed here and
/// channel 2's estimate is pinned to the same value.
const FIXED_VOLTS_PER_DIV: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepPoint {
    pub frequency_hz: f64,
    pub magnitude_db: f64,
    pub phase_deg: f64,
}

/// Everything a finished (or interrupted) sweep hands to export/plot.
#[derive(Clone, Debug, Default)]
pub struct SweepResult {
    pub points: Vec<SweepPoint>,
    pub interrupted: bool,
}

/// Target frequencies for a sweep: log-uniform or uniform spacing between
/// start and stop inclusive.
pub fn frequency_list(config: &SweepConfig) -> Vec<f64> {
    let n = config.num_points as usize;
    if n == 1 {
        return vec![config.f_start_hz];
    }
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            match config.scale {
                FreqScale::Log => {
                    let la = config.f_start_hz.log10();
                    let lb = config.f_stop_hz.log10();
                    10f64.powf(la + (lb - la) * t)
                }
                FreqScale::Lin => config.f_start_hz + (config.f_stop_hz - config.f_start_hz) * t,
            }
        })
        .collect()
}

/// Gain of channel 2 over channel 1 in dB, with the channel 1 amplitude
/// clamped up to the detectable floor so a vanishing input cannot blow up
/// the ratio.
pub fn magnitude_db(vpp1: f64, vpp2: f64) -> f64 {
    20.0 * (vpp2 / vpp1.max(MIN_DETECTABLE_VPP)).log10()
}

/// Phase implied by the falling-edge delay at the given frequency, mapped
/// into the half-open interval (-180, 180].
pub fn phase_degrees(fall_delay_secs: f64, frequency_hz: f64) -> f64 {
    let raw = (-fall_delay_secs * frequency_hz * 360.0).rem_euclid(360.0);
    if raw > 180.0 {
        raw - 360.0
    } else {
        raw
    }
}

/// Run the whole sweep: global configuration, the per-point
/// stop/reconfigure/measure cycle, and unconditional instrument cleanup.
///
/// Failed points are skipped, an interrupt ends the sweep early with the
/// points collected so far, and a transport failure aborts with `Err`;
/// in every case the generator output is switched off and the scope is
/// put back into automatic trigger and sample acquisition.
pub fn run_sweep<G, S>(
    gen: &mut Generator<G>,
    scope: &mut Scope<S>,
    config: &SweepConfig,
    pacing: &Pacing,
    interrupt: &InterruptFlag,
) -> Result<SweepResult, ScpiError>
where
    G: ScpiLink,
    S: ScpiLink,
{
    let outcome = drive_sweep(gen, scope, config, pacing, interrupt);

    // Unconditional cleanup: leave the bench safe no matter how we got
    // here. Each step is best-effort since the link may already be gone.
    if gen.set_output(false).is_ok() {
        info!("generator output switched off");
    }
    let _ = scope.set_acquire_type(AcquireType::Sample);
    let _ = scope.set_trigger_mode(TriggerMode::Auto);

    outcome
}

fn drive_sweep<G, S>(
    gen: &mut Generator<G>,
    scope: &mut Scope<S>,
    config: &SweepConfig,
    pacing: &Pacing,
    interrupt: &InterruptFlag,
) -> Result<SweepResult, ScpiError>
where
    G: ScpiLink,
    S: ScpiLink,
{
    configure_bench(gen, scope, config, pacing)?;

    let frequencies = frequency_list(config);
    let mut result = SweepResult::default();

    info!("starting sweep");
    println!(
        "\nFixing CH1 and CH2 at {FIXED_VOLTS_PER_DIV} V/div for the whole sweep..."
    );
    scope.set_channel_scale(Channel::Ch1, FIXED_VOLTS_PER_DIV)?;
    pacing.pause(pacing.scale);
    scope.set_trigger_edge_source(Channel::Ch1)?;
    pacing.pause(pacing.command);
    scope.set_channel_scale(Channel::Ch2, FIXED_VOLTS_PER_DIV)?;
    pacing.pause(pacing.scale);

    // Offsets drift when scales change; re-zero before measuring.
    scope.set_channel_offset(Channel::Ch1, 0)?;
    pacing.pause(pacing.command);
    scope.set_channel_offset(Channel::Ch2, 0)?;
    pacing.pause(pacing.command);

    // Free-running trigger tolerates noisy and untriggerable signals
    // without stalling the sweep.
    scope.set_trigger_mode(TriggerMode::Auto)?;
    pacing.pause(pacing.command);
    scope.run()?;
    pacing.pause(pacing.run_stabilize);

    for (i, &freq) in frequencies.iter().enumerate() {
        if interrupt.is_set() {
            println!("\n--- Sweep interrupted, keeping {} points ---", result.points.len());
            result.interrupted = true;
            break;
        }
        if freq <= 0.0 {
            warn!("skipping invalid frequency {freq} Hz");
            continue;
        }

        println!(
            "\nPoint {}/{} - frequency {freq:.2} Hz",
            i + 1,
            frequencies.len()
        );
        gen.set_frequency_hz(freq)?;

        // Let the new tone propagate: three periods, bounded both ways.
        let period = 1.0 / freq;
        pacing.pause(pacing.dynamic((period * 3.0).max(0.5).min(5.0)));

        // Configuring while running is unreliable, so stop first.
        scope.stop()?;
        pacing.pause(pacing.stop);

        let timebase = optimal_timebase(freq);
        info!("timebase {} for {freq:.2} Hz", timebase.token);
        scope.set_timebase_scale(timebase.token)?;
        pacing.pause(pacing.scale);

        let Some(avg) = sample_point(scope, config.num_averages, timebase.seconds, pacing)? else {
            warn!("point {}/{} failed, skipping", i + 1, frequencies.len());
            continue;
        };

        let magnitude = magnitude_db(avg.vpp1, avg.vpp2);
        let phase = phase_degrees(avg.fall_delay_secs, freq);
        println!("  -> magnitude {magnitude:.2} dB | phase {phase:.2} deg");
        result.points.push(SweepPoint {
            frequency_hz: freq,
            magnitude_db: magnitude,
            phase_deg: phase,
        });
    }

    Ok(result)
}

/// One-time bench setup before the sweep, each command paced so the
/// firmware commits it before the next arrives.
fn configure_bench<G, S>(
    gen: &mut Generator<G>,
    scope: &mut Scope<S>,
    config: &SweepConfig,
    pacing: &Pacing,
) -> Result<(), ScpiError>
where
    G: ScpiLink,
    S: ScpiLink,
{
    info!("configuring generator");
    gen.set_shape(Waveform::Sine)?;
    pacing.pause(pacing.command);
    gen.set_amplitude_vpp(config.gen_amplitude_vpp)?;
    pacing.pause(pacing.command);
    gen.set_high_impedance()?;
    pacing.pause(pacing.command);
    gen.set_offset_volts(0.0)?;
    pacing.pause(pacing.command);

    info!("configuring oscilloscope");
    scope.set_channel_display(Channel::Ch1, true)?;
    pacing.pause(pacing.command);
    scope.set_channel_display(Channel::Ch2, true)?;
    pacing.pause(pacing.command);
    scope.set_coupling(Channel::Ch1, Coupling::Dc)?;
    pacing.pause(pacing.command);
    scope.set_coupling(Channel::Ch2, Coupling::Dc)?;
    pacing.pause(pacing.command);
    scope.set_probe_attenuation(Channel::Ch1, 1)?;
    pacing.pause(pacing.command);
    scope.set_acquire_type(AcquireType::Sample)?;
    pacing.pause(pacing.command);
    scope.set_channel_offset(Channel::Ch1, 0)?;
    pacing.pause(pacing.command);
    scope.set_channel_offset(Channel::Ch2, 0)?;
    pacing.pause(pacing.command);

    gen.set_output(true)?;
    pacing.pause(pacing.command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scpi::SimLink;
    use std::io;

    fn test_config() -> SweepConfig {
        SweepConfig {
            f_start_hz: 1000.0,
            f_stop_hz: 10_000.0,
            num_points: 3,
            scale: FreqScale::Log,
            num_averages: 2,
            ..SweepConfig::default()
        }
    }

    fn measuring_scope() -> Scope<SimLink> {
        let mut link = SimLink::new();
        link.set_reply(":MEASure1:PKPK?", "1.0");
        link.set_reply(":MEASure2:PKPK?", "0.5");
        link.set_reply(":MEASure1:FDELay?", "1e-5");
        Scope::new(link)
    }

    #[test]
    fn log_frequency_list_hits_both_endpoints() {
        let config = SweepConfig {
            f_start_hz: 10.0,
            f_stop_hz: 100_000.0,
            num_points: 17,
            scale: FreqScale::Log,
            ..SweepConfig::default()
        };
        let freqs = frequency_list(&config);
        assert_eq!(freqs.len(), 17);
        assert!((freqs[0] - 10.0).abs() < 1e-9);
        assert!((freqs[16] - 100_000.0).abs() < 1e-6);
        for pair in freqs.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn linear_frequency_list_is_evenly_spaced() {
        let config = SweepConfig {
            f_start_hz: 0.0,
            f_stop_hz: 100.0,
            num_points: 5,
            scale: FreqScale::Lin,
            ..SweepConfig::default()
        };
        let freqs = frequency_list(&config);
        assert_eq!(freqs, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn single_point_list_is_the_start_frequency() {
        let config = SweepConfig {
            num_points: 1,
            ..test_config()
        };
        assert_eq!(frequency_list(&config), vec![1000.0]);
    }

    #[test]
    fn phase_maps_into_half_open_interval() {
        // raw 180 degrees stays 180.
        let phase = phase_degrees(-0.5, 1.0);
        assert!((phase - 180.0).abs() < 1e-9);
        // raw 181 degrees wraps to -179.
        let phase = phase_degrees(-181.0 / 360.0, 1.0);
        assert!((phase - (-179.0)).abs() < 1e-9);
    }

    #[test]
    fn magnitude_clamps_the_primary_amplitude() {
        let db = magnitude_db(0.0, 1.0);
        assert!(db.is_finite());
        assert!((db - 180.0).abs() < 1e-9);
        // Above the floor the plain ratio applies.
        assert!((magnitude_db(1.0, 0.5) - (-6.020599913279624)).abs() < 1e-9);
    }

    #[test]
    fn sweep_measures_every_point_with_constant_replies() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        let config = test_config();
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &config,
            &Pacing::none(),
            &InterruptFlag::new(),
        )
        .unwrap();

        assert_eq!(result.points.len(), 3);
        assert!(!result.interrupted);
        let expected_freqs = [1000.0, 1000.0 * 10f64.sqrt(), 10_000.0];
        for (point, expected) in result.points.iter().zip(expected_freqs) {
            assert!((point.frequency_hz - expected).abs() / expected < 1e-12);
            assert!((point.magnitude_db - (-6.0206)).abs() < 1e-3);
            let expected_phase = phase_degrees(1e-5, point.frequency_hz);
            assert!((point.phase_deg - expected_phase).abs() < 1e-9);
        }
    }

    #[test]
    fn overloaded_repetition_is_excluded_without_aborting() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        scope.link_mut().push_reply(":MEASure2:PKPK?", "2e30");
        let config = SweepConfig {
            num_points: 1,
            ..test_config()
        };
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &config,
            &Pacing::none(),
            &InterruptFlag::new(),
        )
        .unwrap();
        // The surviving repetition still reads 0.5 V, so the point lands
        // at the usual -6 dB.
        assert_eq!(result.points.len(), 1);
        assert!((result.points[0].magnitude_db - (-6.0206)).abs() < 1e-3);
    }

    #[test]
    fn failed_points_are_skipped_without_placeholders() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        // Both repetitions of the first point overload; the other two
        // points measure normally.
        for _ in 0..2 {
            scope.link_mut().push_reply(":MEASure1:PKPK?", "2e30");
        }
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &test_config(),
            &Pacing::none(),
            &InterruptFlag::new(),
        )
        .unwrap();
        assert_eq!(result.points.len(), 2);
        assert!(result.points[0].frequency_hz > 1000.0);
    }

    #[test]
    fn non_positive_frequencies_are_never_sent_to_the_generator() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        let config = SweepConfig {
            f_start_hz: -100.0,
            f_stop_hz: 100.0,
            num_points: 2,
            scale: FreqScale::Lin,
            ..SweepConfig::default()
        };
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &config,
            &Pacing::none(),
            &InterruptFlag::new(),
        )
        .unwrap();
        assert_eq!(result.points.len(), 1);
        let freq_commands: Vec<_> = gen
            .into_link()
            .sent
            .iter()
            .filter(|c| c.contains("FREQuency:FIXed"))
            .cloned()
            .collect();
        assert_eq!(freq_commands, vec!["SOURce1:FREQuency:FIXed 100Hz"]);
    }

    #[test]
    fn cleanup_runs_after_a_successful_sweep() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        run_sweep(
            &mut gen,
            &mut scope,
            &test_config(),
            &Pacing::none(),
            &InterruptFlag::new(),
        )
        .unwrap();
        assert_eq!(gen.into_link().sent.last().unwrap(), "OUTPut1:STATE OFF");
        let scope_sent = scope.into_link().sent;
        let tail = &scope_sent[scope_sent.len() - 2..];
        assert_eq!(tail, [":ACQuire:TYPE SAMPle", ":TRIGger:MODE AUTO"]);
    }

    #[test]
    fn interrupt_keeps_collected_points_and_still_cleans_up() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = measuring_scope();
        let interrupt = InterruptFlag::new();
        interrupt.set();
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &test_config(),
            &Pacing::none(),
            &interrupt,
        )
        .unwrap();
        assert!(result.interrupted);
        assert!(result.points.is_empty());
        assert_eq!(gen.into_link().sent.last().unwrap(), "OUTPut1:STATE OFF");
    }

    /// Link whose queries fail like a dropped connection.
    struct DeadLink;

    impl ScpiLink for DeadLink {
        fn send(&mut self, _command: &str) -> Result<(), ScpiError> {
            Ok(())
        }
        fn query(&mut self, _command: &str) -> Result<String, ScpiError> {
            Err(ScpiError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link down",
            )))
        }
        fn query_binary(&mut self, _command: &str) -> Result<Vec<u8>, ScpiError> {
            Err(ScpiError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link down",
            )))
        }
    }

    #[test]
    fn transport_failure_aborts_but_generator_is_switched_off() {
        let mut gen = Generator::new(SimLink::new());
        let mut scope = Scope::new(DeadLink);
        let result = run_sweep(
            &mut gen,
            &mut scope,
            &test_config(),
            &Pacing::none(),
            &InterruptFlag::new(),
        );
        assert!(result.is_err());
        assert_eq!(gen.into_link().sent.last().unwrap(), "OUTPut1:STATE OFF");
    }
}
