use log::{info, warn};

use crate::scpi::{Channel, MeasureItem, Scope, ScpiError, ScpiLink};
use crate::sweep::poll::poll_measurement;
use crate::sweep::Pacing;

/// Any reading at or beyond this magnitude means the instrument could not
/// resolve the value (signal out of range).
pub const OVERLOAD_SENTINEL: f64 = 1e30;

/// Smallest peak-to-peak voltage the instrument can meaningfully report.
pub const MIN_DETECTABLE_VPP: f64 = 1e-9;

/// Software-averaged reading for one sweep point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AveragedPoint {
    pub vpp1: f64,
    pub vpp2: f64,
    pub fall_delay_secs: f64,
}

/// Take `num_averages` repetitions of (vpp1, vpp2, fall delay) and return
/// their means over the repetitions that produced usable readings.
///
/// A repetition is dropped whole if any of its three reads is missing,
/// any amplitude or the delay magnitude hits the overload sentinel, or the
/// channel 1 amplitude is below the detectable floor; dropped repetitions
/// contribute nothing to any of the three means. `Ok(None)` when every
/// repetition was dropped.
pub fn sample_point<L: ScpiLink>(
    scope: &mut Scope<L>,
    num_averages: u32,
    timebase_secs: f64,
    pacing: &Pacing,
) -> Result<Option<AveragedPoint>, ScpiError> {
    register_measurements(scope, pacing)?;

    // Two divisions of fresh signal, at least half a second, at most five.
    let wait_per_reading = (timebase_secs * 2.0).max(0.5).min(5.0);

    let mut sums = [0.0f64; 3];
    let mut accepted = 0u32;

    info!("acquiring {num_averages} software averages");
    for rep in 1..=num_averages {
        pacing.pause(pacing.dynamic(wait_per_reading));

        let vpp1 = poll_measurement(
            || scope.read_measurement(Channel::Ch1, MeasureItem::PeakToPeak),
            pacing,
        )?;
        let vpp2 = poll_measurement(
            || scope.read_measurement(Channel::Ch2, MeasureItem::PeakToPeak),
            pacing,
        )?;
        let delay = poll_measurement(
            || scope.read_measurement(Channel::Ch1, MeasureItem::FallDelay),
            pacing,
        )?;

        let (Some(vpp1), Some(vpp2), Some(delay)) = (vpp1, vpp2, delay) else {
            warn!("average {rep}/{num_averages}: read timed out, dropping repetition");
            continue;
        };
        if vpp1.abs() >= OVERLOAD_SENTINEL
            || vpp2.abs() >= OVERLOAD_SENTINEL
            || delay.abs() >= OVERLOAD_SENTINEL
        {
            warn!("average {rep}/{num_averages}: overload, dropping repetition");
            continue;
        }
        if vpp1 < MIN_DETECTABLE_VPP {
            warn!("average {rep}/{num_averages}: vpp1 below detectable floor ({vpp1:e}), dropping repetition");
            continue;
        }

        sums[0] += vpp1;
        sums[1] += vpp2;
        sums[2] += delay;
        accepted += 1;
    }

    if accepted == 0 {
        return Ok(None);
    }
    let n = accepted as f64;
    Ok(Some(AveragedPoint {
        vpp1: sums[0] / n,
        vpp2: sums[1] / n,
        fall_delay_secs: sums[2] / n,
    }))
}

/// Replace the instrument's active measurement set with exactly the three
/// items the sweep needs. The instrument commits each registration
/// asynchronously, hence the pause after every step.
fn register_measurements<L: ScpiLink>(
    scope: &mut Scope<L>,
    pacing: &Pacing,
) -> Result<(), ScpiError> {
    scope.clear_measurements()?;
    pacing.pause(pacing.measure_setup);
    scope.set_measure_source(Channel::Ch1)?;
    pacing.pause(pacing.measure_setup);
    scope.add_measurement(MeasureItem::PeakToPeak)?;
    pacing.pause(pacing.measure_setup);
    scope.add_measurement(MeasureItem::FallDelay)?;
    pacing.pause(pacing.measure_setup);
    scope.set_measure_source(Channel::Ch2)?;
    pacing.pause(pacing.measure_setup);
    scope.add_measurement(MeasureItem::PeakToPeak)?;
    pacing.pause(pacing.measure_setup);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scpi::SimLink;

    fn scope_with(replies: &[(&str, &str)]) -> Scope<SimLink> {
        let mut link = SimLink::new();
        for (pattern, reply) in replies {
            link.set_reply(pattern, reply);
        }
        Scope::new(link)
    }

    #[test]
    fn averages_over_all_repetitions_when_all_are_valid() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "1.0"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        let avg = sample_point(&mut scope, 3, 1e-3, &Pacing::none())
            .unwrap()
            .unwrap();
        assert_eq!(avg.vpp1, 1.0);
        assert_eq!(avg.vpp2, 0.5);
        assert_eq!(avg.fall_delay_secs, 1e-5);
    }

    #[test]
    fn overloaded_repetition_is_excluded_from_every_mean() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "1.0"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        // First repetition reads a 2e30 overload on channel 2; its channel 1
        // and delay readings must not leak into the averages either.
        scope.link_mut().push_reply(":MEASure1:PKPK?", "4.0");
        scope.link_mut().push_reply(":MEASure2:PKPK?", "2e30");
        let avg = sample_point(&mut scope, 2, 1e-3, &Pacing::none())
            .unwrap()
            .unwrap();
        assert_eq!(avg.vpp1, 1.0);
        assert_eq!(avg.vpp2, 0.5);
    }

    #[test]
    fn all_invalid_repetitions_fail_the_point() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "2e30"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        let avg = sample_point(&mut scope, 3, 1e-3, &Pacing::none()).unwrap();
        assert!(avg.is_none());
    }

    #[test]
    fn sub_floor_primary_amplitude_drops_the_repetition() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "1e-12"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        let avg = sample_point(&mut scope, 2, 1e-3, &Pacing::none()).unwrap();
        assert!(avg.is_none());
    }

    #[test]
    fn missing_reading_drops_only_that_repetition() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "1.0"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        // One garbage delay reply; with a zero poll timeout that repetition
        // reports no value and is dropped.
        scope.link_mut().push_reply(":MEASure1:FDELay?", "****");
        let avg = sample_point(&mut scope, 2, 1e-3, &Pacing::none())
            .unwrap()
            .unwrap();
        assert_eq!(avg.fall_delay_secs, 1e-5);
    }

    #[test]
    fn registers_exactly_the_needed_measurement_set() {
        let mut scope = scope_with(&[
            (":MEASure1:PKPK?", "1.0"),
            (":MEASure2:PKPK?", "0.5"),
            (":MEASure1:FDELay?", "1e-5"),
        ]);
        sample_point(&mut scope, 1, 1e-3, &Pacing::none()).unwrap();
        let sent = scope.into_link().sent;
        assert_eq!(
            sent,
            vec![
                ":MEASure:DELete ALL",
                ":MEASure:SOURce CH1",
                ":MEASure:ADD PKPK",
                ":MEASure:ADD FDELay",
                ":MEASure:SOURce CH2",
                ":MEASure:ADD PKPK",
            ]
        );
    }
}
