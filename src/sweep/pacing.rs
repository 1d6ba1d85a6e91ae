use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Settle delays inserted after instrument commands. The firmware applies
/// commands asynchronously and silently misapplies rapid-fire settings, so
/// every class of command gets its own pause. `Pacing::none()` zeroes them
/// for the simulator and for tests.
#[derive(Clone, Debug)]
pub struct Pacing {
    /// After an ordinary set command.
    pub command: Duration,
    /// After registering a measurement item.
    pub measure_setup: Duration,
    /// After a vertical-scale or timebase change, the least stable
    /// operation on this instrument.
    pub scale: Duration,
    /// After STOP, before reconfiguring.
    pub stop: Duration,
    /// After RUN, before the first measurement.
    pub run_stabilize: Duration,
    /// After an instrument reset.
    pub reset: Duration,
    /// Spectrum stop/timebase settle.
    pub reconfigure: Duration,
    /// Before downloading the ADC buffer.
    pub buffer_ready: Duration,
    /// Between polling attempts.
    pub poll_interval: Duration,
    /// Polling give-up per measurement read.
    pub poll_timeout: Duration,
    /// Whether period- and timebase-proportional waits are honored.
    dynamic_waits: bool,
}

impl Pacing {
    pub fn instrument() -> Self {
        Self {
            command: Duration::from_millis(300),
            measure_setup: Duration::from_millis(200),
            scale: Duration::from_secs(2),
            stop: Duration::from_millis(1500),
            run_stabilize: Duration::from_secs(3),
            reset: Duration::from_secs(2),
            reconfigure: Duration::from_secs(1),
            buffer_ready: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
            poll_timeout: Duration::from_secs(10),
            dynamic_waits: true,
        }
    }

    pub fn none() -> Self {
        Self {
            command: Duration::ZERO,
            measure_setup: Duration::ZERO,
            scale: Duration::ZERO,
            stop: Duration::ZERO,
            run_stabilize: Duration::ZERO,
            reset: Duration::ZERO,
            reconfigure: Duration::ZERO,
            buffer_ready: Duration::ZERO,
            poll_interval: Duration::ZERO,
            poll_timeout: Duration::ZERO,
            dynamic_waits: false,
        }
    }

    pub fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    /// A wait whose length depends on the signal, e.g. a few periods or an
    /// acquisition fill. Collapses to zero when dynamic waits are off.
    pub fn dynamic(&self, secs: f64) -> Duration {
        if self.dynamic_waits {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            Duration::ZERO
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::instrument()
    }
}

/// Shared stop request, set from the Ctrl-C handler thread and read by the
/// sequencers between instrument transactions.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this flag for the rest of the process lifetime.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            eprintln!("\ninterrupt requested, finishing the current step...");
            flag.set();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_pacing_collapses_dynamic_waits() {
        let pacing = Pacing::none();
        assert_eq!(pacing.dynamic(5.0), Duration::ZERO);
        assert_eq!(pacing.poll_timeout, Duration::ZERO);
    }

    #[test]
    fn interrupt_flag_is_shared_between_clones() {
        let flag = InterruptFlag::new();
        let other = flag.clone();
        assert!(!other.is_set());
        flag.set();
        assert!(other.is_set());
    }
}
