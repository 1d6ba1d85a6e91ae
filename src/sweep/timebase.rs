/// One entry of the instrument's enumerated horizontal scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timebase {
    pub seconds: f64,
    pub token: &'static str,
}

/// Horizontal divisions across the screen.
pub const HORIZONTAL_DIVISIONS: f64 = 10.0;

/// Every timebase the instrument accepts, ascending.
pub const TIMEBASES: [Timebase; 32] = [
    Timebase { seconds: 5e-9, token: "5ns" },
    Timebase { seconds: 10e-9, token: "10ns" },
    Timebase { seconds: 20e-9, token: "20ns" },
    Timebase { seconds: 50e-9, token: "50ns" },
    Timebase { seconds: 100e-9, token: "100ns" },
    Timebase { seconds: 200e-9, token: "200ns" },
    Timebase { seconds: 500e-9, token: "500ns" },
    Timebase { seconds: 1e-6, token: "1us" },
    Timebase { seconds: 2e-6, token: "2us" },
    Timebase { seconds: 5e-6, token: "5us" },
    Timebase { seconds: 10e-6, token: "10us" },
    Timebase { seconds: 20e-6, token: "20us" },
    Timebase { seconds: 50e-6, token: "50us" },
    Timebase { seconds: 100e-6, token: "100us" },
    Timebase { seconds: 200e-6, token: "200us" },
    Timebase { seconds: 500e-6, token: "500us" },
    Timebase { seconds: 1e-3, token: "1ms" },
    Timebase { seconds: 2e-3, token: "2ms" },
    Timebase { seconds: 5e-3, token: "5ms" },
    Timebase { seconds: 10e-3, token: "10ms" },
    Timebase { seconds: 20e-3, token: "20ms" },
    Timebase { seconds: 50e-3, token: "50ms" },
    Timebase { seconds: 100e-3, token: "100ms" },
    Timebase { seconds: 200e-3, token: "200ms" },
    Timebase { seconds: 500e-3, token: "500ms" },
    Timebase { seconds: 1.0, token: "1s" },
    Timebase { seconds: 2.0, token: "2s" },
    Timebase { seconds: 5.0, token: "5s" },
    Timebase { seconds: 10.0, token: "10s" },
    Timebase { seconds: 20.0, token: "20s" },
    Timebase { seconds: 50.0, token: "50s" },
    Timebase { seconds: 100.0, token: "100s" },
];

fn smallest_at_least(ideal_secs_per_div: f64) -> Timebase {
    for tb in TIMEBASES {
        if tb.seconds >= ideal_secs_per_div {
            return tb;
        }
    }
    TIMEBASES[TIMEBASES.len() - 1]
}

/// Timebase showing about two signal periods across the screen: the
/// smallest entry whose per-division time covers `2 * period / 10`,
/// clamped to the largest entry for very low frequencies. Non-positive
/// frequencies fall back to 1 s/div.
pub fn optimal_timebase(freq_hz: f64) -> Timebase {
    if freq_hz <= 0.0 {
        return Timebase { seconds: 1.0, token: "1s" };
    }
    let period = 1.0 / freq_hz;
    smallest_at_least(period * 2.0 / HORIZONTAL_DIVISIONS)
}

/// Timebase giving at least the requested frequency resolution over a full
/// screen capture. Same selection policy, driven by resolution instead of
/// period count.
pub fn timebase_for_resolution(resolution_hz: f64) -> Timebase {
    smallest_at_least(1.0 / (resolution_hz * HORIZONTAL_DIVISIONS))
}
