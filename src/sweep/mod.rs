pub mod pacing;
pub mod poll;
pub mod sampler;
pub mod sequencer;
pub mod timebase;

pub use pacing::{InterruptFlag, Pacing};
pub use sampler::{AveragedPoint, MIN_DETECTABLE_VPP, OVERLOAD_SENTINEL};
pub use sequencer::{frequency_list, magnitude_db, phase_degrees, run_sweep, SweepPoint, SweepResult};
pub use timebase::{optimal_timebase, timebase_for_resolution, Timebase, HORIZONTAL_DIVISIONS};
