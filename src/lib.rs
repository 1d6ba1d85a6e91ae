pub mod config;
pub mod export;
pub mod plot;
pub mod prompt;
pub mod scpi;
pub mod spectrum;
pub mod sweep;

pub use config::{SpectrumConfig, SweepConfig};
pub use spectrum::{run_spectrum_analysis, SpectrumResult};
pub use sweep::{run_sweep, SweepResult};
