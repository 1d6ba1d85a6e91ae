pub mod error;
pub mod generator;
pub mod link;
pub mod scope;
pub mod sim;
pub mod socket;

pub use error::ScpiError;
pub use generator::{Generator, Waveform};
pub use link::ScpiLink;
pub use scope::{AcquireType, Channel, Coupling, MeasureItem, Scope, TriggerMode, ADC_SAMPLE_COUNT};
pub use sim::SimLink;
pub use socket::SocketLink;
