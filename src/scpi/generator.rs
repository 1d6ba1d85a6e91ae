use crate::scpi::{ScpiError, ScpiLink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Ramp,
}

impl Waveform {
    fn scpi(self) -> &'static str {
        match self {
            Waveform::Sine => "SINusoid",
            Waveform::Square => "SQUare",
            Waveform::Ramp => "RAMP",
        }
    }
}

/// Waveform generator command dictionary, channel 1 output only.
pub struct Generator<L: ScpiLink> {
    link: L,
}

impl<L: ScpiLink> Generator<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn identity(&mut self) -> Result<String, ScpiError> {
        self.link.query("*IDN?")
    }

    pub fn set_shape(&mut self, shape: Waveform) -> Result<(), ScpiError> {
        self.link
            .send(&format!("SOURce1:FUNCtion:SHAPE {}", shape.scpi()))
    }

    pub fn set_amplitude_vpp(&mut self, vpp: f64) -> Result<(), ScpiError> {
        self.link
            .send(&format!("SOURce1:VOLTage:AMPLitude {vpp}Vpp"))
    }

    pub fn set_offset_volts(&mut self, volts: f64) -> Result<(), ScpiError> {
        self.link
            .send(&format!("SOURce1:VOLTage:OFFSet {volts}V"))
    }

    /// High-impedance load setting, correct when driving a scope probe.
    pub fn set_high_impedance(&mut self) -> Result<(), ScpiError> {
        self.link.send("OUTPut1:IMPedance INFinity")
    }

    pub fn set_output(&mut self, on: bool) -> Result<(), ScpiError> {
        let state = if on { "ON" } else { "OFF" };
        self.link.send(&format!("OUTPut1:STATE {state}"))
    }

    pub fn set_frequency_hz(&mut self, freq_hz: f64) -> Result<(), ScpiError> {
        self.link
            .send(&format!("SOURce1:FREQuency:FIXed {freq_hz}Hz"))
    }
}
