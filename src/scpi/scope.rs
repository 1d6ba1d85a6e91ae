use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::scpi::{ScpiError, ScpiLink};

/// Length of one raw ADC transfer, fixed by the instrument.
pub const ADC_SAMPLE_COUNT: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Ch1,
    Ch2,
}

impl Channel {
    pub fn number(self) -> u8 {
        match self {
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Channel::Ch1),
            2 => Some(Channel::Ch2),
            _ => None,
        }
    }

    /// Short form used by trigger/measure/ADC commands, e.g. "CH1".
    fn short(self) -> &'static str {
        match self {
            Channel::Ch1 => "CH1",
            Channel::Ch2 => "CH2",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.number())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coupling {
    Ac,
    Dc,
}

impl Coupling {
    fn scpi(self) -> &'static str {
        match self {
            Coupling::Ac => "AC",
            Coupling::Dc => "DC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Auto,
    Normal,
    Single,
}

impl TriggerMode {
    fn scpi(self) -> &'static str {
        match self {
            TriggerMode::Auto => "AUTO",
            TriggerMode::Normal => "NORMal",
            TriggerMode::Single => "SINGle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireType {
    Sample,
    Peak,
    Average,
}

impl AcquireType {
    fn scpi(self) -> &'static str {
        match self {
            AcquireType::Sample => "SAMPle",
            AcquireType::Peak => "PEAK",
            AcquireType::Average => "AVERage",
        }
    }
}

/// Automatic measurement items the sequencers register and read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasureItem {
    /// Peak-to-peak voltage.
    PeakToPeak,
    /// Falling-edge delay between channel 1 and channel 2.
    FallDelay,
}

impl MeasureItem {
    fn scpi(self) -> &'static str {
        match self {
            MeasureItem::PeakToPeak => "PKPK",
            MeasureItem::FallDelay => "FDELay",
        }
    }
}

/// Oscilloscope command dictionary. One flat capability surface per
/// instrument; channel-addressed commands take a `Channel` argument instead
/// of going through per-channel sub-objects.
pub struct Scope<L: ScpiLink> {
    link: L,
}

impl<L: ScpiLink> Scope<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Consume the wrapper and hand back the underlying link.
    pub fn into_link(self) -> L {
        self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn identity(&mut self) -> Result<String, ScpiError> {
        self.link.query("*IDN?")
    }

    pub fn reset(&mut self) -> Result<(), ScpiError> {
        self.link.send("*RST")
    }

    pub fn run(&mut self) -> Result<(), ScpiError> {
        self.link.send("*RUN")
    }

    pub fn stop(&mut self) -> Result<(), ScpiError> {
        self.link.send("*STOP")
    }

    // --- channel group ---

    pub fn set_channel_display(&mut self, ch: Channel, on: bool) -> Result<(), ScpiError> {
        let state = if on { "ON" } else { "OFF" };
        self.link
            .send(&format!(":CHANnel{}:DISPlay {state}", ch.number()))
    }

    pub fn set_coupling(&mut self, ch: Channel, coupling: Coupling) -> Result<(), ScpiError> {
        self.link
            .send(&format!(":CHANnel{}:COUPling {}", ch.number(), coupling.scpi()))
    }

    /// Probe attenuation as the instrument names it, e.g. "X1" or "X10".
    pub fn set_probe_attenuation(&mut self, ch: Channel, factor: u32) -> Result<(), ScpiError> {
        self.link
            .send(&format!(":CHANnel{}:PROBe X{factor}", ch.number()))
    }

    pub fn probe_attenuation(&mut self, ch: Channel) -> Result<u32, ScpiError> {
        let cmd = format!(":CHANnel{}:PROBe?", ch.number());
        let reply = self.link.query(&cmd)?;
        reply
            .trim()
            .to_ascii_uppercase()
            .trim_start_matches('X')
            .parse()
            .map_err(|_| ScpiError::Reply { command: cmd, reply })
    }

    /// Vertical scale in volts per division.
    pub fn set_channel_scale(&mut self, ch: Channel, volts_per_div: f64) -> Result<(), ScpiError> {
        self.link
            .send(&format!(":CHANnel{}:SCALe {volts_per_div}", ch.number()))
    }

    pub fn channel_scale(&mut self, ch: Channel) -> Result<f64, ScpiError> {
        let cmd = format!(":CHANnel{}:SCALe?", ch.number());
        let reply = self.link.query(&cmd)?;
        reply
            .trim()
            .parse()
            .map_err(|_| ScpiError::Reply { command: cmd, reply })
    }

    /// Vertical offset in screen pixels; 0 centers the trace.
    pub fn set_channel_offset(&mut self, ch: Channel, offset: i32) -> Result<(), ScpiError> {
        self.link
            .send(&format!(":CHANnel{}:OFFSet {offset}", ch.number()))
    }

    // --- timebase group ---

    /// Horizontal scale as the instrument's enumerated token, e.g. "200us".
    pub fn set_timebase_scale(&mut self, token: &str) -> Result<(), ScpiError> {
        self.link.send(&format!(":TIMebase:SCALe {token}"))
    }

    pub fn timebase_scale(&mut self) -> Result<String, ScpiError> {
        self.link.query(":TIMebase:SCALe?")
    }

    // --- acquisition group ---

    pub fn set_acquire_type(&mut self, acq: AcquireType) -> Result<(), ScpiError> {
        self.link.send(&format!(":ACQuire:TYPE {}", acq.scpi()))
    }

    // --- trigger group ---

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), ScpiError> {
        self.link.send(&format!(":TRIGger:MODE {}", mode.scpi()))
    }

    pub fn set_trigger_edge_source(&mut self, ch: Channel) -> Result<(), ScpiError> {
        self.link
            .send(&format!(":TRIGger:SINGle:EDGE:SOURce {}", ch.short()))
    }

    // --- measurement group ---

    pub fn clear_measurements(&mut self) -> Result<(), ScpiError> {
        self.link.send(":MEASure:DELete ALL")
    }

    pub fn set_measure_source(&mut self, ch: Channel) -> Result<(), ScpiError> {
        self.link.send(&format!(":MEASure:SOURce {}", ch.short()))
    }

    pub fn add_measurement(&mut self, item: MeasureItem) -> Result<(), ScpiError> {
        self.link.send(&format!(":MEASure:ADD {}", item.scpi()))
    }

    /// Raw reply for a registered measurement; the instrument answers with a
    /// number once the value is computed and with placeholder text before
    /// that, so parsing is left to the polling reader.
    pub fn read_measurement(&mut self, ch: Channel, item: MeasureItem) -> Result<String, ScpiError> {
        self.link
            .query(&format!(":MEASure{}:{}?", ch.number(), item.scpi()))
    }

    // --- raw sample download ---

    /// One screenful of raw ADC codes for a channel. Short transfers are an
    /// error so the caller can discard the repetition.
    pub fn adc_data(&mut self, ch: Channel) -> Result<Vec<u8>, ScpiError> {
        let mut data = self.link.query_binary(&format!("*ADC? {}", ch.short()))?;
        if data.len() < ADC_SAMPLE_COUNT {
            return Err(ScpiError::ShortTransfer {
                got: data.len(),
                expected: ADC_SAMPLE_COUNT,
            });
        }
        if data.len() > ADC_SAMPLE_COUNT {
            debug!("trimming ADC transfer from {} to {ADC_SAMPLE_COUNT} bytes", data.len());
            data.truncate(ADC_SAMPLE_COUNT);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scpi::SimLink;

    #[test]
    fn channel_commands_use_long_form_addressing() {
        let mut scope = Scope::new(SimLink::new());
        scope.set_channel_display(Channel::Ch1, true).unwrap();
        scope.set_coupling(Channel::Ch2, Coupling::Dc).unwrap();
        scope.set_channel_scale(Channel::Ch1, 1.0).unwrap();
        scope.set_channel_offset(Channel::Ch2, 0).unwrap();
        let sent = scope.into_link().sent;
        assert_eq!(
            sent,
            vec![
                ":CHANnel1:DISPlay ON",
                ":CHANnel2:COUPling DC",
                ":CHANnel1:SCALe 1",
                ":CHANnel2:OFFSet 0",
            ]
        );
    }

    #[test]
    fn measurement_queries_address_the_channel() {
        let mut link = SimLink::new();
        link.set_reply(":MEASure2:PKPK?", "0.5");
        let mut scope = Scope::new(link);
        let raw = scope
            .read_measurement(Channel::Ch2, MeasureItem::PeakToPeak)
            .unwrap();
        assert_eq!(raw, "0.5");
    }

    #[test]
    fn probe_attenuation_parses_the_x_prefix() {
        let mut link = SimLink::new();
        link.set_reply(":CHANnel1:PROBe?", "X10");
        let mut scope = Scope::new(link);
        assert_eq!(scope.probe_attenuation(Channel::Ch1).unwrap(), 10);
    }

    #[test]
    fn short_adc_transfer_is_an_error() {
        let mut link = SimLink::new();
        link.set_adc_frame(vec![127u8; 10]);
        let mut scope = Scope::new(link);
        let err = scope.adc_data(Channel::Ch1).unwrap_err();
        assert!(matches!(err, ScpiError::ShortTransfer { got: 10, .. }));
    }

    #[test]
    fn oversized_adc_transfer_is_trimmed() {
        let mut link = SimLink::new();
        link.set_adc_frame(vec![127u8; 600]);
        let mut scope = Scope::new(link);
        assert_eq!(scope.adc_data(Channel::Ch1).unwrap().len(), ADC_SAMPLE_COUNT);
    }
}
