use std::cell::RefCell;
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::rc::Rc;

use crate::scpi::scope::ADC_SAMPLE_COUNT;
use crate::scpi::{ScpiError, ScpiLink};

/// Shared state for the simulated bench: a first-order RC low-pass between
/// the generator output and scope channel 2, with channel 1 seeing the
/// generator directly.
#[derive(Debug)]
pub struct RcCircuit {
    pub cutoff_hz: f64,
    pub frequency_hz: f64,
    pub amplitude_vpp: f64,
    pub timebase_secs: f64,
}

impl RcCircuit {
    fn new(cutoff_hz: f64) -> Self {
        Self {
            cutoff_hz,
            frequency_hz: 1000.0,
            amplitude_vpp: 1.0,
            timebase_secs: 1e-3,
        }
    }

    fn gain(&self) -> f64 {
        1.0 / (1.0 + (self.frequency_hz / self.cutoff_hz).powi(2)).sqrt()
    }

    /// Falling-edge delay consistent with the low-pass phase lag.
    fn fall_delay_secs(&self) -> f64 {
        let lag_deg = (self.frequency_hz / self.cutoff_hz).atan().to_degrees();
        lag_deg / (360.0 * self.frequency_hz)
    }

    fn adc_frame(&self, channel_gain: f64) -> Vec<u8> {
        let volts_per_code = 8.0 / 255.0;
        let window = self.timebase_secs * 10.0;
        (0..ADC_SAMPLE_COUNT)
            .map(|i| {
                let t = i as f64 * window / ADC_SAMPLE_COUNT as f64;
                let v = channel_gain * self.amplitude_vpp / 2.0
                    * (2.0 * PI * self.frequency_hz * t).sin();
                (127.5 + v / volts_per_code).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Deterministic in-memory instrument link, useful for tests and for the
/// `--sim` demo mode. Queries are answered from queued one-shot replies
/// first, then sticky replies, then the optional circuit model.
pub struct SimLink {
    /// Every set command, in order.
    pub sent: Vec<String>,
    /// Every query command, in order.
    pub queries: Vec<String>,
    queued: Vec<(String, VecDeque<String>)>,
    sticky: Vec<(String, String)>,
    queued_adc: VecDeque<Vec<u8>>,
    sticky_adc: Option<Vec<u8>>,
    circuit: Option<Rc<RefCell<RcCircuit>>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            queries: Vec::new(),
            queued: Vec::new(),
            sticky: Vec::new(),
            queued_adc: VecDeque::new(),
            sticky_adc: None,
            circuit: None,
        }
    }

    /// Generator and scope links sharing one RC low-pass circuit model, so
    /// frequency and amplitude commands on the generator side change what
    /// the scope side measures.
    pub fn rc_bench(cutoff_hz: f64) -> (SimLink, SimLink) {
        let circuit = Rc::new(RefCell::new(RcCircuit::new(cutoff_hz)));
        let mut gen = SimLink::new();
        gen.circuit = Some(Rc::clone(&circuit));
        let mut scope = SimLink::new();
        scope.circuit = Some(circuit);
        (gen, scope)
    }

    /// Sticky reply for every query containing `pattern`.
    pub fn set_reply(&mut self, pattern: &str, reply: &str) {
        self.sticky.push((pattern.to_string(), reply.to_string()));
    }

    /// One-shot reply consumed by the next query containing `pattern`;
    /// repeated pushes for the same pattern are served in order.
    pub fn push_reply(&mut self, pattern: &str, reply: &str) {
        if let Some((_, queue)) = self.queued.iter_mut().find(|(p, _)| p == pattern) {
            queue.push_back(reply.to_string());
        } else {
            let mut queue = VecDeque::new();
            queue.push_back(reply.to_string());
            self.queued.push((pattern.to_string(), queue));
        }
    }

    pub fn set_adc_frame(&mut self, frame: Vec<u8>) {
        self.sticky_adc = Some(frame);
    }

    pub fn push_adc_frame(&mut self, frame: Vec<u8>) {
        self.queued_adc.push_back(frame);
    }

    fn lookup(&mut self, command: &str) -> Option<String> {
        for (pattern, queue) in &mut self.queued {
            if command.contains(pattern.as_str()) {
                if let Some(reply) = queue.pop_front() {
                    return Some(reply);
                }
            }
        }
        for (pattern, reply) in &self.sticky {
            if command.contains(pattern.as_str()) {
                return Some(reply.clone());
            }
        }
        self.circuit_reply(command)
    }

    fn circuit_reply(&self, command: &str) -> Option<String> {
        let circuit = self.circuit.as_ref()?.borrow();
        if command.starts_with("*IDN?") {
            Some("SCOPESWEEP,SIM,0,1.0".to_string())
        } else if command.contains(":MEASure1:PKPK?") {
            Some(format!("{}", circuit.amplitude_vpp))
        } else if command.contains(":MEASure2:PKPK?") {
            Some(format!("{}", circuit.amplitude_vpp * circuit.gain()))
        } else if command.contains(":MEASure1:FDELay?") {
            Some(format!("{:e}", circuit.fall_delay_secs()))
        } else if command.contains(":SCALe?") && command.contains(":CHANnel") {
            Some("1.0".to_string())
        } else if command.contains(":PROBe?") {
            Some("X1".to_string())
        } else {
            None
        }
    }

    fn observe(&mut self, command: &str) {
        let Some(circuit) = self.circuit.as_ref() else {
            return;
        };
        let mut circuit = circuit.borrow_mut();
        if let Some(rest) = command.strip_prefix("SOURce1:FREQuency:FIXed ") {
            if let Ok(freq) = rest.trim_end_matches("Hz").parse::<f64>() {
                circuit.frequency_hz = freq;
            }
        } else if let Some(rest) = command.strip_prefix("SOURce1:VOLTage:AMPLitude ") {
            if let Ok(vpp) = rest.trim_end_matches("Vpp").parse::<f64>() {
                circuit.amplitude_vpp = vpp;
            }
        } else if let Some(token) = command.strip_prefix(":TIMebase:SCALe ") {
            if let Some(secs) = parse_timebase_token(token.trim()) {
                circuit.timebase_secs = secs;
            }
        }
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timebase_token(token: &str) -> Option<f64> {
    let (scale, digits) = if let Some(d) = token.strip_suffix("ns") {
        (1e-9, d)
    } else if let Some(d) = token.strip_suffix("us") {
        (1e-6, d)
    } else if let Some(d) = token.strip_suffix("ms") {
        (1e-3, d)
    } else if let Some(d) = token.strip_suffix('s') {
        (1.0, d)
    } else {
        return None;
    };
    digits.parse::<f64>().ok().map(|v| v * scale)
}

impl ScpiLink for SimLink {
    fn send(&mut self, command: &str) -> Result<(), ScpiError> {
        self.observe(command);
        self.sent.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, ScpiError> {
        self.queries.push(command.to_string());
        self.lookup(command).ok_or_else(|| ScpiError::Timeout {
            command: command.to_string(),
            timeout_secs: 0.0,
        })
    }

    fn query_binary(&mut self, command: &str) -> Result<Vec<u8>, ScpiError> {
        self.queries.push(command.to_string());
        if let Some(frame) = self.queued_adc.pop_front() {
            return Ok(frame);
        }
        if let Some(frame) = &self.sticky_adc {
            return Ok(frame.clone());
        }
        if let Some(circuit) = &self.circuit {
            let circuit = circuit.borrow();
            let gain = if command.contains("CH2") { circuit.gain() } else { 1.0 };
            return Ok(circuit.adc_frame(gain));
        }
        Err(ScpiError::Timeout {
            command: command.to_string(),
            timeout_secs: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_replies_are_consumed_before_sticky_ones() {
        let mut link = SimLink::new();
        link.set_reply("PKPK?", "1.0");
        link.push_reply("PKPK?", "2e30");
        assert_eq!(link.query(":MEASure2:PKPK?").unwrap(), "2e30");
        assert_eq!(link.query(":MEASure2:PKPK?").unwrap(), "1.0");
        assert_eq!(link.query(":MEASure2:PKPK?").unwrap(), "1.0");
    }

    #[test]
    fn unmatched_query_times_out() {
        let mut link = SimLink::new();
        assert!(matches!(
            link.query("*IDN?"),
            Err(ScpiError::Timeout { .. })
        ));
    }

    #[test]
    fn rc_bench_couples_generator_commands_to_scope_readings() {
        let (mut gen, mut scope) = SimLink::rc_bench(1000.0);
        gen.send("SOURce1:FREQuency:FIXed 1000Hz").unwrap();
        let vpp2: f64 = scope.query(":MEASure2:PKPK?").unwrap().parse().unwrap();
        // At the cutoff frequency the divider sits 3 dB down.
        assert!((vpp2 - 1.0 / 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn timebase_tokens_parse_to_seconds() {
        assert_eq!(parse_timebase_token("200us"), Some(200e-6));
        assert_eq!(parse_timebase_token("5ns"), Some(5e-9));
        assert_eq!(parse_timebase_token("2s"), Some(2.0));
        assert_eq!(parse_timebase_token("bogus"), None);
    }
}
