use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScpiError {
    #[error("instrument i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("no reply to '{command}' within {timeout_secs:.1}s")]
    Timeout { command: String, timeout_secs: f64 },
    #[error("connection to {addr} refused: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("short ADC transfer: got {got} bytes, expected {expected}")]
    ShortTransfer { got: usize, expected: usize },
    #[error("unparseable reply to '{command}': '{reply}'")]
    Reply { command: String, reply: String },
}

impl ScpiError {
    /// Fatal errors mean the link itself is gone and the run must end.
    /// Everything else is a bad or missing reading that the sequencers
    /// contain at repetition or point granularity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScpiError::Io(_) | ScpiError::Connect { .. })
    }
}
