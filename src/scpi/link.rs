use crate::scpi::ScpiError;

/// Byte-level seam between the command dictionaries and whatever carries the
/// commands: a TCP socket in production, an in-memory double in tests.
pub trait ScpiLink {
    /// Fire-and-forget set command. The instrument sends no acknowledgement.
    fn send(&mut self, command: &str) -> Result<(), ScpiError>;

    /// Query returning a text reply (trailing whitespace stripped).
    fn query(&mut self, command: &str) -> Result<String, ScpiError>;

    /// Query returning a raw binary reply, e.g. an ADC sample dump.
    fn query_binary(&mut self, command: &str) -> Result<Vec<u8>, ScpiError>;
}
