use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, warn};

use crate::scpi::{ScpiError, ScpiLink};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);
/// The firmware silently drops commands that arrive back to back, so every
/// write is followed by a short pause.
const POST_SEND_PAUSE: Duration = Duration::from_millis(100);

/// TCP transport for an SCPI instrument. The handle exists only while the
/// connection is up: constructing it connects, dropping it closes. There is
/// no disconnected-but-alive state to check at call sites.
pub struct SocketLink {
    stream: TcpStream,
    addr: String,
}

impl SocketLink {
    pub fn connect(addr: &str) -> Result<Self, ScpiError> {
        let stream = TcpStream::connect(addr).map_err(|source| ScpiError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!("connected to {addr}");
        Ok(Self {
            stream,
            addr: addr.to_string(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn write_line(&mut self, command: &str) -> Result<(), ScpiError> {
        let mut line = command.trim().to_string();
        line.push('\n');
        self.stream.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Throw away any bytes left over from an earlier exchange so the next
    /// reply cannot be mistaken for a stale one.
    fn drain(&mut self) -> Result<(), ScpiError> {
        self.stream.set_read_timeout(Some(DRAIN_TIMEOUT))?;
        let mut scratch = [0u8; 4096];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    return Err(ScpiError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "instrument closed the connection",
                    )))
                }
                Ok(n) => debug!("drained {n} stale bytes"),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Ok(())
                }
                Err(e) => return Err(ScpiError::Io(e)),
            }
        }
    }

    fn read_reply(&mut self, command: &str) -> Result<Vec<u8>, ScpiError> {
        self.stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        let mut buf = vec![0u8; 65536];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(ScpiError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "instrument closed the connection",
            ))),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                warn!("timeout waiting for reply to '{command}'");
                Err(ScpiError::Timeout {
                    command: command.to_string(),
                    timeout_secs: REPLY_TIMEOUT.as_secs_f64(),
                })
            }
            Err(e) => Err(ScpiError::Io(e)),
        }
    }
}

impl ScpiLink for SocketLink {
    fn send(&mut self, command: &str) -> Result<(), ScpiError> {
        self.write_line(command)?;
        std::thread::sleep(POST_SEND_PAUSE);
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, ScpiError> {
        self.drain()?;
        self.write_line(command)?;
        let reply = self.read_reply(command)?;
        Ok(String::from_utf8_lossy(&reply).trim().to_string())
    }

    fn query_binary(&mut self, command: &str) -> Result<Vec<u8>, ScpiError> {
        self.drain()?;
        self.write_line(command)?;
        self.read_reply(command)
    }
}
