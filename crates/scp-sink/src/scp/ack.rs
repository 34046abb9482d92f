// ── Acknowledgment protocol – one status byte per protocol phase ─────────────
//
// Sink → source:  0x00                      ready / ok
//                 0x01 <message> 0x0A       error
// Source → sink:  0x00                      ok
//                 0x01 | 0x02 <message> 0x0A  error / fatal error
//                 anything else             returned to the caller as-is

use crate::scp::error::{ScpError, ScpRemoteSeverity, ScpResult};
use log::debug;
use std::io::{ErrorKind, Read, Write};

pub const READY: u8 = 0;
pub const LINE_FEED: u8 = 0x0a;

/// Longest remote error message kept; the rest of the line is discarded.
const MAX_MESSAGE_LEN: usize = 8192;

/// Outcome of reading one status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    /// The stream ended where a status byte was expected.
    Eof,
    /// Any status other than 0, 1, 2 – e.g. the `C` of the next header.
    Other(u8),
}

/// Read a single byte, retrying on `Interrupted`. `None` at end of stream.
pub(crate) fn read_byte<R: Read>(reader: &mut R) -> std::io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Send the ready/ok byte and flush it.
pub fn send_ready<W: Write>(writer: &mut W) -> ScpResult<()> {
    writer
        .write_all(&[READY])
        .and_then(|_| writer.flush())
        .map_err(|e| ScpError::transport(format!("Failed to send acknowledgment: {}", e)))
}

/// Tell the source this sink cannot continue, with a one-line reason.
pub fn send_error<W: Write>(writer: &mut W, message: &str) -> ScpResult<()> {
    let mut line = Vec::with_capacity(message.len() + 2);
    line.push(ScpRemoteSeverity::Error.status_byte());
    line.extend(message.bytes().filter(|&b| b != LINE_FEED));
    line.push(LINE_FEED);
    writer
        .write_all(&line)
        .and_then(|_| writer.flush())
        .map_err(|e| ScpError::transport(format!("Failed to send error status: {}", e)))
}

/// Read one status byte from the source.
///
/// Status 1 and 2 consume the attached message up to and including the
/// line feed and come back as [`ScpError::Remote`].
pub fn read_ack<R: Read>(reader: &mut R) -> ScpResult<Ack> {
    let status = read_byte(reader)
        .map_err(|e| ScpError::from_stream("Failed to read status byte", e))?;

    match status {
        None => Ok(Ack::Eof),
        Some(READY) => Ok(Ack::Ok),
        Some(byte) => match ScpRemoteSeverity::from_status(byte) {
            Some(severity) => {
                let message = read_message(reader)?;
                debug!("SCP source reported {:?}: {}", severity, message);
                Err(ScpError::remote(severity, message))
            }
            None => Ok(Ack::Other(byte)),
        },
    }
}

fn read_message<R: Read>(reader: &mut R) -> ScpResult<String> {
    let mut message = Vec::new();
    loop {
        match read_byte(reader)
            .map_err(|e| ScpError::from_stream("Failed to read remote error message", e))?
        {
            None | Some(LINE_FEED) => break,
            Some(byte) => {
                if message.len() < MAX_MESSAGE_LEN {
                    message.push(byte);
                }
            }
        }
    }
    Ok(String::from_utf8_lossy(&message).into_owned())
}
