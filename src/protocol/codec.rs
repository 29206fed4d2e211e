//! Request framing over a byte stream
//!
//! Reads are cooperative: the underlying stream is expected to have a short
//! read timeout, and every timeout is a chance to observe the abort flag.
//! A timeout with nothing buffered is reported as [`ReadOutcome::Idle`]; a
//! timeout in the middle of a frame keeps waiting for the rest of it.

use super::header::{CommandHeader, CommandType, Direction};
use super::ids::FILE_TRANSFER_COMMAND;
use crate::error::{Result, TuningError};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Largest payload a single command may carry
pub const MAX_PAYLOAD: usize = 16 * 1024;

/// Largest chunk of the settings file transfer
pub const MAX_FILE_CHUNK: usize = 16 * 1024;

/// Largest settings file accepted over the wire
pub const MAX_SETTINGS_FILE: usize = 1024 * 1024;

/// Result of polling for the next frame
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    Ready(T),
    /// Nothing arrived within one poll interval
    Idle,
    /// Peer closed the connection cleanly between frames
    Closed,
}

enum Fill {
    Complete,
    Idle,
    Eof(usize),
}

/// Whether a request header is followed by the file-transfer sub-protocol
pub fn is_file_transfer(header: &CommandHeader) -> bool {
    header.command_id == FILE_TRANSFER_COMMAND
        && header.command_type() == CommandType::File
        && header.direction() == Direction::Set
}

/// Cooperative reader for request frames
pub struct CommandReader<R> {
    stream: R,
    abort: Arc<AtomicBool>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(stream: R, abort: Arc<AtomicBool>) -> Self {
        Self { stream, abort }
    }

    /// Wait one poll interval for the next header
    pub fn poll_header(&mut self) -> Result<ReadOutcome<CommandHeader>> {
        let mut buf = [0u8; CommandHeader::SIZE];
        match self.fill(&mut buf, true)? {
            Fill::Complete => CommandHeader::decode(&buf).map(ReadOutcome::Ready),
            Fill::Idle => Ok(ReadOutcome::Idle),
            Fill::Eof(0) => Ok(ReadOutcome::Closed),
            Fill::Eof(n) => Err(TuningError::Format(format!(
                "connection closed after {} of {} header bytes",
                n,
                CommandHeader::SIZE
            ))),
        }
    }

    /// Read the payload announced by `header`
    pub fn read_payload(&mut self, header: &CommandHeader) -> Result<Vec<u8>> {
        let size = header.payload_size as usize;
        if size > MAX_PAYLOAD {
            return Err(TuningError::Format(format!(
                "payload size {} exceeds {} bytes",
                size, MAX_PAYLOAD
            )));
        }

        let mut payload = vec![0u8; size];
        self.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Receive a settings file: `u32` length-prefixed chunks terminated by a
    /// zero-length chunk
    pub fn read_settings_file(&mut self, header: &CommandHeader) -> Result<Vec<u8>> {
        let announced = header.payload_size as usize;
        if announced > MAX_SETTINGS_FILE {
            return Err(TuningError::Format(format!(
                "settings file of {} bytes exceeds {} bytes",
                announced, MAX_SETTINGS_FILE
            )));
        }

        let mut contents = Vec::with_capacity(announced);
        loop {
            let mut len = [0u8; 4];
            self.read_exact(&mut len)?;
            let len = u32::from_le_bytes(len) as usize;
            if len == 0 {
                break;
            }
            if len > MAX_FILE_CHUNK || contents.len() + len > MAX_SETTINGS_FILE {
                return Err(TuningError::Format(format!(
                    "settings file chunk of {} bytes rejected",
                    len
                )));
            }
            let start = contents.len();
            contents.resize(start + len, 0);
            self.read_exact(&mut contents[start..])?;
        }

        if contents.len() != announced {
            tracing::warn!(
                "Settings file announced {} bytes but {} arrived",
                announced,
                contents.len()
            );
        }
        Ok(contents)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.fill(buf, false)? {
            Fill::Complete => Ok(()),
            Fill::Eof(received) => Err(TuningError::ShortRead {
                expected: buf.len(),
                received,
            }),
            Fill::Idle => Err(TuningError::ShortRead {
                expected: buf.len(),
                received: 0,
            }),
        }
    }

    fn fill(&mut self, buf: &mut [u8], idle_ok: bool) -> Result<Fill> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Ok(Fill::Eof(filled)),
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if self.abort.load(Ordering::Relaxed) {
                        return Err(TuningError::Shutdown);
                    }
                    if filled == 0 && idle_ok {
                        return Ok(Fill::Idle);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Fill::Complete)
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Echo `request` with its size rewritten, followed by `payload`
pub fn write_response<W: Write>(
    out: &mut W,
    request: &CommandHeader,
    payload: &[u8],
) -> Result<()> {
    let mut frame = Vec::with_capacity(CommandHeader::SIZE + payload.len());
    frame.extend_from_slice(&request.reply(payload.len()).encode());
    frame.extend_from_slice(payload);
    out.write_all(&frame)?;
    out.flush()?;
    Ok(())
}

/// Send a bare header exactly as given
pub fn write_header<W: Write>(out: &mut W, header: &CommandHeader) -> Result<()> {
    out.write_all(&header.encode())?;
    out.flush()?;
    Ok(())
}

/// Send a raw packet with no header
pub fn write_packet<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    out.write_all(bytes)?;
    out.flush()?;
    Ok(())
}

/// Client-side framing of a request and its payload
pub fn encode_request(header: &CommandHeader, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CommandHeader::SIZE + payload.len());
    frame.extend_from_slice(&header.reply(payload.len()).encode());
    frame.extend_from_slice(payload);
    frame
}

/// Client-side framing of the settings file chunks, terminator included
pub fn encode_settings_file(contents: &[u8], chunk_size: usize) -> Vec<u8> {
    let chunk_size = chunk_size.clamp(1, MAX_FILE_CHUNK);
    let mut out = Vec::with_capacity(contents.len() + 4 * (contents.len() / chunk_size + 2));
    for chunk in contents.chunks(chunk_size) {
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}
