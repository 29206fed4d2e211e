//! One tuning client connection
//!
//! A session owns its socket and executes commands strictly in arrival
//! order. Every read waits at most one poll interval, so the abort flag is
//! observed promptly even on an idle connection.
//!
//! Errors raised while handling a command are caught here. Only framing and
//! socket failures end the session; everything else is answered with an
//! empty response (GET) or dropped (SET).

use super::context::ServerContext;
use super::general::GeneralCommandHandler;
use super::isp::IspParamHandler;
use super::response::Response;
use crate::error::{Result, ResultExt, TuningError};
use crate::protocol::{
    is_file_transfer, CommandHeader, CommandReader, CommandSpace, Direction, GeneralGet,
    ReadOutcome,
};
use chrono::{DateTime, Utc};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub type SessionId = u64;

/// Bookkeeping shared between a session and the connection table
#[derive(Debug)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    commands: AtomicU64,
}

impl SessionInfo {
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            id,
            peer,
            connected_at: now,
            last_activity: Mutex::new(now),
            commands: AtomicU64::new(0),
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Commands handled so far
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
        self.commands.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct TuningSession {
    info: Arc<SessionInfo>,
    ctx: Arc<ServerContext>,
    reader: CommandReader<TcpStream>,
    writer: TcpStream,
    general: GeneralCommandHandler,
    isp: IspParamHandler,
}

impl TuningSession {
    pub fn new(stream: TcpStream, info: Arc<SessionInfo>, ctx: Arc<ServerContext>) -> Result<Self> {
        stream
            .set_nonblocking(false)
            .context("Failed to make session socket blocking")?;
        stream
            .set_read_timeout(Some(ctx.config.tuning.poll_interval()))
            .context("Failed to set session read timeout")?;
        stream.set_nodelay(true).ok();
        let writer = stream.try_clone().context("Failed to clone session socket")?;

        Ok(Self {
            reader: CommandReader::new(stream, Arc::clone(&ctx.abort)),
            writer,
            general: GeneralCommandHandler::new(Arc::clone(&ctx)),
            isp: IspParamHandler::new(Arc::clone(&ctx)),
            info,
            ctx,
        })
    }

    /// Serve until the peer disconnects, a fatal error occurs or the server
    /// shuts down
    pub fn run(mut self) {
        tracing::info!("Session {} opened from {}", self.info.id, self.info.peer);

        match self.serve() {
            Ok(()) | Err(TuningError::Shutdown) => {
                tracing::info!(
                    "Session {} closed after {} command(s)",
                    self.info.id,
                    self.info.commands()
                );
            }
            Err(e) => tracing::error!("Session {} from {} dropped: {}", self.info.id, self.info.peer, e),
        }

        let _ = self.writer.shutdown(Shutdown::Both);
    }

    fn serve(&mut self) -> Result<()> {
        while !self.ctx.is_aborted() {
            let header = match self.reader.poll_header()? {
                ReadOutcome::Ready(header) => header,
                ReadOutcome::Idle => continue,
                ReadOutcome::Closed => return Ok(()),
            };

            let payload = if is_file_transfer(&header) {
                self.reader.read_settings_file(&header)?
            } else if header.payload_size > 0 {
                self.reader.read_payload(&header)?
            } else {
                Vec::new()
            };

            self.info.touch();
            self.trace_command(&header);

            let response = self.dispatch(&header, payload)?;
            response.write_to(&mut self.writer)?;
        }
        Ok(())
    }

    fn dispatch(&self, header: &CommandHeader, payload: Vec<u8>) -> Result<Response> {
        let result = match CommandSpace::classify(header.command_id) {
            CommandSpace::General(_) => self.general.handle(header, payload),
            CommandSpace::Isp(module_id) => self.isp.handle(header, module_id, &payload),
            CommandSpace::Reserved(id) | CommandSpace::Unknown(id) => {
                Err(TuningError::UnknownCommand(id))
            }
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) if e.is_session_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(
                    "Session {}: command {} failed: {}",
                    self.info.id,
                    header.command_id,
                    e
                );
                Ok(match header.direction() {
                    Direction::Get => Response::empty(header),
                    Direction::Set => Response::Silent,
                })
            }
        }
    }

    fn trace_command(&self, header: &CommandHeader) {
        let is_alive_poll = header.direction() == Direction::Get
            && header.command_id == GeneralGet::AliveCount.id();
        if self.ctx.debug_enabled() && !is_alive_poll {
            tracing::info!(
                "Session {}: {:?} {} ({} bytes)",
                self.info.id,
                header.direction(),
                header.command_id,
                header.payload_size
            );
        } else {
            tracing::trace!(
                "Session {}: {:?} {} ({} bytes)",
                self.info.id,
                header.direction(),
                header.command_id,
                header.payload_size
            );
        }
    }
}
