//! UDP discovery responder
//!
//! Tuning tools locate boards by sending a three-line ASCII datagram to the
//! discovery port:
//!
//! ```text
//! StarFive\n
//! <GetAll|GetTuning|GetStream|GetRtsp|Bye>\n
//! <reply port>\n
//! ```
//!
//! The reply goes to the sender's address on the reply port and lists the
//! endpoints of the requested kind:
//!
//! ```text
//! StarFive\n
//! RetAll\n
//! tuning://192.168.1.20:8550\n
//! stream://192.168.1.20:8552\n
//! rtsp://192.168.1.20:8554/live\n
//! ```
//!
//! Datagrams with the wrong magic are ignored without a trace above debug.

use super::context::ServerContext;
use crate::error::{Result, ResultExt};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

pub const DISCOVERY_MAGIC: &str = "StarFive";

const MAX_DATAGRAM: usize = 1500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryCommand {
    GetAll,
    GetTuning,
    GetStream,
    GetRtsp,
    Bye,
    /// Missing or unrecognised command line
    Unknown(String),
}

impl DiscoveryCommand {
    fn parse(line: &str) -> Self {
        match line {
            "GetAll" => DiscoveryCommand::GetAll,
            "GetTuning" => DiscoveryCommand::GetTuning,
            "GetStream" => DiscoveryCommand::GetStream,
            "GetRtsp" => DiscoveryCommand::GetRtsp,
            "Bye" => DiscoveryCommand::Bye,
            other => DiscoveryCommand::Unknown(other.to_string()),
        }
    }

    /// Reply tag; `None` for commands that get no reply
    pub fn reply_tag(&self) -> Option<&'static str> {
        match self {
            DiscoveryCommand::GetAll => Some("RetAll"),
            DiscoveryCommand::GetTuning => Some("RetTuning"),
            DiscoveryCommand::GetStream => Some("RetStream"),
            DiscoveryCommand::GetRtsp => Some("RetRtsp"),
            DiscoveryCommand::Bye | DiscoveryCommand::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub command: DiscoveryCommand,
    /// As written by the client; may be zero, negative or out of range
    pub reply_port: i64,
}

/// Parse a request; `None` unless the first line is the magic string
pub fn parse_request(text: &str) -> Option<DiscoveryRequest> {
    let mut lines = text.split('\n').filter(|line| !line.is_empty());
    if lines.next()? != DISCOVERY_MAGIC {
        return None;
    }
    let command = DiscoveryCommand::parse(lines.next().unwrap_or_default());
    let reply_port = lines.next().map(atoi).unwrap_or(0);
    Some(DiscoveryRequest {
        command,
        reply_port,
    })
}

/// Leading integer of `s` after optional whitespace and sign; 0 if none
fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });
    if negative {
        -value
    } else {
        value
    }
}

/// Endpoints advertised in replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub tuning_port: u16,
    pub stream_port: u16,
    pub rtsp_port: u16,
    pub rtsp_paths: Vec<String>,
}

/// Reply text for `command`, or `None` if the command gets no reply
pub fn build_reply(command: &DiscoveryCommand, host: &str, endpoints: &Endpoints) -> Option<String> {
    let tag = command.reply_tag()?;
    let all = *command == DiscoveryCommand::GetAll;

    let mut reply = format!("{}\n{}\n", DISCOVERY_MAGIC, tag);
    if all || *command == DiscoveryCommand::GetTuning {
        let _ = writeln!(reply, "tuning://{}:{}", host, endpoints.tuning_port);
    }
    if all || *command == DiscoveryCommand::GetStream {
        let _ = writeln!(reply, "stream://{}:{}", host, endpoints.stream_port);
    }
    if all || *command == DiscoveryCommand::GetRtsp {
        for path in &endpoints.rtsp_paths {
            let _ = writeln!(reply, "rtsp://{}:{}{}", host, endpoints.rtsp_port, path);
        }
    }
    Some(reply)
}

pub struct DiscoveryResponder {
    socket: UdpSocket,
    ctx: Arc<ServerContext>,
    port: u16,
}

impl DiscoveryResponder {
    pub fn bind(ctx: Arc<ServerContext>) -> Result<Self> {
        let settings = &ctx.config.discovery;
        let socket = UdpSocket::bind(("0.0.0.0", settings.port))
            .with_context(|| format!("Failed to bind discovery port {}", settings.port))?;
        socket
            .set_read_timeout(Some(settings.poll_interval()))
            .context("Failed to set discovery read timeout")?;
        let port = socket.local_addr()?.port();
        tracing::info!("Discovery responder listening on UDP port {}", port);

        Ok(Self { socket, ctx, port })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn run(self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        while !self.ctx.is_aborted() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => self.handle_datagram(&buf[..len], src),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => tracing::warn!("Discovery receive failed: {}", e),
            }
        }
        tracing::info!("Discovery responder stopped");
    }

    fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        let text = String::from_utf8_lossy(data);
        let Some(request) = parse_request(&text) else {
            tracing::debug!("Ignoring foreign datagram from {}", src);
            return;
        };

        match &request.command {
            DiscoveryCommand::Bye => {
                tracing::info!("Discovery client {} said goodbye", src.ip());
                return;
            }
            DiscoveryCommand::Unknown(cmd) => {
                tracing::warn!("Unknown discovery command {:?} from {}", cmd, src);
                return;
            }
            _ => {}
        }

        let reply_port = match u16::try_from(request.reply_port) {
            Ok(port) if port > self.port => port,
            _ => {
                tracing::warn!(
                    "Discovery reply port {} from {} must be above {}",
                    request.reply_port,
                    src.ip(),
                    self.port
                );
                return;
            }
        };

        let host = self.advertised_host(src.ip());
        let Some(reply) = build_reply(&request.command, &host, &self.endpoints()) else {
            return;
        };

        let target = SocketAddr::new(src.ip(), reply_port);
        match self.socket.send_to(reply.as_bytes(), target) {
            Ok(_) => tracing::debug!("Answered {:?} to {}", request.command, target),
            Err(e) => tracing::warn!("Discovery reply to {} failed: {}", target, e),
        }
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            tuning_port: self.ctx.tuning_port(),
            stream_port: self.ctx.config.stream.port,
            rtsp_port: self.ctx.config.rtsp.port,
            rtsp_paths: self.ctx.streams.active(),
        }
    }

    /// Configured host, else the local address that routes to `peer`
    fn advertised_host(&self, peer: IpAddr) -> String {
        if let Some(host) = &self.ctx.config.discovery.advertise_host {
            return host.clone();
        }
        local_address_toward(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .to_string()
    }
}

/// Connecting a UDP socket sends nothing but selects the outgoing interface
fn local_address_toward(peer: IpAddr) -> Option<IpAddr> {
    let bind: SocketAddr = match peer {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let probe = UdpSocket::bind(bind).ok()?;
    probe.connect((peer, 9)).ok()?;
    probe.local_addr().ok().map(|addr| addr.ip())
}
