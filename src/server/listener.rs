//! Connection manager
//!
//! # Architecture
//!
//! ```text
//!  accept thread                          session threads
//!  ─────────────                          ───────────────
//!  reap finished ◄── finished_rx ◄─────── session-N exits
//!  at capacity? ── yes ─► sleep, retry
//!  accept() ──► spawn session-N ─────────► TuningSession::run
//!  abort set ──► join every session
//! ```
//!
//! The listener is non-blocking and polled once per poll interval. At
//! capacity no connection is accepted; pending clients stay in the kernel
//! backlog until a session ends.

use super::context::ServerContext;
use super::session::{SessionId, SessionInfo, TuningSession};
use crate::error::{Result, ResultExt};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

struct SessionEntry {
    info: Arc<SessionInfo>,
    handle: JoinHandle<()>,
}

/// Live sessions, shared with the server handle for reporting
#[derive(Clone, Default)]
pub struct SessionTable {
    entries: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionTable {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bookkeeping of every live session, oldest first
    pub fn snapshot(&self) -> Vec<Arc<SessionInfo>> {
        let mut infos: Vec<_> = self.lock().values().map(|e| Arc::clone(&e.info)).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ConnectionManager {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    sessions: SessionTable,
    finished_tx: Sender<SessionId>,
    finished_rx: Receiver<SessionId>,
    next_id: SessionId,
}

impl ConnectionManager {
    /// Bind the tuning port; port 0 picks an ephemeral port, which is
    /// recorded in the context
    pub fn bind(ctx: Arc<ServerContext>) -> Result<Self> {
        let port = ctx.config.tuning.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("Failed to bind tuning port {}", port))?;
        listener
            .set_nonblocking(true)
            .context("Failed to make tuning listener non-blocking")?;

        let local = listener.local_addr()?;
        ctx.set_tuning_port(local.port());
        tracing::info!("Tuning server listening on {}", local);

        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            listener,
            ctx,
            sessions: SessionTable::default(),
            finished_tx,
            finished_rx,
            next_id: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn sessions(&self) -> SessionTable {
        self.sessions.clone()
    }

    /// Accept loop; returns once the abort flag is set and every session
    /// has been joined
    pub fn run(mut self) {
        let poll = self.ctx.config.tuning.poll_interval();
        let max_sessions = self.ctx.config.tuning.max_sessions;

        while !self.ctx.is_aborted() {
            self.reap_finished();

            if self.sessions.len() >= max_sessions {
                std::thread::sleep(poll);
                continue;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    std::thread::sleep(poll);
                }
            }
        }

        self.join_all();
        tracing::info!("Tuning listener stopped");
    }

    fn spawn_session(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id;
        self.next_id += 1;

        let info = Arc::new(SessionInfo::new(id, peer));
        let session = match TuningSession::new(stream, Arc::clone(&info), Arc::clone(&self.ctx)) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Rejecting connection from {}: {}", peer, e);
                return;
            }
        };

        let finished = self.finished_tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || {
                session.run();
                let _ = finished.send(id);
            });

        match spawned {
            Ok(handle) => {
                self.sessions.lock().insert(id, SessionEntry { info, handle });
            }
            // the session, and with it the socket, was dropped with the closure
            Err(e) => tracing::error!("Cannot start session for {}: {}", peer, e),
        }
    }

    fn reap_finished(&mut self) {
        while let Ok(id) = self.finished_rx.try_recv() {
            let entry = self.sessions.lock().remove(&id);
            if let Some(entry) = entry {
                if entry.handle.join().is_err() {
                    tracing::error!("Session {} panicked", id);
                }
            }
        }
    }

    fn join_all(&mut self) {
        let entries: Vec<_> = self.sessions.lock().drain().collect();
        if !entries.is_empty() {
            tracing::info!("Waiting for {} session(s) to finish", entries.len());
        }
        for (id, entry) in entries {
            if entry.handle.join().is_err() {
                tracing::error!("Session {} panicked", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::pipeline::MockCameraPipeline;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn manager(max_sessions: usize) -> (ConnectionManager, Arc<ServerContext>) {
        let mut config = ServerConfig::default();
        config.tuning.port = 0;
        config.tuning.max_sessions = max_sessions;
        let ctx = Arc::new(ServerContext::new(config, Arc::new(MockCameraPipeline::new())));
        (ConnectionManager::bind(Arc::clone(&ctx)).unwrap(), ctx)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn session_ids(table: &SessionTable) -> Vec<SessionId> {
        table.snapshot().iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_ephemeral_port_recorded() {
        let (manager, ctx) = manager(1);
        assert_ne!(ctx.tuning_port(), 0);
        assert_eq!(manager.local_addr().unwrap().port(), ctx.tuning_port());
    }

    #[test]
    fn test_capacity_defers_accept() {
        let (manager, ctx) = manager(1);
        let addr = SocketAddr::from(([127, 0, 0, 1], ctx.tuning_port()));
        let table = manager.sessions();
        let accept = std::thread::spawn(move || manager.run());

        let first = TcpStream::connect(addr).unwrap();
        assert!(wait_until(|| table.len() == 1));

        // queued in the backlog, not accepted
        let second = TcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(table.len(), 1);

        drop(first);
        assert!(wait_until(|| session_ids(&table) == vec![2]));

        drop(second);
        ctx.abort.store(true, Ordering::SeqCst);
        accept.join().unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_abort_joins_open_sessions() {
        let (manager, ctx) = manager(4);
        let addr = SocketAddr::from(([127, 0, 0, 1], ctx.tuning_port()));
        let table = manager.sessions();
        let accept = std::thread::spawn(move || manager.run());

        let _clients: Vec<_> = (0..3).map(|_| TcpStream::connect(addr).unwrap()).collect();
        assert!(wait_until(|| table.len() == 3));

        ctx.abort.store(true, Ordering::SeqCst);
        accept.join().unwrap();
        assert!(table.is_empty());
    }
}
