//! Tuning server
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!   TCP clients ──►│ accept thread            │──► session-N threads
//!                  │ (ConnectionManager)      │      │
//!                  └──────────────────────────┘      ├─► GeneralCommandHandler
//!                                                    └─► IspParamHandler
//!                  ┌──────────────────────────┐            │
//!   UDP probes ───►│ discovery thread         │            ▼
//!                  └──────────────────────────┘   ParamRegistry + ProbeRequestPool
//!                                                          │
//!                                                          ▼
//!                                                   CameraPipeline
//! ```
//!
//! All threads share one [`ServerContext`]. Shutdown runs in a fixed order:
//! stop accepting, join sessions, join discovery, abandon outstanding
//! probes, then release the pipeline.

pub mod context;
pub mod discovery;
pub mod general;
pub mod isp;
pub mod listener;
pub mod response;
pub mod session;

pub use context::{DiscardSink, ServerContext, SettingsFileSink, StreamRegistry};
pub use discovery::DiscoveryResponder;
pub use general::GeneralCommandHandler;
pub use isp::IspParamHandler;
pub use listener::{ConnectionManager, SessionTable};
pub use response::Response;
pub use session::{SessionId, SessionInfo, TuningSession};

use crate::config::ServerConfig;
use crate::error::{Result, TuningError};
use crate::pipeline::CameraPipeline;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a running server
pub struct TuningServer {
    ctx: Arc<ServerContext>,
    tuning_addr: SocketAddr,
    discovery_addr: Option<SocketAddr>,
    sessions: SessionTable,
    accept_thread: Option<JoinHandle<()>>,
    discovery_thread: Option<JoinHandle<()>>,
    stopped: bool,
}

impl TuningServer {
    /// Bind the configured ports and start serving
    pub fn start(config: ServerConfig, pipeline: Arc<dyn CameraPipeline>) -> Result<Self> {
        config.validate()?;
        Self::start_with_context(ServerContext::new(config, pipeline))
    }

    /// Start from a prepared context (custom sink, registry or pool limits)
    pub fn start_with_context(ctx: ServerContext) -> Result<Self> {
        let ctx = Arc::new(ctx);
        for path in &ctx.config.rtsp.streams {
            ctx.streams.register(path.clone());
        }

        let manager = ConnectionManager::bind(Arc::clone(&ctx))?;
        let discovery = if ctx.config.discovery.enabled {
            Some(DiscoveryResponder::bind(Arc::clone(&ctx))?)
        } else {
            None
        };

        let tuning_addr = manager.local_addr()?;
        let discovery_addr = discovery.as_ref().map(|d| d.local_addr()).transpose()?;
        let sessions = manager.sessions();

        let accept_thread = spawn("tuning-accept", move || manager.run())?;

        let discovery_thread = match discovery {
            Some(responder) => match spawn("discovery", move || responder.run()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    ctx.abort.store(true, Ordering::SeqCst);
                    let _ = accept_thread.join();
                    return Err(e);
                }
            },
            None => None,
        };

        tracing::info!(
            "Tuning server started (tuning {}, discovery {})",
            tuning_addr,
            discovery_addr.map_or_else(|| "disabled".to_string(), |a| a.to_string())
        );

        Ok(Self {
            ctx,
            tuning_addr,
            discovery_addr,
            sessions,
            accept_thread: Some(accept_thread),
            discovery_thread,
            stopped: false,
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn local_tuning_addr(&self) -> SocketAddr {
        self.tuning_addr
    }

    pub fn local_discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery_addr
    }

    /// Sessions currently connected, oldest first
    pub fn active_sessions(&self) -> Vec<Arc<SessionInfo>> {
        self.sessions.snapshot()
    }

    /// Stop every thread and release the pipeline; safe to call twice
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        tracing::info!("Shutting down tuning server");

        self.ctx.abort.store(true, Ordering::SeqCst);

        // the accept thread joins its sessions before returning
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Accept thread panicked");
            }
        }
        if let Some(handle) = self.discovery_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Discovery thread panicked");
            }
        }

        self.ctx.probes.abandon_all();
        self.ctx.pipeline.shutdown();
        tracing::info!("Tuning server stopped");
    }
}

impl Drop for TuningServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| TuningError::ThreadSpawn {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MockCameraPipeline;

    fn config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.tuning.port = 0;
        config.discovery.port = 0;
        config
    }

    #[test]
    fn test_shutdown_releases_pipeline_last() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline.expect_shutdown().times(1).return_const(());
        let mut server = TuningServer::start(config(), Arc::new(pipeline)).unwrap();
        assert_ne!(server.local_tuning_addr().port(), 0);
        assert!(server.local_discovery_addr().is_some());

        server.shutdown();
        server.shutdown();
    }

    #[test]
    fn test_discovery_can_be_disabled() {
        let mut config = config();
        config.discovery.enabled = false;
        let mut pipeline = MockCameraPipeline::new();
        pipeline.expect_shutdown().return_const(());
        let server = TuningServer::start(config, Arc::new(pipeline)).unwrap();
        assert!(server.local_discovery_addr().is_none());
    }

    #[test]
    fn test_configured_streams_registered() {
        let mut config = config();
        config.rtsp.streams = vec!["/live".into()];
        let mut pipeline = MockCameraPipeline::new();
        pipeline.expect_shutdown().return_const(());
        let server = TuningServer::start(config, Arc::new(pipeline)).unwrap();
        assert_eq!(server.context().streams.active(), vec!["/live".to_string()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.tuning.max_sessions = 0;
        let result = TuningServer::start(config, Arc::new(MockCameraPipeline::new()));
        assert!(matches!(result, Err(TuningError::Config(_))));
    }
}
