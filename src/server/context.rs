//! Process-wide server state shared by every thread

use crate::config::ServerConfig;
use crate::params::ParamRegistry;
use crate::pipeline::CameraPipeline;
use crate::probe::ProbeRequestPool;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives settings files uploaded by the tuning tool
pub trait SettingsFileSink: Send + Sync {
    fn store(&self, contents: &[u8]);
}

/// Default sink: the file is logged and dropped
#[derive(Debug, Default)]
pub struct DiscardSink;

impl SettingsFileSink for DiscardSink {
    fn store(&self, contents: &[u8]) {
        tracing::info!("Discarding uploaded settings file ({} bytes)", contents.len());
    }
}

/// Paths of the RTSP streams currently being served
#[derive(Debug, Default)]
pub struct StreamRegistry {
    paths: Mutex<Vec<String>>,
}

impl StreamRegistry {
    /// Register a stream; duplicate paths are ignored
    pub fn register(&self, path: impl Into<String>) {
        let path = path.into();
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.contains(&path) {
            tracing::debug!("Stream {} registered", path);
            paths.push(path);
        }
    }

    pub fn unregister(&self, path: &str) -> bool {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        let before = paths.len();
        paths.retain(|p| p != path);
        paths.len() != before
    }

    pub fn active(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything the accept loop, sessions and discovery share
pub struct ServerContext {
    pub config: ServerConfig,
    pub registry: Arc<ParamRegistry>,
    pub probes: ProbeRequestPool,
    pub pipeline: Arc<dyn CameraPipeline>,
    pub settings_sink: Arc<dyn SettingsFileSink>,
    pub streams: StreamRegistry,
    /// Set once at shutdown; every loop polls it
    pub abort: Arc<AtomicBool>,
    debug: AtomicBool,
    alive: AtomicU32,
    tuning_port: AtomicU16,
}

impl ServerContext {
    pub fn new(config: ServerConfig, pipeline: Arc<dyn CameraPipeline>) -> Self {
        let registry = Arc::new(ParamRegistry::builtin());
        let probes = ProbeRequestPool::new(Arc::clone(&registry));
        Self::with_parts(config, registry, probes, pipeline, Arc::new(DiscardSink))
    }

    pub fn with_parts(
        config: ServerConfig,
        registry: Arc<ParamRegistry>,
        probes: ProbeRequestPool,
        pipeline: Arc<dyn CameraPipeline>,
        settings_sink: Arc<dyn SettingsFileSink>,
    ) -> Self {
        let tuning_port = config.tuning.port;
        Self {
            config,
            registry,
            probes,
            pipeline,
            settings_sink,
            streams: StreamRegistry::default(),
            abort: Arc::new(AtomicBool::new(false)),
            debug: AtomicBool::new(false),
            alive: AtomicU32::new(1),
            tuning_port: AtomicU16::new(tuning_port),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Next liveness count; never returns zero
    pub fn next_alive(&self) -> u32 {
        match self.alive.fetch_add(1, Ordering::SeqCst) {
            0 => self.alive.fetch_add(1, Ordering::SeqCst),
            count => count,
        }
    }

    /// Port the tuning listener actually bound
    pub fn tuning_port(&self) -> u16 {
        self.tuning_port.load(Ordering::SeqCst)
    }

    pub(crate) fn set_tuning_port(&self, port: u16) {
        self.tuning_port.store(port, Ordering::SeqCst);
    }
}
