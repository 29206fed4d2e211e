//! Simulated camera pipeline
//!
//! An in-process stand-in for the camera pipeline, used when no sensor is
//! attached and by the integration tests. It behaves like the real thing
//! from the server's point of view:
//!
//! - probes are answered asynchronously, one frame after submission, on
//!   the pipeline's own worker thread
//! - parameter images pushed through `apply` are kept per control channel
//!   and reflected by later probes
//! - controls with live analysis get a fresh status block every frame
//! - a synthetic NV12 frame and a 10-bit RGGB dump are always available
//!   while streaming
//!
//! Stopping the stream holds queued probes until it is started again,
//! which lets callers observe probe timeouts.

use super::{
    CameraPipeline, ImageFrame, ImageInfo, ImageKind, LifecycleAction, Mosaic, PipelineControl,
    ProbeRequest,
};
use crate::config::PipelineSettings;
use crate::error::{Result, TuningError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Synthetic output geometry
const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const RAW_BIT_DEPTH: u32 = 10;

/// Commands sent to the pipeline worker
#[derive(Debug)]
enum PipelineCommand {
    Probe(ProbeRequest),
    Shutdown,
}

/// State shared by the facade and its worker
struct PipelineState {
    params: Mutex<HashMap<PipelineControl, Vec<u8>>>,
    streaming: AtomicBool,
    running: AtomicBool,
    frame_count: AtomicU32,
    processed: ImageFrame,
    raw: ImageFrame,
}

impl PipelineState {
    /// Current parameters of `control`, sized for the requester
    fn snapshot(&self, control: PipelineControl, size: usize, frame: u32) -> Vec<u8> {
        let mut params = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = params.entry(control).or_insert_with(|| {
            let mut fresh = vec![0u8; size];
            if let Some(enable) = fresh.first_mut() {
                *enable = 1;
            }
            fresh
        });
        entry.resize(size, 0);

        if control.has_live_status() && size >= 4 {
            entry[size - 4..].copy_from_slice(&frame.to_le_bytes());
        }
        entry.clone()
    }
}

/// Worker loop answering probes once per frame
struct PipelineWorker {
    command_rx: Receiver<PipelineCommand>,
    state: Arc<PipelineState>,
    pending: Vec<ProbeRequest>,
    frame_interval: Duration,
}

impl PipelineWorker {
    fn run(&mut self) {
        tracing::info!("Simulated pipeline started ({:?} per frame)", self.frame_interval);

        while self.state.running.load(Ordering::SeqCst) {
            self.process_commands();
            self.next_frame();
        }

        if !self.pending.is_empty() {
            tracing::debug!("Dropping {} unanswered probe(s)", self.pending.len());
        }
        tracing::info!("Simulated pipeline stopped");
    }

    /// Collect commands until the current frame period ends
    fn process_commands(&mut self) {
        let deadline = Instant::now() + self.frame_interval;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.command_rx.recv_timeout(deadline - now) {
                Ok(cmd) => self.handle_command(cmd),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.state.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: PipelineCommand) {
        match cmd {
            PipelineCommand::Probe(request) => self.pending.push(request),
            PipelineCommand::Shutdown => self.state.running.store(false, Ordering::SeqCst),
        }
    }

    fn next_frame(&mut self) {
        if !self.state.streaming.load(Ordering::SeqCst) {
            return;
        }
        let frame = self.state.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        for request in self.pending.drain(..) {
            let snapshot = self
                .state
                .snapshot(request.control, request.internal_size, frame);
            request.complete(&snapshot);
        }
    }
}

fn synth_processed() -> ImageFrame {
    let info = ImageInfo::processed(FRAME_WIDTH, FRAME_HEIGHT, FRAME_WIDTH);
    let luma = (FRAME_WIDTH * FRAME_HEIGHT) as usize;
    let mut data = vec![128u8; info.mem_size as usize];
    for (i, px) in data[..luma].iter_mut().enumerate() {
        let x = i % FRAME_WIDTH as usize;
        let y = i / FRAME_WIDTH as usize;
        *px = ((x + y) & 0xFF) as u8;
    }
    ImageFrame {
        info,
        data: Arc::from(data),
    }
}

fn synth_raw() -> ImageFrame {
    let stride = FRAME_WIDTH * 2;
    let info = ImageInfo::raw(FRAME_WIDTH, FRAME_HEIGHT, stride, RAW_BIT_DEPTH, Mosaic::Rggb);
    let mut data = Vec::with_capacity(info.mem_size as usize);
    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            let sample = ((x * 4 + y) & 0x3FF) as u16;
            data.extend_from_slice(&sample.to_le_bytes());
        }
    }
    ImageFrame {
        info,
        data: Arc::from(data),
    }
}

/// In-process camera pipeline
pub struct SimulatedPipeline {
    command_tx: Sender<PipelineCommand>,
    state: Arc<PipelineState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedPipeline {
    /// Start the pipeline worker, streaming from the first frame
    pub fn new(frame_interval: Duration) -> Result<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let state = Arc::new(PipelineState {
            params: Mutex::new(HashMap::new()),
            streaming: AtomicBool::new(true),
            running: AtomicBool::new(true),
            frame_count: AtomicU32::new(0),
            processed: synth_processed(),
            raw: synth_raw(),
        });

        let mut worker = PipelineWorker {
            command_rx,
            state: Arc::clone(&state),
            pending: Vec::new(),
            frame_interval,
        };
        let handle = std::thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || worker.run())
            .map_err(|source| TuningError::ThreadSpawn {
                name: "pipeline".into(),
                source,
            })?;

        Ok(Self {
            command_tx,
            state,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        Self::new(settings.frame_interval())
    }

    /// Frames produced so far
    pub fn frame_count(&self) -> u32 {
        self.state.frame_count.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.state.streaming.load(Ordering::SeqCst)
    }

    /// Last parameter image applied to (or sampled from) `control`
    pub fn params(&self, control: PipelineControl) -> Option<Vec<u8>> {
        self.state
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&control)
            .cloned()
    }

    fn frame(&self, kind: ImageKind) -> &ImageFrame {
        match kind {
            ImageKind::Processed => &self.state.processed,
            ImageKind::RawDump => &self.state.raw,
        }
    }
}

impl CameraPipeline for SimulatedPipeline {
    fn submit_probe(&self, request: ProbeRequest) -> Result<()> {
        if !self.state.running.load(Ordering::SeqCst) {
            return Err(TuningError::PipelineUnavailable(
                "pipeline is shut down".into(),
            ));
        }
        self.command_tx
            .send(PipelineCommand::Probe(request))
            .map_err(|_| TuningError::PipelineUnavailable("pipeline worker stopped".into()))
    }

    fn apply(&self, control: PipelineControl, params: &[u8]) -> Result<()> {
        tracing::debug!("Applying {} bytes to {}", params.len(), control);
        self.state
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(control, params.to_vec());
        Ok(())
    }

    fn image_info(&self, kind: ImageKind) -> Result<ImageInfo> {
        if !self.is_streaming() {
            return Err(TuningError::PipelineUnavailable(
                "stream is stopped".into(),
            ));
        }
        Ok(self.frame(kind).info)
    }

    fn latest_frame(&self, kind: ImageKind) -> Option<ImageFrame> {
        self.is_streaming().then(|| self.frame(kind).clone())
    }

    fn lifecycle(&self, action: LifecycleAction) -> Result<()> {
        let streaming = action == LifecycleAction::Start;
        self.state.streaming.store(streaming, Ordering::SeqCst);
        tracing::info!("Simulated pipeline {}", if streaming { "started" } else { "stopped" });
        Ok(())
    }

    fn shutdown(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        let _ = self.command_tx.send(PipelineCommand::Shutdown);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Pipeline worker panicked");
            }
        }
    }
}

impl Drop for SimulatedPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
