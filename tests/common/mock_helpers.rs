//! Mock construction helpers

use super::test_timeout;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stf_tuning_server::config::ServerConfig;
use stf_tuning_server::pipeline::{
    ImageFrame, ImageInfo, ImageKind, LifecycleAction, PipelineControl, ProbeRequest,
};
use stf_tuning_server::protocol::{encode_request, CommandHeader};
use stf_tuning_server::{CameraPipeline, Result, SimulatedPipeline, TuningError, TuningServer};

/// Config with ephemeral ports and no discovery
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.tuning.port = 0;
    config.discovery.enabled = false;
    config
}

/// Server backed by a fast simulated pipeline
pub fn start_simulated_server(config: ServerConfig) -> TuningServer {
    let pipeline = SimulatedPipeline::new(Duration::from_millis(5)).unwrap();
    TuningServer::start(config, Arc::new(pipeline)).unwrap()
}

/// Pipeline that accepts probes and never answers them
#[derive(Default)]
pub struct StallingPipeline {
    held: Mutex<Vec<ProbeRequest>>,
    applied: Mutex<HashMap<PipelineControl, Vec<u8>>>,
}

impl StallingPipeline {
    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Answer every held probe with an all-zero snapshot
    pub fn release_all(&self) {
        for request in self.held.lock().unwrap().drain(..) {
            let snapshot = vec![0u8; request.internal_size];
            request.complete(&snapshot);
        }
    }

    pub fn applied(&self, control: PipelineControl) -> Option<Vec<u8>> {
        self.applied.lock().unwrap().get(&control).cloned()
    }
}

impl CameraPipeline for StallingPipeline {
    fn submit_probe(&self, request: ProbeRequest) -> Result<()> {
        self.held.lock().unwrap().push(request);
        Ok(())
    }

    fn apply(&self, control: PipelineControl, params: &[u8]) -> Result<()> {
        self.applied.lock().unwrap().insert(control, params.to_vec());
        Ok(())
    }

    fn image_info(&self, _kind: ImageKind) -> Result<ImageInfo> {
        Err(TuningError::PipelineUnavailable("stalled".into()))
    }

    fn latest_frame(&self, _kind: ImageKind) -> Option<ImageFrame> {
        None
    }

    fn lifecycle(&self, _action: LifecycleAction) -> Result<()> {
        Ok(())
    }
}

/// Minimal tuning tool client
pub struct TuningClient {
    stream: TcpStream,
}

impl TuningClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], addr.port()));
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(test_timeout())).unwrap();
        Self { stream }
    }

    pub fn send(&mut self, header: &CommandHeader, payload: &[u8]) {
        self.stream.write_all(&encode_request(header, payload)).unwrap();
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    pub fn read_header(&mut self) -> CommandHeader {
        let mut raw = [0u8; CommandHeader::SIZE];
        self.stream.read_exact(&mut raw).unwrap();
        CommandHeader::decode(&raw).unwrap()
    }

    pub fn read_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).unwrap();
        buf
    }

    /// Send a request and read the echoed header and its payload
    pub fn request(&mut self, header: &CommandHeader, payload: &[u8]) -> (CommandHeader, Vec<u8>) {
        self.send(header, payload);
        let reply = self.read_header();
        let body = self.read_bytes(reply.payload_size as usize);
        (reply, body)
    }
}
