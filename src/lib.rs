//! # stf-tuning-server: StarFive ISP tuning server
//!
//! Serves the PC tuning tool over a binary TCP protocol and answers board
//! discovery over UDP. Tuning commands read and write the parameters of the
//! ISP modules through a camera pipeline facade.
//!
//! ## Architecture
//!
//! - **Protocol**: fixed 48-byte command headers, optional payloads and a
//!   chunked settings-file transfer
//! - **Params**: per-module conversion between the tool's packed wire layout
//!   and the pipeline's internal layout, with a shared snapshot cache
//! - **Probes**: a bounded pool of asynchronous parameter requests answered
//!   on the pipeline's thread
//! - **Server**: thread-per-connection sessions, an accept loop with
//!   backpressure and a discovery responder
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stf_tuning_server::{config::ServerConfig, SimulatedPipeline, TuningServer};
//!
//! let config = ServerConfig::load_or_default(None)?;
//! let pipeline = Arc::new(SimulatedPipeline::from_settings(&config.pipeline)?);
//! let mut server = TuningServer::start(config, pipeline)?;
//! // ...
//! server.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod probe;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, TuningError};
pub use params::{ParamRegistry, ParameterDescriptor};
pub use pipeline::{CameraPipeline, PipelineControl, SimulatedPipeline};
pub use probe::ProbeRequestPool;
pub use protocol::{CommandHeader, Direction};
pub use server::{ServerContext, TuningServer};
