//! StarFive ISP tuning server - Main Entry Point
//!
//! Usage: `stf-tuning-server [config.toml]`
//!
//! Runs until `q` or `x` is entered on stdin, or stdin is closed.

use anyhow::Context;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use stf_tuning_server::config::{LoggingSettings, PipelineBackend, ServerConfig};
use stf_tuning_server::{CameraPipeline, SimulatedPipeline, TuningServer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "stf-tuning-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn wait_for_quit() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if matches!(line.trim(), "q" | "x") => return,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                return;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServerConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let _log_guard = init_logging(&config.logging);
    tracing::info!("Starting StarFive ISP tuning server");

    let pipeline: Arc<dyn CameraPipeline> = match config.pipeline.backend {
        PipelineBackend::Simulated => Arc::new(
            SimulatedPipeline::from_settings(&config.pipeline)
                .context("Failed to start simulated pipeline")?,
        ),
    };

    let mut server =
        TuningServer::start(config, pipeline).context("Failed to start tuning server")?;
    println!(
        "Tuning server on {}; enter 'q' to quit",
        server.local_tuning_addr()
    );

    wait_for_quit();

    tracing::info!("Shutting down...");
    server.shutdown();
    Ok(())
}
