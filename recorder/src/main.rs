mod http;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use timelapse_collector::ScreenshotCollector;
use timelapse_common::config::{Config, OutputConfig};
use timelapse_common::frame::Screenshot;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("failed to write time-lapse output: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] timelapse_common::config::ConfigError),
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        url = config.capture.url,
        interval_ms = config.collector.interval_ms,
        max_screenshots = config.collector.max_screenshots,
        output_dir = config.output.dir,
        "starting time-lapse recorder"
    );

    let source = match http::HttpCaptureSource::new(&config.capture) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to build capture source");
            std::process::exit(1);
        }
    };

    let collector = match ScreenshotCollector::new(config.collector.clone(), source) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build screenshot collector");
            std::process::exit(1);
        }
    };

    collector.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down, finalizing time-lapse");

    let frames = collector.stop().await;
    match write_timelapse(&frames, &config.output).await {
        Ok(()) => info!(frames = frames.len(), dir = config.output.dir, "time-lapse written"),
        Err(e) => {
            error!(error = %e, "failed to write time-lapse");
            std::process::exit(1);
        }
    }
}

/// Write each retained frame under `output.dir` with its date-partitioned
/// file name.
async fn write_timelapse(frames: &[Screenshot], output: &OutputConfig) -> Result<(), RecorderError> {
    for frame in frames {
        let path = Path::new(&output.dir).join(frame.file_name(&output.prefix));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &frame.data).await?;
        debug!(path = %path.display(), bytes = frame.payload_size(), "wrote frame");
    }
    Ok(())
}
