use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod analysis;
mod config;
mod cutter;
mod media;
mod mux;
mod session;
mod storage;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tvsaw=debug".parse()?))
        .init();

    let config = Config::load()?;
    tracing::info!(url = %config.source.url, "starting segmentation session");

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let session_config = config.clone();
    let session_shutdown = Arc::clone(&shutdown);
    let outcome = tokio::task::spawn_blocking(move || {
        session::run_stream(&session_config, &session_shutdown)
    })
    .await??;

    tracing::info!(
        boundaries = outcome.boundaries.len(),
        cuts = outcome.cuts.len(),
        end_time_secs = format!("{:.2}", outcome.end_time_secs),
        "session complete"
    );

    if let Some(dir) = &config.output.segments_dir {
        let source = Path::new(&config.source.url);

        let break_ranges: Vec<(f64, f64)> = outcome
            .boundaries
            .iter()
            .map(|b| (b.start_secs, b.end_secs))
            .collect();
        let breaks = cutter::cut_segments(source, &dir.join("breaks"), &break_ranges)?;

        let scene_ranges = analysis::segment_ranges(&outcome.cuts);
        let scenes = cutter::cut_segments(source, &dir.join("scenes"), &scene_ranges)?;

        tracing::info!(breaks, scenes, "cut pass complete");
    }

    Ok(())
}
