use clap::Parser;
use roda_spike::{Args, LogDiagnostics, PipelineConfig, SpikeDetection, transport};
use spdlog::LevelFilter;
use spdlog::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    spdlog::init_env_level()?;
    if args.verbose {
        spdlog::default_logger().set_level_filter(LevelFilter::All);
    }

    let config = PipelineConfig::from_args(&args).inspect_err(|e| error!("[System] {}", e))?;
    info!("[System] Booting spike detection in {:?} mode...", config.mode);

    let (mut source, mut sink) = transport::open(&config).inspect_err(|e| error!("[System] {}", e))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("[System] Ctrl+C received. Shutting down...");
        flag.store(true, Ordering::SeqCst);
    })?;

    let diagnostics = Arc::new(LogDiagnostics::new());
    let job = SpikeDetection::new(config, diagnostics.clone());
    let report = job.run(source.as_mut(), sink.as_mut(), &shutdown)?;

    info!(
        "[System] Done: {} lines, {} readings, {} spikes{}",
        report.lines_read,
        report.measurements,
        report.spikes,
        if report.interrupted { " (interrupted)" } else { "" }
    );
    info!("[System] Dropped records: {}", diagnostics.format_counts());

    Ok(())
}
