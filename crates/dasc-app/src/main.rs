// Logging behavior:
// - Writes logs to both stderr and a daily-rotated file at logs/dasc-concat.log.
// - Default log level is INFO. Control via RUST_LOG, e.g.:
//   * RUST_LOG=info                       # standard logging (default)
//   * RUST_LOG=debug                      # verbose, includes per-packet classification
//   * RUST_LOG=dasc_engine=debug,info      # fine-grained per-crate control
// - The logs/ directory is created on startup if missing; file output uses a
//   non-blocking writer so a slow disk never stalls the engine thread.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dasc_app::Settings;
use dasc_checkpoint::FileCheckpointStore;
use dasc_engine::{AssemblyEngine, EngineConfig};
use dasc_io::{ColumnarReader, DirectoryPacketSource, PacketReader, SegYReader};
use dasc_resample::Resampler;
use dasc_sink::Hdf5ChunkSink;
use dasc_telemetry::PipelineMetrics;
use dasc_types::SystemKind;

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "dasc-concat.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let file_layer = fmt::layer().with_writer(non_blocking_file).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Removes rotated log files in `logs/` older than `retention_days` days.
/// `DASC_LOG_RETENTION_DAYS=0` disables pruning; default is 7 days.
fn prune_old_logs(retention_days: Option<u64>) {
    let retention = retention_days.unwrap_or(7);
    if retention == 0 {
        return;
    }
    let cutoff = match SystemTime::now().checked_sub(Duration::from_secs(retention * 24 * 60 * 60)) {
        Some(t) => t,
        None => return,
    };

    let logs_dir = Path::new("logs");
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.starts_with("dasc-concat.log.") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if modified < cutoff {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(file = %path.display(), error = %e, "failed to remove old log file");
                    } else {
                        tracing::info!(file = %path.display(), "removed old log file");
                    }
                }
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dasc-concat", author, version, about = "DAS stream-assembly engine")]
struct Cli {
    /// Path to the INI configuration file.
    #[arg(long = "config", default_value = "config.ini")]
    config: PathBuf,

    /// Worker threads for time-axis decimation (C3).
    #[arg(long = "num_threads", default_value_t = 4)]
    num_threads: usize,
}

fn build_reader(system_kind: SystemKind) -> Box<dyn PacketReader> {
    match system_kind {
        SystemKind::Columnar => Box::new(ColumnarReader),
        SystemKind::SegY => Box::new(SegYReader),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = init_logging()?;
    let retention_days = std::env::var("DASC_LOG_RETENTION_DAYS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok());
    prune_old_logs(retention_days);

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), num_threads = cli.num_threads, "starting dasc-concat");

    let settings = Settings::load(&cli.config).map_err(|e| {
        tracing::error!(error = %dasc_app::format_error_chain(&e), "failed to load configuration");
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    let system_kind = settings.system_kind()?;
    let clock = dasc_foundation::real_clock();

    let source = DirectoryPacketSource::new(system_kind, settings.local_root(), clock);
    let reader = build_reader(system_kind);
    let resampler = Resampler::new(cli.num_threads, settings.constants.sps, settings.constants.dx);
    let sink = Hdf5ChunkSink::new(settings.save_root());
    let checkpoint = FileCheckpointStore::new(settings.save_root());
    let metrics = Arc::new(PipelineMetrics::default());

    let engine_config = EngineConfig {
        sps: settings.constants.sps,
        chunk_duration_secs: settings.constants.concat_time,
    };

    let mut engine = AssemblyEngine::new(
        Box::new(source),
        reader,
        resampler,
        Box::new(sink),
        Box::new(checkpoint),
        engine_config,
    )
    .with_metrics(metrics.clone());

    engine.restore_or_init().map_err(|e| {
        tracing::error!(error = %dasc_app::format_error_chain(&e), "failed to resume from checkpoint");
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    // The engine loop is synchronous and blocking-I/O-bound; it runs on
    // tokio's blocking-thread pool rather than as a cooperative task, and
    // must never be polled mid-classification. The tokio runtime otherwise
    // exists only to host Ctrl-C handling and the periodic stats log below.
    let mut handle = tokio::task::spawn_blocking(move || engine.run());
    let mut stats_interval = tokio::time::interval(Duration::from_secs(30));

    tokio::select! {
        res = &mut handle => {
            match res {
                Ok(Ok(())) => {
                    tracing::info!("packet source exhausted; exiting cleanly");
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %dasc_app::format_error_chain(&err), "engine aborted");
                    return Err(Box::new(err));
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "engine thread panicked");
                    return Err(Box::new(join_err));
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received; at most one in-flight packet's work is lost, next run resumes from the last checkpoint");
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %dasc_app::format_error_chain(&err), "engine returned an error while shutting down"),
                Err(join_err) => tracing::warn!(error = %join_err, "engine thread panicked while shutting down"),
            }
        }
        _ = async {
            loop {
                stats_interval.tick().await;
                let snap = metrics.snapshot();
                tracing::info!(
                    packets_read = snap.packets_read,
                    packets_skipped = snap.packets_skipped,
                    gaps_detected = snap.gaps_detected,
                    overlaps_skipped = snap.overlaps_skipped,
                    chunks_written = snap.chunks_written,
                    packets_per_sec = snap.packets_per_sec,
                    "pipeline running"
                );
            }
        } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_selection_matches_system_kind() {
        let columnar = build_reader(SystemKind::Columnar);
        let segy = build_reader(SystemKind::SegY);
        // No public discriminant to assert on; constructing both without
        // panicking is the behavior under test (the match is exhaustive).
        drop(columnar);
        drop(segy);
    }
}
