use anyhow::{Context, Result};
use chrono::Local;
use obd2_lib::engine::Progress;
use obd2_lib::{CsvLog, DeviceSession, RecordOptions, RecordingEngine, SessionSummary, StandardCatalog, resolve};
use std::io::{self, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Resolve `pids`, then record until `cancel` fires and print the summary table.
pub async fn run<S: DeviceSession>(
    session: &mut S,
    catalog: &StandardCatalog,
    pids: Option<&str>,
    options: RecordOptions,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    // Resolution failures must happen before any file is created
    let resolution = resolve(pids, catalog, session.supported_commands())?;

    println!("\nRecording {} PIDs (Ctrl+C to stop):", resolution.commands.len());
    for command in &resolution.commands {
        println!("  {} {}", command.code(), command.name);
    }

    let mut log = CsvLog::create(output_dir, Local::now())
        .with_context(|| format!("Failed to create a recording in {:?}", output_dir))?;
    let log_path = log.path().map(|p| p.display().to_string()).unwrap_or_default();
    println!("Output: {}\n", log_path);

    let mut engine = RecordingEngine::new(options).with_observer(print_progress);
    let result = engine.run(session, &resolution.commands, &mut log, cancel).await;
    println!();

    let summary = result.context("Recording stopped")?;
    print_summary(&summary, &log_path);
    Ok(())
}

fn print_progress(progress: &Progress) {
    print!("\r  {} records, {}s elapsed", progress.records, progress.elapsed.as_secs());
    let _ = io::stdout().flush();
}

fn print_summary(summary: &SessionSummary, log_path: &str) {
    println!("\n=== Recording Summary ===");
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
    println!("  Records:  {}", summary.record_count);
    println!("  File:     {}", log_path);

    if summary.stats.is_empty() {
        return;
    }
    println!("\n  {:<6} {:<30} {:>10} {:>10} {:>10} Unit", "PID", "Name", "Min", "Max", "Avg");
    println!("  {:<6} {:<30} {:>10} {:>10} {:>10} ---", "---", "---", "---", "---", "---");
    for s in &summary.stats {
        println!(
            "  {:<6} {:<30} {:>10.2} {:>10.2} {:>10.2} {}",
            s.pid,
            s.name,
            s.min,
            s.max,
            s.average(),
            s.unit
        );
    }
}
