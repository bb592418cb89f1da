//! Example: record a simulated drive for a fixed time and print the statistics
//!
//! Runs without an adapter: `cargo run -p obd2-lib --example simulated_drive -- --profile city`

use clap::Parser;
use obd2_lib::engine::Progress;
use obd2_lib::{
    CsvLog, DeviceSession, Profile, RecordOptions, RecordingEngine, SimulatedSession, StandardCatalog, resolve,
};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record a simulated drive to CSV")]
struct Args {
    /// Driving profile: idle, city or highway
    #[arg(short, long, default_value = "city")]
    profile: String,

    /// Comma-separated PIDs to record (default: all simulated)
    #[arg(long)]
    pids: Option<String>,

    /// Seconds between poll cycles
    #[arg(short, long, default_value = "0.2")]
    interval: f64,

    /// Total recording time in seconds
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let profile = Profile::from_name(&args.profile).ok_or_else(|| format!("Unknown profile '{}'", args.profile))?;
    let catalog = StandardCatalog::new();
    let mut session = SimulatedSession::new(profile, &catalog);
    let resolution = resolve(args.pids.as_deref(), &catalog, session.supported_commands())?;

    let mut log = CsvLog::create(Path::new(&args.output), chrono::Local::now())?;
    if let Some(path) = log.path() {
        info!("Writing {}", path.display());
    }

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let duration = Duration::from_secs(args.duration);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        stop.cancel();
    });

    let options = RecordOptions::new().interval(Duration::from_secs_f64(args.interval.max(0.0)));
    let mut engine = RecordingEngine::new(options).with_observer(|p: &Progress| {
        if p.cycles % 10 == 0 {
            info!("{} records after {} cycles", p.records, p.cycles);
        }
    });
    let summary = engine.run(&mut session, &resolution.commands, &mut log, &cancel).await?;

    println!("{} records in {:.1}s", summary.record_count, summary.duration.as_secs_f64());
    for s in &summary.stats {
        println!(
            "{:<6} {:<24} min {:>9.2}  max {:>9.2}  avg {:>9.2} {}",
            s.pid,
            s.name,
            s.min,
            s.max,
            s.average(),
            s.unit
        );
    }
    Ok(())
}
