use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use obd2_lib::constants::DEFAULT_PORT;
use obd2_lib::{DeviceSession, Elm327, Elm327Config, Profile, RecordOptions, SimulatedSession, StandardCatalog};

mod record;
mod scan;

/// OBD-II data capture tool for ELM327 adapters.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial device of the adapter (e.g. /dev/rfcomm0, /dev/tty.OBDII-SPPDev).
    #[arg(short, long, global = true, default_value = DEFAULT_PORT)]
    port: String,
    /// Use a simulated vehicle instead of a real adapter.
    #[arg(long, global = true, value_enum)]
    simulate: Option<SimProfile>,
    /// Directory for recordings and the supported-PID dump.
    #[arg(short, long, global = true, default_value = "output")]
    output_dir: PathBuf,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan supported PIDs and vehicle info.
    Scan,
    /// Record PID values to CSV until Ctrl+C.
    Record {
        /// Comma-separated PID hex codes or names (default: all supported).
        #[arg(long)]
        pids: Option<String>,
        /// Interval between poll cycles in seconds.
        #[arg(long, default_value = "0", value_parser = parse_interval)]
        interval: Duration,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SimProfile {
    Idle,
    City,
    Highway,
}

impl From<SimProfile> for Profile {
    fn from(profile: SimProfile) -> Self {
        match profile {
            SimProfile::Idle => Profile::Idle,
            SimProfile::City => Profile::City,
            SimProfile::Highway => Profile::Highway,
        }
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("'{s}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("interval must be a finite number >= 0, got {s}"))
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file =
            File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv; RUST_LOG overrides
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let guard = match setup_logging(cli.log_file.clone(), &cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = report(run(cli).await);
    // Flushes the file log, including the error line
    drop(guard);
    code
}

fn report(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let catalog = StandardCatalog::new();

    match cli.simulate {
        Some(profile) => {
            let session = SimulatedSession::new(profile.into(), &catalog);
            dispatch(session, &catalog, cli.command, cli.output_dir).await
        }
        None => {
            println!("Connecting to ELM327...");
            let session = Elm327::connect(Elm327Config::new(cli.port), &catalog)
                .await
                .context("Could not connect to the OBD-II adapter")?;
            dispatch(session, &catalog, cli.command, cli.output_dir).await
        }
    }
}

async fn dispatch<S: DeviceSession>(
    mut session: S,
    catalog: &StandardCatalog,
    command: Commands,
    output_dir: PathBuf,
) -> Result<()> {
    println!(
        "Connected: port={}, protocol={}",
        session.port_name(),
        session.protocol_name()
    );

    let result = match command {
        Commands::Scan => scan::run(&mut session, catalog, &output_dir).await,
        Commands::Record { pids, interval } => {
            let cancel = CancellationToken::new();
            spawn_interrupt_listener(cancel.clone());
            let options = RecordOptions::new().interval(interval);
            record::run(&mut session, catalog, pids.as_deref(), options, &output_dir, &cancel).await
        }
    };

    if let Err(e) = session.close().await {
        warn!("Failed to close {}: {}", session.port_name(), e);
    }
    result
}

/// Cancel `token` on the first Ctrl+C.
fn spawn_interrupt_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, stopping...");
                token.cancel();
            }
            Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("0"), Ok(Duration::ZERO));
        assert_eq!(parse_interval("0.5"), Ok(Duration::from_millis(500)));
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("soon").is_err());
        assert!(parse_interval("NaN").is_err());
    }

    #[test]
    fn test_cli_parses_record_options() {
        let cli = Cli::try_parse_from([
            "obd2-capture",
            "--simulate",
            "city",
            "record",
            "--pids",
            "RPM,010D",
            "--interval",
            "2",
        ])
        .unwrap();
        assert!(matches!(cli.simulate, Some(SimProfile::City)));
        assert_eq!(cli.output_dir, PathBuf::from("output"));
        match cli.command {
            Commands::Record { pids, interval } => {
                assert_eq!(pids.as_deref(), Some("RPM,010D"));
                assert_eq!(interval, Duration::from_secs(2));
            }
            other => panic!("Expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_port_after_subcommand() {
        let cli = Cli::try_parse_from(["obd2-capture", "scan", "--port", "/dev/ttyUSB0"]).unwrap();
        assert_eq!(cli.port, "/dev/ttyUSB0");
        assert!(matches!(cli.command, Commands::Scan));
    }

    #[test]
    fn test_failure_reaches_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");
        let (writer, guard) = tracing_appender::non_blocking(File::create(&path).unwrap());
        let subscriber =
            tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false));

        tracing::subscriber::with_default(subscriber, || {
            report(Err(anyhow::anyhow!("adapter unplugged")));
        });
        drop(guard);

        let logged = std::fs::read_to_string(&path).unwrap();
        assert!(logged.contains("ERROR"), "{logged}");
        assert!(logged.contains("adapter unplugged"), "{logged}");
    }

    #[test]
    fn test_cli_rejects_negative_interval() {
        assert!(Cli::try_parse_from(["obd2-capture", "record", "--interval", "-3"]).is_err());
    }
}
