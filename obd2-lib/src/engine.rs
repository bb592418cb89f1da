//! The polling loop: query, normalize, log, aggregate, sleep.

use crate::command::CommandDescriptor;
use crate::error::{ObdError, SessionError};
use crate::log::{Reading, RecordSink};
use crate::response::normalize;
use crate::session::DeviceSession;
use crate::stats::{PidStats, StatsAggregator};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Options of a recording run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Pause between polling cycles. Zero polls back to back.
    pub interval: Duration,
}

impl RecordOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Snapshot handed to the observer after every completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub records: u64,
    pub cycles: u64,
    pub elapsed: Duration,
}

pub trait ProgressObserver {
    fn on_cycle(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressObserver for F {
    fn on_cycle(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Outcome of a run that ended by cancellation.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub duration: Duration,
    pub record_count: u64,
    /// Fully completed polling cycles.
    pub cycles: u64,
    /// Per-PID statistics, ordered by command key.
    pub stats: Vec<PidStats>,
}

/// Run context of one invocation.
#[derive(Default)]
struct RecordingSession {
    stats: StatsAggregator,
    records: u64,
    cycles: u64,
}

pub struct RecordingEngine<P> {
    options: RecordOptions,
    observer: P,
}

impl RecordingEngine<fn(&Progress)> {
    pub fn new(options: RecordOptions) -> Self {
        Self {
            options,
            observer: |_| {},
        }
    }
}

impl<P: ProgressObserver> RecordingEngine<P> {
    pub fn with_observer<Q: ProgressObserver>(self, observer: Q) -> RecordingEngine<Q> {
        RecordingEngine {
            options: self.options,
            observer,
        }
    }

    /// Poll `commands` in order until `cancel` fires.
    ///
    /// The sink receives the header first and is flushed on every exit path.
    /// Losing the device session ends the run with [`ObdError::SessionFailed`].
    pub async fn run<S, K>(
        &mut self,
        session: &mut S,
        commands: &[CommandDescriptor],
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<SessionSummary, ObdError>
    where
        S: DeviceSession,
        K: RecordSink,
    {
        if commands.is_empty() {
            return Err(ObdError::NoPidsResolved);
        }

        let started = Instant::now();
        let mut state = RecordingSession::default();
        info!(
            "Recording {} PID(s) from {} every {:?}",
            commands.len(),
            session.port_name(),
            self.options.interval
        );

        let outcome = match sink.write_header() {
            Ok(()) => self.poll(session, commands, sink, cancel, &mut state, started).await,
            Err(e) => Err(e),
        };
        let flushed = sink.flush();

        match outcome {
            Ok(()) => {
                flushed?;
                let summary = SessionSummary {
                    duration: started.elapsed(),
                    record_count: state.records,
                    cycles: state.cycles,
                    stats: state.stats.summary(),
                };
                info!(
                    "Recording stopped: {} record(s) in {} cycle(s), {:.1}s",
                    summary.record_count,
                    summary.cycles,
                    summary.duration.as_secs_f64()
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(flush_err) = flushed {
                    warn!("Failed to flush log after error: {}", flush_err);
                }
                Err(e)
            }
        }
    }

    async fn poll<S, K>(
        &mut self,
        session: &mut S,
        commands: &[CommandDescriptor],
        sink: &mut K,
        cancel: &CancellationToken,
        state: &mut RecordingSession,
        started: Instant,
    ) -> Result<(), ObdError>
    where
        S: DeviceSession,
        K: RecordSink,
    {
        while !cancel.is_cancelled() {
            for command in commands {
                if cancel.is_cancelled() {
                    debug!("Cancelled before querying {}", command);
                    return Ok(());
                }
                match session.query(command).await {
                    Ok(response) => match normalize(&response) {
                        Some((value, unit)) => {
                            sink.append(&Reading::new(command, value, unit))?;
                            state.stats.record(command, value, unit);
                            state.records += 1;
                        }
                        None if response.is_null() => trace!("{}: no data", command),
                        None => trace!("{}: non-numeric value {}, skipped", command, response),
                    },
                    Err(e) if e.is_fatal() => return Err(session_failed(state.records, e)),
                    Err(e) => warn!("{}: {}, skipping", command, e),
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            state.cycles += 1;
            self.observer.on_cycle(&Progress {
                records: state.records,
                cycles: state.cycles,
                elapsed: started.elapsed(),
            });

            if self.options.interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.options.interval) => {}
                }
            }
        }
        Ok(())
    }
}

fn session_failed(records: u64, source: SessionError) -> ObdError {
    warn!("Device session lost after {} record(s)", records);
    ObdError::SessionFailed { records, source }
}
