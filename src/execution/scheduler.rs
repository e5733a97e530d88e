use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};

use super::coordinator::{ExecutionCoordinator, PairOutcome, PairReport};

/// Periodic driver for the coordinator
///
/// Every tick dispatches a new round without waiting for the previous one;
/// pairs still busy from an earlier round are skipped by the coordinator.
pub struct Scheduler {
    interval: Duration,
    shutdown_grace: Duration,
    last_tick: Option<DateTime<Utc>>,
    rounds: u64,
}

impl Scheduler {
    pub fn new(interval: Duration, shutdown_grace: Duration) -> Self {
        Self {
            interval,
            shutdown_grace,
            last_tick: None,
            rounds: 0,
        }
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped)
    pub async fn run(
        &mut self,
        coordinator: &ExecutionCoordinator,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: JoinSet<PairReport> = JoinSet::new();

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            pairs = coordinator.pair_count(),
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    reap_finished(&mut in_flight);

                    self.last_tick = Some(Utc::now());
                    self.rounds += 1;
                    tracing::info!(round = self.rounds, in_flight = in_flight.len(), "Tick");

                    coordinator.dispatch_round(&mut in_flight);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.drain(in_flight).await;
    }

    /// Give in-flight pair tasks `shutdown_grace` to finish, then abort them
    async fn drain(&self, mut in_flight: JoinSet<PairReport>) {
        if in_flight.is_empty() {
            tracing::info!(rounds = self.rounds, "Scheduler stopped");
            return;
        }

        tracing::info!(
            in_flight = in_flight.len(),
            grace_secs = self.shutdown_grace.as_secs(),
            "Waiting for in-flight pairs"
        );

        let drained = timeout(self.shutdown_grace, async {
            while let Some(joined) = in_flight.join_next().await {
                log_joined(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = in_flight.len(),
                "Shutdown grace period elapsed, aborting pairs"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }

        tracing::info!(rounds = self.rounds, "Scheduler stopped");
    }
}

fn reap_finished(in_flight: &mut JoinSet<PairReport>) {
    while let Some(joined) = in_flight.try_join_next() {
        log_joined(joined);
    }
}

fn log_joined(joined: Result<PairReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => log_report(&report),
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Pair task panicked"),
    }
}

/// One-line summary of a finished pair round
fn log_report(report: &PairReport) {
    let outcome = match &report.outcome {
        PairOutcome::QuoteFailed(_) => "quote_failed",
        PairOutcome::NoSignal => "no_signal",
        PairOutcome::InvalidIntent(_) => "invalid_intent",
        PairOutcome::Filled(_) => "filled",
        PairOutcome::Rejected(_) => "rejected",
        PairOutcome::OrderFailed(_) => "order_failed",
        PairOutcome::Busy => "busy",
        PairOutcome::Cancelled => "cancelled",
        PairOutcome::Aborted(_) => "aborted",
    };

    tracing::debug!(
        venue = %report.venue,
        symbol = %report.symbol,
        outcome,
        "Pair round finished"
    );
}
