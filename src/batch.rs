// SPDX-License-Identifier: MIT

//! Concurrent batch execution of zone migrations.
//!
//! The [`BatchDriver`] feeds an ordered zone list through a bounded pool
//! of worker tasks, each running one [`crate::migrator::ZoneMigrator`]
//! pipeline to completion before taking the next name. Results are
//! aggregated in input order regardless of completion order.
//!
//! Stopping is cooperative and two-staged: cancelling the shared token
//! (externally on SIGINT/SIGTERM, or internally under the stop-on-error
//! policy) halts intake and aborts in-flight HTTP work, after which the
//! driver waits out the configured grace period for workers to unwind.
//! A second, forced signal or grace expiry abandons whatever is left;
//! abandoned and never-started zones are recorded as cancelled.

use crate::errors::MigrateError;
use crate::migrator::{MigrationOutcome, ZoneMigrator};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Batch behavior when a zone migration fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OnError {
    /// Record the failure and keep scheduling remaining zones.
    #[default]
    Continue,
    /// Stop intake, cancel in-flight zones and return early.
    Stop,
}

/// Tuning knobs for a batch run.
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Maximum number of zones in flight at once (at least 1).
    pub concurrency: usize,

    /// What to do when a zone fails.
    pub on_error: OnError,

    /// Interval between progress snapshots; zero disables the ticker.
    /// The final snapshot is emitted regardless.
    pub progress_interval: Duration,

    /// How long to wait for in-flight zones to unwind after a stop;
    /// zero waits indefinitely.
    pub graceful_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            on_error: OnError::Continue,
            progress_interval: Duration::from_secs(30),
            graceful_timeout: Duration::ZERO,
        }
    }
}

/// Outcome of one zone within a batch.
#[derive(Debug)]
pub struct ZoneResult {
    /// The zone name exactly as it appeared in the input.
    pub zone: String,

    /// The migration outcome or the tagged error.
    pub outcome: Result<MigrationOutcome, MigrateError>,

    /// Wall-clock time spent on this zone.
    pub elapsed: Duration,
}

/// Aggregated results of a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per input zone, input order preserved.
    pub results: Vec<ZoneResult>,

    /// The stop-on-error policy fired.
    pub stopped_by_policy: bool,

    /// An external interrupt stopped the run.
    pub interrupted: bool,

    /// The grace period expired (or a second signal forced abandonment)
    /// with work still in flight.
    pub grace_expired: bool,

    /// Total wall-clock time of the run.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Number of zones that migrated successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Number of zones that failed or were cancelled.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// True if every zone succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Tally of successful zones by migrator action label.
    #[must_use]
    pub fn action_totals(&self) -> BTreeMap<&'static str, usize> {
        let mut totals = BTreeMap::new();
        for result in &self.results {
            if let Ok(outcome) = &result.outcome {
                *totals.entry(outcome.action.as_str()).or_insert(0) += 1;
            }
        }
        totals
    }

    /// Tally of failed zones by error kind label.
    #[must_use]
    pub fn error_totals(&self) -> BTreeMap<&'static str, usize> {
        let mut totals = BTreeMap::new();
        for result in &self.results {
            if let Err(e) = &result.outcome {
                *totals.entry(e.kind()).or_insert(0) += 1;
            }
        }
        totals
    }
}

/// Runs many per-zone pipelines concurrently with bounded parallelism.
pub struct BatchDriver {
    migrator: Arc<ZoneMigrator>,
    options: BatchOptions,
}

impl BatchDriver {
    /// Build a driver around a shared migrator.
    #[must_use]
    pub fn new(migrator: Arc<ZoneMigrator>, options: BatchOptions) -> Self {
        Self { migrator, options }
    }

    /// Run the batch to completion, early stop, or abandonment.
    ///
    /// `cancel` is the token shared with the API clients: cancelling it
    /// (first SIGINT/SIGTERM, or the stop-on-error policy) stops intake
    /// and preempts in-flight HTTP work. `forced` (second signal) skips
    /// the grace period and abandons immediately.
    pub async fn run(
        &self,
        zones: Vec<String>,
        cancel: &CancellationToken,
        forced: &CancellationToken,
    ) -> BatchReport {
        let total = zones.len();
        let started = Instant::now();
        let zones = Arc::new(zones);
        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<MigrationOutcome, MigrateError>, Duration)>(
            self.options.concurrency.max(1),
        );

        let mut workers = Vec::new();
        for _ in 0..self.options.concurrency.max(1).min(total.max(1)) {
            workers.push(tokio::spawn(Self::worker(
                Arc::clone(&self.migrator),
                Arc::clone(&zones),
                Arc::clone(&cursor),
                cancel.clone(),
                tx.clone(),
            )));
        }
        drop(tx);

        let progress_enabled = !self.options.progress_interval.is_zero();
        let mut ticker = tokio::time::interval(if progress_enabled {
            self.options.progress_interval
        } else {
            Duration::from_secs(3600)
        });
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut slots: Vec<Option<ZoneResult>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut completed = 0usize;
        let mut report = BatchReport::default();
        let mut stopping = false;
        let far_future = Instant::now() + Duration::from_secs(86_400 * 365);
        let mut grace_deadline = far_future;

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some((index, outcome, elapsed)) = received else {
                        break;
                    };
                    log_zone_outcome(&zones[index], &outcome, elapsed);
                    let failed = outcome.is_err();
                    slots[index] = Some(ZoneResult {
                        zone: zones[index].clone(),
                        outcome,
                        elapsed,
                    });
                    completed += 1;
                    if failed && self.options.on_error == OnError::Stop && !stopping {
                        stopping = true;
                        report.stopped_by_policy = true;
                        grace_deadline = self.grace_deadline(far_future);
                        warn!(zone = %zones[index], "Stopping batch on first failure");
                        cancel.cancel();
                    }
                    if completed == total {
                        break;
                    }
                }
                () = cancel.cancelled(), if !stopping => {
                    stopping = true;
                    report.interrupted = true;
                    grace_deadline = self.grace_deadline(far_future);
                    warn!("Cancellation requested; waiting for in-flight zones to unwind");
                }
                () = forced.cancelled(), if stopping => {
                    report.grace_expired = true;
                    warn!("Forced abandonment; dropping in-flight zones");
                    break;
                }
                () = tokio::time::sleep_until(grace_deadline), if stopping => {
                    report.grace_expired = true;
                    warn!("Graceful timeout reached; abandoning in-flight zones");
                    break;
                }
                _ = ticker.tick(), if progress_enabled => {
                    self.log_progress(total, completed, &slots, &cursor, started);
                }
            }
        }

        for worker in &workers {
            worker.abort();
        }

        self.log_progress(total, completed, &slots, &cursor, started);

        report.results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| ZoneResult {
                    zone: zones[index].clone(),
                    outcome: Err(MigrateError::Cancelled),
                    elapsed: Duration::ZERO,
                })
            })
            .collect();
        report.elapsed = started.elapsed();
        report
    }

    /// One pool unit: take the next zone off the shared cursor, run it,
    /// report the indexed result.
    async fn worker(
        migrator: Arc<ZoneMigrator>,
        zones: Arc<Vec<String>>,
        cursor: Arc<AtomicUsize>,
        cancel: CancellationToken,
        tx: mpsc::Sender<(usize, Result<MigrationOutcome, MigrateError>, Duration)>,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= zones.len() {
                return;
            }
            let zone_started = Instant::now();
            let outcome = migrator.migrate(&zones[index]).await;
            let elapsed = zone_started.elapsed();
            if tx.send((index, outcome, elapsed)).await.is_err() {
                return;
            }
        }
    }

    fn grace_deadline(&self, far_future: Instant) -> Instant {
        if self.options.graceful_timeout.is_zero() {
            far_future
        } else {
            Instant::now() + self.options.graceful_timeout
        }
    }

    fn log_progress(
        &self,
        total: usize,
        completed: usize,
        slots: &[Option<ZoneResult>],
        cursor: &AtomicUsize,
        started: Instant,
    ) {
        let succeeded = slots
            .iter()
            .filter(|s| matches!(s, Some(r) if r.outcome.is_ok()))
            .count();
        let failed = slots
            .iter()
            .filter(|s| matches!(s, Some(r) if r.outcome.is_err()))
            .count();
        let dispatched = cursor.load(Ordering::SeqCst).min(total);
        info!(
            total = total,
            completed = completed,
            succeeded = succeeded,
            failed = failed,
            in_flight = dispatched.saturating_sub(completed),
            elapsed = ?started.elapsed(),
            "Batch progress"
        );
    }
}

fn log_zone_outcome(
    zone: &str,
    outcome: &Result<MigrationOutcome, MigrateError>,
    elapsed: Duration,
) {
    match outcome {
        Ok(result) => info!(
            zone = %zone,
            action = result.action.as_str(),
            changes = result.changes.len(),
            elapsed = ?elapsed,
            "Zone migrated"
        ),
        Err(e) => error!(
            zone = %zone,
            kind = e.kind(),
            error = %e,
            "Zone migration failed"
        ),
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod batch_tests;
