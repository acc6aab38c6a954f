//! Cycle scheduling.
//!
//! A fixed poll tick checks whether a cycle is due. A cycle is due when none
//! has succeeded yet, or when more than `update_frequency` has passed since
//! the start of the last successful one. Failed cycles leave that instant
//! untouched, so they are retried on the next tick.

use async_trait::async_trait;
use chrono::{Local, TimeDelta};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::sync::engine::{CycleReport, SyncEngine};

/// Something that can run one sync cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> SyncResult<CycleReport>;
}

#[async_trait]
impl CycleRunner for SyncEngine {
    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        SyncEngine::run_cycle(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    NotDue,
    Completed(CycleReport),
    Failed(SyncError),
}

pub struct Scheduler<R> {
    runner: R,
    frequency: Duration,
    poll_interval: Duration,
    state: SchedulerState,
    last_success: Option<Instant>,
    consecutive_failures: u32,
}

impl<R: CycleRunner> Scheduler<R> {
    pub fn new(runner: R, frequency: Duration, poll_interval: Duration) -> Self {
        Self {
            runner,
            frequency,
            poll_interval,
            state: SchedulerState::Idle,
            last_success: None,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Start instant of the last successful cycle.
    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_success {
            None => true,
            Some(started) => now.saturating_duration_since(started) > self.frequency,
        }
    }

    /// One state-machine step at `now`. Runs a cycle if one is due.
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state == SchedulerState::Running || !self.is_due(now) {
            return TickOutcome::NotDue;
        }

        self.state = SchedulerState::Running;
        let result = self.runner.run_cycle().await;
        self.state = SchedulerState::Idle;

        match result {
            Ok(report) => {
                self.last_success = Some(now);
                self.consecutive_failures = 0;
                info!(
                    "Cycle complete: {} scanned, {} uploaded ({}), {} already mirrored in {:.1}s; next cycle after {}",
                    report.files_scanned,
                    report.files_uploaded,
                    humansize::format_size(report.bytes_uploaded, humansize::BINARY),
                    report.files_skipped,
                    report.duration.as_secs_f64(),
                    self.next_due_display()
                );
                TickOutcome::Completed(report)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                error!(
                    "Cycle failed ({} error, {} in a row): {}; retrying in {}s",
                    e.kind(),
                    self.consecutive_failures,
                    e,
                    self.poll_interval.as_secs()
                );
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick forever. Never runs two cycles at once; a long cycle delays the next check.
    pub async fn run(mut self) {
        info!(
            "Scheduler started: every {} min, polling every {}s",
            self.frequency.as_secs() / 60,
            self.poll_interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = interval.tick().await;
            self.tick(now).await;
        }
    }

    /// Wall-clock time of the next due cycle, or "never" past the calendar range.
    fn next_due_display(&self) -> String {
        TimeDelta::from_std(self.frequency)
            .ok()
            .and_then(|delta| Local::now().checked_add_signed(delta))
            .map(|due| due.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string())
    }
}
