//! Reconciliation and manifest synchronization.
//!
//! This module decides which files must be pushed on each cycle, keeps the
//! local and remote manifests convergent, and schedules cycles.

pub mod engine;
pub mod exclude;
pub mod manifest;
pub mod progress;
pub mod scanner;
pub mod scheduler;

pub use engine::{CycleReport, SyncEngine};
pub use exclude::IgnoreRules;
pub use manifest::{ManifestStore, UploadedSet};
pub use progress::TransferBar;
pub use scanner::Scanner;
pub use scheduler::{CycleRunner, Scheduler, SchedulerState, TickOutcome};
