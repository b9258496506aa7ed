//! Sync engine: relays ledger messages to the remote channel.
//!
//! The [`SyncOrchestrator`] runs full and quick passes. Each pass paces its
//! sends through a per-destination [`RateLimiter`] and [`BurstTracker`], and
//! classifies failures with [`classify`]. The [`ChangeWatcher`] turns origin
//! change notifications into quick pass requests through a [`Scheduler`].

mod burst;
mod classify;
mod clock;
mod debounce;
mod import;
mod orchestrator;
mod rate_limiter;
mod report;
mod scheduler;
mod watcher;

pub use burst::BurstTracker;
pub use classify::{classify, retry_after_hint, ErrorKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::Debouncer;
pub use orchestrator::{PassOptions, SyncOrchestrator};
pub use rate_limiter::RateLimiter;
pub use report::{AbortReason, PassOutcome, SyncReport, SyncResult};
pub use scheduler::{ChannelScheduler, PassKind, PassRequests, Scheduler};
pub use watcher::ChangeWatcher;
