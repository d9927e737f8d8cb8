//! Load-scheduling and concurrency-control core.
//!
//! The scheduler converts the requests-per-second target into launched write
//! attempts, the limiter bounds how many run at once and the tracker lets the
//! run block until every launched attempt has finished.

pub mod limiter;
pub mod scheduler;
pub mod tracker;

pub use self::{
    limiter::ConcurrencyLimiter,
    scheduler::{RateScheduler, RunOutcome},
    tracker::CompletionTracker,
};
