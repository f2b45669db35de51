//! Shared log event bus
//!
//! One poller per account. It tracks the log cursor, polls at the cadence
//! its consumers ask for, and fans new log entries out to subscribers.
//! Lifecycle decisions go through the pure [`transition`] function; the
//! runtime in `executor` executes the resulting effects.

mod cursor;
mod effect;
pub mod event;
mod executor;
mod poll_interval;
pub mod state;
mod subscription;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use cursor::{select_new_entries, NewEntries};
pub use effect::Effect;
pub use event::BusEvent;
pub use executor::{BusSnapshot, EventBus, PollIntervalGuard};
pub use poll_interval::{PollIntervals, PollToken};
pub use state::{BusError, BusErrorCode, BusRetry, BusStatus};
pub use subscription::{BusEmit, BusSubscription, SubscriptionFilter};
pub use transition::transition;
