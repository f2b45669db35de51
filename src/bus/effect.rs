//! Effects produced by bus transitions

use super::state::BusError;

/// Effects to be executed after a bus transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Restart the poll timer using the interval for the new state
    ResetPollTimer,
    StopPollTimer,
    EmitConnect,
    EmitError(BusError),
    /// Forget the cursor and fetch a fresh one
    Reinitialize,
}
