//! Event bus lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the shared log poller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusStatus {
    /// Created, first log fetch not yet resolved
    #[default]
    Uninitialized,
    /// Re-fetching the starting cursor after an error
    Initializing,
    /// Foreground polling
    Ready,
    /// Slow polling
    Backgrounded,
    /// No polling at all
    Suspended,
    /// Polling stopped until retried
    Error { error: BusError },
}

impl BusStatus {
    pub fn name(&self) -> &'static str {
        match self {
            BusStatus::Uninitialized => "uninitialized",
            BusStatus::Initializing => "initializing",
            BusStatus::Ready => "ready",
            BusStatus::Backgrounded => "backgrounded",
            BusStatus::Suspended => "suspended",
            BusStatus::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BusStatus::Error { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusErrorCode {
    InitFailed,
    PollFailed,
}

impl fmt::Display for BusErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusErrorCode::InitFailed => write!(f, "init_failed"),
            BusErrorCode::PollFailed => write!(f, "poll_failed"),
        }
    }
}

/// How to recover from a bus error. Hand it back to `EventBus::retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusRetry {
    pub code: BusErrorCode,
}

/// Error surfaced to every subscriber when polling stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusError {
    pub code: BusErrorCode,
    pub message: String,
    pub retry: BusRetry,
}

impl BusError {
    pub fn new(code: BusErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry: BusRetry { code },
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
