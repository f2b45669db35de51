//! Effects produced by conversation lifecycle transitions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Fetch conversation metadata and the newest page of messages
    FetchConvo,
    /// Drop confirmed messages and history progress; pending sends survive
    ResetTimeline,
    /// Re-fetch metadata without touching the timeline
    RefreshConvo,
    /// Ask the bus for the active poll cadence
    RequestPollInterval,
    ReleasePollInterval,
}
