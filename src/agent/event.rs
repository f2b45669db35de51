//! Events dispatched into the conversation lifecycle

use super::state::ConvoFatalError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvoEvent {
    /// Start (or restart after a retryable error) the metadata fetch
    Init,
    /// Metadata resolved
    Ready,
    /// Messaging is switched off for this conversation
    Disable,
    /// Messaging is switched back on
    Enable,
    Background,
    Suspend,
    /// `stale` is set when the agent sat backgrounded past the inactive
    /// timeout
    Resume { stale: bool },
    Error(ConvoFatalError),
}

impl ConvoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConvoEvent::Init => "init",
            ConvoEvent::Ready => "ready",
            ConvoEvent::Disable => "disable",
            ConvoEvent::Enable => "enable",
            ConvoEvent::Background => "background",
            ConvoEvent::Suspend => "suspend",
            ConvoEvent::Resume { .. } => "resume",
            ConvoEvent::Error(_) => "error",
        }
    }
}
