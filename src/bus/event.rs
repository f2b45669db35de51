//! Events dispatched into the bus lifecycle

use super::state::BusError;

/// Events that trigger bus state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Ready,
    Background,
    Suspend,
    Resume,
    Error(BusError),
    /// The set of requested poll intervals changed
    UpdatePoll,
}

impl BusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::Ready => "ready",
            BusEvent::Background => "background",
            BusEvent::Suspend => "suspend",
            BusEvent::Resume => "resume",
            BusEvent::Error(_) => "error",
            BusEvent::UpdatePoll => "update_poll",
        }
    }
}
