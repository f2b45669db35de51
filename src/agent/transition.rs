//! Pure conversation lifecycle transition function

use super::effect::Effect;
use super::event::ConvoEvent;
use super::state::AgentStatus;
use thiserror::Error;

#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: AgentStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: AgentStatus) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Conversation error is not retryable")]
    NotRetryable,
}

pub fn transition(
    state: &AgentStatus,
    event: ConvoEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Startup
        // ============================================================
        (AgentStatus::Uninitialized, ConvoEvent::Init) => {
            Ok(TransitionResult::new(AgentStatus::Initializing).with_effect(Effect::FetchConvo))
        }
        (AgentStatus::Initializing, ConvoEvent::Ready) => Ok(TransitionResult::new(
            AgentStatus::Ready,
        )
        .with_effect(Effect::RequestPollInterval)),
        (AgentStatus::Initializing, ConvoEvent::Disable) => {
            Ok(TransitionResult::new(AgentStatus::Disabled))
        }

        // ============================================================
        // Foreground coordination
        // ============================================================
        (AgentStatus::Ready, ConvoEvent::Background) => Ok(TransitionResult::new(
            AgentStatus::Backgrounded,
        )
        .with_effect(Effect::ReleasePollInterval)),
        (AgentStatus::Ready, ConvoEvent::Suspend) => Ok(TransitionResult::new(
            AgentStatus::Suspended,
        )
        .with_effect(Effect::ReleasePollInterval)),
        (AgentStatus::Backgrounded, ConvoEvent::Resume { stale: true }) => {
            Ok(TransitionResult::new(AgentStatus::Initializing)
                .with_effect(Effect::ResetTimeline)
                .with_effect(Effect::FetchConvo))
        }
        (
            AgentStatus::Backgrounded | AgentStatus::Suspended,
            ConvoEvent::Resume { .. },
        ) => Ok(TransitionResult::new(AgentStatus::Ready)
            .with_effect(Effect::RequestPollInterval)
            .with_effect(Effect::RefreshConvo)),
        (AgentStatus::Backgrounded, ConvoEvent::Suspend) => {
            Ok(TransitionResult::new(AgentStatus::Suspended))
        }
        (AgentStatus::Suspended, ConvoEvent::Background) => {
            Ok(TransitionResult::new(AgentStatus::Backgrounded))
        }
        (
            AgentStatus::Ready | AgentStatus::Backgrounded | AgentStatus::Suspended,
            ConvoEvent::Disable,
        ) => Ok(TransitionResult::new(AgentStatus::Disabled)
            .with_effect(Effect::ReleasePollInterval)),
        (AgentStatus::Disabled, ConvoEvent::Enable) => Ok(TransitionResult::new(
            AgentStatus::Ready,
        )
        .with_effect(Effect::RequestPollInterval)),

        // ============================================================
        // Errors
        // ============================================================
        (AgentStatus::Error(error), ConvoEvent::Init) => {
            if error.retry.is_none() {
                return Err(TransitionError::NotRetryable);
            }
            Ok(TransitionResult::new(AgentStatus::Initializing)
                .with_effect(Effect::ResetTimeline)
                .with_effect(Effect::FetchConvo))
        }
        (AgentStatus::Error(_), event @ ConvoEvent::Error(_)) => {
            Err(TransitionError::InvalidTransition(format!(
                "Already in error, ignoring {}",
                event.name()
            )))
        }
        (_, ConvoEvent::Error(error)) => Ok(TransitionResult::new(AgentStatus::Error(error))
            .with_effect(Effect::ReleasePollInterval)),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.name(),
            event.name()
        ))),
    }
}
