//! Pure bus state transition function
//!
//! Every legal edge of the bus lifecycle is listed here. Anything else is
//! rejected with [`TransitionError::InvalidTransition`], which the runtime
//! treats as a no-op.

use super::effect::Effect;
use super::event::BusEvent;
use super::state::BusStatus;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: BusStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: BusStatus) -> Self {
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
}

pub fn transition(state: &BusStatus, event: BusEvent) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Startup (initial fetch or re-init after an error)
        // ============================================================
        (BusStatus::Uninitialized | BusStatus::Initializing, BusEvent::Ready) => {
            Ok(TransitionResult::new(BusStatus::Ready)
                .with_effect(Effect::ResetPollTimer)
                .with_effect(Effect::EmitConnect))
        }
        (BusStatus::Uninitialized | BusStatus::Initializing, BusEvent::Background) => {
            Ok(TransitionResult::new(BusStatus::Backgrounded)
                .with_effect(Effect::ResetPollTimer)
                .with_effect(Effect::EmitConnect))
        }
        (BusStatus::Uninitialized | BusStatus::Initializing, BusEvent::Suspend) => {
            Ok(TransitionResult::new(BusStatus::Suspended))
        }
        (BusStatus::Uninitialized | BusStatus::Initializing, BusEvent::Error(error)) => {
            Ok(TransitionResult::new(BusStatus::Error {
                error: error.clone(),
            })
            .with_effect(Effect::EmitError(error)))
        }

        // ============================================================
        // Ready
        // ============================================================
        (BusStatus::Ready, BusEvent::Background) => {
            Ok(TransitionResult::new(BusStatus::Backgrounded).with_effect(Effect::ResetPollTimer))
        }
        (BusStatus::Ready, BusEvent::Suspend) => {
            Ok(TransitionResult::new(BusStatus::Suspended).with_effect(Effect::StopPollTimer))
        }
        (BusStatus::Ready, BusEvent::UpdatePoll) => {
            Ok(TransitionResult::new(BusStatus::Ready).with_effect(Effect::ResetPollTimer))
        }

        // ============================================================
        // Backgrounded / Suspended
        // ============================================================
        (BusStatus::Backgrounded | BusStatus::Suspended, BusEvent::Resume) => {
            Ok(TransitionResult::new(BusStatus::Ready).with_effect(Effect::ResetPollTimer))
        }
        (BusStatus::Backgrounded, BusEvent::Suspend) => {
            Ok(TransitionResult::new(BusStatus::Suspended).with_effect(Effect::StopPollTimer))
        }
        (BusStatus::Suspended, BusEvent::Background) => {
            Ok(TransitionResult::new(BusStatus::Backgrounded).with_effect(Effect::ResetPollTimer))
        }

        // Any running state + Error -> Error
        (
            BusStatus::Ready | BusStatus::Backgrounded | BusStatus::Suspended,
            BusEvent::Error(error),
        ) => Ok(TransitionResult::new(BusStatus::Error {
            error: error.clone(),
        })
        .with_effect(Effect::StopPollTimer)
        .with_effect(Effect::EmitError(error))),

        // ============================================================
        // Error recovery
        // ============================================================
        (BusStatus::Error { .. }, BusEvent::UpdatePoll) => {
            Ok(TransitionResult::new(BusStatus::Initializing).with_effect(Effect::Reinitialize))
        }
        (BusStatus::Error { .. }, BusEvent::Resume) => Ok(TransitionResult::new(BusStatus::Ready)
            .with_effect(Effect::ResetPollTimer)
            .with_effect(Effect::EmitConnect)),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.name(),
            event.name()
        ))),
    }
}
