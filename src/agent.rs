//! Conversation agent
//!
//! One agent per open conversation. It loads metadata and the newest page of
//! messages, merges the bus's log entries into its timeline, applies
//! optimistic sends, deletes and reactions, and publishes a [`ConvoState`]
//! whose item list is ready to render. Lifecycle decisions go through the
//! pure [`transition`] function.

mod effect;
mod event;
mod executor;
pub mod items;
mod metadata;
pub mod state;
pub mod timeline;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::ConvoEvent;
pub use executor::{ConvoAgent, ConvoAgentParams};
pub use items::{project, AdjacentMessage, ConvoItem, ConvoItemErrorCode};
pub use metadata::apply_convo_entry;
pub use state::{
    ActiveConvo, AgentStatus, ConvoErrorCode, ConvoFatalError, ConvoOpError, ConvoRetry,
    ConvoState,
};
pub use timeline::{PendingMessage, Timeline, TimelineEntry};
pub use transition::{transition, TransitionError, TransitionResult};
