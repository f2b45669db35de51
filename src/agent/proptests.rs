//! Property-based tests for the conversation lifecycle and timeline

use super::effect::Effect;
use super::event::ConvoEvent;
use super::state::*;
use super::timeline::{Timeline, TimelineEntry};
use super::transition::*;
use crate::api::{LogEntry, MessageLog, MessageRecord, ReactionLog};
use crate::testing::{deleted_view, message_view, reaction};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_fatal_error() -> impl Strategy<Value = ConvoFatalError> {
    prop_oneof![
        Just(ConvoFatalError {
            code: ConvoErrorCode::InitFailed,
            message: "offline".to_string(),
            retry: Some(ConvoRetry::Init),
        }),
        Just(ConvoFatalError {
            code: ConvoErrorCode::Unresolvable,
            message: "gone".to_string(),
            retry: None,
        }),
    ]
}

fn arb_status() -> impl Strategy<Value = AgentStatus> {
    prop_oneof![
        Just(AgentStatus::Uninitialized),
        Just(AgentStatus::Initializing),
        Just(AgentStatus::Ready),
        Just(AgentStatus::Backgrounded),
        Just(AgentStatus::Suspended),
        Just(AgentStatus::Disabled),
        arb_fatal_error().prop_map(AgentStatus::Error),
    ]
}

fn arb_event() -> impl Strategy<Value = ConvoEvent> {
    prop_oneof![
        Just(ConvoEvent::Init),
        Just(ConvoEvent::Ready),
        Just(ConvoEvent::Disable),
        Just(ConvoEvent::Enable),
        Just(ConvoEvent::Background),
        Just(ConvoEvent::Suspend),
        any::<bool>().prop_map(|stale| ConvoEvent::Resume { stale }),
        arb_fatal_error().prop_map(ConvoEvent::Error),
    ]
}

fn arb_id() -> impl Strategy<Value = String> {
    (0u32..6).prop_map(|n| format!("m{n}"))
}

fn arb_rev() -> impl Strategy<Value = String> {
    (1u32..40).prop_map(|n| format!("{n:06}"))
}

fn arb_log_entry() -> impl Strategy<Value = LogEntry> {
    let message_log = |rev: String, record: MessageRecord| MessageLog {
        rev: Some(rev),
        convo_id: "convo-1".to_string(),
        message: record,
    };
    prop_oneof![
        3 => (arb_id(), arb_rev()).prop_map(move |(id, rev)| {
            LogEntry::CreateMessage(message_log(
                rev.clone(),
                MessageRecord::Message(message_view(&id, &rev, "text")),
            ))
        }),
        1 => (arb_id(), arb_rev()).prop_map(move |(id, rev)| {
            LogEntry::DeleteMessage(message_log(
                rev.clone(),
                MessageRecord::Deleted(deleted_view(&id, &rev)),
            ))
        }),
        1 => (arb_id(), arb_rev(), "[ab]").prop_map(|(id, rev, value)| {
            let mut message = message_view(&id, &rev, "text");
            let reaction = reaction(&value, "did:plc:bob");
            message.reactions.push(reaction.clone());
            LogEntry::AddReaction(ReactionLog {
                rev: Some(rev),
                convo_id: "convo-1".to_string(),
                message,
                reaction,
            })
        }),
    ]
}

fn confirmed_ids(timeline: &Timeline) -> Vec<&str> {
    timeline
        .entries()
        .iter()
        .filter_map(|entry| match entry {
            TimelineEntry::Message(m) => Some(m.id.as_str()),
            TimelineEntry::Deleted(d) => Some(d.id.as_str()),
            TimelineEntry::Pending(_) => None,
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The error state is left only through a retryable init
    #[test]
    fn prop_error_exits_only_through_retryable_init(
        error in arb_fatal_error(),
        event in arb_event(),
    ) {
        let status = AgentStatus::Error(error.clone());
        match transition(&status, event.clone()) {
            Ok(result) => {
                prop_assert!(matches!(event, ConvoEvent::Init));
                prop_assert!(error.retry.is_some());
                prop_assert_eq!(result.new_state, AgentStatus::Initializing);
                prop_assert!(result.effects.contains(&Effect::FetchConvo));
            }
            Err(TransitionError::NotRetryable) => {
                prop_assert!(error.retry.is_none());
            }
            Err(TransitionError::InvalidTransition(_)) => {}
        }
    }

    /// Only a Ready conversation holds the active poll interval, and every
    /// exit from an active state gives it back
    #[test]
    fn prop_poll_interval_follows_ready(status in arb_status(), event in arb_event()) {
        if let Ok(result) = transition(&status, event) {
            if result.effects.contains(&Effect::RequestPollInterval) {
                prop_assert_eq!(&result.new_state, &AgentStatus::Ready);
            }
            if status == AgentStatus::Ready
                && !matches!(result.new_state, AgentStatus::Ready)
            {
                prop_assert!(result.effects.contains(&Effect::ReleasePollInterval));
            }
        }
    }

    /// Fatal errors are always accepted from non-error states
    #[test]
    fn prop_error_event_always_lands(
        status in arb_status().prop_filter("not errored", |s| !matches!(s, AgentStatus::Error(_))),
        error in arb_fatal_error(),
    ) {
        let result = transition(&status, ConvoEvent::Error(error.clone())).unwrap();
        prop_assert_eq!(result.new_state, AgentStatus::Error(error));
    }

    /// Replaying log entries changes nothing and never duplicates a message
    #[test]
    fn prop_log_replay_is_idempotent(
        entries in proptest::collection::vec(arb_log_entry(), 0..20),
    ) {
        let mut once = Timeline::default();
        for entry in entries.clone() {
            once.apply_log(entry);
        }

        let mut twice = Timeline::default();
        for entry in entries.iter().chain(entries.iter()).cloned() {
            twice.apply_log(entry);
        }

        prop_assert_eq!(once.entries(), twice.entries());

        let ids = confirmed_ids(&once);
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());
    }
}
