//! Property-based tests for the bus lifecycle and cursor

use super::cursor::select_new_entries;
use super::state::*;
use super::transition::*;
use super::*;
use crate::api::{ConvoLog, LogEntry};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_bus_error() -> impl Strategy<Value = BusError> {
    (
        prop_oneof![Just(BusErrorCode::InitFailed), Just(BusErrorCode::PollFailed)],
        "[a-z ]{1,20}",
    )
        .prop_map(|(code, message)| BusError::new(code, message))
}

fn arb_status() -> impl Strategy<Value = BusStatus> {
    prop_oneof![
        Just(BusStatus::Uninitialized),
        Just(BusStatus::Initializing),
        Just(BusStatus::Ready),
        Just(BusStatus::Backgrounded),
        Just(BusStatus::Suspended),
        arb_bus_error().prop_map(|error| BusStatus::Error { error }),
    ]
}

fn arb_event() -> impl Strategy<Value = BusEvent> {
    prop_oneof![
        Just(BusEvent::Ready),
        Just(BusEvent::Background),
        Just(BusEvent::Suspend),
        Just(BusEvent::Resume),
        Just(BusEvent::UpdatePoll),
        arb_bus_error().prop_map(BusEvent::Error),
    ]
}

fn arb_rev() -> impl Strategy<Value = String> {
    (0u32..50).prop_map(|n| format!("{n:06}"))
}

fn arb_entry() -> impl Strategy<Value = LogEntry> {
    prop_oneof![
        4 => (arb_rev(), "[ab]").prop_map(|(rev, convo_id)| LogEntry::BeginConvo(ConvoLog {
            rev: Some(rev),
            convo_id,
        })),
        1 => Just(LogEntry::Unknown),
    ]
}

fn is_running(status: &BusStatus) -> bool {
    matches!(
        status,
        BusStatus::Ready | BusStatus::Backgrounded | BusStatus::Suspended
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Errors always land in the error state and are always emitted
    #[test]
    fn prop_error_event_reaches_error(
        status in arb_status().prop_filter("not already errored", |s| !s.is_error()),
        error in arb_bus_error(),
    ) {
        let result = transition(&status, BusEvent::Error(error.clone())).unwrap();
        prop_assert_eq!(&result.new_state, &BusStatus::Error { error: error.clone() });
        prop_assert!(result.effects.contains(&Effect::EmitError(error)));
    }

    /// Polling only ever starts from states where it was not already
    /// running, and connect is only announced on the way out of startup
    /// or error
    #[test]
    fn prop_connect_only_from_startup_or_error(status in arb_status(), event in arb_event()) {
        if let Ok(result) = transition(&status, event) {
            if result.effects.contains(&Effect::EmitConnect) {
                prop_assert!(!is_running(&status));
            }
        }
    }

    /// A timer reset never leaves the bus in a non-polling state
    #[test]
    fn prop_timer_reset_implies_polling(status in arb_status(), event in arb_event()) {
        if let Ok(result) = transition(&status, event) {
            if result.effects.contains(&Effect::ResetPollTimer) {
                prop_assert!(matches!(
                    result.new_state,
                    BusStatus::Ready | BusStatus::Backgrounded
                ));
            }
            if matches!(result.new_state, BusStatus::Suspended) {
                prop_assert!(!result.effects.contains(&Effect::ResetPollTimer));
            }
        }
    }

    /// Only the error state re-initializes
    #[test]
    fn prop_reinitialize_only_from_error(status in arb_status(), event in arb_event()) {
        if let Ok(result) = transition(&status, event) {
            if result.effects.contains(&Effect::Reinitialize) {
                prop_assert!(status.is_error());
                prop_assert_eq!(result.new_state, BusStatus::Initializing);
            }
        }
    }

    /// Feeding arbitrary pages through the cursor never delivers a revision
    /// at or below the cursor held before the poll, never redelivers a
    /// revision from an earlier poll, and never moves the cursor backwards.
    /// Entries sharing a revision within one page are all delivered.
    #[test]
    fn prop_cursor_is_monotonic(
        start in proptest::option::of(arb_rev()),
        pages in proptest::collection::vec(proptest::collection::vec(arb_entry(), 0..8), 1..8),
    ) {
        let mut cursor = start;
        let mut delivered_before: Vec<String> = Vec::new();

        for page in pages {
            let selected = select_new_entries(cursor.as_deref(), page);
            let mut delivered_now: Vec<String> = Vec::new();
            for entry in &selected.entries {
                if let Some(rev) = entry.rev() {
                    prop_assert!(cursor.as_deref().map_or(true, |c| rev > c));
                    prop_assert!(!delivered_before.iter().any(|d| d == rev));
                    delivered_now.push(rev.to_string());
                }
            }
            delivered_before.extend(delivered_now);
            if let Some(rev) = selected.latest_rev {
                prop_assert!(cursor.as_deref().map_or(true, |c| rev.as_str() > c));
                cursor = Some(rev);
            }
        }
    }
}
