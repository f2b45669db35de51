//! Conversation-level log entries

use crate::api::{ConvoStatus, ConvoView, LogEntry};

/// Fold a conversation-level log entry into the metadata. Returns whether
/// the metadata changed.
pub fn apply_convo_entry(convo: &mut ConvoView, entry: &LogEntry) -> bool {
    let before = convo.clone();

    match entry {
        LogEntry::AcceptConvo(_) => convo.status = Some(ConvoStatus::Accepted),
        LogEntry::MuteConvo(_) => convo.muted = true,
        LogEntry::UnmuteConvo(_) => convo.muted = false,
        LogEntry::ReadMessage(_) => convo.unread_count = 0,
        LogEntry::BeginConvo(_) | LogEntry::LeaveConvo(_) => {
            tracing::debug!(convo_id = %convo.id, kind = entry.kind(), "Membership log entry");
        }
        _ => {}
    }

    if let Some(rev) = entry.rev() {
        if rev > convo.rev.as_str() {
            convo.rev = rev.to_string();
        }
    }

    *convo != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ConvoLog, MessageLog, MessageRecord};
    use crate::testing::{convo_view, message_view};

    fn convo_log(rev: &str) -> ConvoLog {
        ConvoLog {
            rev: Some(rev.to_string()),
            convo_id: "convo-1".to_string(),
        }
    }

    #[test]
    fn test_accept_and_mute_update_metadata() {
        let mut convo = convo_view("convo-1");
        convo.status = Some(ConvoStatus::Request);

        assert!(apply_convo_entry(&mut convo, &LogEntry::AcceptConvo(convo_log("000002"))));
        assert_eq!(convo.status, Some(ConvoStatus::Accepted));
        assert_eq!(convo.rev, "000002");

        apply_convo_entry(&mut convo, &LogEntry::MuteConvo(convo_log("000003")));
        assert!(convo.muted);
        apply_convo_entry(&mut convo, &LogEntry::UnmuteConvo(convo_log("000004")));
        assert!(!convo.muted);
    }

    #[test]
    fn test_read_clears_unread_count() {
        let mut convo = convo_view("convo-1");
        convo.unread_count = 4;
        let entry = LogEntry::ReadMessage(MessageLog {
            rev: Some("000005".to_string()),
            convo_id: "convo-1".to_string(),
            message: MessageRecord::Message(message_view("m1", "000005", "hi")),
        });
        assert!(apply_convo_entry(&mut convo, &entry));
        assert_eq!(convo.unread_count, 0);
    }

    #[test]
    fn test_older_rev_does_not_rewind_metadata() {
        let mut convo = convo_view("convo-1");
        convo.rev = "000009".to_string();
        assert!(!apply_convo_entry(&mut convo, &LogEntry::BeginConvo(convo_log("000001"))));
        assert_eq!(convo.rev, "000009");
    }
}
