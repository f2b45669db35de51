//! Bus subscriptions and per-subscriber filtering

use super::executor::BusMessage;
use super::state::BusError;
use crate::api::LogEntry;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Everything the bus tells its subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEmit {
    /// Polling started (or restarted after an error)
    Connect,
    Error(BusError),
    /// New log entries from one poll, in server order
    Logs(Vec<LogEntry>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubscriptionFilter {
    #[default]
    All,
    /// Only log entries for this conversation; lifecycle emits pass through
    Convo(String),
}

impl SubscriptionFilter {
    pub fn convo(convo_id: impl Into<String>) -> Self {
        SubscriptionFilter::Convo(convo_id.into())
    }

    /// What a subscriber with this filter should receive, if anything
    pub fn apply(&self, emit: &BusEmit) -> Option<BusEmit> {
        match (self, emit) {
            (SubscriptionFilter::Convo(convo_id), BusEmit::Logs(entries)) => {
                let matching: Vec<LogEntry> = entries
                    .iter()
                    .filter(|entry| entry.convo_id() == Some(convo_id.as_str()))
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    None
                } else {
                    Some(BusEmit::Logs(matching))
                }
            }
            _ => Some(emit.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(super) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Receiving end of a bus subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct BusSubscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<BusEmit>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
}

impl BusSubscription {
    pub(super) fn new(
        id: SubscriberId,
        rx: mpsc::UnboundedReceiver<BusEmit>,
        bus_tx: mpsc::UnboundedSender<BusMessage>,
    ) -> Self {
        Self { id, rx, bus_tx }
    }

    /// Next emit, or `None` once the bus has shut down
    pub async fn recv(&mut self) -> Option<BusEmit> {
        self.rx.recv().await
    }

    /// Next emit if one is already queued
    pub fn try_recv(&mut self) -> Option<BusEmit> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        let _ = self.bus_tx.send(BusMessage::Unsubscribe(self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ConvoLog;

    fn begin(convo_id: &str, rev: &str) -> LogEntry {
        LogEntry::BeginConvo(ConvoLog {
            rev: Some(rev.to_string()),
            convo_id: convo_id.to_string(),
        })
    }

    #[test]
    fn test_convo_filter_keeps_matching_entries_in_order() {
        let emit = BusEmit::Logs(vec![begin("a", "1"), begin("b", "2"), begin("a", "3")]);
        let filtered = SubscriptionFilter::convo("a").apply(&emit);
        assert_eq!(
            filtered,
            Some(BusEmit::Logs(vec![begin("a", "1"), begin("a", "3")]))
        );
    }

    #[test]
    fn test_convo_filter_suppresses_empty_batches() {
        let emit = BusEmit::Logs(vec![begin("b", "2"), LogEntry::Unknown]);
        assert_eq!(SubscriptionFilter::convo("a").apply(&emit), None);
    }

    #[test]
    fn test_lifecycle_emits_are_unfiltered() {
        let filter = SubscriptionFilter::convo("a");
        assert_eq!(filter.apply(&BusEmit::Connect), Some(BusEmit::Connect));
        let all = SubscriptionFilter::All;
        let emit = BusEmit::Logs(vec![begin("b", "2")]);
        assert_eq!(all.apply(&emit), Some(emit.clone()));
    }
}
