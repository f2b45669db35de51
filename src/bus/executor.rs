//! Event bus runtime
//!
//! One tokio task owns the cursor, the poll timer and the subscriber list.
//! Handles talk to it over an unbounded channel, and network calls run as
//! background tasks that report back over the same channel, so all state is
//! mutated in one place.

use super::cursor::select_new_entries;
use super::effect::Effect;
use super::event::BusEvent;
use super::poll_interval::{PollIntervals, PollToken};
use super::state::{BusError, BusErrorCode, BusRetry, BusStatus};
use super::subscription::{BusEmit, BusSubscription, SubscriberId, SubscriptionFilter};
use super::transition::transition;
use crate::api::{ApiError, ChatApi, LogPage};
use crate::config::SyncConfig;
use crate::retry::with_retries;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the bus, readable without awaiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSnapshot {
    pub status: BusStatus,
    pub latest_rev: Option<String>,
    pub poll_interval: Duration,
}

#[derive(Debug)]
pub(crate) enum BusMessage {
    Dispatch(BusEvent),
    Subscribe {
        id: SubscriberId,
        filter: SubscriptionFilter,
        tx: mpsc::UnboundedSender<BusEmit>,
    },
    Unsubscribe(SubscriberId),
    RequestInterval {
        token: PollToken,
        interval: Duration,
    },
    ReleaseInterval(PollToken),
    Retry(BusRetry),
    InitComplete {
        generation: u64,
        result: Result<LogPage, ApiError>,
    },
    PollComplete {
        generation: u64,
        result: Result<LogPage, ApiError>,
    },
}

/// Handle to a running event bus. Cheap to clone; all clones share one bus.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<BusMessage>,
    snapshot: watch::Receiver<BusSnapshot>,
    shutdown: CancellationToken,
}

impl EventBus {
    /// Start the bus and its initial log fetch. Must be called inside a
    /// tokio runtime.
    pub fn start(api: Arc<dyn ChatApi>, config: SyncConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let initial = BusSnapshot {
            status: BusStatus::Uninitialized,
            latest_rev: None,
            poll_interval: config.default_poll_interval,
        };
        let (snapshot_tx, snapshot) = watch::channel(initial);

        let runtime = BusRuntime {
            api,
            config,
            status: BusStatus::Uninitialized,
            latest_rev: None,
            intervals: PollIntervals::default(),
            subscribers: HashMap::new(),
            next_poll_at: None,
            is_polling: false,
            generation: 0,
            rx,
            tx: tx.clone(),
            snapshot_tx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(runtime.run());

        Self {
            tx,
            snapshot,
            shutdown,
        }
    }

    /// Subscribe to bus emits. Lifecycle emits are always delivered; log
    /// batches are narrowed by `filter`.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> BusSubscription {
        let id = SubscriberId::new();
        let (emit_tx, emit_rx) = mpsc::unbounded_channel();
        self.send(BusMessage::Subscribe {
            id,
            filter,
            tx: emit_tx,
        });
        BusSubscription::new(id, emit_rx, self.tx.clone())
    }

    /// Ask for polling at least this often while the bus is in the
    /// foreground. Dropping the guard withdraws the request.
    pub fn request_poll_interval(&self, interval: Duration) -> PollIntervalGuard {
        let token = PollToken::new();
        self.send(BusMessage::RequestInterval { token, interval });
        PollIntervalGuard {
            token,
            tx: self.tx.clone(),
        }
    }

    pub fn latest_rev(&self) -> Option<String> {
        self.snapshot.borrow().latest_rev.clone()
    }

    pub fn status(&self) -> BusStatus {
        self.snapshot.borrow().status.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        self.snapshot.borrow().poll_interval
    }

    pub fn watch_status(&self) -> watch::Receiver<BusSnapshot> {
        self.snapshot.clone()
    }

    pub fn resume(&self) {
        self.send(BusMessage::Dispatch(BusEvent::Resume));
    }

    pub fn background(&self) {
        self.send(BusMessage::Dispatch(BusEvent::Background));
    }

    pub fn suspend(&self) {
        self.send(BusMessage::Dispatch(BusEvent::Suspend));
    }

    /// Recover from a bus error
    pub fn retry(&self, retry: &BusRetry) {
        self.send(BusMessage::Retry(retry.clone()));
    }

    /// Stop polling and drop every subscription. Clones of this handle
    /// become inert.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn send(&self, message: BusMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Event bus is shut down, dropping message");
        }
    }
}

/// Registered poll interval request. Dropping it unregisters the request.
#[derive(Debug)]
pub struct PollIntervalGuard {
    token: PollToken,
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl PollIntervalGuard {
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for PollIntervalGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(BusMessage::ReleaseInterval(self.token));
    }
}

struct Subscriber {
    filter: SubscriptionFilter,
    tx: mpsc::UnboundedSender<BusEmit>,
}

struct BusRuntime {
    api: Arc<dyn ChatApi>,
    config: SyncConfig,
    status: BusStatus,
    latest_rev: Option<String>,
    intervals: PollIntervals,
    subscribers: HashMap<SubscriberId, Subscriber>,
    next_poll_at: Option<Instant>,
    /// Single-flight guard: a tick while a poll is outstanding is a no-op
    is_polling: bool,
    /// Bumped on every (re)initialization so stale completions are ignored
    generation: u64,
    rx: mpsc::UnboundedReceiver<BusMessage>,
    tx: mpsc::UnboundedSender<BusMessage>,
    snapshot_tx: watch::Sender<BusSnapshot>,
    shutdown: CancellationToken,
}

impl BusRuntime {
    async fn run(mut self) {
        tracing::info!("Starting event bus");
        self.init();

        loop {
            let deadline = self.next_poll_at;
            let tick = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                Some(message) = self.rx.recv() => self.handle_message(message),

                () = tick => self.on_poll_tick(),
            }
        }

        self.subscribers.clear();
        tracing::info!("Event bus stopped");
    }

    fn handle_message(&mut self, message: BusMessage) {
        match message {
            BusMessage::Dispatch(event) => self.dispatch(event),
            BusMessage::Subscribe { id, filter, tx } => {
                tracing::debug!(?filter, "Bus subscriber added");
                self.subscribers.insert(id, Subscriber { filter, tx });
            }
            BusMessage::Unsubscribe(id) => {
                if self.subscribers.remove(&id).is_some() {
                    tracing::debug!("Bus subscriber removed");
                }
            }
            BusMessage::RequestInterval { token, interval } => {
                tracing::debug!(interval_ms = %interval.as_millis(), "Poll interval requested");
                self.intervals.register(token, interval);
                self.dispatch(BusEvent::UpdatePoll);
            }
            BusMessage::ReleaseInterval(token) => {
                if self.intervals.unregister(token) {
                    self.dispatch(BusEvent::UpdatePoll);
                }
            }
            BusMessage::Retry(retry) => {
                tracing::info!(code = %retry.code, "Retrying event bus");
                self.dispatch(BusEvent::Resume);
            }
            BusMessage::InitComplete { generation, result } => {
                if generation == self.generation {
                    self.on_init_complete(result);
                } else {
                    tracing::debug!("Ignoring stale init result");
                }
            }
            BusMessage::PollComplete { generation, result } => {
                self.is_polling = false;
                if generation == self.generation {
                    self.on_poll_complete(result);
                } else {
                    tracing::debug!("Ignoring stale poll result");
                }
            }
        }
    }

    fn dispatch(&mut self, event: BusEvent) {
        let event_name = event.name();
        let result = match transition(&self.status, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring bus event");
                return;
            }
        };

        let old_state = std::mem::replace(&mut self.status, result.new_state);
        if old_state != self.status {
            tracing::info!(
                from = old_state.name(),
                to = self.status.name(),
                event = event_name,
                "Event bus state changed"
            );
        }

        for effect in result.effects {
            self.execute_effect(effect);
        }
        self.publish_snapshot();
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ResetPollTimer => {
                let interval = self.current_interval();
                tracing::debug!(interval_ms = %interval.as_millis(), "Resetting poll timer");
                self.next_poll_at = Some(Instant::now() + interval);
            }
            Effect::StopPollTimer => {
                self.next_poll_at = None;
            }
            Effect::EmitConnect => self.emit(&BusEmit::Connect),
            Effect::EmitError(error) => {
                tracing::warn!(code = %error.code, error = %error.message, "Event bus error");
                self.emit(&BusEmit::Error(error));
            }
            Effect::Reinitialize => {
                self.latest_rev = None;
                self.init();
            }
        }
    }

    /// Fetch the starting cursor
    fn init(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let retries = self.config.network_retries;
        let backoff = self.config.retry_backoff;

        tokio::spawn(async move {
            let result = with_retries(retries, backoff, || api.get_log(None)).await;
            let _ = tx.send(BusMessage::InitComplete { generation, result });
        });
    }

    fn on_init_complete(&mut self, result: Result<LogPage, ApiError>) {
        match result {
            Ok(page) => {
                if let Some(cursor) = page.cursor {
                    if self.latest_rev.as_ref().map_or(true, |rev| cursor > *rev) {
                        self.latest_rev = Some(cursor);
                    }
                }
                tracing::info!(rev = ?self.latest_rev, "Event bus initialized");
                self.dispatch(BusEvent::Ready);
            }
            Err(e) => {
                self.dispatch(BusEvent::Error(BusError::new(
                    BusErrorCode::InitFailed,
                    e.message,
                )));
            }
        }
    }

    fn on_poll_tick(&mut self) {
        self.next_poll_at = Some(Instant::now() + self.current_interval());

        if self.is_polling {
            tracing::debug!("Poll already in flight, skipping tick");
            return;
        }
        self.is_polling = true;

        let generation = self.generation;
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let cursor = self.latest_rev.clone();
        let retries = self.config.network_retries;
        let backoff = self.config.retry_backoff;

        tokio::spawn(async move {
            let result = with_retries(retries, backoff, || api.get_log(cursor.as_deref())).await;
            let _ = tx.send(BusMessage::PollComplete { generation, result });
        });
    }

    fn on_poll_complete(&mut self, result: Result<LogPage, ApiError>) {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.dispatch(BusEvent::Error(BusError::new(
                    BusErrorCode::PollFailed,
                    e.message,
                )));
                return;
            }
        };

        // Nothing to compare against yet: adopt the server position silently
        if self.latest_rev.is_none() {
            let selected = select_new_entries(None, page.logs);
            self.latest_rev = page.cursor.or(selected.latest_rev);
            tracing::info!(rev = ?self.latest_rev, "Primed cursor from poll");
            self.publish_snapshot();
            return;
        }

        let selected = select_new_entries(self.latest_rev.as_deref(), page.logs);
        if let Some(rev) = selected.latest_rev {
            self.latest_rev = Some(rev);
            self.publish_snapshot();
        }

        if !selected.entries.is_empty() {
            tracing::debug!(
                entries = selected.entries.len(),
                rev = ?self.latest_rev,
                "Emitting log batch"
            );
            self.emit(&BusEmit::Logs(selected.entries));
        }
    }

    fn emit(&mut self, emit: &BusEmit) {
        self.subscribers.retain(|_, subscriber| match subscriber.filter.apply(emit) {
            Some(filtered) => subscriber.tx.send(filtered).is_ok(),
            None => !subscriber.tx.is_closed(),
        });
    }

    fn current_interval(&self) -> Duration {
        self.intervals.effective(&self.status, &self.config)
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(BusSnapshot {
            status: self.status.clone(),
            latest_rev: self.latest_rev.clone(),
            poll_interval: self.current_interval(),
        });
    }
}
