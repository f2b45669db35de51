//! Conversation agent runtime
//!
//! Same shape as the bus runtime: one task owns the timeline and lifecycle,
//! the handle and [`ActiveConvo`] talk to it over a channel, and API calls
//! run as spawned tasks that report completion back into that channel.

use super::effect::Effect;
use super::event::ConvoEvent;
use super::items::project;
use super::metadata::apply_convo_entry;
use super::state::{
    ActiveConvo, AgentStatus, ConvoFatalError, ConvoOpError, ConvoOps, ConvoRetry, ConvoState,
};
use super::timeline::Timeline;
use super::transition::transition;
use crate::api::{
    ApiError, ChatApi, ConvoStatus, ConvoView, HistoryPage, MessageInput, MessageSender,
    MessageView, ReactionView,
};
use crate::bus::{BusEmit, BusSubscription, EventBus, PollIntervalGuard, SubscriptionFilter};
use crate::config::SyncConfig;
use crate::retry::with_retries;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Reply = oneshot::Sender<Result<(), ConvoOpError>>;

/// Everything needed to open one conversation
pub struct ConvoAgentParams {
    pub convo_id: String,
    /// Account that authors optimistic sends and reactions
    pub viewer_did: String,
    pub bus: EventBus,
    pub api: Arc<dyn ChatApi>,
    pub config: SyncConfig,
    /// Cached metadata to show while the first fetch is in flight
    pub placeholder: Option<ConvoView>,
}

#[derive(Debug)]
pub(crate) enum AgentMessage {
    Resume,
    Background,
    Suspend,
    Retry(ConvoRetry),

    // Operations from ActiveConvo
    Send(MessageInput),
    FetchHistory,
    Delete {
        message_id: String,
        reply: Reply,
    },
    AddReaction {
        message_id: String,
        value: String,
        reply: Reply,
    },
    RemoveReaction {
        message_id: String,
        value: String,
        reply: Reply,
    },
    MarkAccepted {
        reply: Reply,
    },
    MarkRead {
        reply: Reply,
    },

    // Completions of spawned API calls
    InitComplete {
        generation: u64,
        result: Result<(ConvoView, Result<HistoryPage, ApiError>), ApiError>,
    },
    RefreshComplete {
        generation: u64,
        result: Result<ConvoView, ApiError>,
    },
    HistoryComplete {
        generation: u64,
        result: Result<HistoryPage, ApiError>,
    },
    SendComplete {
        key: String,
        result: Result<MessageView, ApiError>,
    },
    DeleteComplete {
        original: MessageView,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    AddReactionComplete {
        message_id: String,
        reaction: ReactionView,
        added: bool,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    RemoveReactionComplete {
        message_id: String,
        removed: Option<ReactionView>,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    AcceptComplete {
        result: Result<(), ApiError>,
        reply: Reply,
    },
    ReadComplete {
        result: Result<(), ApiError>,
        reply: Reply,
    },
}

/// Where the caller wants the conversation to be, applied once it is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Foreground,
    Background,
    Suspended,
}

/// Handle to one conversation agent. Cheap to clone.
#[derive(Clone)]
pub struct ConvoAgent {
    convo_id: String,
    tx: mpsc::UnboundedSender<AgentMessage>,
    state: watch::Receiver<ConvoState>,
    shutdown: CancellationToken,
}

impl ConvoAgent {
    /// Subscribe to the bus and start loading the conversation. Must be
    /// called inside a tokio runtime.
    pub fn start(params: ConvoAgentParams) -> Self {
        let ConvoAgentParams {
            convo_id,
            viewer_did,
            bus,
            api,
            config,
            placeholder,
        } = params;

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConvoState::Uninitialized);
        let shutdown = CancellationToken::new();
        let subscription = bus.subscribe(SubscriptionFilter::convo(&convo_id));

        let runtime = AgentRuntime {
            convo_id: convo_id.clone(),
            viewer: MessageSender::new(viewer_did),
            api,
            config,
            bus,
            subscription,
            bus_closed: false,
            poll_guard: None,
            status: AgentStatus::Uninitialized,
            focus: Focus::Foreground,
            convo: None,
            placeholder,
            timeline: Timeline::default(),
            generation: 0,
            backgrounded_at: None,
            rx,
            tx: tx.clone(),
            state_tx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(runtime.run());

        Self {
            convo_id,
            tx,
            state,
            shutdown,
        }
    }

    pub fn convo_id(&self) -> &str {
        &self.convo_id
    }

    pub fn state(&self) -> ConvoState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConvoState> {
        self.state.clone()
    }

    pub fn resume(&self) {
        self.send(AgentMessage::Resume);
    }

    pub fn background(&self) {
        self.send(AgentMessage::Background);
    }

    pub fn suspend(&self) {
        self.send(AgentMessage::Suspend);
    }

    pub fn retry(&self, retry: &ConvoRetry) {
        self.send(AgentMessage::Retry(retry.clone()));
    }

    /// Unsubscribe from the bus and stop the agent. Outstanding operations
    /// resolve with [`ConvoOpError::Closed`].
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    fn send(&self, message: AgentMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!(convo_id = %self.convo_id, "Conversation agent is closed");
        }
    }
}

struct AgentRuntime {
    convo_id: String,
    viewer: MessageSender,
    api: Arc<dyn ChatApi>,
    config: SyncConfig,
    bus: EventBus,
    subscription: BusSubscription,
    bus_closed: bool,
    /// Held while this conversation wants the active poll cadence
    poll_guard: Option<PollIntervalGuard>,
    status: AgentStatus,
    focus: Focus,
    convo: Option<ConvoView>,
    placeholder: Option<ConvoView>,
    timeline: Timeline,
    /// Bumped on every (re)initialization so stale completions are ignored
    generation: u64,
    backgrounded_at: Option<Instant>,
    rx: mpsc::UnboundedReceiver<AgentMessage>,
    tx: mpsc::UnboundedSender<AgentMessage>,
    state_tx: watch::Sender<ConvoState>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    async fn run(mut self) {
        tracing::info!(convo_id = %self.convo_id, "Starting conversation agent");
        self.dispatch(ConvoEvent::Init);
        self.publish();

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                Some(message) = self.rx.recv() => self.handle_message(message),

                emit = self.subscription.recv(), if !self.bus_closed => match emit {
                    Some(emit) => self.handle_bus_emit(emit),
                    None => {
                        tracing::warn!(convo_id = %self.convo_id, "Event bus closed");
                        self.bus_closed = true;
                    }
                },
            }
            self.publish();
        }

        self.poll_guard = None;
        tracing::info!(convo_id = %self.convo_id, "Conversation agent stopped");
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn dispatch(&mut self, event: ConvoEvent) {
        let event_name = event.name();
        let result = match transition(&self.status, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(convo_id = %self.convo_id, error = %e, "Ignoring conversation event");
                return;
            }
        };

        let old_state = std::mem::replace(&mut self.status, result.new_state);
        if old_state != self.status {
            tracing::info!(
                convo_id = %self.convo_id,
                from = old_state.name(),
                to = self.status.name(),
                event = event_name,
                "Conversation state changed"
            );
        }

        match self.status {
            AgentStatus::Backgrounded if old_state != AgentStatus::Backgrounded => {
                self.backgrounded_at = Some(Instant::now());
            }
            AgentStatus::Backgrounded => {}
            _ => self.backgrounded_at = None,
        }

        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::FetchConvo => self.fetch_convo(),
            Effect::ResetTimeline => self.timeline.reset(),
            Effect::RefreshConvo => self.refresh_convo(),
            Effect::RequestPollInterval => {
                if self.poll_guard.is_none() {
                    self.poll_guard = Some(
                        self.bus
                            .request_poll_interval(self.config.active_poll_interval),
                    );
                }
            }
            Effect::ReleasePollInterval => {
                self.poll_guard = None;
            }
        }
    }

    fn on_focus(&mut self, focus: Focus) {
        self.focus = focus;
        let event = match focus {
            Focus::Foreground => ConvoEvent::Resume {
                stale: self.is_stale(),
            },
            Focus::Background => ConvoEvent::Background,
            Focus::Suspended => ConvoEvent::Suspend,
        };
        self.dispatch(event);
    }

    fn is_stale(&self) -> bool {
        self.backgrounded_at
            .is_some_and(|at| at.elapsed() > self.config.inactive_timeout)
    }

    /// Replay the caller's latest focus request once the conversation is up
    fn apply_focus(&mut self) {
        match self.focus {
            Focus::Foreground => {}
            Focus::Background => self.dispatch(ConvoEvent::Background),
            Focus::Suspended => self.dispatch(ConvoEvent::Suspend),
        }
    }

    // ========================================================================
    // Message handling
    // ========================================================================

    fn handle_message(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::Resume => self.on_focus(Focus::Foreground),
            AgentMessage::Background => self.on_focus(Focus::Background),
            AgentMessage::Suspend => self.on_focus(Focus::Suspended),
            AgentMessage::Retry(retry) => self.on_retry(retry),

            AgentMessage::Send(input) => self.send_message(input),
            AgentMessage::FetchHistory => {
                if self.status.is_active() && self.timeline.can_fetch_history() {
                    self.fetch_history();
                }
            }
            AgentMessage::Delete { message_id, reply } => self.delete_message(&message_id, reply),
            AgentMessage::AddReaction {
                message_id,
                value,
                reply,
            } => self.add_reaction(message_id, value, reply),
            AgentMessage::RemoveReaction {
                message_id,
                value,
                reply,
            } => self.remove_reaction(message_id, &value, reply),
            AgentMessage::MarkAccepted { reply } => self.mark_accepted(reply),
            AgentMessage::MarkRead { reply } => self.mark_read(reply),

            AgentMessage::InitComplete { generation, result } => {
                if generation == self.generation {
                    self.on_init_complete(result);
                }
            }
            AgentMessage::RefreshComplete { generation, result } => {
                if generation == self.generation {
                    self.on_refresh_complete(result);
                }
            }
            AgentMessage::HistoryComplete { generation, result } => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(page) => self.timeline.merge_history(page),
                    Err(e) => {
                        tracing::warn!(convo_id = %self.convo_id, error = %e, "History fetch failed");
                        self.timeline.fail_history_fetch(e.message);
                    }
                }
            }
            AgentMessage::SendComplete { key, result } => match result {
                Ok(sent) => self.timeline.confirm_send(&key, &sent),
                Err(e) => {
                    tracing::warn!(convo_id = %self.convo_id, key = %key, error = %e, "Send failed");
                    self.timeline.fail_send(&key);
                }
            },
            AgentMessage::DeleteComplete {
                original,
                result,
                reply,
            } => {
                if result.is_err() {
                    self.timeline.restore_deleted(original);
                }
                let _ = reply.send(result.map_err(ConvoOpError::from));
            }
            AgentMessage::AddReactionComplete {
                message_id,
                reaction,
                added,
                result,
                reply,
            } => {
                if result.is_err() && added {
                    let _ = self.timeline.remove_reaction(
                        &message_id,
                        &reaction.value,
                        &reaction.sender.did,
                    );
                }
                let _ = reply.send(result.map_err(ConvoOpError::from));
            }
            AgentMessage::RemoveReactionComplete {
                message_id,
                removed,
                result,
                reply,
            } => {
                if let (Err(_), Some(reaction)) = (&result, removed) {
                    let _ = self.timeline.add_reaction(&message_id, reaction);
                }
                let _ = reply.send(result.map_err(ConvoOpError::from));
            }
            AgentMessage::AcceptComplete { result, reply } => {
                if result.is_ok() {
                    if let Some(convo) = &mut self.convo {
                        convo.status = Some(ConvoStatus::Accepted);
                    }
                }
                let _ = reply.send(result.map_err(ConvoOpError::from));
            }
            AgentMessage::ReadComplete { result, reply } => {
                if result.is_ok() {
                    if let Some(convo) = &mut self.convo {
                        convo.unread_count = 0;
                    }
                }
                let _ = reply.send(result.map_err(ConvoOpError::from));
            }
        }
    }

    fn on_retry(&mut self, retry: ConvoRetry) {
        tracing::info!(convo_id = %self.convo_id, ?retry, "Retrying");
        match retry {
            ConvoRetry::Init => self.dispatch(ConvoEvent::Init),
            ConvoRetry::History => {
                if self.status.is_active() && self.timeline.can_fetch_history() {
                    self.fetch_history();
                }
            }
            ConvoRetry::Firehose => {
                if let Some(error) = self.timeline.firehose_error() {
                    self.bus.retry(&error.retry);
                }
            }
            ConvoRetry::Send { key } => {
                if !self.status.is_active() {
                    return;
                }
                if let Some(input) = self.timeline.retry_send(&key) {
                    self.spawn_send(key, input);
                }
            }
        }
    }

    fn handle_bus_emit(&mut self, emit: BusEmit) {
        match emit {
            BusEmit::Connect => {
                if self.timeline.clear_firehose_error() {
                    tracing::info!(convo_id = %self.convo_id, "Event bus reconnected");
                    if self.status.is_active() {
                        self.refresh_convo();
                    }
                }
            }
            BusEmit::Error(error) => {
                tracing::warn!(convo_id = %self.convo_id, error = %error, "Event bus error");
                self.timeline.set_firehose_error(error);
            }
            BusEmit::Logs(entries) => {
                if matches!(
                    self.status,
                    AgentStatus::Uninitialized | AgentStatus::Error(_)
                ) {
                    return;
                }
                tracing::debug!(convo_id = %self.convo_id, entries = entries.len(), "Applying log entries");
                for entry in entries {
                    if let Some(convo) = &mut self.convo {
                        apply_convo_entry(convo, &entry);
                    }
                    self.timeline.apply_log(entry);
                }
            }
        }
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    fn retry_policy(&self) -> (u32, Duration) {
        (self.config.network_retries, self.config.retry_backoff)
    }

    fn spawn<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = AgentMessage> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    fn fetch_convo(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.timeline.begin_history_fetch();

        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        let limit = self.config.history_page_size;

        self.spawn(async move {
            let result = async {
                let convo =
                    with_retries(retries, backoff, || api.get_conversation(&convo_id)).await?;
                let history = with_retries(retries, backoff, || {
                    api.get_history(&convo_id, None, limit)
                })
                .await;
                Ok::<_, ApiError>((convo, history))
            }
            .await;
            AgentMessage::InitComplete { generation, result }
        });
    }

    fn on_init_complete(
        &mut self,
        result: Result<(ConvoView, Result<HistoryPage, ApiError>), ApiError>,
    ) {
        if self.status != AgentStatus::Initializing {
            return;
        }

        match result {
            Ok((convo, history)) => {
                let disabled = convo.messaging_disabled;
                self.convo = Some(convo);
                match history {
                    Ok(page) => self.timeline.merge_history(page),
                    Err(e) => self.timeline.fail_history_fetch(e.message),
                }
                if disabled {
                    self.dispatch(ConvoEvent::Disable);
                } else {
                    self.dispatch(ConvoEvent::Ready);
                    self.apply_focus();
                }
            }
            Err(e) => {
                tracing::warn!(convo_id = %self.convo_id, error = %e, "Failed to load conversation");
                self.dispatch(ConvoEvent::Error(ConvoFatalError::from_init_failure(&e)));
            }
        }
    }

    fn refresh_convo(&self) {
        let generation = self.generation;
        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();

        self.spawn(async move {
            let result = with_retries(retries, backoff, || api.get_conversation(&convo_id)).await;
            AgentMessage::RefreshComplete { generation, result }
        });
    }

    fn on_refresh_complete(&mut self, result: Result<ConvoView, ApiError>) {
        if !self.status.is_active() {
            return;
        }
        match result {
            Ok(convo) => {
                let disabled = convo.messaging_disabled;
                self.convo = Some(convo);
                let was_disabled = self.status == AgentStatus::Disabled;
                if disabled && !was_disabled {
                    self.dispatch(ConvoEvent::Disable);
                } else if !disabled && was_disabled {
                    self.dispatch(ConvoEvent::Enable);
                    self.apply_focus();
                }
            }
            Err(e) => {
                tracing::warn!(convo_id = %self.convo_id, error = %e, "Failed to refresh conversation");
            }
        }
    }

    fn fetch_history(&mut self) {
        let generation = self.generation;
        let cursor = self.timeline.begin_history_fetch();
        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        let limit = self.config.history_page_size;

        self.spawn(async move {
            let result = with_retries(retries, backoff, || {
                api.get_history(&convo_id, cursor.as_deref(), limit)
            })
            .await;
            AgentMessage::HistoryComplete { generation, result }
        });
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn send_message(&mut self, input: MessageInput) {
        if !self.status.is_active() {
            tracing::debug!(convo_id = %self.convo_id, "Dropping send on inactive conversation");
            return;
        }
        let key = Uuid::new_v4().to_string();
        let input = self
            .timeline
            .add_pending(key.clone(), input, self.viewer.clone(), Utc::now());
        self.spawn_send(key, input);
    }

    fn spawn_send(&self, key: String, input: MessageInput) {
        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();

        self.spawn(async move {
            let result =
                with_retries(retries, backoff, || api.send_message(&convo_id, &input)).await;
            AgentMessage::SendComplete { key, result }
        });
    }

    fn delete_message(&mut self, message_id: &str, reply: Reply) {
        if !self.status.is_active() {
            let _ = reply.send(Err(ConvoOpError::Inactive));
            return;
        }
        let original = match self.timeline.delete_local(message_id) {
            Ok(original) => original,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        self.spawn(async move {
            let result = with_retries(retries, backoff, || {
                api.delete_message(&convo_id, &original.id)
            })
            .await;
            AgentMessage::DeleteComplete {
                original,
                result,
                reply,
            }
        });
    }

    fn add_reaction(&mut self, message_id: String, value: String, reply: Reply) {
        if !self.status.is_active() {
            let _ = reply.send(Err(ConvoOpError::Inactive));
            return;
        }
        let reaction = ReactionView {
            value,
            sender: self.viewer.clone(),
            created_at: Utc::now(),
        };
        let added = match self.timeline.add_reaction(&message_id, reaction.clone()) {
            Ok(added) => added,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        self.spawn(async move {
            let result = with_retries(retries, backoff, || {
                api.add_reaction(&convo_id, &message_id, &reaction.value)
            })
            .await;
            AgentMessage::AddReactionComplete {
                message_id,
                reaction,
                added,
                result,
                reply,
            }
        });
    }

    fn remove_reaction(&mut self, message_id: String, value: &str, reply: Reply) {
        if !self.status.is_active() {
            let _ = reply.send(Err(ConvoOpError::Inactive));
            return;
        }
        let removed = match self
            .timeline
            .remove_reaction(&message_id, value, &self.viewer.did)
        {
            Ok(removed) => removed,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let value = value.to_string();
        let (retries, backoff) = self.retry_policy();
        self.spawn(async move {
            let result = with_retries(retries, backoff, || {
                api.remove_reaction(&convo_id, &message_id, &value)
            })
            .await;
            AgentMessage::RemoveReactionComplete {
                message_id,
                removed,
                result,
                reply,
            }
        });
    }

    fn mark_accepted(&mut self, reply: Reply) {
        if !self.status.is_active() {
            let _ = reply.send(Err(ConvoOpError::Inactive));
            return;
        }
        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        self.spawn(async move {
            let result = with_retries(retries, backoff, || api.accept_convo(&convo_id)).await;
            AgentMessage::AcceptComplete { result, reply }
        });
    }

    fn mark_read(&mut self, reply: Reply) {
        if !self.status.is_active() {
            let _ = reply.send(Err(ConvoOpError::Inactive));
            return;
        }
        let api = Arc::clone(&self.api);
        let convo_id = self.convo_id.clone();
        let (retries, backoff) = self.retry_policy();
        self.spawn(async move {
            let result = with_retries(retries, backoff, || api.mark_read(&convo_id)).await;
            AgentMessage::ReadComplete { result, reply }
        });
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn snapshot(&self) -> ConvoState {
        let placeholder = || self.convo.clone().or_else(|| self.placeholder.clone());

        let active = |convo: &ConvoView| {
            ActiveConvo::new(
                convo.clone(),
                project(&self.timeline),
                self.timeline.is_fetching_history(),
                self.timeline.has_fetched_all_history(),
                ConvoOps::new(self.tx.clone()),
            )
        };

        match (&self.status, &self.convo) {
            (AgentStatus::Uninitialized, _) => ConvoState::Uninitialized,
            (AgentStatus::Error(error), _) => ConvoState::Error(error.clone()),
            (AgentStatus::Ready, Some(convo)) => ConvoState::Ready(active(convo)),
            (AgentStatus::Backgrounded, Some(convo)) => ConvoState::Backgrounded(active(convo)),
            (AgentStatus::Suspended, Some(convo)) => ConvoState::Suspended(active(convo)),
            (AgentStatus::Disabled, Some(convo)) => ConvoState::Disabled(active(convo)),
            _ => ConvoState::Initializing {
                placeholder: placeholder(),
            },
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
