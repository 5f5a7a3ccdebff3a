//! Session controller: one background task per debate, replayable streams.
//!
//! Each session's messages live in an append-only buffer with a single
//! writer (its task). Observers replay the buffer from the start and then
//! follow new messages, woken through a `watch` channel. When a run ends the
//! buffer is flushed to the [`TranscriptStore`], so sessions evicted from
//! memory remain readable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;

use crate::debate::{Debate, derive_session_id};
use crate::dialogue::Message;
use crate::error::{DebateError, ProviderError, SessionError, StoreError};
use crate::llm::{Provider, ProviderKeys, TextGenerator, connect};
use crate::profile::ProfileStore;
use crate::runner::{DebateRequest, Runner};
use crate::store::{SessionSummary, TranscriptStore};
use crate::tools::Toolbox;

/// One item of a session stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(Message),
    Error(String),
    Done,
}

impl StreamEvent {
    /// Payload of the server-sent event carrying this item.
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Message(msg) => msg.to_transport_form().to_string(),
            StreamEvent::Error(e) => serde_json::json!({ "error": e }).to_string(),
            StreamEvent::Done => "[DONE]".to_string(),
        }
    }
}

pub type EventStream = BoxStream<'static, StreamEvent>;

/// Lifecycle of a session as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Metadata plus transcript, as returned by [`Controller::get`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub meta: SessionSummary,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub messages: Vec<Message>,
}

/// Outcome of flushing a finished session to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Flush {
    #[default]
    Pending,
    Saved,
    Failed,
}

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<Message>,
    error: Option<String>,
    finished_at: Option<Instant>,
    flush: Flush,
}

fn status_of(state: &SessionState) -> SessionStatus {
    match (&state.finished_at, &state.error) {
        (None, _) => SessionStatus::Running,
        (Some(_), None) => SessionStatus::Completed,
        (Some(_), Some(_)) => SessionStatus::Failed,
    }
}

/// A live session: metadata, buffer and change notification.
#[derive(Debug)]
pub struct SessionRecord {
    summary: SessionSummary,
    state: RwLock<SessionState>,
    version: watch::Sender<u64>,
}

enum Slot {
    Next(Message),
    Finished(Option<String>),
    Pending,
}

impl SessionRecord {
    fn new(summary: SessionSummary) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            summary,
            state: RwLock::new(SessionState::default()),
            version,
        }
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.read().finished_at.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        status_of(&self.state.read())
    }

    /// A consistent snapshot of metadata, status and transcript.
    pub fn detail(&self) -> SessionDetail {
        let state = self.state.read();
        SessionDetail {
            meta: self.summary.clone(),
            status: status_of(&state),
            error: state.error.clone(),
            messages: state.messages.clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        f(&mut self.state.write());
        self.version.send_modify(|v| *v += 1);
    }

    fn push(&self, msg: Message) {
        self.update(|s| s.messages.push(msg));
    }

    fn finish(&self, error: Option<String>) {
        self.update(|s| {
            s.error = error;
            s.finished_at = Some(Instant::now());
        });
    }

    fn flushed(&self, outcome: Flush) {
        self.update(|s| s.flush = outcome);
    }

    /// Finished and the flush attempted, whatever its outcome.
    fn is_settled(&self) -> bool {
        let state = self.state.read();
        state.finished_at.is_some() && state.flush != Flush::Pending
    }

    /// Finished and saved, so the store can serve it after eviction.
    ///
    /// A session whose flush failed stays in memory for the life of the
    /// process; it is the only copy of its transcript.
    fn is_evictable(&self) -> bool {
        let state = self.state.read();
        state.finished_at.is_some() && state.flush == Flush::Saved
    }

    fn finished_before(&self, cutoff: Instant) -> bool {
        let state = self.state.read();
        state.flush == Flush::Saved && state.finished_at.is_some_and(|t| t <= cutoff)
    }

    fn slot(&self, index: usize) -> Slot {
        let state = self.state.read();
        if let Some(msg) = state.messages.get(index) {
            Slot::Next(msg.clone())
        } else if state.finished_at.is_some() {
            Slot::Finished(state.error.clone())
        } else {
            Slot::Pending
        }
    }

    /// Replay from the first message, follow until finished, then close.
    fn follow(self: Arc<Self>) -> EventStream {
        struct Cursor {
            record: Arc<SessionRecord>,
            rx: watch::Receiver<u64>,
            next: usize,
            tail: Vec<StreamEvent>,
            closed: bool,
        }

        let rx = self.version.subscribe();
        let cursor = Cursor {
            record: self,
            rx,
            next: 0,
            tail: Vec::new(),
            closed: false,
        };
        stream::unfold(cursor, |mut c| async move {
            loop {
                if c.closed {
                    // tail is stored reversed
                    let ev = c.tail.pop()?;
                    return Some((ev, c));
                }
                c.rx.mark_unchanged();
                match c.record.slot(c.next) {
                    Slot::Next(msg) => {
                        c.next += 1;
                        return Some((StreamEvent::Message(msg), c));
                    }
                    Slot::Finished(error) => {
                        c.closed = true;
                        c.tail.push(StreamEvent::Done);
                        if let Some(e) = error {
                            c.tail.push(StreamEvent::Error(e));
                        }
                    }
                    Slot::Pending => {
                        if c.rx.changed().await.is_err() {
                            // The record owns the sender, so this cannot
                            // happen while we hold it; stop rather than spin.
                            c.closed = true;
                            c.tail.push(StreamEvent::Done);
                        }
                    }
                }
            }
        })
        .boxed()
    }

    async fn wait_settled(&self) {
        let mut rx = self.version.subscribe();
        loop {
            rx.mark_unchanged();
            if self.is_settled() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Live sessions by id.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, Arc<SessionRecord>>,
}

impl SessionTable {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionRecord>> {
        self.sessions.get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Drop saved sessions that finished more than `retention` ago.
    pub fn evict_expired(&mut self, retention: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(retention) else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions.retain(|_, r| !r.finished_before(cutoff));
        before - self.sessions.len()
    }

    /// Free a slot when at `capacity` by evicting the oldest saved session.
    pub fn make_room(&mut self, capacity: usize) -> Result<(), SessionError> {
        if self.sessions.len() < capacity {
            return Ok(());
        }
        let oldest = self
            .sessions
            .iter()
            .filter(|(_, r)| r.is_evictable())
            .min_by_key(|(_, r)| r.summary.created_at)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                tracing::debug!(session_id = %id, "evicting oldest completed session");
                self.sessions.remove(&id);
                Ok(())
            }
            None => Err(SessionError::CapacityExceeded(self.sessions.len())),
        }
    }

    fn insert(&mut self, record: Arc<SessionRecord>) {
        self.sessions
            .insert(record.summary.session_id.clone(), record);
    }

    fn records(&self) -> Vec<Arc<SessionRecord>> {
        self.sessions.values().cloned().collect()
    }
}

/// Where sessions get their text generator.
#[derive(Clone)]
pub enum GeneratorSource {
    /// Connect to the requested provider, else the default one.
    Providers {
        default: Provider,
        keys: ProviderKeys,
        /// Model used when a request names none.
        model: Option<String>,
    },
    /// One generator for every session.
    Fixed(Arc<dyn TextGenerator>),
}

impl GeneratorSource {
    fn generator_for(
        &self,
        request: &DebateRequest,
    ) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        match self {
            GeneratorSource::Providers {
                default,
                keys,
                model,
            } => {
                let mut params = request.model_params();
                if params.model.is_none() {
                    params.model = model.clone();
                }
                connect(request.llm.unwrap_or(*default), keys, &params)
            }
            GeneratorSource::Fixed(generator) => Ok(generator.clone()),
        }
    }
}

/// Session table limits.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a completed session stays in memory.
    pub retention: Duration,
    /// Most sessions held in memory at once.
    pub max_sessions: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
            max_sessions: 64,
        }
    }
}

/// Creates sessions, runs them and serves their transcripts.
pub struct Controller {
    table: Mutex<SessionTable>,
    store: Arc<TranscriptStore>,
    generators: GeneratorSource,
    toolbox: Toolbox,
    profile: Option<ProfileStore>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: Arc<TranscriptStore>,
        generators: GeneratorSource,
        config: ControllerConfig,
    ) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            store,
            generators,
            toolbox: Toolbox::web_lookup(),
            profile: None,
            config,
        }
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    pub fn with_profile(mut self, profile: ProfileStore) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn store(&self) -> &Arc<TranscriptStore> {
        &self.store
    }

    pub fn profile(&self) -> Option<&ProfileStore> {
        self.profile.as_ref()
    }

    pub fn live_sessions(&self) -> usize {
        self.table.lock().len()
    }

    /// Build and start a session, returning its id.
    pub fn create(&self, mut request: DebateRequest) -> Result<String, SessionError> {
        if request.context.is_none() {
            request.context = self.profile.as_ref().and_then(ProfileStore::load);
        }
        let created_at = Utc::now();
        let session_id = self.unused_id(derive_session_id(&request.motion, created_at));

        let generator = self
            .generators
            .generator_for(&request)
            .map_err(DebateError::from)?;
        let debate = Runner::new(generator)
            .with_toolbox(self.toolbox.clone())
            .build(&request, &session_id)?;

        let summary = SessionSummary {
            session_id,
            motion: request.motion.clone(),
            mode: request.mode,
            created_at,
        };
        self.launch(summary, debate)
    }

    fn unused_id(&self, base: String) -> String {
        let table = self.table.lock();
        let mut candidate = base.clone();
        let mut n = 1;
        while table.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }

    /// Register an already seated debate and spawn its task.
    pub fn launch(&self, summary: SessionSummary, debate: Debate) -> Result<String, SessionError> {
        let record = Arc::new(SessionRecord::new(summary));
        {
            let mut table = self.table.lock();
            let evicted = table.evict_expired(self.config.retention);
            if evicted > 0 {
                tracing::debug!(evicted, "expired sessions evicted");
            }
            table.make_room(self.config.max_sessions)?;
            if table.contains(&record.summary.session_id) {
                return Err(DebateError::Config(format!(
                    "session {} already exists",
                    record.summary.session_id
                ))
                .into());
            }
            table.insert(record.clone());
        }

        let session_id = record.summary.session_id.clone();
        tracing::info!(
            session_id = %session_id,
            mode = %record.summary.mode,
            motion = %record.summary.motion,
            "session created"
        );
        tokio::spawn(run_session(record, debate, self.store.clone()));
        Ok(session_id)
    }

    /// Replay-then-follow stream of a live session, or a replay of a stored one.
    pub async fn stream(&self, session_id: &str) -> Result<EventStream, SessionError> {
        let live = self.table.lock().get(session_id);
        if let Some(record) = live {
            return Ok(record.follow());
        }
        let stored = self.stored(session_id).await?;
        let events = stored
            .messages
            .into_iter()
            .map(StreamEvent::Message)
            .chain(stored.error.map(StreamEvent::Error))
            .chain(std::iter::once(StreamEvent::Done));
        Ok(stream::iter(events).boxed())
    }

    /// Metadata and transcript so far.
    pub async fn get(&self, session_id: &str) -> Result<SessionDetail, SessionError> {
        let live = self.table.lock().get(session_id);
        if let Some(record) = live {
            return Ok(record.detail());
        }
        self.stored(session_id).await
    }

    /// A session read back from the store.
    async fn stored(&self, session_id: &str) -> Result<SessionDetail, SessionError> {
        let store = self.store.clone();
        let id = session_id.to_string();
        let (summary, messages, error) = blocking(move || {
            Ok((store.summary(&id)?, store.load(&id)?, store.run_error(&id)?))
        })
        .await?;
        let meta = summary.ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let status = match error {
            Some(_) => SessionStatus::Failed,
            None => SessionStatus::Completed,
        };
        Ok(SessionDetail {
            meta,
            status,
            error,
            messages,
        })
    }

    /// Stored and live sessions, newest first.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let store = self.store.clone();
        let mut summaries = blocking(move || store.list()).await?;
        let live = self.table.lock().records();
        for record in live {
            if !summaries.iter().any(|s| s.session_id == record.summary.session_id) {
                summaries.push(record.summary.clone());
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Wait until a live session has finished and its flush to the store
    /// has been attempted.
    pub async fn wait_settled(&self, session_id: &str) -> Result<(), SessionError> {
        let record = self
            .table
            .lock()
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        record.wait_settled().await;
        Ok(())
    }
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

/// Drive a debate to exhaustion, then persist its transcript.
async fn run_session(record: Arc<SessionRecord>, mut debate: Debate, store: Arc<TranscriptStore>) {
    let session_id = record.summary.session_id.clone();
    let error = loop {
        match debate.next_message().await {
            Ok(Some(msg)) => record.push(msg),
            Ok(None) => break None,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "session failed");
                break Some(e.to_string());
            }
        }
    };
    record.finish(error.clone());
    tracing::info!(session_id = %session_id, messages = record.len(), "session finished");

    let summary = record.summary.clone();
    let messages = record.messages();
    let outcome = match blocking(move || store.save(&summary, &messages, error.as_deref())).await {
        Ok(()) => Flush::Saved,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist transcript, keeping it in memory");
            Flush::Failed
        }
    };
    record.flushed(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::DebateKind;
    use crate::dialogue::Role;

    fn record(id: &str) -> Arc<SessionRecord> {
        Arc::new(SessionRecord::new(SessionSummary {
            session_id: id.to_string(),
            motion: "m".into(),
            mode: DebateKind::Simple,
            created_at: Utc::now(),
        }))
    }

    #[test]
    fn event_payloads() {
        assert_eq!(StreamEvent::Done.data(), "[DONE]");
        assert_eq!(StreamEvent::Error("boom".into()).data(), r#"{"error":"boom"}"#);
        let msg = Message::new("mod", Role::Moderator, "Please begin", "s");
        let v: serde_json::Value = serde_json::from_str(&StreamEvent::Message(msg).data()).unwrap();
        assert_eq!(v["message"], "Please begin");
    }

    #[tokio::test]
    async fn late_observer_replays_then_sees_error_and_done() {
        let r = record("s");
        r.push(Message::new("mod", Role::Moderator, "Please begin", "s"));
        r.finish(Some("provider down".into()));
        let events: Vec<_> = r.clone().follow().collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StreamEvent::Message(_)));
        assert_eq!(events[1], StreamEvent::Error("provider down".into()));
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[tokio::test]
    async fn follower_is_woken_by_appends() {
        let r = record("s");
        let mut stream = r.clone().follow();
        let writer = {
            let r = r.clone();
            tokio::spawn(async move {
                for i in 0..3 {
                    tokio::task::yield_now().await;
                    r.push(Message::new("A", Role::Debater, format!("turn {i}"), "s"));
                }
                r.finish(None);
            })
        };
        let mut texts = Vec::new();
        while let Some(ev) = stream.next().await {
            match ev {
                StreamEvent::Message(m) => texts.push(m.text),
                StreamEvent::Done => break,
                StreamEvent::Error(e) => panic!("unexpected error {e}"),
            }
        }
        writer.await.unwrap();
        assert_eq!(texts, ["turn 0", "turn 1", "turn 2"]);
    }

    #[test]
    fn table_refuses_when_full_of_running_sessions() {
        let mut table = SessionTable::default();
        table.insert(record("a"));
        assert!(matches!(table.make_room(1), Err(SessionError::CapacityExceeded(1))));
    }

    #[test]
    fn table_evicts_oldest_settled_session() {
        let mut table = SessionTable::default();
        let done = record("done");
        done.finish(None);
        done.flushed(Flush::Saved);
        table.insert(done);
        table.insert(record("running"));
        table.make_room(2).unwrap();
        assert!(!table.contains("done"));
        assert!(table.contains("running"));
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let mut table = SessionTable::default();
        let done = record("done");
        done.finish(None);
        done.flushed(Flush::Saved);
        table.insert(done);
        table.insert(record("running"));
        assert_eq!(table.evict_expired(Duration::ZERO), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unsaved_sessions_are_never_evicted() {
        let mut table = SessionTable::default();
        let lost = record("lost");
        lost.finish(None);
        lost.flushed(Flush::Failed);
        assert!(lost.is_settled());
        table.insert(lost);
        assert_eq!(table.evict_expired(Duration::ZERO), 0);
        assert!(matches!(table.make_room(1), Err(SessionError::CapacityExceeded(1))));
        assert!(table.contains("lost"));
    }
}
