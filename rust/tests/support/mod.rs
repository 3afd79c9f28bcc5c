#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chat_core::{
    AppReconciler, AppState, AppUpdate, ChannelConnector, ChannelEvent, ChatBackend,
    ChatBackendConnector, ConnectionGuard, EventChannel, FetchError, FfiApp, LiveMessage,
    MinimalProfile, OutgoingMessage, SessionContext, StoredMessage, TypingSignal,
};
use chrono::{TimeZone, Utc};

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, extra: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("chat_config.json");
    let mut v = serde_json::json!({
        "disable_network": true,
        "typing_timeout_ms": 1500,
    });
    if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
        for (k, val) in extra {
            base.insert(k.clone(), val.clone());
        }
    }
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
        })
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(AppUpdate::rev).collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

pub fn stored(id: &str, sender: &str, chat: &str, text: &str, at_ms: i64) -> StoredMessage {
    StoredMessage {
        id: id.to_string(),
        sender_id: sender.to_string(),
        receiver_id: None,
        conversation_id: chat.to_string(),
        text: text.to_string(),
        created_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
    }
}

pub fn live(sender: &str, receiver: &str, chat: &str, text: &str, id: Option<&str>) -> ChannelEvent {
    ChannelEvent::ReceiveMessage(LiveMessage {
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        conversation_id: chat.to_string(),
        text: text.to_string(),
        message_id: id.map(ToString::to_string),
    })
}

pub fn typing(sender: &str, receiver: &str) -> ChannelEvent {
    ChannelEvent::Typing(TypingSignal {
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
    })
}

pub fn profile(id: &str, first: &str, last: &str) -> MinimalProfile {
    MinimalProfile {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        about: None,
        account_type: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    FetchHistory(String),
    PostMessage(OutgoingMessage),
    MarkRead(String),
    MarkUnread(String),
    FetchProfile(String),
}

#[derive(Default)]
struct MockState {
    history: Mutex<HashMap<String, Vec<StoredMessage>>>,
    history_delay: Mutex<HashMap<String, Duration>>,
    profiles: Mutex<HashMap<String, MinimalProfile>>,
    missing_profiles: Mutex<HashSet<String>>,
    post_delay: Mutex<Duration>,
    post_failures: Mutex<VecDeque<FetchError>>,
    mark_unread_failures: Mutex<VecDeque<FetchError>>,
    calls: Mutex<Vec<BackendCall>>,
    tokens: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

/// Recording in-process backend. Saved messages get ids `srv-1`, `srv-2`, ...
/// Unknown profiles resolve to a placeholder unless marked with `fail_profile`.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, chat_id: &str, messages: Vec<StoredMessage>) {
        self.inner
            .history
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), messages);
    }

    pub fn delay_history(&self, chat_id: &str, delay: Duration) {
        self.inner
            .history_delay
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), delay);
    }

    pub fn set_profile(&self, profile: MinimalProfile) {
        self.inner
            .profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    /// Profile lookups for `user_id` answer 404.
    pub fn fail_profile(&self, user_id: &str) {
        self.inner
            .missing_profiles
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn delay_posts(&self, delay: Duration) {
        *self.inner.post_delay.lock().unwrap() = delay;
    }

    /// The next post call fails with `err`.
    pub fn fail_next_post(&self, err: FetchError) {
        self.inner.post_failures.lock().unwrap().push_back(err);
    }

    /// The next mark-unread call fails with `err`.
    pub fn fail_next_mark_unread(&self, err: FetchError) {
        self.inner.mark_unread_failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &BackendCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn posts(&self) -> Vec<OutgoingMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::PostMessage(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.inner.tokens.lock().unwrap().clone()
    }

    fn record(&self, call: BackendCall) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, FetchError> {
        self.record(BackendCall::FetchHistory(conversation_id.to_string()));
        let delay = self
            .inner
            .history_delay
            .lock()
            .unwrap()
            .get(conversation_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .inner
            .history
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<StoredMessage, FetchError> {
        self.record(BackendCall::PostMessage(message.clone()));
        let delay = *self.inner.post_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.inner.post_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StoredMessage {
            id: format!("srv-{n}"),
            sender_id: message.sender_id.clone(),
            receiver_id: None,
            conversation_id: message.conversation_id.clone(),
            text: message.text.clone(),
            created_at: Utc::now(),
        })
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), FetchError> {
        self.record(BackendCall::MarkRead(conversation_id.to_string()));
        Ok(())
    }

    async fn mark_unread(&self, conversation_id: &str) -> Result<(), FetchError> {
        self.record(BackendCall::MarkUnread(conversation_id.to_string()));
        match self.inner.mark_unread_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<MinimalProfile, FetchError> {
        self.record(BackendCall::FetchProfile(user_id.to_string()));
        if self.inner.missing_profiles.lock().unwrap().contains(user_id) {
            return Err(FetchError::Status {
                status: 404,
                body: "not found".to_string(),
            });
        }
        Ok(self
            .inner
            .profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| profile(user_id, "User", user_id)))
    }
}

impl ChatBackendConnector for MockBackend {
    fn connect(&self, session: &SessionContext) -> Arc<dyn ChatBackend> {
        self.inner.tokens.lock().unwrap().push(session.token.clone());
        Arc::new(self.clone())
    }
}

#[derive(Default)]
struct LinkState {
    channel: Mutex<Option<EventChannel>>,
    outbound: Mutex<Option<flume::Receiver<ChannelEvent>>>,
    sent: Mutex<Vec<ChannelEvent>>,
    offline: AtomicBool,
}

/// In-memory live channel. The test plays the server: `push` delivers inbound
/// events, `sent` returns what the app emitted.
#[derive(Clone, Default)]
pub struct MemoryLink {
    inner: Arc<LinkState>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions started afterwards never come online.
    pub fn offline() -> Self {
        let link = Self::default();
        link.inner.offline.store(true, Ordering::SeqCst);
        link
    }

    pub fn push(&self, event: ChannelEvent) {
        let channel = self.inner.channel.lock().unwrap().clone();
        channel.expect("no session connected").deliver(&event);
    }

    pub fn sent(&self) -> Vec<ChannelEvent> {
        let mut sent = self.inner.sent.lock().unwrap();
        if let Some(rx) = self.inner.outbound.lock().unwrap().as_ref() {
            sent.extend(rx.try_iter());
        }
        sent.clone()
    }

    pub fn sent_messages(&self) -> Vec<LiveMessage> {
        self.sent()
            .into_iter()
            .filter_map(|e| match e {
                ChannelEvent::SendMessage(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn drop_connection(&self) {
        self.sent();
        let channel = self.inner.channel.lock().unwrap().clone();
        if let Some(channel) = channel {
            channel.detach();
            self.inner.outbound.lock().unwrap().take();
            channel.deliver(&ChannelEvent::Disconnected);
        }
    }

    pub fn restore_connection(&self) {
        let channel = self.inner.channel.lock().unwrap().clone();
        if let Some(channel) = channel {
            *self.inner.outbound.lock().unwrap() = Some(channel.attach());
            channel.deliver(&ChannelEvent::Connected);
        }
    }
}

impl ChannelConnector for MemoryLink {
    fn connect(
        &self,
        channel: &EventChannel,
        _session: &SessionContext,
        _runtime: &tokio::runtime::Handle,
    ) -> ConnectionGuard {
        *self.inner.channel.lock().unwrap() = Some(channel.clone());
        if !self.inner.offline.load(Ordering::SeqCst) {
            *self.inner.outbound.lock().unwrap() = Some(channel.attach());
            channel.deliver(&ChannelEvent::Connected);
        }
        ConnectionGuard::detached()
    }
}

pub struct Harness {
    pub app: Arc<FfiApp>,
    pub backend: MockBackend,
    pub link: MemoryLink,
    pub updates: Collector,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(serde_json::json!({}), MemoryLink::new())
    }

    pub fn with(config: serde_json::Value, link: MemoryLink) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        write_config(&data_dir, config);
        let app = FfiApp::new(data_dir);
        let backend = MockBackend::new();
        app.set_backend_connector_for_tests(Arc::new(backend.clone()));
        app.set_channel_connector_for_tests(Arc::new(link.clone()));
        let updates = Collector::new();
        app.listen_for_updates(Box::new(updates.clone()));
        Self {
            app,
            backend,
            link,
            updates,
            _dir: dir,
        }
    }

    pub fn state(&self) -> AppState {
        self.app.state()
    }

    pub fn wait(&self, what: &str, f: impl Fn(&AppState) -> bool) {
        wait_until(what, Duration::from_secs(3), || f(&self.app.state()));
    }

    pub fn login(&self, user_id: &str) {
        self.app.dispatch(chat_core::AppAction::StartSession {
            user_id: user_id.to_string(),
            token: format!("token-{user_id}"),
        });
        self.wait("logged in", |s| {
            matches!(s.auth, chat_core::AuthState::LoggedIn { .. })
        });
    }

    /// Open `chat_id` and wait for its history to settle.
    pub fn open(&self, chat_id: &str, partner_id: &str) {
        self.app.dispatch(chat_core::AppAction::OpenChat {
            chat_id: chat_id.to_string(),
            partner_id: partner_id.to_string(),
        });
        self.wait("chat loaded", |s| {
            s.current_chat
                .as_ref()
                .is_some_and(|c| c.chat_id == chat_id && !c.is_loading)
        });
    }
}
