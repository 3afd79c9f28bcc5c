//! Event channel adapter over the persistent live connection.
//!
//! One `EventChannel` exists per authenticated session and is shared by every
//! conversation; per-conversation filtering happens in the handlers. A
//! transport (websocket in production, in-memory in tests) `attach`es to carry
//! outbound events and calls `deliver` for every inbound frame, in stream
//! order, from a single task.

mod ws;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};

use crate::context::SessionContext;
use crate::error::ChannelError;

pub use ws::WebSocketConnector;

/// Chat message notification carried by `sendMessage` / `receiveMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_id: String,
    pub text: String,
    /// Canonical server id, present when the sender emits after persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub sender_id: String,
    pub receiver_id: String,
}

/// Everything that flows through the channel. Lifecycle variants are local
/// only and never appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ChannelEvent {
    SendMessage(LiveMessage),
    ReceiveMessage(LiveMessage),
    Typing(TypingSignal),
    #[serde(skip)]
    Connected,
    #[serde(skip)]
    Disconnected,
}

impl ChannelEvent {
    pub fn name(&self) -> EventName {
        match self {
            ChannelEvent::SendMessage(_) => EventName::SendMessage,
            ChannelEvent::ReceiveMessage(_) => EventName::ReceiveMessage,
            ChannelEvent::Typing(_) => EventName::Typing,
            ChannelEvent::Connected => EventName::Connect,
            ChannelEvent::Disconnected => EventName::Disconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    SendMessage,
    ReceiveMessage,
    Typing,
    Connect,
    Disconnect,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SendMessage => "sendMessage",
            EventName::ReceiveMessage => "receiveMessage",
            EventName::Typing => "typing",
            EventName::Connect => "connect",
            EventName::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync + 'static>;

struct Listener {
    id: ListenerId,
    name: EventName,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    listeners: Mutex<Vec<Listener>>,
    outbound: Mutex<Option<flume::Sender<ChannelEvent>>>,
    next_listener_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventChannel {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`. Every call adds a new listener; callers
    /// must `off` the previous one before re-registering.
    pub fn on(
        &self,
        name: EventName,
        handler: impl Fn(&ChannelEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.inner.listeners).push(Listener {
            id,
            name,
            handler: Arc::new(handler),
        });
        tracing::debug!(event = name.as_str(), listener = id.0, "channel listener added");
        id
    }

    /// Remove one listener, or every listener for `name` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&self, name: EventName, id: Option<ListenerId>) -> usize {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|l| l.name != name || id.is_some_and(|id| l.id != id));
        before - listeners.len()
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        lock(&self.inner.listeners)
            .iter()
            .filter(|l| l.name == name)
            .count()
    }

    /// Best-effort send. With no live connection the event is dropped.
    pub fn emit(&self, event: ChannelEvent) -> Result<(), ChannelError> {
        let outbound = lock(&self.inner.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(ChannelError::Unavailable);
        };
        tx.send(event).map_err(|_| ChannelError::Unavailable)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.outbound)
            .as_ref()
            .is_some_and(|tx| !tx.is_disconnected())
    }

    /// Called by a transport once its connection is up. Outbound events are
    /// read from the returned receiver until `detach`.
    pub fn attach(&self) -> flume::Receiver<ChannelEvent> {
        let (tx, rx) = flume::unbounded();
        *lock(&self.inner.outbound) = Some(tx);
        rx
    }

    pub fn detach(&self) {
        lock(&self.inner.outbound).take();
    }

    /// Invoke every handler registered for the event's name, in registration
    /// order. Handlers run outside the listener lock so they may call `off`.
    pub fn deliver(&self, event: &ChannelEvent) {
        let name = event.name();
        let handlers: Vec<Handler> = lock(&self.inner.listeners)
            .iter()
            .filter(|l| l.name == name)
            .map(|l| l.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

/// Keeps a transport running; dropping or closing it shuts the transport down.
pub struct ConnectionGuard {
    shutdown: Option<tokio::sync::watch::Sender<bool>>,
}

impl ConnectionGuard {
    /// For transports with nothing to shut down.
    pub fn detached() -> Self {
        Self { shutdown: None }
    }

    pub(crate) fn new(shutdown: tokio::sync::watch::Sender<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the live connection for a session and binds it to `channel`.
pub trait ChannelConnector: Send + Sync + 'static {
    fn connect(
        &self,
        channel: &EventChannel,
        session: &SessionContext,
        runtime: &tokio::runtime::Handle,
    ) -> ConnectionGuard;
}

pub type SharedChannelConnector = Arc<RwLock<Option<Arc<dyn ChannelConnector>>>>;
