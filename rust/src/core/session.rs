use std::sync::Arc;

use flume::Sender;

use super::AppCore;
use crate::backend::{ChatBackend, ChatBackendConnector, HttpBackendConnector, OfflineBackend};
use crate::channel::{
    ChannelConnector, ChannelEvent, ConnectionGuard, EventChannel, EventName, ListenerId,
    WebSocketConnector,
};
use crate::context::SessionContext;
use crate::updates::{CoreMsg, InternalEvent};

/// Everything owned by one authenticated session: the backend, the shared
/// live channel and the listeners registered on it.
pub(super) struct Session {
    pub(super) seq: u64,
    pub(super) ctx: SessionContext,
    pub(super) backend: Arc<dyn ChatBackend>,
    pub(super) channel: EventChannel,
    connection: ConnectionGuard,
    session_listeners: Vec<(EventName, ListenerId)>,
    chat_listeners: Vec<(EventName, ListenerId)>,
}

fn forward(tx: &Sender<CoreMsg>, event: InternalEvent) {
    let _ = tx.send(CoreMsg::Internal(Box::new(event)));
}

impl Session {
    /// Subscribed once per connection lifetime: message delivery for every
    /// conversation plus connection status.
    fn attach_session_listeners(&mut self, core_sender: &Sender<CoreMsg>) {
        let seq = self.seq;

        let tx = core_sender.clone();
        let id = self.channel.on(EventName::ReceiveMessage, move |event| {
            if let ChannelEvent::ReceiveMessage(message) = event {
                forward(
                    &tx,
                    InternalEvent::LiveMessageReceived {
                        session: seq,
                        message: message.clone(),
                    },
                );
            }
        });
        self.session_listeners.push((EventName::ReceiveMessage, id));

        for (name, connected) in [(EventName::Connect, true), (EventName::Disconnect, false)] {
            let tx = core_sender.clone();
            let id = self.channel.on(name, move |_| {
                forward(&tx, InternalEvent::ChannelStatus { session: seq, connected });
            });
            self.session_listeners.push((name, id));
        }
    }

    /// Typing listener scoped to the active conversation. Always detaches the
    /// previous chat's listener first.
    pub(super) fn attach_chat_listeners(&mut self, core_sender: &Sender<CoreMsg>, partner_id: &str) {
        self.detach_chat_listeners();

        let seq = self.seq;
        let me = self.ctx.user_id.clone();
        let partner = partner_id.to_string();
        let tx = core_sender.clone();
        let id = self.channel.on(EventName::Typing, move |event| {
            if let ChannelEvent::Typing(signal) = event {
                if signal.sender_id == partner && signal.receiver_id == me {
                    forward(
                        &tx,
                        InternalEvent::LiveTyping {
                            session: seq,
                            signal: signal.clone(),
                        },
                    );
                }
            }
        });
        self.chat_listeners.push((EventName::Typing, id));
    }

    pub(super) fn detach_chat_listeners(&mut self) {
        for (name, id) in self.chat_listeners.drain(..) {
            self.channel.off(name, Some(id));
        }
    }

    fn teardown(&mut self) {
        self.detach_chat_listeners();
        for (name, id) in self.session_listeners.drain(..) {
            self.channel.off(name, Some(id));
        }
        self.connection.close();
        self.channel.detach();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl AppCore {
    pub(super) fn open_session(&mut self, ctx: SessionContext) -> Session {
        self.session_seq += 1;

        let backend_override = match self.backend_connector.read() {
            Ok(slot) => slot.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        let channel_override = match self.channel_connector.read() {
            Ok(slot) => slot.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        let network_enabled = self.network_enabled();

        let backend: Arc<dyn ChatBackend> = match backend_override {
            Some(connector) => connector.connect(&ctx),
            None if network_enabled => {
                HttpBackendConnector::new(self.config.server_url(), self.config.http_timeout())
                    .connect(&ctx)
            }
            None => Arc::new(OfflineBackend),
        };

        let channel = EventChannel::new();
        let mut session = Session {
            seq: self.session_seq,
            ctx,
            backend,
            channel,
            connection: ConnectionGuard::detached(),
            session_listeners: Vec::new(),
            chat_listeners: Vec::new(),
        };
        // Listeners go in before the transport starts so the first
        // `connect` is observed.
        session.attach_session_listeners(&self.core_sender);

        let connection = match channel_override {
            Some(connector) => {
                connector.connect(&session.channel, &session.ctx, self.runtime.handle())
            }
            None if network_enabled => {
                WebSocketConnector::new(self.config.channel_url(), self.config.reconnect_delay())
                    .connect(&session.channel, &session.ctx, self.runtime.handle())
            }
            None => {
                tracing::info!("network disabled; live channel not started");
                ConnectionGuard::detached()
            }
        };
        session.connection = connection;

        tracing::info!(user_id = %session.ctx.user_id, seq = session.seq, "session opened");
        session
    }
}
