mod compose;
mod config;
mod live;
mod outbox;
mod session;
mod store;
mod typing;
mod unread;

use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::backend::{ChatBackend, SharedBackendConnector};
use crate::channel::SharedChannelConnector;
use crate::context::SessionContext;
use crate::error::ValidationError;
use crate::state::{AuthState, ChatViewState, PartnerProfile};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::default_app_config_json;

use outbox::Outbox;
use session::Session;
use store::MessageStore;
use typing::TypingIndicator;
use unread::UnreadTracker;

const GUEST_ACCOUNT_TYPE: &str = "guest";

pub struct AppCore {
    pub state: crate::state::AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<crate::state::AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    backend_connector: SharedBackendConnector,
    channel_connector: SharedChannelConnector,

    session: Option<Session>,
    session_seq: u64,

    // Actor-internal chat bookkeeping. `store` mirrors the ActiveChat only;
    // `outbox` and `unread` span every conversation of the session.
    store: MessageStore,
    outbox: Outbox,
    typing: TypingIndicator,
    typing_timer: Option<tokio::task::JoinHandle<()>>,
    unread: UnreadTracker,

    // Bumped on every ActiveChat change; history/profile results carrying an
    // older token are dropped.
    chat_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<crate::state::AppState>>,
        backend_connector: SharedBackendConnector,
        channel_connector: SharedChannelConnector,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = crate::state::AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let store = MessageStore::new(String::new(), config.echo_window_ms());
        let typing = TypingIndicator::new(config.typing_timeout());

        tracing::info!(data_dir = %data_dir, server = %config.server_url(), "chat core starting");

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            backend_connector,
            channel_connector,
            session: None,
            session_seq: 0,
            store,
            outbox: Outbox::default(),
            typing,
            typing_timer: None,
            unread: UnreadTracker::default(),
            chat_token: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &crate::state::AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Copy actor bookkeeping into the UI state, then emit.
    fn emit_chat(&mut self) {
        self.state.unread_chats = self.unread.badges();
        self.state.muted_chats = self.unread.muted();
        if let Some(chat) = self.state.current_chat.as_mut() {
            chat.messages = self.store.messages().to_vec();
            chat.partner_typing = self.typing.is_typing();
        }
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI clears it so a snapshot resync still shows it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn my_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.ctx.user_id.as_str())
    }

    fn active_chat_id(&self) -> Option<&str> {
        self.state.current_chat.as_ref().map(|c| c.chat_id.as_str())
    }

    fn active_partner_id(&self) -> Option<&str> {
        self.state.current_chat.as_ref().map(|c| c.partner_id.as_str())
    }

    fn backend(&self) -> Option<Arc<dyn ChatBackend>> {
        self.session.as_ref().map(|s| s.backend.clone())
    }

    fn send_internal(tx: &Sender<CoreMsg>, event: InternalEvent) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries the session token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::StartSession { user_id, token } => self.start_session(&user_id, &token),
            AppAction::EndSession => {
                self.end_session();
                self.emit_state();
            }

            // ActiveChat
            AppAction::OpenChat {
                chat_id,
                partner_id,
            } => self.open_chat(&chat_id, &partner_id),
            AppAction::CloseChat => {
                if self.state.current_chat.is_some() {
                    self.close_chat();
                    self.emit_chat();
                }
            }
            AppAction::MarkChatRead { chat_id } => {
                if !self.is_logged_in() {
                    return;
                }
                self.unread.mark_read(&chat_id);
                self.spawn_mark_read(chat_id);
                self.emit_chat();
            }
            AppAction::MuteChat { chat_id } => {
                if self.unread.mute(&chat_id) {
                    self.emit_chat();
                }
            }
            AppAction::UnmuteChat { chat_id } => {
                if self.unread.unmute(&chat_id) {
                    self.emit_chat();
                }
            }

            // Composer
            AppAction::UpdateDraft { chat_id, text } => self.update_draft(&chat_id, text),
            AppAction::SendMessage { chat_id, content } => self.send_message(&chat_id, &content),
            AppAction::RetryMessage { chat_id, local_id } => self.retry_message(&chat_id, local_id),
            AppAction::DiscardMessage { chat_id, local_id } => {
                self.discard_message(&chat_id, local_id)
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::LiveMessageReceived { session, message } => {
                if self.is_current_session(session) {
                    self.on_live_message(message);
                }
            }
            InternalEvent::LiveTyping { session, signal } => {
                if self.is_current_session(session) {
                    self.on_live_typing(signal);
                }
            }
            InternalEvent::ChannelStatus { session, connected } => {
                if !self.is_current_session(session) {
                    return;
                }
                tracing::info!(connected, "live channel status");
                if self.state.channel_connected != connected {
                    self.state.channel_connected = connected;
                    self.emit_state();
                }
            }
            InternalEvent::HistoryLoaded {
                chat_id,
                token,
                result,
            } => {
                if !self.is_current_chat(&chat_id, token) {
                    tracing::debug!(%chat_id, token, "discarding stale history");
                    return;
                }
                match result {
                    Ok(history) => {
                        tracing::debug!(%chat_id, count = history.len(), "history loaded");
                        self.store.load_history(history);
                    }
                    Err(e) => {
                        tracing::warn!(%chat_id, err = %e, "history fetch failed");
                        self.state.toast = Some(e.notice("Unable to load messages!"));
                    }
                }
                if let Some(chat) = self.state.current_chat.as_mut() {
                    chat.is_loading = false;
                }
                self.emit_chat();
            }
            InternalEvent::PartnerProfileLoaded {
                chat_id,
                token,
                result,
            } => {
                if !self.is_current_chat(&chat_id, token) {
                    tracing::debug!(%chat_id, token, "discarding stale profile");
                    return;
                }
                match result {
                    Ok(profile) => {
                        if let Some(chat) = self.state.current_chat.as_mut() {
                            chat.partner = Some(PartnerProfile {
                                is_guest: profile.account_type.as_deref()
                                    == Some(GUEST_ACCOUNT_TYPE),
                                user_id: profile.id,
                                first_name: profile.first_name,
                                last_name: profile.last_name,
                            });
                        }
                        self.emit_state();
                    }
                    Err(e) => {
                        tracing::warn!(%chat_id, err = %e, "profile fetch failed");
                        self.toast(e.notice("Unable to fetch userdata!"));
                    }
                }
            }
            InternalEvent::PersistResult {
                session,
                local_id,
                result,
            } => {
                if self.is_current_session(session) {
                    self.on_persist_result(local_id, result);
                }
            }
            InternalEvent::TypingExpired { generation } => {
                if self.typing.expire(generation) {
                    self.typing_timer = None;
                    self.emit_chat();
                }
            }
            InternalEvent::Toast(msg) => self.toast(msg),
        }
    }

    fn is_current_session(&self, seq: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.seq == seq)
    }

    fn is_current_chat(&self, chat_id: &str, token: u64) -> bool {
        token == self.chat_token && self.active_chat_id() == Some(chat_id)
    }

    fn start_session(&mut self, user_id: &str, token: &str) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            self.toast("Missing user id");
            return;
        }
        if self.is_logged_in() {
            self.end_session();
        }

        self.store = MessageStore::new(user_id, self.config.echo_window_ms());
        let session = self.open_session(SessionContext::new(user_id, token));
        self.state.channel_connected = session.channel.is_connected();
        self.session = Some(session);
        self.state.auth = AuthState::LoggedIn {
            user_id: user_id.to_string(),
        };
        self.emit_state();
    }

    /// Drop the session and every piece of per-session bookkeeping. The caller
    /// emits.
    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(seq = session.seq, "session closed");
        }
        self.clear_typing();
        self.chat_token += 1;
        self.store = MessageStore::new(String::new(), self.config.echo_window_ms());
        self.outbox.clear();
        self.unread.clear();

        let rev = self.state.rev;
        self.state = crate::state::AppState::empty();
        self.state.rev = rev;
    }

    fn open_chat(&mut self, chat_id: &str, partner_id: &str) {
        let chat_id = chat_id.trim();
        let partner_id = partner_id.trim();
        if !self.is_logged_in() {
            self.toast("Please log in first");
            return;
        }
        if chat_id.is_empty() || partner_id.is_empty() {
            self.toast("Missing conversation or partner");
            return;
        }
        if self.active_chat_id() == Some(chat_id) {
            return;
        }

        self.clear_typing();
        self.chat_token += 1;
        let token = self.chat_token;

        let core_sender = self.core_sender.clone();
        if let Some(session) = self.session.as_mut() {
            session.attach_chat_listeners(&core_sender, partner_id);
        }

        self.store.reset(Some(chat_id.to_string()));
        for pending in self.outbox.for_chat(chat_id) {
            self.store.restore_local(pending);
        }

        self.state.current_chat = Some(ChatViewState {
            chat_id: chat_id.to_string(),
            partner_id: partner_id.to_string(),
            partner: None,
            is_loading: true,
            messages: vec![],
            partner_typing: false,
            draft: String::new(),
        });

        if self.unread.activate(chat_id) {
            self.spawn_mark_read(chat_id.to_string());
        }
        self.spawn_chat_loads(chat_id.to_string(), partner_id.to_string(), token);
        self.emit_chat();
    }

    /// Leave the ActiveChat. The caller emits.
    fn close_chat(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.detach_chat_listeners();
        }
        self.clear_typing();
        self.chat_token += 1;
        self.store.reset(None);
        self.state.current_chat = None;
    }

    fn spawn_chat_loads(&self, chat_id: String, partner_id: String, token: u64) {
        let Some(backend) = self.backend() else {
            return;
        };

        let tx = self.core_sender.clone();
        let history_backend = backend.clone();
        let history_chat = chat_id.clone();
        self.runtime.spawn(async move {
            let result = history_backend.fetch_history(&history_chat).await;
            Self::send_internal(
                &tx,
                InternalEvent::HistoryLoaded {
                    chat_id: history_chat,
                    token,
                    result,
                },
            );
        });

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.fetch_profile(&partner_id).await;
            Self::send_internal(
                &tx,
                InternalEvent::PartnerProfileLoaded {
                    chat_id,
                    token,
                    result,
                },
            );
        });
    }

    fn spawn_mark_read(&self, chat_id: String) {
        let Some(backend) = self.backend() else {
            return;
        };
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            if let Err(e) = backend.mark_read(&chat_id).await {
                tracing::warn!(%chat_id, err = %e, "mark read failed");
                Self::send_internal(
                    &tx,
                    InternalEvent::Toast(e.notice("Unable to mark message as read!")),
                );
            }
        });
    }

    fn spawn_mark_unread(&self, chat_id: String) {
        let Some(backend) = self.backend() else {
            return;
        };
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            if let Err(e) = backend.mark_unread(&chat_id).await {
                tracing::warn!(%chat_id, err = %e, "mark unread failed");
                Self::send_internal(
                    &tx,
                    InternalEvent::Toast(e.notice("Unable to mark message as unread!")),
                );
            }
        });
    }

    fn clear_typing(&mut self) {
        if let Some(timer) = self.typing_timer.take() {
            timer.abort();
        }
        self.typing.clear();
    }

    /// Resolve the ActiveChat a composer action refers to.
    fn composer_target(&self, chat_id: &str) -> Result<(String, String), ValidationError> {
        let chat = self
            .state
            .current_chat
            .as_ref()
            .ok_or(ValidationError::NoActiveChat)?;
        if chat.chat_id != chat_id {
            return Err(ValidationError::ChatMismatch(chat_id.to_string()));
        }
        Ok((chat.chat_id.clone(), chat.partner_id.clone()))
    }
}
