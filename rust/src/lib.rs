mod actions;
mod backend;
mod channel;
mod context;
mod core;
mod error;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use backend::{
    ChatBackend, ChatBackendConnector, HttpBackend, HttpBackendConnector, MinimalProfile,
    OutgoingMessage, SharedBackendConnector, StoredMessage,
};
pub use channel::{
    ChannelConnector, ChannelEvent, ConnectionGuard, EventChannel, EventName, ListenerId,
    LiveMessage, SharedChannelConnector, TypingSignal, WebSocketConnector,
};
pub use context::SessionContext;
pub use error::{ChannelError, FetchError, ValidationError};
pub use state::*;
pub use updates::*;

/// Return the default `chat_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    backend_connector: SharedBackendConnector,
    channel_connector: SharedChannelConnector,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let backend_connector: SharedBackendConnector = Arc::new(RwLock::new(None));
        let channel_connector: SharedChannelConnector = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let backend_for_core = backend_connector.clone();
        let channel_for_core = channel_connector.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                backend_for_core,
                channel_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            backend_connector,
            channel_connector,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl FfiApp {
    /// Replace the persistence backend for sessions started after this call.
    pub fn set_backend_connector_for_tests(&self, connector: Arc<dyn ChatBackendConnector>) {
        match self.backend_connector.write() {
            Ok(mut slot) => {
                *slot = Some(connector);
            }
            Err(poison) => {
                *poison.into_inner() = Some(connector);
            }
        }
    }

    /// Replace the live-channel transport for sessions started after this call.
    pub fn set_channel_connector_for_tests(&self, connector: Arc<dyn ChannelConnector>) {
        match self.channel_connector.write() {
            Ok(mut slot) => {
                *slot = Some(connector);
            }
            Err(poison) => {
                *poison.into_inner() = Some(connector);
            }
        }
    }
}
