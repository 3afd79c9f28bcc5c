use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context};
use chat_core::{
    AppAction, AppReconciler, AppState, AppUpdate, ChatMessage, FfiApp, MessageDeliveryState,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatctl")]
#[command(about = "Terminal client for the live chat core")]
struct Cli {
    /// State directory (config and logs live here between runs)
    #[arg(long, default_value = ".chatctl")]
    state_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default chat_config.json payload
    DefaultConfig,

    /// Open one conversation; stdin lines are sent as messages
    Chat {
        /// REST base URL
        #[arg(long, env = "CHAT_SERVER_URL")]
        server: Option<String>,

        /// Live channel websocket URL (derived from --server when omitted)
        #[arg(long, env = "CHAT_CHANNEL_URL")]
        channel: Option<String>,

        /// Logged-in user id
        #[arg(long, env = "CHAT_USER_ID")]
        user: String,

        /// Bearer token
        #[arg(long, env = "CHAT_TOKEN", hide_env_values = true)]
        token: String,

        /// Conversation id
        #[arg(long)]
        chat: String,

        /// Partner user id
        #[arg(long)]
        partner: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::DefaultConfig => {
            println!("{}", chat_core::default_config_json());
            Ok(())
        }
        Command::Chat {
            server,
            channel,
            user,
            token,
            chat,
            partner,
        } => {
            std::fs::create_dir_all(&cli.state_dir)
                .with_context(|| format!("create state dir {}", cli.state_dir.display()))?;
            write_config(&cli.state_dir, server.as_deref(), channel.as_deref())?;
            cmd_chat(&cli.state_dir, &user, &token, &chat, &partner)
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Merge URL overrides into `<state_dir>/chat_config.json`, keeping other keys.
fn write_config(
    state_dir: &Path,
    server: Option<&str>,
    channel: Option<&str>,
) -> anyhow::Result<()> {
    let path = state_dir.join("chat_config.json");
    let existing = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(_) => chat_core::default_config_json(),
    };
    let mut config: serde_json::Value =
        serde_json::from_str(&existing).with_context(|| format!("parse {}", path.display()))?;
    let Some(obj) = config.as_object_mut() else {
        bail!("{} is not a JSON object", path.display());
    };
    if let Some(server) = server {
        obj.insert("server_url".into(), serde_json::json!(server));
        // A stale derived URL would point at the previous server.
        if channel.is_none() {
            obj.remove("channel_url");
        }
    }
    if let Some(channel) = channel {
        obj.insert("channel_url".into(), serde_json::json!(channel));
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&config)?)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn delivery_tag(msg: &ChatMessage) -> &'static str {
    match msg.delivery {
        MessageDeliveryState::Pending => "…",
        MessageDeliveryState::Persisted => "✓",
        MessageDeliveryState::Failed { .. } => "✗",
    }
}

/// Prints the conversation incrementally as state snapshots arrive.
#[derive(Default)]
struct Printer {
    seen: Mutex<PrinterState>,
}

#[derive(Default)]
struct PrinterState {
    delivery: HashMap<u64, &'static str>,
    typing: bool,
    connected: Option<bool>,
    toast: Option<String>,
}

impl Printer {
    fn render(&self, state: &AppState) {
        let mut seen = match self.seen.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };

        if seen.connected != Some(state.channel_connected) {
            seen.connected = Some(state.channel_connected);
            let status = if state.channel_connected { "online" } else { "offline" };
            eprintln!("-- live channel {status}");
        }
        if state.toast != seen.toast {
            if let Some(toast) = &state.toast {
                eprintln!("!! {toast}");
            }
            seen.toast = state.toast.clone();
        }
        if !state.unread_chats.is_empty() {
            tracing::debug!(unread = ?state.unread_chats, "unread conversations");
        }

        let Some(chat) = &state.current_chat else {
            return;
        };
        for msg in &chat.messages {
            let tag = delivery_tag(msg);
            if seen.delivery.get(&msg.local_id) == Some(&tag) {
                continue;
            }
            let first = seen.delivery.insert(msg.local_id, tag).is_none();
            let who = if msg.is_mine {
                "me".to_string()
            } else {
                chat.partner
                    .as_ref()
                    .map(|p| p.display_name())
                    .unwrap_or_else(|| msg.sender_id.clone())
            };
            if first {
                println!("[{}] {who}: {} {tag}", msg.local_id, msg.text);
            } else {
                println!("[{}] {tag}", msg.local_id);
            }
        }
        if chat.partner_typing != seen.typing {
            seen.typing = chat.partner_typing;
            if chat.partner_typing {
                eprintln!("-- {} is typing…", chat.partner_id);
            }
        }
    }
}

impl AppReconciler for Printer {
    fn reconcile(&self, update: AppUpdate) {
        match update {
            AppUpdate::FullState(state) => self.render(&state),
        }
    }
}

fn parse_local_id(arg: Option<&str>) -> Option<u64> {
    arg.and_then(|s| s.trim().parse().ok())
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_chat(
    state_dir: &Path,
    user: &str,
    token: &str,
    chat: &str,
    partner: &str,
) -> anyhow::Result<()> {
    // The core logs to stderr; keep the interactive view quiet unless asked.
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let data_dir = state_dir
        .to_str()
        .context("state dir is not valid UTF-8")?
        .to_string();
    let app = FfiApp::new(data_dir);
    app.listen_for_updates(Box::new(Printer::default()));

    app.dispatch(AppAction::StartSession {
        user_id: user.to_string(),
        token: token.to_string(),
    });
    app.dispatch(AppAction::OpenChat {
        chat_id: chat.to_string(),
        partner_id: partner.to_string(),
    });
    eprintln!("-- chatting in {chat} with {partner}; /retry <id>, /discard <id>, /read, /quit");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let mut parts = line.trim().splitn(2, ' ');
        match parts.next() {
            Some("/quit") => break,
            Some("/read") => app.dispatch(AppAction::MarkChatRead {
                chat_id: chat.to_string(),
            }),
            Some(cmd @ ("/retry" | "/discard")) => {
                let Some(local_id) = parse_local_id(parts.next()) else {
                    eprintln!("!! usage: {cmd} <id>");
                    continue;
                };
                let chat_id = chat.to_string();
                app.dispatch(if cmd == "/retry" {
                    AppAction::RetryMessage { chat_id, local_id }
                } else {
                    AppAction::DiscardMessage { chat_id, local_id }
                });
            }
            Some(cmd) if cmd.starts_with('/') => eprintln!("!! unknown command {cmd}"),
            _ => {
                app.dispatch(AppAction::UpdateDraft {
                    chat_id: chat.to_string(),
                    text: line.clone(),
                });
                app.dispatch(AppAction::SendMessage {
                    chat_id: chat.to_string(),
                    content: line.clone(),
                });
            }
        }
        app.dispatch(AppAction::ClearToast);
    }

    app.dispatch(AppAction::EndSession);
    // Give the actor a moment to close the live connection.
    std::thread::sleep(std::time::Duration::from_millis(200));
    Ok(())
}
