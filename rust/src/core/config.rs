use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppCore;

pub(crate) const CONFIG_FILE_NAME: &str = "chat_config.json";

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_TYPING_TIMEOUT_MS: u64 = 1_500;
const DEFAULT_ECHO_WINDOW_MS: u64 = 10_000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) server_url: Option<String>,
    pub(crate) channel_url: Option<String>,
    pub(crate) disable_network: Option<bool>,
    pub(crate) typing_timeout_ms: Option<u64>,
    pub(crate) echo_window_ms: Option<u64>,
    pub(crate) reconnect_delay_ms: Option<u64>,
    pub(crate) http_timeout_ms: Option<u64>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "invalid config; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        server_url: Some(DEFAULT_SERVER_URL.to_string()),
        channel_url: Some(derive_channel_url(DEFAULT_SERVER_URL)),
        disable_network: Some(false),
        typing_timeout_ms: Some(DEFAULT_TYPING_TIMEOUT_MS),
        echo_window_ms: Some(DEFAULT_ECHO_WINDOW_MS),
        reconnect_delay_ms: Some(DEFAULT_RECONNECT_DELAY_MS),
        http_timeout_ms: Some(DEFAULT_HTTP_TIMEOUT_MS),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

/// `http(s)://host[:port]/...` -> `ws(s)://host[:port]/live`.
fn derive_channel_url(server_url: &str) -> String {
    let Ok(mut url) = url::Url::parse(server_url) else {
        return server_url.to_string();
    };
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    if url.set_scheme(scheme).is_err() {
        return server_url.to_string();
    }
    url.set_path("/live");
    url.set_query(None);
    url.to_string()
}

impl AppConfig {
    pub(crate) fn server_url(&self) -> String {
        self.server_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVER_URL)
            .to_string()
    }

    pub(crate) fn channel_url(&self) -> String {
        match self
            .channel_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(url) => url.to_string(),
            None => derive_channel_url(&self.server_url()),
        }
    }

    pub(crate) fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms.unwrap_or(DEFAULT_TYPING_TIMEOUT_MS))
    }

    pub(crate) fn echo_window_ms(&self) -> i64 {
        self.echo_window_ms.unwrap_or(DEFAULT_ECHO_WINDOW_MS) as i64
    }

    pub(crate) fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS))
    }

    pub(crate) fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS))
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("CHAT_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.server_url(), DEFAULT_SERVER_URL);
        assert_eq!(cfg.typing_timeout(), Duration::from_millis(1_500));
        assert_eq!(cfg.echo_window_ms(), 10_000);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"{not json").unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert!(cfg.server_url.is_none());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            br#"{"server_url":"https://chat.example.com","typing_timeout_ms":200}"#,
        )
        .unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.server_url(), "https://chat.example.com");
        assert_eq!(cfg.channel_url(), "wss://chat.example.com/live");
        assert_eq!(cfg.typing_timeout(), Duration::from_millis(200));
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(2_000));
    }

    #[test]
    fn channel_url_keeps_port_and_plain_scheme() {
        assert_eq!(
            derive_channel_url("http://127.0.0.1:3000/api"),
            "ws://127.0.0.1:3000/live"
        );
    }

    #[test]
    fn default_json_round_trips() {
        let cfg: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(cfg.disable_network, Some(false));
        assert_eq!(cfg.channel_url(), "ws://localhost:3000/live");
    }
}
