use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{ChannelConnector, ChannelEvent, ConnectionGuard, EventChannel};
use crate::context::SessionContext;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live channel over a websocket carrying `{"event", "data"}` JSON text frames.
/// Reconnects after `reconnect_delay` whenever the connection drops, until the
/// guard is closed.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    reconnect_delay: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
        }
    }
}

impl ChannelConnector for WebSocketConnector {
    fn connect(
        &self,
        channel: &EventChannel,
        session: &SessionContext,
        runtime: &tokio::runtime::Handle,
    ) -> ConnectionGuard {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(run(
            channel.clone(),
            self.url.clone(),
            session.token.clone(),
            self.reconnect_delay,
            shutdown_rx,
        ));
        ConnectionGuard::new(shutdown_tx)
    }
}

async fn run(
    channel: EventChannel,
    url: String,
    token: String,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        match open(&url, &token).await {
            Ok(socket) => {
                tracing::info!(%url, "live channel connected");
                let outbound = channel.attach();
                channel.deliver(&ChannelEvent::Connected);
                let stopped = pump(&channel, socket, outbound, &mut shutdown).await;
                channel.detach();
                channel.deliver(&ChannelEvent::Disconnected);
                tracing::info!(%url, stopped, "live channel disconnected");
                if stopped {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%url, err = %e, "live channel connect failed");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn open(url: &str, token: &str) -> Result<Socket, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}

/// Shuttle frames until the connection ends. Returns true when it ended
/// because of shutdown.
async fn pump(
    channel: &EventChannel,
    socket: Socket,
    outbound: flume::Receiver<ChannelEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                }
            }
            out = outbound.recv_async() => {
                let Ok(event) = out else {
                    return false;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(event = event.name().as_str(), err = %e, "live event not sendable");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(err = %e, "live channel write failed");
                    return false;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ChannelEvent>(text.as_str()) {
                            Ok(event) => channel.deliver(&event),
                            Err(e) => tracing::debug!(err = %e, "ignoring unknown live frame"),
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(err = %e, "live channel read failed");
                        return false;
                    }
                }
            }
        }
    }
}
