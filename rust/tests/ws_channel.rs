use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_core::{
    ChannelConnector, ChannelEvent, EventChannel, EventName, LiveMessage, SessionContext,
    WebSocketConnector,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Received = tokio::sync::mpsc::UnboundedReceiver<ChannelEvent>;

/// Accept one client, recording its `Authorization` header.
async fn accept(
    listener: &TcpListener,
    auth: Arc<Mutex<Option<String>>>,
) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *auth.lock().unwrap() = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        Ok(resp)
    };
    tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap()
}

fn recorder(channel: &EventChannel, name: EventName) -> Received {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    channel.on(name, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

async fn next<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out")
        .expect("closed")
}

async fn next_text(socket: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("timed out")
            .expect("closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_flow_both_ways_with_bearer_auth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/live", listener.local_addr().unwrap());
    let auth = Arc::new(Mutex::new(None));

    let channel = EventChannel::new();
    let mut connected = recorder(&channel, EventName::Connect);
    let mut received = recorder(&channel, EventName::ReceiveMessage);

    let connector = WebSocketConnector::new(url, Duration::from_millis(50));
    let _guard = connector.connect(
        &channel,
        &SessionContext::new("u1", "jwt-1"),
        &tokio::runtime::Handle::current(),
    );

    let mut server = accept(&listener, auth.clone()).await;
    assert_eq!(next(&mut connected).await, ChannelEvent::Connected);
    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer jwt-1"));
    assert!(channel.is_connected());

    server
        .send(Message::Text(
            r#"{"event":"receiveMessage","data":{"senderId":"u2","receiverId":"u1","conversationId":"c1","text":"hi","messageId":"m1"}}"#
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    // Unknown frames are skipped without dropping the connection.
    server
        .send(Message::Text(r#"{"event":"presence","data":{}}"#.to_string().into()))
        .await
        .unwrap();
    match next(&mut received).await {
        ChannelEvent::ReceiveMessage(m) => {
            assert_eq!(m.text, "hi");
            assert_eq!(m.message_id.as_deref(), Some("m1"));
        }
        other => panic!("unexpected {other:?}"),
    }

    channel
        .emit(ChannelEvent::SendMessage(LiveMessage {
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            conversation_id: "c1".into(),
            text: "hello".into(),
            message_id: Some("m2".into()),
        }))
        .unwrap();
    let text = next_text(&mut server).await;
    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["event"], "sendMessage");
    assert_eq!(frame["data"]["conversationId"], "c1");
    assert_eq!(frame["data"]["messageId"], "m2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_after_server_drop_and_stops_on_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/live", listener.local_addr().unwrap());
    let auth = Arc::new(Mutex::new(None));

    let channel = EventChannel::new();
    let mut connected = recorder(&channel, EventName::Connect);
    let mut disconnected = recorder(&channel, EventName::Disconnect);

    let connector = WebSocketConnector::new(url, Duration::from_millis(50));
    let mut guard = connector.connect(
        &channel,
        &SessionContext::new("u1", "jwt-1"),
        &tokio::runtime::Handle::current(),
    );

    let server = accept(&listener, auth.clone()).await;
    next(&mut connected).await;
    drop(server);
    assert_eq!(next(&mut disconnected).await, ChannelEvent::Disconnected);
    assert!(!channel.is_connected());

    let mut server = accept(&listener, auth.clone()).await;
    next(&mut connected).await;
    assert!(channel.is_connected());

    guard.close();
    let closing = tokio::time::timeout(Duration::from_secs(3), server.next())
        .await
        .expect("timed out");
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None));
    next(&mut disconnected).await;
    assert!(!channel.is_connected());

    // No further reconnect attempts after close.
    let again = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(again.is_err());
}
