//! End-to-end against a real WebSocket server on localhost.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use phithiai_realtime::{ClientBuilder, ClientEvent, ClientEvents, Envelope, ReconnectPolicy};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(10);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    (listener, format!("ws://{addr}/ws?token=test-token"))
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("timed out waiting for the client")
        .expect("accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket handshake")
}

async fn next_event(events: &mut ClientEvents<Envelope>) -> ClientEvent<Envelope> {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a client event")
        .expect("client event stream ended")
}

async fn next_text(socket: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("client hung up")
            .expect("read frame");
        if frame.is_text() {
            return frame.to_text().expect("text frame").to_string();
        }
    }
}

#[tokio::test]
async fn test_round_trip_with_real_server() {
    let (listener, url) = listen().await;
    let (client, mut events) = ClientBuilder::new(url).build::<Envelope>();
    client.connect();

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, ClientEvent::Open);

    server
        .send(Message::text("plain text, not an envelope"))
        .await
        .expect("server send");
    match next_event(&mut events).await {
        ClientEvent::Message(envelope) => {
            assert!(envelope.is_raw());
            assert_eq!(envelope.payload, Some(json!("plain text, not an envelope")));
        }
        other => panic!("expected a raw message, got {other:?}"),
    }

    assert!(client.send(Envelope::new("chat", json!({"text": "hi"}))));
    let received: serde_json::Value =
        serde_json::from_str(&next_text(&mut server).await).expect("client sent JSON");
    assert_eq!(received["type"], "chat");
    assert_eq!(received["payload"]["text"], "hi");
    assert!(received["ts"].is_string());

    client.disconnect();
    let closing = tokio::time::timeout(WAIT, server.next())
        .await
        .expect("timed out waiting for close");
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None));
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (listener, url) = listen().await;
    let (client, mut events) = ClientBuilder::new(url)
        .policy(ReconnectPolicy::fixed(Duration::from_millis(50)))
        .build::<Envelope>();
    client.connect();

    let mut first = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, ClientEvent::Open);

    first.close(None).await.expect("server close");
    match next_event(&mut events).await {
        ClientEvent::Closed { code, .. } => assert_eq!(code, Some(1005)),
        other => panic!("expected close, got {other:?}"),
    }

    let mut second = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, ClientEvent::Open);

    assert!(client.send(Envelope::bare("presence")));
    let received: serde_json::Value =
        serde_json::from_str(&next_text(&mut second).await).expect("client sent JSON");
    assert_eq!(received["type"], "presence");

    client.disconnect();
}
