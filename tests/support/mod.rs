//! In-memory socket for driving the realtime client in tests.
//!
//! Each successful `connect` hands the test a [`MockPeer`]: the server side
//! of that one connection. The peer sees every frame the client writes and
//! can push frames, close frames, or errors back.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use phithiai_realtime::ws::{Connector, FramePair, FrameSink, FrameSource, WsMessage};
use phithiai_realtime::{ClientEvent, ClientEvents};
use tokio::sync::mpsc;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(60);

/// A frame written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// Text frame.
    Text(String),
    /// Pong answer.
    Pong(Vec<u8>),
    /// Client closed the socket.
    Close,
}

/// Server side of one mock connection.
#[derive(Debug)]
pub struct MockPeer {
    sent: mpsc::UnboundedReceiver<Sent>,
    push: Option<mpsc::UnboundedSender<Result<WsMessage>>>,
}

impl MockPeer {
    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: &str) {
        self.push(Ok(WsMessage::Text(text.to_string())));
    }

    /// Deliver any frame to the client.
    pub fn push_frame(&self, frame: WsMessage) {
        self.push(Ok(frame));
    }

    /// Deliver a close frame with `code`.
    pub fn close(&self, code: u16) {
        self.push(Ok(WsMessage::Close {
            code,
            reason: String::new(),
        }));
    }

    /// Fail the read side with an I/O-style error.
    pub fn fail(&self, reason: &str) {
        self.push(Err(anyhow!(reason.to_string())));
    }

    /// End the client's read stream without a close frame.
    pub fn hang_up(&mut self) {
        self.push = None;
    }

    fn push(&self, frame: Result<WsMessage>) {
        if let Some(tx) = &self.push {
            let _ = tx.send(frame);
        }
    }

    /// Next frame the client wrote.
    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a frame from the client")
            .expect("client side of the mock socket is gone")
    }

    /// Next frame the client wrote, which must be text.
    pub async fn next_text(&mut self) -> String {
        match self.next_sent().await {
            Sent::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Next frame decoded as JSON.
    pub async fn next_json(&mut self) -> serde_json::Value {
        let text = self.next_text().await;
        serde_json::from_str(&text).expect("client sent valid JSON")
    }

    /// A frame the client already wrote, if any.
    pub fn try_sent(&mut self) -> Option<Sent> {
        self.sent.try_recv().ok()
    }
}

/// Connector producing [`MockPeer`]s.
#[derive(Debug, Clone)]
pub struct MockConnector {
    attempts: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Connector plus the stream of peers it creates.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                refuse: Arc::new(AtomicBool::new(false)),
                peers,
            },
            peers_rx,
        )
    }

    /// Number of connect calls so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<FramePair> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            bail!("connection refused");
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(MockPeer {
            sent: sent_rx,
            push: Some(push_tx),
        });

        Ok((
            Box::new(MockSink { tx: sent_tx }),
            Box::new(MockSource { rx: push_rx }),
        ))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<Sent>,
}

impl MockSink {
    fn record(&self, frame: Sent) -> Result<()> {
        self.tx.send(frame).map_err(|_| anyhow!("peer dropped"))
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.record(Sent::Text(text.to_string()))
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.record(Sent::Pong(data))
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Sent::Close)
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<Result<WsMessage>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.rx.recv().await
    }
}

/// Next peer created by the connector.
pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<MockPeer>) -> MockPeer {
    tokio::time::timeout(WAIT, peers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

/// Next client event.
pub async fn next_event<M>(events: &mut ClientEvents<M>) -> ClientEvent<M> {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a client event")
        .expect("client event stream ended")
}

/// Skip events until the socket opens.
pub async fn wait_open<M: std::fmt::Debug>(events: &mut ClientEvents<M>) {
    loop {
        match next_event(events).await {
            ClientEvent::Open => return,
            ClientEvent::GaveUp { attempts } => panic!("gave up after {attempts} attempts"),
            _ => {}
        }
    }
}

/// Skip events until the next incoming message.
pub async fn next_message<M: std::fmt::Debug>(events: &mut ClientEvents<M>) -> M {
    loop {
        if let ClientEvent::Message(message) = next_event(events).await {
            return message;
        }
    }
}
