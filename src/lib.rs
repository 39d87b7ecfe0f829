//! Phithiai realtime - reconnecting messaging client.
//!
//! This crate provides the real-time side of the Phithiai marketplace:
//! a socket client that survives dropped connections, the JSON envelopes it
//! carries, and the inquiry-chat helpers built on top.
//!
//! # Architecture
//!
//! - **Transport** - `tokio-tungstenite` behind the [`ws::Connector`] seam
//! - **Client** - [`RealtimeClient`], connect / send / disconnect with a
//!   background reconnect loop driven by a [`ReconnectPolicy`]
//! - **Envelopes** - [`Envelope`] (`{type, payload, ts}`) and
//!   [`chat::ChatEnvelope`] (`{type, data, timestamp, senderId, conversationId}`)
//! - **Chat** - [`chat::ChatClient`] and [`chat::TypingIndicator`]
//!
//! # Modules
//!
//! - [`client`] - Reconnecting client and its events
//! - [`chat`] - Chat envelope, typed events, typing indicator
//! - [`config`] - Configuration loading/saving
//! - [`history`] - Bounded message log

pub mod chat;
pub mod client;
pub mod config;
pub mod envelope;
pub mod history;
pub mod reconnect;
pub mod ws;

pub use chat::{ChatClient, ChatEnvelope, ChatEvent, ChatKind, TypingIndicator};
pub use client::{ClientBuilder, ClientEvent, ClientEvents, ConnectionStatus, RealtimeClient};
pub use config::Config;
pub use envelope::{Envelope, WireMessage};
pub use history::MessageLog;
pub use reconnect::{Backoff, ReconnectPolicy};
