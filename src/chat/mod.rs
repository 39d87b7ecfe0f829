//! Inquiry chat over the realtime client.
//!
//! [`ChatClient`] owns a [`RealtimeClient<ChatEnvelope>`] and the identity of
//! the local user. Every outgoing envelope gets its `senderId` from the chat
//! client and its `timestamp` from the send path, so callers only pick the
//! kind, the conversation and the payload. The inner client is never handed
//! out.
//!
//! ```ignore
//! let (chat, mut events) = ChatClient::builder(url, "buyer-42").build();
//! chat.connect();
//! while let Some(ClientEvent::Message(env)) = events.recv().await {
//!     if env.is_for("conv-1") {
//!         handle(ChatEvent::from_envelope(env));
//!     }
//! }
//! ```

pub mod message;
pub mod typing;

use serde::Serialize;
use tokio::sync::watch;

use crate::client::{ClientBuilder, ClientEvents, ConnectionStatus, RealtimeClient};
use crate::reconnect::ReconnectPolicy;
use crate::ws::Connector;

pub use message::{
    Attachment, ChatEnvelope, ChatEvent, ChatKind, ErrorData, MessageData, PresenceData,
    PresenceStatus, ReadReceiptData, TypingData,
};
pub use typing::TypingIndicator;

/// Builder for [`ChatClient`].
#[derive(Debug)]
pub struct ChatClientBuilder {
    inner: ClientBuilder,
    sender_id: String,
}

impl ChatClientBuilder {
    /// Reconnect strategy.
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.inner = self.inner.policy(policy);
        self
    }

    /// Socket factory.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.inner = self.inner.connector(connector);
        self
    }

    /// Build the chat client and its event receiver.
    pub fn build(self) -> (ChatClient, ClientEvents<ChatEnvelope>) {
        let (client, events) = self.inner.build::<ChatEnvelope>();
        (
            ChatClient {
                client,
                sender_id: self.sender_id,
            },
            events,
        )
    }
}

/// Chat client for one signed-in user.
#[derive(Debug)]
pub struct ChatClient {
    client: RealtimeClient<ChatEnvelope>,
    sender_id: String,
}

impl ChatClient {
    /// Start building a chat client for `sender_id` on socket `url`.
    pub fn builder(url: impl Into<String>, sender_id: impl Into<String>) -> ChatClientBuilder {
        ChatClientBuilder {
            inner: ClientBuilder::new(url),
            sender_id: sender_id.into(),
        }
    }

    /// See [`RealtimeClient::connect`].
    pub fn connect(&self) {
        self.client.connect();
    }

    /// See [`RealtimeClient::disconnect`].
    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.client.status()
    }

    /// The local user id stamped on outgoing envelopes.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Subscribe to status transitions.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.client.watch_status()
    }

    /// Whether [`Self::disconnect`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.client.is_stopped()
    }

    /// Send an envelope of `kind` with `data`. Returns `false` if the socket
    /// is not open or `data` does not serialize.
    pub fn send(&self, kind: ChatKind, conversation_id: &str, data: impl Serialize) -> bool {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("[Chat] Failed to encode '{}' payload: {}", kind, e);
                return false;
            }
        };
        self.client.send(ChatEnvelope::outgoing(
            kind,
            &self.sender_id,
            conversation_id,
            data,
        ))
    }

    /// Send a text message. Returns the generated message id if it went out.
    pub fn send_message(&self, conversation_id: &str, content: &str) -> Option<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let data = MessageData {
            id: Some(id.clone()),
            content: content.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            ..MessageData::default()
        };
        self.send(ChatKind::Message, conversation_id, data)
            .then_some(id)
    }

    /// Tell the other side whether the local user is typing.
    pub fn send_typing_indicator(&self, conversation_id: &str, is_typing: bool) -> bool {
        self.send(ChatKind::Typing, conversation_id, TypingData { is_typing })
    }

    /// Acknowledge that `message_id` was read.
    pub fn send_read_receipt(&self, conversation_id: &str, message_id: &str) -> bool {
        let data = ReadReceiptData {
            message_id: message_id.to_string(),
        };
        self.send(ChatKind::ReadReceipt, conversation_id, data)
    }

    /// Announce the local user's presence. Not tied to a conversation.
    pub fn send_presence(&self, status: PresenceStatus) -> bool {
        self.send(ChatKind::Presence, "", PresenceData { status })
    }
}
