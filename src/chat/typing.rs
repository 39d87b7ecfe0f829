//! Outgoing typing indicator with idle auto-clear.
//!
//! Every keystroke re-arms an idle timer. The first keystroke sends
//! `typing=true`; when the timer runs out without another keystroke the
//! indicator sends `typing=false` on its own. The timer lives in its own task,
//! independent of the client's reconnect timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ChatClient;

/// Default idle time before a typing indicator clears itself.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(3);

#[derive(Debug)]
enum Signal {
    Keystroke,
    Stop,
}

/// Typing indicator for one conversation.
///
/// Dropping it clears an active typing state from the timer task, after the
/// drop returns. Use [`TypingIndicator::finish`] when the client is about to
/// be disconnected.
#[derive(Debug)]
pub struct TypingIndicator {
    tx: mpsc::UnboundedSender<Signal>,
    task: JoinHandle<()>,
}

impl TypingIndicator {
    /// Spawn the indicator's timer task. Requires a tokio runtime.
    pub fn new(chat: Arc<ChatClient>, conversation_id: impl Into<String>, idle: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_typing_timer(chat, conversation_id.into(), idle, rx));
        Self { tx, task }
    }

    /// Clear an active typing state and wait until `typing=false` has been
    /// handed to the socket.
    pub async fn finish(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            log::warn!("[Chat] Typing timer task failed: {}", e);
        }
    }

    /// The local user typed something.
    pub fn keystroke(&self) {
        let _ = self.tx.send(Signal::Keystroke);
    }

    /// The local user stopped typing (sent the message, cleared the input).
    pub fn stop(&self) {
        let _ = self.tx.send(Signal::Stop);
    }

    /// Feed the current input contents: non-empty counts as a keystroke,
    /// empty stops.
    pub fn input_changed(&self, text: &str) {
        if text.is_empty() {
            self.stop();
        } else {
            self.keystroke();
        }
    }
}

async fn run_typing_timer(
    chat: Arc<ChatClient>,
    conversation_id: String,
    idle: Duration,
    mut rx: mpsc::UnboundedReceiver<Signal>,
) {
    let mut typing = false;
    let idle_timer = tokio::time::sleep(idle);
    tokio::pin!(idle_timer);

    loop {
        tokio::select! {
            signal = rx.recv() => match signal {
                Some(Signal::Keystroke) => {
                    if !typing {
                        // Stays false if the socket is down; the next keystroke retries.
                        typing = chat.send_typing_indicator(&conversation_id, true);
                    }
                    idle_timer.as_mut().reset(Instant::now() + idle);
                }
                Some(Signal::Stop) => {
                    if typing {
                        chat.send_typing_indicator(&conversation_id, false);
                        typing = false;
                    }
                }
                None => {
                    if typing {
                        chat.send_typing_indicator(&conversation_id, false);
                    }
                    break;
                }
            },

            () = &mut idle_timer, if typing => {
                log::trace!("[Chat] Typing idle timeout for {}", conversation_id);
                chat.send_typing_indicator(&conversation_id, false);
                typing = false;
            }
        }
    }
}
