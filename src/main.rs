//! Phithiai realtime CLI.
//!
//! Drives the reconnecting client from a terminal: tail a socket, push a
//! single envelope, or join an inquiry conversation over stdin.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use phithiai_realtime::chat::PresenceStatus;
use phithiai_realtime::{
    ChatClient, ChatEnvelope, ChatEvent, ClientBuilder, ClientEvent, ClientEvents, Config,
    Envelope, MessageLog, TypingIndicator,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long `send` waits for the socket to open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "phithiai", version, about = "Phithiai realtime messaging client")]
struct Cli {
    /// Socket base URL (overrides config and PHITHIAI_WS_URL).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Auth token (overrides PHITHIAI_TOKEN).
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every envelope received, one JSON object per line.
    Listen,
    /// Connect, send one generic envelope, and exit.
    Send {
        /// Envelope type tag.
        #[arg(long = "type")]
        kind: String,
        /// JSON payload.
        #[arg(long)]
        payload: Option<String>,
    },
    /// Join a conversation; stdin lines are sent as messages.
    ///
    /// Commands: `/typing`, `/read <message-id>`, `/online`, `/away`,
    /// `/history`, `/quit`.
    Chat {
        /// Conversation to join.
        #[arg(long)]
        conversation: String,
        /// Local user id.
        #[arg(long)]
        sender: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = cli.url {
        config.ws_url = url;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    match cli.command {
        Command::Listen => listen(&config).await,
        Command::Send { kind, payload } => send_one(&config, kind, payload.as_deref()).await,
        Command::Chat {
            conversation,
            sender,
        } => chat(&config, &conversation, &sender).await,
    }
}

async fn listen(config: &Config) -> Result<()> {
    let (client, mut events) = ClientBuilder::new(config.socket_url())
        .policy(config.reconnect_policy())
        .build::<Envelope>();
    client.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(ClientEvent::Message(envelope)) => {
                    println!("{}", serde_json::to_string(&envelope)?);
                }
                Some(ClientEvent::GaveUp { attempts }) => {
                    bail!("gave up after {attempts} reconnect attempts");
                }
                Some(other) => log::debug!("{:?}", other),
                None => break,
            }
        }
    }

    client.disconnect();
    Ok(())
}

async fn send_one(config: &Config, kind: String, payload: Option<&str>) -> Result<()> {
    let payload = payload
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--payload is not valid JSON")?;
    let envelope = Envelope {
        kind,
        payload,
        ts: None,
    };

    let (client, mut events) = ClientBuilder::new(config.socket_url())
        .policy(config.reconnect_policy())
        .build::<Envelope>();
    client.connect();

    tokio::time::timeout(OPEN_TIMEOUT, wait_for_open(&mut events))
        .await
        .context("timed out waiting for the socket to open")??;

    if !client.send(envelope) {
        bail!("socket closed before the message could be sent");
    }

    client.disconnect();
    while let Some(event) = events.recv().await {
        if matches!(event, ClientEvent::Closed { .. }) {
            break;
        }
    }
    Ok(())
}

async fn wait_for_open<M>(events: &mut ClientEvents<M>) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Open => return Ok(()),
            ClientEvent::GaveUp { attempts } => {
                bail!("gave up after {attempts} reconnect attempts")
            }
            _ => {}
        }
    }
    bail!("client stopped before the socket opened")
}

async fn chat(config: &Config, conversation: &str, sender: &str) -> Result<()> {
    let (chat, mut events) = ChatClient::builder(config.socket_url(), sender)
        .policy(config.reconnect_policy())
        .build();
    let chat = Arc::new(chat);
    chat.connect();

    let typing = TypingIndicator::new(Arc::clone(&chat), conversation, config.typing_idle());
    let mut history: MessageLog<ChatEnvelope> = MessageLog::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line.split_once(' ').unwrap_or((line, "")) {
                    ("", _) => {}
                    ("/quit", _) => break,
                    ("/typing", _) => typing.keystroke(),
                    ("/online", _) => report(chat.send_presence(PresenceStatus::Online)),
                    ("/away", _) => report(chat.send_presence(PresenceStatus::Away)),
                    ("/read", id) if !id.is_empty() => {
                        report(chat.send_read_receipt(conversation, id.trim()));
                    }
                    ("/history", _) => {
                        for envelope in history.iter() {
                            println!("{}", serde_json::to_string(envelope)?);
                        }
                    }
                    _ => {
                        typing.stop();
                        match chat.send_message(conversation, line) {
                            Some(id) => println!("sent {id}"),
                            None => println!("not connected; message dropped"),
                        }
                    }
                }
            }

            event = events.recv() => match event {
                Some(ClientEvent::Message(envelope)) => {
                    if envelope.is_for(conversation) || envelope.conversation_id.is_empty() {
                        history.push(envelope.clone());
                        print_chat_event(ChatEvent::from_envelope(envelope), sender);
                    }
                }
                Some(ClientEvent::Open) => println!("* connected"),
                Some(ClientEvent::Closed { .. }) => println!("* reconnecting..."),
                Some(ClientEvent::GaveUp { attempts }) => {
                    bail!("gave up after {attempts} reconnect attempts");
                }
                Some(ClientEvent::Error(e)) => log::debug!("socket error: {}", e),
                None => break,
            }
        }
    }

    typing.finish().await;
    chat.disconnect();
    Ok(())
}

fn report(sent: bool) {
    if !sent {
        println!("not connected; dropped");
    }
}

fn print_chat_event(event: ChatEvent, me: &str) {
    match event {
        ChatEvent::Message {
            sender_id, data, ..
        } => {
            let who = if sender_id == me {
                "you".to_string()
            } else {
                data.sender_name.unwrap_or(sender_id)
            };
            println!("<{who}> {}", data.content);
        }
        ChatEvent::Typing {
            sender_id,
            is_typing,
            ..
        } if sender_id != me => {
            if is_typing {
                println!("* {sender_id} is typing...");
            }
        }
        ChatEvent::Typing { .. } => {}
        ChatEvent::ReadReceipt {
            sender_id,
            message_id,
            ..
        } => println!("* {sender_id} read {message_id}"),
        ChatEvent::Presence { sender_id, status } => println!("* {sender_id} is {status:?}"),
        ChatEvent::Error(err) => println!("! {}", err.message),
        ChatEvent::Raw(text) => println!("? {text}"),
    }
}
