//! Sends one line of text and prints the conversation until the assistant
//! finishes its turn.
//!
//! ```sh
//! PARLEY_SEND_URL=wss://... PARLEY_RECV_URL=wss://... \
//!     cargo run --example text_chat -- "What's the tallest mountain?"
//! ```

use anyhow::Context;
use parley_core::{EventStream, Session, SessionConfig, SessionEvent, WsConnector};
use parley_types::ServerEvent;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let send_url = std::env::var("PARLEY_SEND_URL").context("PARLEY_SEND_URL is not set")?;
    let recv_url = std::env::var("PARLEY_RECV_URL").context("PARLEY_RECV_URL is not set")?;
    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Hello! Who am I talking to?".to_string());

    let session = Session::new(SessionConfig::new(send_url, recv_url));
    let (events, mut rx) = EventStream::channel();
    session.set_handler(events);
    session.connect(&WsConnector).await?;
    session.control().send_user_input(text)?;

    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Message(message) => match &message.event {
                ServerEvent::AssistantMessage(msg) | ServerEvent::UserMessage(msg) => {
                    println!("{} {}: {}", message.received_at, msg.message.role, msg.content())
                }
                ServerEvent::AssistantEnd(_) => session.close(),
                _ => {}
            },
            SessionEvent::Error(e) => eprintln!("error: {}", e),
            SessionEvent::Close(_) => break,
            SessionEvent::Open => {}
        }
    }
    Ok(())
}
