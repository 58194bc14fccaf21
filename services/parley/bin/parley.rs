//! Main entrypoint for the parley terminal client.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Opening the session and sending its settings.
//! 3. Relaying stdin lines to the session and printing what comes back.
//! 4. Closing the session on /quit, end of input or Ctrl+C.

use anyhow::Context;
use clap::Parser;
use parley_core::{EventStream, Session, SessionEvent, WsConnector};
use parley_service::{
    audio::{AudioRecorder, stream_pcm_file},
    cli::Cli,
    config::Config,
    console::{self, Flow},
    tools::DemoTools,
};
use parley_types::{AudioSettings, ServerEvent, SessionSettings};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Resolves on `Ctrl+C`. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Closing session...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let config = Config::load(&cli.overrides()).context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded. Connecting...");

    // --- 3. Open the Session ---
    let session = Session::new(config.session_config());
    let (events, mut inbound) = EventStream::channel();
    session.set_handler(events);
    session.set_tool_handler(Arc::new(DemoTools));

    session
        .connect(&WsConnector)
        .await
        .context("Failed to open session")?;
    info!(session_id = %session.id(), "Session open.");

    let audio_settings = AudioSettings {
        sample_rate: cli.sample_rate,
        ..AudioSettings::default()
    };
    let settings = SessionSettings {
        system_prompt: config.system_prompt.clone(),
        audio: cli.audio_in.is_some().then(|| audio_settings.clone()),
        tools: DemoTools::definitions(),
        ..Default::default()
    };
    session
        .control()
        .send_session_settings(settings)
        .context("Failed to send session settings")?;

    let mut recorder = match &cli.audio_out {
        Some(path) => Some(AudioRecorder::create(path).await?),
        None => None,
    };

    if let Some(path) = cli.audio_in.clone() {
        let control = session.control().clone();
        tokio::spawn(async move {
            match stream_pcm_file(&control, &path, &audio_settings).await {
                Ok(frames) => info!(frames, "Finished streaming audio input."),
                Err(e) => warn!(error = %e, "Audio input stopped."),
            }
        });
    }

    // --- 4. Relay ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut interrupted = false;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => match console::execute(session.control(), console::parse_command(&line)) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => session.close(),
                        Err(e) => warn!(error = %e, "Command failed."),
                    },
                    None => {
                        stdin_open = false;
                        session.close();
                    }
                }
            }
            event = inbound.recv() => match event {
                Some(SessionEvent::Message(message)) => {
                    println!("{}", console::describe(&message));
                    if let (Some(recorder), ServerEvent::AudioOutput(audio)) =
                        (recorder.as_mut(), &message.event)
                    {
                        if let Err(e) = recorder.write(audio).await {
                            warn!(error = %e, "Failed to record audio.");
                        }
                    }
                }
                Some(SessionEvent::Error(e)) => warn!(error = %e, "Session error."),
                Some(SessionEvent::Open) => {}
                Some(SessionEvent::Close(close)) => {
                    info!(code = close.code, reason = %close.reason, "Session closed.");
                    break;
                }
                None => break,
            },
            _ = &mut shutdown, if !interrupted => {
                interrupted = true;
                session.close();
            }
        }
    }

    if let Some(recorder) = &recorder {
        info!(bytes = recorder.bytes_written(), "Audio capture saved.");
    }
    Ok(())
}
