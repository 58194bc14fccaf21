use crate::config::Overrides;
use clap::Parser;
use std::path::PathBuf;

/// Talk to a parley session from the terminal.
#[derive(Parser, Debug, Default)]
#[command(name = "parley", version, about)]
pub struct Cli {
    /// Endpoint of the sending leg. Overrides PARLEY_SEND_URL.
    #[arg(long, value_name = "URL")]
    pub send_url: Option<String>,

    /// Endpoint of the receiving leg. Overrides PARLEY_RECV_URL.
    #[arg(long, value_name = "URL")]
    pub recv_url: Option<String>,

    /// System prompt sent with the session settings.
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Append every received audio chunk, decoded, to this file.
    #[arg(long, value_name = "FILE")]
    pub audio_out: Option<PathBuf>,

    /// Stream this raw linear16 PCM file to the session.
    #[arg(long, value_name = "FILE")]
    pub audio_in: Option<PathBuf>,

    /// Sample rate of the --audio-in file.
    #[arg(long, default_value_t = 16000)]
    pub sample_rate: u32,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            send_url: self.send_url.clone(),
            recv_url: self.recv_url.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}
