//! Audio file capture and playback into a session.

use anyhow::Context;
use parley_core::SessionControl;
use parley_types::{AudioOutput, AudioSettings};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

/// linear16 is two bytes per sample.
const BYTES_PER_SAMPLE: u64 = 2;
/// Length of audio carried by one outgoing frame.
const FRAME_DURATION: Duration = Duration::from_millis(100);

/// Appends decoded `audio_output` payloads to a file.
pub struct AudioRecorder {
    path: PathBuf,
    file: tokio::fs::File,
    bytes_written: u64,
}

impl AudioRecorder {
    pub async fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    /// Decodes and appends one chunk. Returns the number of bytes written.
    pub async fn write(&mut self, audio: &AudioOutput) -> anyhow::Result<usize> {
        let bytes = audio
            .decode_audio()
            .with_context(|| format!("audio_output {} is not valid base64", audio.id))?;
        self.file
            .write_all(&bytes)
            .await
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.file.flush().await?;
        self.bytes_written += bytes.len() as u64;
        debug!(id = %audio.id, bytes = bytes.len(), total = self.bytes_written, "Recorded audio chunk.");
        Ok(bytes.len())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Size of one outgoing frame for the given format.
pub fn frame_size(settings: &AudioSettings) -> usize {
    let bytes_per_second =
        settings.sample_rate as u64 * settings.channels.max(1) as u64 * BYTES_PER_SAMPLE;
    let size = bytes_per_second * FRAME_DURATION.as_millis() as u64 / 1000;
    // Keep whole samples across all channels.
    let align = settings.channels.max(1) as u64 * BYTES_PER_SAMPLE;
    (size - size % align).max(align) as usize
}

/// Sends a raw PCM file as binary frames, paced at real time.
/// Returns the number of frames sent.
pub async fn stream_pcm_file(
    control: &SessionControl,
    path: &Path,
    settings: &AudioSettings,
) -> anyhow::Result<usize> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut ticker = tokio::time::interval(FRAME_DURATION);
    let mut frames = 0;
    for chunk in data.chunks(frame_size(settings)) {
        ticker.tick().await;
        control.send_audio(chunk.to_vec())?;
        frames += 1;
    }
    debug!(frames, bytes = data.len(), "Finished streaming audio file.");
    Ok(frames)
}
