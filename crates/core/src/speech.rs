use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Speech recognition over one recorded segment.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Transcriber: Send + Sync {
    /// Recognize the audio at `audio` and return the text. An empty string
    /// means "no speech detected" and is a normal outcome, not an error;
    /// errors are reserved for I/O and transport failure.
    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Speech synthesis into a telephony-playable artifact.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Synthesizer: Send + Sync {
    /// Render `text` as narrowband companded audio at `output`. On failure no
    /// partial file is left behind at `output`; intermediate formats are the
    /// adapter's business.
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()>;
}
