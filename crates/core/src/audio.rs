//! Audio format conversion via the `sox` command-line utility.
//!
//! The telephony side only plays and records narrowband companded audio,
//! while the speech providers want wideband linear PCM, so every artifact
//! crosses through here on its way in or out of the call.

use std::path::Path;
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Sample rate of the channel itself: 8 kHz mono µ-law.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;
/// Sample rate speech recognition models expect.
pub const RECOGNITION_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch sox: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sox exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Convert `src` into playback format at `dst`: 8 kHz, mono, µ-law. The
/// destination should carry a `.ul` extension so both sox and the telephony
/// host recognize the encoding.
pub async fn to_telephony_format(src: &Path, dst: &Path) -> Result<(), TranscodeError> {
    debug!("transcoding {} -> {} (telephony)", src.display(), dst.display());
    let mut cmd = Command::new("sox");
    cmd.arg(src)
        .arg("-r")
        .arg(TELEPHONY_SAMPLE_RATE.to_string())
        .args(["-c", "1", "-e", "mu-law"])
        .arg(dst);
    run(cmd, dst).await
}

/// Convert `src` into recognition format at `dst`: 16 kHz, mono, 16-bit
/// signed PCM in a WAV container.
pub async fn to_recognition_format(src: &Path, dst: &Path) -> Result<(), TranscodeError> {
    debug!(
        "transcoding {} -> {} (recognition)",
        src.display(),
        dst.display()
    );
    let mut cmd = Command::new("sox");
    cmd.arg(src)
        .arg("-r")
        .arg(RECOGNITION_SAMPLE_RATE.to_string())
        .args(["-c", "1", "-e", "signed-integer", "-b", "16"])
        .arg(dst);
    run(cmd, dst).await
}

/// Convert `src` into headerless linear PCM at `dst`, for providers that take
/// raw sample bodies instead of containers.
pub(crate) async fn to_linear_pcm(
    src: &Path,
    dst: &Path,
    sample_rate: u32,
) -> Result<(), TranscodeError> {
    debug!(
        "transcoding {} -> {} (raw lpcm {sample_rate} Hz)",
        src.display(),
        dst.display()
    );
    let mut cmd = Command::new("sox");
    cmd.arg(src)
        .args(["-t", "raw"])
        .arg("-r")
        .arg(sample_rate.to_string())
        .args(["-c", "1", "-e", "signed-integer", "-b", "16"])
        .arg(dst);
    run(cmd, dst).await
}

// Runs the prepared command and maps a non-zero exit into `Failed`. A failed
// conversion must not leave a partial file behind at `dst`.
async fn run(mut cmd: Command, dst: &Path) -> Result<(), TranscodeError> {
    let output = cmd.output().await?;
    if !output.status.success() {
        let _ = tokio::fs::remove_file(dst).await;
        return Err(TranscodeError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
