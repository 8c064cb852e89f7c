//! Yandex SpeechKit speech backends. Both endpoints work in raw linear PCM at
//! the telephony rate, so synthesis output gets wrapped into a WAV container
//! for transcoding, and recordings get stripped down to a bare sample body
//! before upload.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::audio;
use crate::speech::{Synthesizer, Transcriber};

const TTS_URL: &str = "https://tts.api.cloud.yandex.net/speech/v1/tts:synthesize";
const STT_URL: &str = "https://stt.api.cloud.yandex.net/speech/v1/stt:recognize";
const LANG: &str = "ru-RU";
const VOICE: &str = "alena";

#[derive(Debug, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub result: String,
}

pub struct YandexTts {
    client: Client,
    api_key: String,
    folder_id: String,
}

impl YandexTts {
    pub fn new(client: Client, api_key: String, folder_id: String) -> Self {
        Self {
            client,
            api_key,
            folder_id,
        }
    }
}

#[async_trait]
impl Synthesizer for YandexTts {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let rate = audio::TELEPHONY_SAMPLE_RATE.to_string();
        let params = [
            ("text", text),
            ("lang", LANG),
            ("voice", VOICE),
            ("folderId", self.folder_id.as_str()),
            ("format", "lpcm"),
            ("sampleRateHertz", rate.as_str()),
        ];

        let lpcm = self
            .client
            .post(TTS_URL)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        let wav = tempfile::Builder::new()
            .prefix("tts_")
            .suffix(".wav")
            .tempfile_in(parent)
            .context("failed to create synthesis intermediate")?;
        write_wav(wav.path(), &lpcm)?;

        audio::to_telephony_format(wav.path(), output).await?;
        Ok(())
    }
}

pub struct YandexStt {
    client: Client,
    api_key: String,
}

impl YandexStt {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl Transcriber for YandexStt {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let rate = audio::TELEPHONY_SAMPLE_RATE.to_string();
        let parent = audio_path.parent().unwrap_or_else(|| Path::new("."));
        let raw = tempfile::Builder::new()
            .prefix("stt_")
            .suffix(".raw")
            .tempfile_in(parent)
            .context("failed to create recognition intermediate")?;
        audio::to_linear_pcm(audio_path, raw.path(), audio::TELEPHONY_SAMPLE_RATE).await?;

        let body = tokio::fs::read(raw.path()).await?;
        let resp = self
            .client
            .post(STT_URL)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .query(&[
                ("lang", LANG),
                ("format", "lpcm"),
                ("sampleRateHertz", rate.as_str()),
            ])
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json::<RecognizeResponse>()
            .await?;

        Ok(resp.result.trim().to_string())
    }
}

// Wraps headerless little-endian samples into a mono 16-bit WAV at the
// telephony rate so sox can identify the input.
fn write_wav(path: &Path, lpcm: &[u8]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio::TELEPHONY_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for chunk in lpcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}
