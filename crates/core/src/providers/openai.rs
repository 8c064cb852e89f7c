//! OpenAI-backed capabilities: chat completions for replies, `tts-1` for
//! synthesis and `whisper-1` for recognition. All three share the `AI_API_KEY`
//! credential.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::chat::ChatAgent;
use crate::speech::{Synthesizer, Transcriber};
use crate::{TurnRecord, audio};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

const TTS_MODEL: &str = "tts-1";
const TTS_VOICE: &str = "alloy";
const STT_MODEL: &str = "whisper-1";
// Recognition language hint. The call flow is Russian end to end, matching
// the fixed `ru-RU` used by the other speech backends.
const STT_LANGUAGE: &str = "ru";

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl OpenAiChat {
    pub fn new(client: Client, api_key: String, model: String, system_prompt: String) -> Self {
        Self {
            client,
            api_key,
            model,
            system_prompt,
        }
    }

    fn request_body(&self, utterance: &str, history: &[TurnRecord]) -> serde_json::Value {
        let mut messages =
            vec![serde_json::json!({ "role": "system", "content": self.system_prompt })];
        messages.extend(
            history
                .iter()
                .map(|turn| serde_json::json!({ "role": turn.role, "content": turn.text })),
        );
        messages.push(serde_json::json!({ "role": "user", "content": utterance }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 1024,
        })
    }
}

#[async_trait]
impl ChatAgent for OpenAiChat {
    async fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Result<String> {
        let resp = self
            .client
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(utterance, history))
            .send()
            .await?
            .error_for_status()?
            .json::<ChatCompletion>()
            .await?;

        let reply = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No choices in model response"))?
            .message
            .content;
        Ok(reply.trim().to_string())
    }
}

/// Synthesis via the speech endpoint. The API returns mp3, which gets
/// transcoded down to the companded telephony format before the adapter
/// reports success.
pub struct OpenAiTts {
    client: Client,
    api_key: String,
}

impl OpenAiTts {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl Synthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let audio_bytes = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": TTS_MODEL,
                "voice": TTS_VOICE,
                "input": text,
            }))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // The mp3 intermediate lives next to the output and disappears with
        // this handle, success or not.
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        let mp3 = tempfile::Builder::new()
            .prefix("tts_")
            .suffix(".mp3")
            .tempfile_in(parent)
            .context("failed to create mp3 intermediate")?;
        tokio::fs::write(mp3.path(), &audio_bytes).await?;

        audio::to_telephony_format(mp3.path(), output).await?;
        Ok(())
    }
}

/// Recognition via hosted whisper. Recordings come in as 8 kHz telephony WAV
/// and are upsampled to the recognition format before upload.
pub struct WhisperStt {
    client: Client,
    api_key: String,
}

impl WhisperStt {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl Transcriber for WhisperStt {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let parent = audio_path.parent().unwrap_or_else(|| Path::new("."));
        let wav = tempfile::Builder::new()
            .prefix("stt_")
            .suffix(".wav")
            .tempfile_in(parent)
            .context("failed to create recognition intermediate")?;
        audio::to_recognition_format(audio_path, wav.path()).await?;

        let wav_bytes = tokio::fs::read(wav.path()).await?;
        let form = Form::new()
            .text("model", STT_MODEL)
            .text("language", STT_LANGUAGE)
            .part(
                "file",
                Part::bytes(wav_bytes)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            );

        let resp = self
            .client
            .post(TRANSCRIPTION_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<Transcription>()
            .await?;

        Ok(resp.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_leads_with_the_system_prompt() {
        let chat = OpenAiChat::new(
            Client::new(),
            "key".to_string(),
            "gpt-4o".to_string(),
            "Вы ассистент.".to_string(),
        );
        let history = vec![TurnRecord::user("алло")];

        let body = chat.request_body("вы меня слышите?", &history);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Вы ассистент.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["content"], "вы меня слышите?");
    }

    #[test]
    fn parses_a_chat_completion() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Слышу вас хорошо."}, "finish_reason": "stop"}
            ]
        }"#;
        let parsed: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Слышу вас хорошо.");
    }

    #[test]
    fn parses_a_transcription_without_text() {
        // Whisper can return an empty object for pure silence.
        let parsed: Transcription = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text, "");
    }
}
