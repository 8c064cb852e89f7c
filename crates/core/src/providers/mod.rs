//! Vendor adapters behind the capability traits. Selection out of the
//! configuration happens here, once, at startup; nothing else in the crate
//! branches on a vendor name.

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
pub mod yandex;

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use tracing::info;

use crate::chat::ChatAgent;
use crate::config::{ChatProvider, Config, SttProvider, TtsProvider};
use crate::speech::{Synthesizer, Transcriber};

use self::anthropic::AnthropicChat;
use self::google::GeminiChat;
use self::ollama::OllamaChat;
use self::openai::{OpenAiChat, OpenAiTts, WhisperStt};
use self::yandex::{YandexStt, YandexTts};

/// The three capability implementations picked by configuration, ready to be
/// handed to a call session.
pub struct Providers {
    pub agent: Box<dyn ChatAgent>,
    pub transcriber: Box<dyn Transcriber>,
    pub synthesizer: Box<dyn Synthesizer>,
}

/// Builds every configured adapter over one shared HTTP client. Requests are
/// bounded by the configured timeout so a stalled provider cannot hang the
/// call past it.
pub fn from_config(config: &Config) -> Result<Providers> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let agent: Box<dyn ChatAgent> = match config.chat_provider {
        ChatProvider::Anthropic => Box::new(AnthropicChat::new(
            client.clone(),
            api_key(config)?,
            config.model.clone(),
            config.system_prompt.clone(),
        )),
        ChatProvider::OpenAi => Box::new(OpenAiChat::new(
            client.clone(),
            api_key(config)?,
            config.model.clone(),
            config.system_prompt.clone(),
        )),
        ChatProvider::Google => Box::new(GeminiChat::new(
            client.clone(),
            api_key(config)?,
            config.model.clone(),
            config.system_prompt.clone(),
        )),
        ChatProvider::Ollama => Box::new(OllamaChat::new(
            client.clone(),
            config.ollama_url.clone(),
            config.model.clone(),
        )),
    };

    let synthesizer: Box<dyn Synthesizer> = match config.tts_provider {
        TtsProvider::OpenAi => Box::new(OpenAiTts::new(client.clone(), api_key(config)?)),
        TtsProvider::Yandex => Box::new(YandexTts::new(
            client.clone(),
            yandex_key(config)?,
            config
                .yandex_folder_id
                .clone()
                .ok_or_else(|| anyhow!("YANDEX_FOLDER_ID is not set"))?,
        )),
    };

    let transcriber: Box<dyn Transcriber> = match config.stt_provider {
        SttProvider::Whisper => Box::new(WhisperStt::new(client.clone(), api_key(config)?)),
        SttProvider::Yandex => Box::new(YandexStt::new(client, yandex_key(config)?)),
    };

    info!(
        "Providers selected: chat={:?} ({}), tts={:?}, stt={:?}",
        config.chat_provider, config.model, config.tts_provider, config.stt_provider
    );

    Ok(Providers {
        agent,
        transcriber,
        synthesizer,
    })
}

fn api_key(config: &Config) -> Result<String> {
    config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("AI_API_KEY is not set"))
}

fn yandex_key(config: &Config) -> Result<String> {
    config
        .yandex_api_key
        .clone()
        .ok_or_else(|| anyhow!("YANDEX_API_KEY is not set"))
}
