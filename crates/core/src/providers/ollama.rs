use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::TurnRecord;
use crate::chat::ChatAgent;

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
}

/// Reply generation against a local ollama daemon. The generate endpoint is
/// single-prompt, so prior turns are not replayed to the model.
pub struct OllamaChat {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(client: Client, base_url: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl ChatAgent for OllamaChat {
    async fn reply(&self, utterance: &str, _history: &[TurnRecord]) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": utterance,
                "stream": false,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        Ok(resp.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let chat = OllamaChat::new(
            Client::new(),
            "http://localhost:11434/".to_string(),
            "llama3".to_string(),
        );
        assert_eq!(chat.base_url, "http://localhost:11434");
    }

    #[test]
    fn parses_a_generate_response() {
        let raw = r#"{"model": "llama3", "response": "Добрый день!", "done": true}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response, "Добрый день!");
    }

    // Needs a local ollama daemon with the model pulled; run with
    // `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn replies_against_a_local_daemon() {
        let chat = OllamaChat::new(
            Client::new(),
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            std::env::var("AI_MODEL").unwrap_or_else(|_| "llama3".to_string()),
        );
        let reply = chat.reply("Скажи привет одним словом.", &[]).await.unwrap();
        assert!(!reply.is_empty());
    }
}
