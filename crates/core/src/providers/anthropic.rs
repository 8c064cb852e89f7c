use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::TurnRecord;
use crate::chat::ChatAgent;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: String,
}

/// Reply generation backed by the Anthropic messages API.
pub struct AnthropicChat {
    client: Client,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl AnthropicChat {
    pub fn new(client: Client, api_key: String, model: String, system_prompt: String) -> Self {
        Self {
            client,
            api_key,
            model,
            system_prompt,
        }
    }

    fn request_body(&self, utterance: &str, history: &[TurnRecord]) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| serde_json::json!({ "role": turn.role, "content": turn.text }))
            .collect();
        messages.push(serde_json::json!({ "role": "user", "content": utterance }));

        serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": self.system_prompt,
            "messages": messages,
        })
    }
}

#[async_trait]
impl ChatAgent for AnthropicChat {
    async fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Result<String> {
        let resp = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(utterance, history))
            .send()
            .await?
            .error_for_status()?
            .json::<MessagesResponse>()
            .await?;

        let reply = &resp
            .content
            .first()
            .ok_or_else(|| anyhow::anyhow!("No content in model response"))?
            .text;
        Ok(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_history_in_order() {
        let chat = AnthropicChat::new(
            Client::new(),
            "key".to_string(),
            "claude-sonnet-4-5-20250929".to_string(),
            "Вы ассистент.".to_string(),
        );
        let history = vec![
            TurnRecord::user("сколько это стоит"),
            TurnRecord::assistant("Зависит от тарифа."),
        ];

        let body = chat.request_body("расскажите подробнее", &history);

        assert_eq!(body["model"], "claude-sonnet-4-5-20250929");
        assert_eq!(body["system"], "Вы ассистент.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "сколько это стоит");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"], "расскажите подробнее");
    }

    #[test]
    fn parses_a_messages_response() {
        let raw = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Здравствуйте! Чем могу помочь?"}],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "Здравствуйте! Чем могу помочь?");
    }

    // Live call against the real API; needs AI_API_KEY in the environment.
    // Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn replies_over_the_live_api() {
        dotenvy::dotenv_override().ok();
        let api_key = std::env::var("AI_API_KEY").expect("AI_API_KEY not set");
        let chat = AnthropicChat::new(
            Client::new(),
            api_key,
            "claude-sonnet-4-5-20250929".to_string(),
            "Отвечайте одним коротким предложением.".to_string(),
        );

        let reply = chat.reply("Привет! Как дела?", &[]).await.unwrap();
        assert!(!reply.is_empty());
    }
}
