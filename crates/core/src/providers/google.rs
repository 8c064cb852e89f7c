use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::chat::ChatAgent;
use crate::{TurnRecord, TurnRole};

const GENERATE_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: String,
}

/// Reply generation backed by the Gemini REST API.
pub struct GeminiChat {
    client: Client,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl GeminiChat {
    pub fn new(client: Client, api_key: String, model: String, system_prompt: String) -> Self {
        Self {
            client,
            api_key,
            model,
            system_prompt,
        }
    }

    fn request_body(&self, utterance: &str, history: &[TurnRecord]) -> serde_json::Value {
        // Gemini calls the assistant role "model".
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": turn.text }] })
            })
            .collect();
        contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": utterance }] }));

        serde_json::json!({
            "system_instruction": { "parts": [{ "text": self.system_prompt }] },
            "contents": contents,
        })
    }
}

#[async_trait]
impl ChatAgent for GeminiChat {
    async fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Result<String> {
        let url = format!("{GENERATE_URL_BASE}/{}:generateContent", self.model);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(utterance, history))
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        let reply = resp
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("No candidates in model response"))?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_maps_assistant_turns_to_model_role() {
        let chat = GeminiChat::new(
            Client::new(),
            "key".to_string(),
            "gemini-2.0-flash".to_string(),
            "Вы ассистент.".to_string(),
        );
        let history = vec![
            TurnRecord::user("алло"),
            TurnRecord::assistant("Здравствуйте!"),
        ];

        let body = chat.request_body("мне нужна помощь", &history);

        assert_eq!(
            body["system_instruction"]["parts"][0]["text"],
            "Вы ассистент."
        );
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "мне нужна помощь");
    }

    #[test]
    fn parses_a_generate_response() {
        let raw = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [{"text": "Конечно, помогу."}],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "Конечно, помогу.");
    }

    #[test]
    fn missing_candidates_is_an_error_not_a_panic() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
