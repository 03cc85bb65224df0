use std::future::Future;
use std::pin::Pin;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::agent::harness::DecisionMaker;
use crate::agent::prompt::ChatMessage;
use crate::config::LlmConfig;

/// Minimal config for an Ollama-style `POST /api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:11434/api/chat`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
}

impl From<&LlmConfig> for OllamaConfig {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

fn chat_request<'a>(messages: &'a [ChatMessage], cfg: &'a OllamaConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &cfg.model,
        messages,
        stream: false,
        options: ChatOptions {
            temperature: cfg.temperature,
        },
    }
}

/// Sends role-tagged messages to an Ollama-style chat endpoint and returns the reply text.
pub async fn query_ollama_chat(
    client: &Client,
    messages: &[ChatMessage],
    cfg: &OllamaConfig,
) -> anyhow::Result<String> {
    let res = client
        .post(&cfg.endpoint)
        .json(&chat_request(messages, cfg))
        .send()
        .await
        .context("ollama request failed")?
        .error_for_status()
        .context("ollama non-2xx response")?
        .json::<ChatResponse>()
        .await
        .context("ollama response decode failed")?;

    Ok(res.message.content)
}

/// [`DecisionMaker`] backed by an Ollama chat endpoint. Reuses one HTTP client.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    client: Client,
    cfg: OllamaConfig,
}

impl OllamaChat {
    pub fn new(cfg: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.cfg
    }
}

impl DecisionMaker for OllamaChat {
    fn decide<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                model = %self.cfg.model,
                messages = messages.len(),
                "bridge.llm.request"
            );
            query_ollama_chat(&self.client, &messages, &self.cfg).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_chat_api() {
        let cfg = OllamaConfig::from(&LlmConfig::default());
        let msgs = vec![ChatMessage::system("persona"), ChatMessage::user("state")];
        let v = serde_json::to_value(chat_request(&msgs, &cfg)).unwrap();
        assert_eq!(v["model"], "llama3.1:8b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["temperature"], 1.0);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "state");
    }

    #[test]
    fn response_body_yields_message_content() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"WhiteboardClear()"},"done":true}"#;
        let res: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(res.message.content, "WhiteboardClear()");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_not_a_panic() {
        let llm = OllamaChat::new(OllamaConfig {
            endpoint: "http://127.0.0.1:9/api/chat".to_string(),
            model: "m".to_string(),
            temperature: 0.0,
        });
        let err = llm
            .decide(vec![ChatMessage::user("state")])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("ollama request failed"));
    }
}
