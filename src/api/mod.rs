use serde::{Deserialize, Serialize};

use crate::core::message::Message;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Role and content only; ids, timestamps and metadata stay local.
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.role.to_api_role().to_string(),
            content: message.content.clone(),
        }
    }
}

pub fn to_chat_messages(history: &[Message]) -> Vec<ChatMessage> {
    history.iter().map(ChatMessage::from_message).collect()
}

// Ollama native API

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OllamaMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// One NDJSON record. `/api/generate` fills `response`, `/api/chat` fills
/// `message.content`; both carry the text produced since the last record.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OllamaRecord {
    pub model: String,
    pub created_at: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<OllamaMessage>,
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

impl OllamaRecord {
    pub fn delta(&self) -> &str {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .or(self.response.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
pub struct OllamaModelInfo {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct OllamaTagsResponse {
    pub models: Vec<OllamaModelInfo>,
}

// OpenAI-compatible API (LM Studio)

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponseDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatUsage {
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub fn delta(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.choices
            .first()
            .is_some_and(|c| c.finish_reason.is_some())
    }
}

#[derive(Deserialize, Debug)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

// llama.cpp server native API

#[derive(Serialize, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub content: String,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub tokens_predicted: Option<u32>,
}

pub mod models;
