use async_trait::async_trait;
use tracing::debug;

use super::http::{chunk_stream, send_json, Piece};
use super::{
    ChatProvider, ChunkStream, GenerationParameters, GenerationRequest, ProviderError, ProviderKind,
    ProviderSettings,
};
use crate::api::models::fetch_openai_models;
use crate::api::{CompletionRecord, CompletionRequest};
use crate::core::decoder::{ChunkDecoder, Frame};
use crate::core::message::{Message, Role};
use crate::utils::url::construct_api_url;

/// Flatten a conversation into a plain-text prompt for `/completion`, ending
/// with an open assistant turn.
pub fn render_prompt(history: &[Message]) -> String {
    let mut prompt = String::new();
    for message in history {
        let speaker = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Agent => "Assistant",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(message.content.trim());
        prompt.push('\n');
    }
    prompt.push_str("Assistant:");
    prompt
}

/// The llama.cpp server's native completion endpoint, streamed as SSE.
pub struct LlamaCppProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    parameters: GenerationParameters,
}

impl LlamaCppProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            parameters: settings.parameters,
        }
    }
}

fn piece(frame: Frame<CompletionRecord>) -> Piece {
    match frame {
        Frame::Record(record) => Piece {
            text: record.content,
            done: record.stop,
            tokens: record.tokens_predicted,
        },
        Frame::Done => Piece::end(None),
    }
}

#[async_trait]
impl ChatProvider for LlamaCppProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LlamaCpp
    }

    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let url = construct_api_url(&self.base_url, "completion");
        debug!(%url, "Opening llama.cpp stream");

        // The server runs whichever model it was started with.
        let body = CompletionRequest {
            prompt: render_prompt(&request.history),
            stream: true,
            n_predict: self.parameters.max_tokens,
            temperature: self.parameters.temperature,
            top_p: self.parameters.top_p,
        };
        let mut post = self.client.post(url);
        if !self.api_key.is_empty() {
            post = post.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = send_json(post, &body).await?;

        Ok(chunk_stream(
            request.message_id.clone(),
            response.bytes_stream(),
            ChunkDecoder::sse(),
            piece,
        ))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        fetch_openai_models(&self.client, &self.base_url, &self.api_key).await
    }
}
