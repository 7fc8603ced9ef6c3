use async_trait::async_trait;
use tracing::debug;

use super::http::{chunk_stream, send_json, Piece};
use super::{
    ChatProvider, ChunkStream, GenerationParameters, GenerationRequest, ProviderError, ProviderKind,
    ProviderSettings,
};
use crate::api::models::fetch_openai_models;
use crate::api::{to_chat_messages, ChatRequest, ChatResponse};
use crate::core::decoder::{ChunkDecoder, Frame};
use crate::utils::url::construct_api_url;

// LM Studio accepts any bearer token; this is the one its docs use.
const DEFAULT_API_KEY: &str = "lm-studio";

/// LM Studio's OpenAI-compatible chat completions, streamed as SSE.
pub struct LmStudioProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    parameters: GenerationParameters,
}

impl LmStudioProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings
                .api_key
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            parameters: settings.parameters,
        }
    }
}

fn piece(frame: Frame<ChatResponse>) -> Piece {
    match frame {
        Frame::Record(response) => Piece {
            text: response.delta().to_string(),
            done: response.is_finished(),
            tokens: response.usage.and_then(|u| u.completion_tokens),
        },
        Frame::Done => Piece::end(None),
    }
}

#[async_trait]
impl ChatProvider for LmStudioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LmStudio
    }

    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let url = construct_api_url(&self.base_url, "v1/chat/completions");
        debug!(%url, model = %request.model, "Opening LM Studio stream");

        let body = ChatRequest {
            model: request.model.clone(),
            messages: to_chat_messages(&request.history),
            stream: true,
            max_tokens: self.parameters.max_tokens,
            temperature: self.parameters.temperature,
            top_p: self.parameters.top_p,
        };
        let post = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key));
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
