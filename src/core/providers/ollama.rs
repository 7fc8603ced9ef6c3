use async_trait::async_trait;
use tracing::debug;

use super::http::{chunk_stream, send_json, Piece};
use super::{
    ChatProvider, ChunkStream, GenerationParameters, GenerationRequest, ProviderError, ProviderKind,
    ProviderSettings,
};
use crate::api::models::fetch_ollama_models;
use crate::api::{to_chat_messages, OllamaChatRequest, OllamaOptions, OllamaRecord};
use crate::core::decoder::{ChunkDecoder, Frame};
use crate::utils::url::construct_api_url;

/// Ollama's native chat endpoint, streamed as NDJSON.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    parameters: GenerationParameters,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            parameters: settings.parameters,
        }
    }

    fn options(&self) -> Option<OllamaOptions> {
        let options = OllamaOptions {
            temperature: self.parameters.temperature,
            top_p: self.parameters.top_p,
            num_predict: self.parameters.max_tokens,
        };
        (options != OllamaOptions::default()).then_some(options)
    }
}

fn piece(frame: Frame<OllamaRecord>) -> Piece {
    match frame {
        Frame::Record(record) => Piece {
            text: record.delta().to_string(),
            done: record.done,
            tokens: record.eval_count,
        },
        Frame::Done => Piece::end(None),
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let url = construct_api_url(&self.base_url, "api/chat");
        debug!(%url, model = %request.model, "Opening Ollama stream");

        let body = OllamaChatRequest {
            model: request.model.clone(),
            messages: to_chat_messages(&request.history),
            stream: true,
            options: self.options(),
        };
        let response = send_json(self.client.post(url), &body).await?;

        Ok(chunk_stream(
            request.message_id.clone(),
            response.bytes_stream(),
            ChunkDecoder::ndjson(),
            piece,
        ))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        fetch_ollama_models(&self.client, &self.base_url).await
    }
}
