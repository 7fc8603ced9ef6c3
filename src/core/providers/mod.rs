//! Model backends and the adapter that hides their differences.
//!
//! Every backend hands back cumulative [`StreamChunk`]s for one placeholder
//! message. [`ProviderAdapter`] turns backend failures into a terminal error
//! chunk and falls back to the built-in mock when no backend is configured.

pub(crate) mod http;
mod llamacpp;
mod lmstudio;
mod ollama;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::core::message::Message;
use crate::core::mock::{MockGenerator, MOCK_MODELS};
use crate::core::stream::StreamChunk;

pub use llamacpp::{render_prompt, LlamaCppProvider};
pub use lmstudio::LmStudioProvider;
pub use ollama::OllamaProvider;

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    LmStudio,
    LlamaCpp,
    Mock,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(ProviderKind::Ollama),
            "lmstudio" | "lm-studio" | "lm_studio" => Some(ProviderKind::LmStudio),
            "llamacpp" | "llama.cpp" | "llama-cpp" => Some(ProviderKind::LlamaCpp),
            "mock" | "offline" => Some(ProviderKind::Mock),
            _ => None,
        }
    }

    /// Like [`ProviderKind::parse`], but an unrecognised name selects the
    /// mock backend instead of failing.
    pub fn from_config(name: Option<&str>) -> Self {
        match name {
            None => ProviderKind::Mock,
            Some(name) => Self::parse(name).unwrap_or_else(|| {
                warn!(provider = name, "Unknown provider kind; using mock responses");
                ProviderKind::Mock
            }),
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lmstudio",
            ProviderKind::LlamaCpp => "llamacpp",
            ProviderKind::Mock => "mock",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::LmStudio => "LM Studio",
            ProviderKind::LlamaCpp => "llama.cpp",
            ProviderKind::Mock => "Mock",
        }
    }

    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("http://127.0.0.1:11434"),
            ProviderKind::LmStudio => Some("http://127.0.0.1:1234"),
            ProviderKind::LlamaCpp => Some("http://127.0.0.1:8080"),
            ProviderKind::Mock => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend could not be reached at all.
    Unreachable(String),
    /// The request failed or the body broke off mid-stream.
    Transport(String),
    /// The backend answered with a non-success status.
    Status { status: u16, message: String },
    /// A non-streaming response could not be understood.
    Decode(String),
}

impl ProviderError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Unreachable(message) => write!(f, "backend unreachable: {message}"),
            ProviderError::Transport(message) => write!(f, "{message}"),
            ProviderError::Status { status, message } => {
                write!(f, "backend returned HTTP {status}: {message}")
            }
            ProviderError::Decode(message) => write!(f, "unexpected response: {message}"),
        }
    }
}

impl Error for ProviderError {}

/// Sampling parameters passed through to every backend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParameters {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub message_id: String,
    pub model: String,
    pub history: Vec<Message>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start generating. Connection and status failures are reported here;
    /// anything that goes wrong after the first byte arrives as an `Err`
    /// item on the stream.
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError>;

    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    generator: MockGenerator,
}

impl MockProvider {
    pub fn new(generator: MockGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        Ok(self
            .generator
            .stream(&request.message_id, &request.history)
            .map(Ok)
            .boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(MOCK_MODELS.iter().map(|m| m.to_string()).collect())
    }
}

/// Connection details for a real backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub parameters: GenerationParameters,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().unwrap_or_default().to_string(),
            api_key: None,
            parameters: GenerationParameters::default(),
        }
    }
}

pub fn build_provider(settings: &ProviderSettings, mock: MockGenerator) -> Arc<dyn ChatProvider> {
    let client = reqwest::Client::new();
    match settings.kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(client, settings)),
        ProviderKind::LmStudio => Arc::new(LmStudioProvider::new(client, settings)),
        ProviderKind::LlamaCpp => Arc::new(LlamaCppProvider::new(client, settings)),
        ProviderKind::Mock => Arc::new(MockProvider::new(mock)),
    }
}

/// Uniform front for whichever backend is active.
///
/// [`ProviderAdapter::stream`] never fails: its stream always ends with
/// exactly one terminal chunk, and nothing follows it.
pub struct ProviderAdapter {
    backend: Arc<dyn ChatProvider>,
    mock: MockGenerator,
    offline_fallback: bool,
}

impl ProviderAdapter {
    pub fn new(
        backend: Arc<dyn ChatProvider>,
        mock: MockGenerator,
        offline_fallback: bool,
    ) -> Self {
        Self {
            backend,
            mock,
            offline_fallback,
        }
    }

    pub fn mock(mock: MockGenerator) -> Self {
        Self::new(Arc::new(MockProvider::new(mock.clone())), mock, false)
    }

    pub fn from_settings(
        settings: &ProviderSettings,
        mock: MockGenerator,
        offline_fallback: bool,
    ) -> Self {
        Self::new(build_provider(settings, mock.clone()), mock, offline_fallback)
    }

    pub fn kind(&self) -> ProviderKind {
        self.backend.kind()
    }

    pub fn offline_fallback(&self) -> bool {
        self.offline_fallback
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.backend.list_models().await
    }

    pub async fn stream(&self, request: GenerationRequest) -> BoxStream<'static, StreamChunk> {
        let message_id = request.message_id.clone();
        match self.backend.open(&request).await {
            Ok(chunks) => settle(message_id, chunks),
            Err(err) if err.is_unreachable() && self.offline_fallback => {
                warn!(
                    provider = self.backend.kind().id(),
                    error = %err,
                    "Backend unreachable; answering with mock responses"
                );
                self.mock.stream(&message_id, &request.history)
            }
            Err(err) => {
                warn!(
                    provider = self.backend.kind().id(),
                    error = %err,
                    "Generation failed to start"
                );
                stream::once(async move { StreamChunk::failed(message_id, err.to_string()) })
                    .boxed()
            }
        }
    }
}

fn settle(message_id: String, chunks: ChunkStream) -> BoxStream<'static, StreamChunk> {
    stream::unfold(Some(chunks), move |state| {
        let message_id = message_id.clone();
        async move {
            let mut chunks = state?;
            match chunks.next().await {
                Some(Ok(chunk)) if chunk.is_terminal() => Some((chunk, None)),
                Some(Ok(chunk)) => Some((chunk, Some(chunks))),
                Some(Err(err)) => {
                    debug!(error = %err, "Backend stream failed");
                    Some((StreamChunk::failed(message_id, err.to_string()), None))
                }
                None => Some((
                    StreamChunk::failed(message_id, "the response ended unexpectedly"),
                    None,
                )),
            }
        }
    })
    .boxed()
}
