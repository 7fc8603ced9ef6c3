//! Conversation state and the single streaming slot.
//!
//! The store is the only writer of conversations. Sending a message reserves
//! the streaming slot and hands back the parameters for the provider call;
//! chunks coming back through the relay are applied with
//! [`ConversationStore::apply_envelope`].

use std::error::Error;
use std::fmt;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::agent::{AgentConfig, AgentRegistry};
use crate::core::chat_stream::StreamParams;
use crate::core::conversation::{Conversation, ConversationStatus};
use crate::core::message::{Message, MessageMetadata};
use crate::core::providers::GenerationRequest;
use crate::core::relay::{Envelope, RelayEvent};
use crate::core::stream::StreamChunk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UnknownAgent(String),
    UnknownConversation(String),
    NoActiveConversation,
    EmptyMessage,
    StreamInProgress,
    AgentMismatch {
        conversation_agent: String,
        requested: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownAgent(id) => write!(f, "unknown agent '{id}'"),
            StoreError::UnknownConversation(id) => write!(f, "unknown conversation '{id}'"),
            StoreError::NoActiveConversation => write!(f, "no conversation is active"),
            StoreError::EmptyMessage => write!(f, "message is empty"),
            StoreError::StreamInProgress => {
                write!(f, "a response is still streaming; wait for it or cancel it")
            }
            StoreError::AgentMismatch {
                conversation_agent,
                requested,
            } => write!(
                f,
                "conversation belongs to agent '{conversation_agent}', not '{requested}'"
            ),
        }
    }
}

impl Error for StoreError {}

/// The in-flight generation, if any.
#[derive(Debug)]
pub struct StreamingState {
    pub conversation_id: String,
    pub message_id: String,
    pub agent_id: String,
    pub model: String,
    pub stream_id: u64,
    started_at: Instant,
    cancel_token: CancellationToken,
}

/// What a render surface needs to know after a chunk was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    /// New text was appended to the streaming message.
    Appended { message_id: String, content: String },
    /// The stream finished; `content` is any text that arrived with the
    /// terminal chunk.
    Settled { message_id: String, content: String },
    /// The stream failed and a system message was appended.
    Failed { message_id: String, error: String },
    /// The envelope belonged to a stale or unknown stream.
    Ignored,
}

pub struct ConversationStore {
    agents: AgentRegistry,
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
    streaming: Option<StreamingState>,
    next_stream_id: u64,
    model_override: Option<String>,
}

impl ConversationStore {
    pub fn new(agents: AgentRegistry) -> Self {
        Self {
            agents,
            conversations: Vec::new(),
            active_conversation_id: None,
            streaming: None,
            next_stream_id: 0,
            model_override: None,
        }
    }

    /// Use `model` for every agent instead of each agent's configured model.
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    pub fn agent_configs(&self) -> &[AgentConfig] {
        self.agents.configs()
    }

    pub fn update_agent_config(&mut self, config: AgentConfig) -> Result<(), StoreError> {
        self.agents.update(config)
    }

    /// Newest first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    pub fn create_conversation(
        &mut self,
        agent_id: &str,
        title: Option<&str>,
    ) -> Result<String, StoreError> {
        let agent = self
            .agents
            .get(agent_id)
            .ok_or_else(|| StoreError::UnknownAgent(agent_id.to_string()))?;

        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => format!("Chat with {}", agent.name),
        };
        let conversation = Conversation::new(agent_id, title);
        let id = conversation.id.clone();
        debug!(conversation_id = %id, agent_id, "Created conversation");

        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(id.clone());
        Ok(id)
    }

    pub fn set_active_conversation(&mut self, id: Option<&str>) -> Result<(), StoreError> {
        if let Some(id) = id {
            if self.conversation(id).is_none() {
                return Err(StoreError::UnknownConversation(id.to_string()));
            }
        }
        self.active_conversation_id = id.map(str::to_string);
        Ok(())
    }

    pub fn delete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

        if self
            .streaming
            .as_ref()
            .is_some_and(|s| s.conversation_id == id)
        {
            self.cancel_stream();
        }
        self.conversations.remove(index);
        if self.active_conversation_id.as_deref() == Some(id) {
            self.active_conversation_id = None;
        }
        Ok(())
    }

    pub fn archive_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        self.set_status(id, ConversationStatus::Archived)
    }

    pub fn complete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        self.set_status(id, ConversationStatus::Completed)
    }

    fn set_status(&mut self, id: &str, status: ConversationStatus) -> Result<(), StoreError> {
        let conversation = self
            .conversation_mut(id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;
        conversation.status = status;
        conversation.touch();
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn streaming(&self) -> Option<&StreamingState> {
        self.streaming.as_ref()
    }

    pub fn streaming_message_id(&self) -> Option<&str> {
        self.streaming.as_ref().map(|s| s.message_id.as_str())
    }

    /// Append the user turn and an empty agent placeholder to the active
    /// conversation and reserve the streaming slot for it.
    ///
    /// Nothing is modified when this returns an error.
    pub fn send_message(
        &mut self,
        content: &str,
        agent_id: Option<&str>,
    ) -> Result<StreamParams, StoreError> {
        if self.streaming.is_some() {
            return Err(StoreError::StreamInProgress);
        }
        let conversation = self
            .active_conversation()
            .ok_or(StoreError::NoActiveConversation)?;
        if content.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        if let Some(requested) = agent_id {
            if requested != conversation.agent_id {
                return Err(StoreError::AgentMismatch {
                    conversation_agent: conversation.agent_id.clone(),
                    requested: requested.to_string(),
                });
            }
        }
        let agent = self
            .agents
            .get(&conversation.agent_id)
            .ok_or_else(|| StoreError::UnknownAgent(conversation.agent_id.clone()))?;

        let agent_id = agent.id.clone();
        let model = self
            .model_override
            .clone()
            .unwrap_or_else(|| agent.model.clone());
        let conversation_id = conversation.id.clone();

        let now = Utc::now();
        let user = Message::user(content, now).with_agent(&agent_id);
        let placeholder = Message::agent_placeholder(now).with_agent(&agent_id);
        let message_id = placeholder.id.clone();

        let Some(conversation) = self.conversation_mut(&conversation_id) else {
            return Err(StoreError::NoActiveConversation);
        };
        conversation.push(user);
        conversation.push(placeholder);
        let history = conversation.history_excluding(&message_id);

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let cancel_token = CancellationToken::new();
        debug!(stream_id, message_id = %message_id, model = %model, "Stream started");

        self.streaming = Some(StreamingState {
            conversation_id,
            message_id: message_id.clone(),
            agent_id,
            model: model.clone(),
            stream_id,
            started_at: Instant::now(),
            cancel_token: cancel_token.clone(),
        });

        Ok(StreamParams {
            request: GenerationRequest {
                message_id,
                model,
                history,
            },
            cancel_token,
            stream_id,
        })
    }

    /// Stop the in-flight generation. Content received so far stays on the
    /// message. Returns `false` when nothing was streaming.
    pub fn cancel_stream(&mut self) -> bool {
        match self.streaming.take() {
            Some(state) => {
                state.cancel_token.cancel();
                debug!(stream_id = state.stream_id, "Stream cancelled by user");
                true
            }
            None => false,
        }
    }

    pub fn apply_envelope(&mut self, envelope: Envelope) -> StoreUpdate {
        let current = self.streaming.as_ref().map(|s| s.stream_id);
        if current != Some(envelope.stream_id) {
            debug!(
                stream_id = envelope.stream_id,
                ?current,
                "Ignoring envelope from inactive stream"
            );
            return StoreUpdate::Ignored;
        }
        match envelope.event {
            RelayEvent::Chunk(chunk) => self.apply_chunk(chunk),
        }
    }

    /// Apply one cumulative chunk to the streaming message.
    pub fn apply_chunk(&mut self, chunk: StreamChunk) -> StoreUpdate {
        let Some(state) = self.streaming.as_ref() else {
            return StoreUpdate::Ignored;
        };
        if state.message_id != chunk.id {
            debug!(chunk_id = %chunk.id, "Ignoring chunk for a message that is not streaming");
            return StoreUpdate::Ignored;
        }
        let conversation_id = state.conversation_id.clone();

        if let Some(error) = chunk.error {
            return self.fail_stream(&error);
        }

        let appended = match self
            .conversation_mut(&conversation_id)
            .and_then(|c| c.message_mut(&chunk.id))
        {
            Some(message) => append_suffix(message, &chunk.content),
            None => String::new(),
        };

        if !chunk.done {
            return StoreUpdate::Appended {
                message_id: chunk.id,
                content: appended,
            };
        }

        let Some(state) = self.streaming.take() else {
            return StoreUpdate::Ignored;
        };
        let elapsed = state.started_at.elapsed();
        if let Some(conversation) = self.conversation_mut(&state.conversation_id) {
            if let Some(message) = conversation.message_mut(&state.message_id) {
                message.metadata = Some(MessageMetadata {
                    tokens: chunk.tokens,
                    model: Some(state.model.clone()),
                    processing_time_ms: Some(elapsed.as_millis() as u64),
                });
            }
            conversation.touch();
        }
        self.agents.record_outcome(&state.agent_id, true, elapsed);
        debug!(
            stream_id = state.stream_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stream settled"
        );

        StoreUpdate::Settled {
            message_id: state.message_id,
            content: appended,
        }
    }

    /// End the in-flight stream with an error: the placeholder keeps what it
    /// has and a system message explains what went wrong.
    pub fn fail_stream(&mut self, error: &str) -> StoreUpdate {
        let Some(state) = self.streaming.take() else {
            return StoreUpdate::Ignored;
        };
        warn!(stream_id = state.stream_id, error, "Stream failed");

        let elapsed = state.started_at.elapsed();
        if let Some(conversation) = self.conversation_mut(&state.conversation_id) {
            conversation.push(Message::system(format!("Error: {error}")));
        }
        self.agents.record_outcome(&state.agent_id, false, elapsed);

        StoreUpdate::Failed {
            message_id: state.message_id,
            error: error.to_string(),
        }
    }
}

fn append_suffix(message: &mut Message, cumulative: &str) -> String {
    match cumulative.strip_prefix(message.content.as_str()) {
        Some(suffix) => {
            message.content.push_str(suffix);
            suffix.to_string()
        }
        None => {
            warn!(
                message_id = %message.id,
                held = message.content.len(),
                received = cumulative.len(),
                "Chunk does not extend streamed content; ignoring"
            );
            String::new()
        }
    }
}

#[cfg(test)]
mod tests;
