use serde::{Deserialize, Serialize};

/// One unit of generation output for a single agent message.
///
/// `content` is cumulative: each chunk carries everything generated so far,
/// so any intermediate chunk may be skipped without losing text. A
/// well-formed stream ends with exactly one chunk whose `done` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub content: String,
    pub done: bool,
    /// Set on the terminal chunk of a failed generation; `content` then holds
    /// a human-readable explanation instead of model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
}

impl StreamChunk {
    pub fn partial(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            done: false,
            error: None,
            tokens: None,
        }
    }

    pub fn finished(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            done: true,
            ..Self::partial(id, content)
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let content = format!(
            "I apologize, but I encountered an error: {error}\n\nPlease try again or check your connection."
        );
        Self {
            error: Some(error),
            ..Self::finished(id, content)
        }
    }

    pub fn with_tokens(mut self, tokens: Option<u32>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
