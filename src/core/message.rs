use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }

    /// Role name understood by chat-completion style backends.
    pub fn to_api_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_agent(self) -> bool {
        self == Role::Agent
    }

    pub fn is_system(self) -> bool {
        self == Role::System
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "agent" | "assistant" => Ok(Role::Agent),
            "system" => Ok(Role::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Details recorded on an agent message once its stream settles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub tokens: Option<u32>,
    pub model: Option<String>,
    pub processing_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp,
            agent_id: None,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    /// Empty agent message that receives streamed content.
    pub fn agent_placeholder(timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Agent, String::new(), timestamp)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, Utc::now())
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_agent(&self) -> bool {
        self.role.is_agent()
    }

    pub fn is_system(&self) -> bool {
        self.role.is_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_maps_to_assistant_for_backends() {
        assert_eq!(Role::Agent.to_api_role(), "assistant");
        assert_eq!(Role::User.to_api_role(), "user");
        assert_eq!(Role::System.to_api_role(), "system");
    }

    #[test]
    fn roles_accept_backend_spelling() {
        assert_eq!(Role::try_from("assistant"), Ok(Role::Agent));
        assert_eq!(Role::try_from("agent"), Ok(Role::Agent));
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("tool/call").is_err());
    }

    #[test]
    fn placeholder_starts_empty_with_fresh_id() {
        let now = Utc::now();
        let first = Message::agent_placeholder(now);
        let second = Message::agent_placeholder(now);
        assert!(first.content.is_empty());
        assert!(first.is_agent());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn role_serializes_as_plain_string() {
        let message = Message::user("hi", Utc::now());
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "user");
        assert!(value.get("metadata").is_none());
    }
}
