//! Agent configurations
//!
//! Agents pair a display name with the backend model that answers for them.
//! The shipped roster is embedded from `builtin_agents.toml`; entries in the
//! user config replace builtins with the same id or add new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::core::store::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub total_messages: u64,
    pub successful_messages: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
}

impl AgentUsage {
    /// Fold one settled response into the running statistics. Response time
    /// is averaged over successful responses only.
    pub fn record(&mut self, success: bool, elapsed: Duration) {
        self.total_messages += 1;
        if success {
            self.successful_messages += 1;
            let n = self.successful_messages as f64;
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / n;
        }
        self.success_rate = self.successful_messages as f64 / self.total_messages as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub usage: AgentUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BuiltinAgentsFile {
    agents: Vec<AgentConfig>,
}

/// Load the agent roster shipped with the binary.
pub fn load_builtin_agents() -> Vec<AgentConfig> {
    const CONTENT: &str = include_str!("builtin_agents.toml");

    match toml::from_str::<BuiltinAgentsFile>(CONTENT) {
        Ok(file) => file.agents,
        Err(err) => {
            tracing::warn!(error = %err, "builtin agent roster failed to parse");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentConfig>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self { agents }
    }

    pub fn builtin() -> Self {
        Self::new(load_builtin_agents())
    }

    /// Builtins with user-defined agents layered on top, matched by id
    /// (case-insensitive). An override keeps the builtin's id.
    pub fn with_overrides(overrides: &[AgentConfig]) -> Self {
        let mut registry = Self::builtin();
        for agent in overrides {
            match registry
                .agents
                .iter_mut()
                .find(|a| a.id.eq_ignore_ascii_case(&agent.id))
            {
                Some(existing) => {
                    let id = std::mem::take(&mut existing.id);
                    *existing = AgentConfig {
                        id,
                        ..agent.clone()
                    };
                }
                None => registry.agents.push(agent.clone()),
            }
        }
        registry
    }

    pub fn configs(&self) -> &[AgentConfig] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Replace a known agent's configuration. Usage statistics are owned by
    /// the registry and survive the update.
    pub fn update(&mut self, config: AgentConfig) -> Result<(), StoreError> {
        let existing = self
            .agents
            .iter_mut()
            .find(|a| a.id == config.id)
            .ok_or_else(|| StoreError::UnknownAgent(config.id.clone()))?;

        let usage = std::mem::take(&mut existing.usage);
        let last_used = existing.last_used;
        *existing = config;
        existing.usage = usage;
        existing.last_used = last_used;
        Ok(())
    }

    pub fn record_outcome(&mut self, id: &str, success: bool, elapsed: Duration) {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == id) {
            agent.usage.record(success, elapsed);
            agent.last_used = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roster_loads() {
        let agents = load_builtin_agents();
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert!(ids.contains(&"foreman"));
        assert!(ids.contains(&"coder"));
        assert!(ids.contains(&"planner"));

        let rag = agents.iter().find(|a| a.id == "rag").unwrap();
        assert!(!rag.enabled);
        assert_eq!(rag.config["embedding_model"], "mxbai-embed-large");
    }

    #[test]
    fn builtin_agents_have_models() {
        for agent in load_builtin_agents() {
            assert!(!agent.id.is_empty());
            assert!(!agent.name.is_empty());
            assert!(!agent.model.is_empty());
        }
    }

    #[test]
    fn overrides_replace_and_extend() {
        let custom = AgentConfig {
            id: "Coder".into(),
            name: "Local Coder".into(),
            model: "qwen2.5-coder:7b".into(),
            description: String::new(),
            enabled: true,
            config: Map::new(),
            usage: AgentUsage::default(),
            last_used: None,
        };
        let extra = AgentConfig {
            id: "reviewer".into(),
            name: "Reviewer".into(),
            ..custom.clone()
        };

        let registry = AgentRegistry::with_overrides(&[custom, extra]);
        assert_eq!(
            registry
                .configs()
                .iter()
                .filter(|a| a.id.eq_ignore_ascii_case("coder"))
                .count(),
            1
        );
        let coder = registry.get("coder").expect("builtin id survives the override");
        assert_eq!(coder.model, "qwen2.5-coder:7b");
        assert_eq!(coder.name, "Local Coder");
        assert!(registry.get("Coder").is_none());
        assert!(registry.contains("reviewer"));
    }

    #[test]
    fn update_rejects_unknown_agent_and_keeps_usage() {
        let mut registry = AgentRegistry::builtin();
        registry.record_outcome("coder", true, Duration::from_millis(200));

        let mut changed = registry.get("coder").unwrap().clone();
        changed.model = "codellama:7b".into();
        changed.usage = AgentUsage::default();
        registry.update(changed).expect("known agent");

        let coder = registry.get("coder").unwrap();
        assert_eq!(coder.model, "codellama:7b");
        assert_eq!(coder.usage.total_messages, 1);
        assert!(coder.last_used.is_some());

        let mut ghost = coder.clone();
        ghost.id = "ghost".into();
        assert!(matches!(
            registry.update(ghost),
            Err(StoreError::UnknownAgent(id)) if id == "ghost"
        ));
    }

    #[test]
    fn usage_tracks_success_rate_and_mean_latency() {
        let mut usage = AgentUsage::default();
        usage.record(true, Duration::from_millis(100));
        usage.record(true, Duration::from_millis(300));
        usage.record(false, Duration::from_millis(5000));

        assert_eq!(usage.total_messages, 3);
        assert_eq!(usage.successful_messages, 2);
        assert!((usage.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((usage.average_response_time_ms - 200.0).abs() < 1e-6);
    }
}
