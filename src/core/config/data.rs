use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::agent::AgentConfig;
use crate::core::mock::MockPacing;
use crate::core::providers::{GenerationParameters, ProviderKind, ProviderSettings};
use crate::core::throttle::DEFAULT_THROTTLE_INTERVAL;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ProviderConfig {
    /// `ollama`, `lmstudio`, `llamacpp` or `mock`. Unset means mock.
    pub kind: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model used for every agent, overriding each agent's own model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Answer with mock responses when the backend cannot be reached.
    pub offline_fallback: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Minimum milliseconds between forwarded chunks.
    pub throttle_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct MockConfig {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Agent for new conversations when none is given on the command line.
    pub default_agent: Option<String>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub mock: MockConfig,
    /// Agents added to, or replacing, the builtin roster.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

pub const FALLBACK_AGENT: &str = "foreman";

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn provider_kind(&self) -> ProviderKind {
        ProviderKind::from_config(self.provider.kind.as_deref())
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        let defaults = ProviderSettings::new(self.provider_kind());
        ProviderSettings {
            base_url: self
                .provider
                .base_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.base_url),
            api_key: self.provider.api_key.clone(),
            parameters: GenerationParameters {
                temperature: self.provider.temperature,
                max_tokens: self.provider.max_tokens,
                top_p: self.provider.top_p,
            },
            ..defaults
        }
    }

    pub fn offline_fallback(&self) -> bool {
        self.provider.offline_fallback.unwrap_or(false)
    }

    pub fn throttle_interval(&self) -> Duration {
        self.streaming
            .throttle_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_THROTTLE_INTERVAL)
    }

    /// Pacing for mock playback. A maximum below the minimum is raised to it.
    pub fn mock_pacing(&self) -> MockPacing {
        let defaults = MockPacing::default();
        let min = self
            .mock
            .min_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.min);
        let max = self
            .mock
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.max)
            .max(min);
        MockPacing { min, max }
    }

    pub fn default_agent(&self) -> &str {
        self.default_agent.as_deref().unwrap_or(FALLBACK_AGENT)
    }
}
