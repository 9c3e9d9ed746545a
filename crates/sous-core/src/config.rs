use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SousError};

/// Top-level configuration for the Sous assistant core.
///
/// Loaded from `~/.sous/config.toml` by whatever process embeds the library.
/// Each section corresponds to one concern of the dialogue core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SousConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub capabilities: CapabilityConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl SousConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SousConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SousError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Chat entry-point settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the assistant accepts messages at all.
    pub enabled: bool,
    /// Maximum utterance length in characters.
    pub max_message_length: usize,
    /// Idle minutes after which a session is dropped and recreated.
    pub session_timeout_minutes: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_length: 2000,
            session_timeout_minutes: 30,
        }
    }
}

/// Conversation memory invalidation windows.
///
/// The ingredient and selection turn windows are independent. An entry is
/// usable only while both its time window and its turn window hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Wall-clock time-to-live for every cached entry, in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum turn distance for reusing the cached ingredient list.
    pub ingredient_turn_window: u64,
    /// Maximum turn distance for binding a numeric pick to the suggestion list.
    pub selection_turn_window: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            ingredient_turn_window: 3,
            selection_turn_window: 1,
        }
    }
}

/// Capability invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Upper bound on a single capability invocation, in seconds.
    pub timeout_secs: u64,
    /// Endpoint of the video transcript extraction service.
    pub video_endpoint: Option<String>,
    /// Endpoint of the product catalog search service.
    pub product_search_endpoint: Option<String>,
    /// Recipes longer than this are truncated.
    pub max_recipe_steps: usize,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            video_endpoint: Some("http://localhost:8003/process".to_string()),
            product_search_endpoint: Some("http://localhost:8004/search/text".to_string()),
            max_recipe_steps: 15,
        }
    }
}

/// Completion service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of the generation API.
    pub endpoint: String,
    /// Model identifier appended to the endpoint.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on a single completion request, in seconds.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}
