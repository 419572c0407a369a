// src/config/generation.rs
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ConfigError;
use crate::jobs::provider::{DisabledGenerator, GenerationProvider, OpenAiGenerator};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "openai" is supported (case-insensitive).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_api_key() -> String {
    "ENV".into()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: None,
            api_key: default_api_key(),
        }
    }
}

impl GenerationConfig {
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if !self.api_key.trim().eq_ignore_ascii_case("env") {
            return Ok(self.api_key.trim().to_string());
        }
        match self.provider.to_ascii_lowercase().as_str() {
            "openai" => std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingApiKey("OPENAI_API_KEY".into())),
            other => Err(ConfigError::Invalid(format!(
                "unsupported generation provider '{other}'"
            ))),
        }
    }

    /// Build the configured generator. Disabled or misconfigured setups
    /// fall back to [`DisabledGenerator`] with a warning.
    pub fn build_generator(&self) -> Arc<dyn GenerationProvider> {
        if !self.enabled {
            return Arc::new(DisabledGenerator);
        }
        let built = self
            .resolve_api_key()
            .map_err(anyhow::Error::from)
            .and_then(|key| OpenAiGenerator::new(key, self.model.as_deref()));
        match built {
            Ok(g) => {
                // Safe diagnostics only: never log the key itself.
                tracing::info!(target: "jobs", provider = %self.provider, model = ?self.model, "generation provider ready");
                Arc::new(g)
            }
            Err(e) => {
                tracing::warn!(target: "jobs", error = %format!("{e:#}"), "generation disabled");
                Arc::new(DisabledGenerator)
            }
        }
    }
}
