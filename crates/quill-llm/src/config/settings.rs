use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderType;

/// Provider records, scene selections and HTTP client settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Scene name (summary, translation, qa, tags, ...) to provider + model
    #[serde(default)]
    pub scenes: HashMap<String, SceneSelection>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    /// Longest silence tolerated between two reads of a response. Streams
    /// that keep delivering chunks run past it.
    #[serde(default = "default_read_timeout", alias = "timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// One configured LLM vendor endpoint and credential
#[derive(Clone, Deserialize, Serialize)]
pub struct ProviderEntry {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable read when `api_key` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub models: Vec<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SceneSelection {
    pub provider: String,
    pub model: String,
}

fn default_read_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl HttpSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ProviderEntry {
    pub fn new(id: &str, provider_type: ProviderType) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            provider_type,
            base_url: None,
            api_key: None,
            api_key_env: None,
            models: Vec::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_api_key_env(mut self, var: &str) -> Self {
        self.api_key_env = Some(var.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.models.push(model.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Configured name, else the provider type's display name
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.provider_type.display_name()
        } else {
            &self.name
        }
    }

    /// Configured base URL, else the provider type's default
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.provider_type.default_base_url())
    }

    /// Inline key if non-empty, else the `api_key_env` variable if set and non-empty
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        let var = self.api_key_env.as_deref()?;
        std::env::var(var)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// First listed model
    pub fn default_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("models", &self.models)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Settings {
    /// Load settings from a TOML file and validate cross references
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
        let settings = Self::from_toml_str(&content)
            .context(format!("Failed to parse TOML config: {:?}", path))?;
        tracing::debug!(path = ?path, providers = settings.providers.len(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Provider ids must be unique and every scene must name a known provider
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                bail!("Provider with empty id");
            }
            if !seen.insert(provider.id.as_str()) {
                bail!("Duplicate provider id: {}", provider.id);
            }
        }
        for (scene, selection) in &self.scenes {
            if self.provider(&selection.provider).is_none() {
                bail!(
                    "Scene '{}' refers to unknown provider '{}'",
                    scene,
                    selection.provider
                );
            }
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Provider and model selected for a scene
    pub fn scene(&self, name: &str) -> Result<(&ProviderEntry, &str)> {
        let selection = self
            .scenes
            .get(name)
            .ok_or_else(|| anyhow!("No provider selected for scene '{}'", name))?;
        let provider = self
            .provider(&selection.provider)
            .ok_or_else(|| anyhow!("Unknown provider '{}'", selection.provider))?;
        Ok((provider, selection.model.as_str()))
    }
}
