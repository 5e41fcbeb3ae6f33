use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Message role in conversation. Only the three roles every vendor accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(text: &str) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: &str) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: &str) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Resolved configuration for one provider call.
///
/// Built once per request or session and never mutated afterwards; the
/// builder methods consume `self`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: Option<String>,
    pub name: String,
    /// May carry a trailing slash; adapters normalize it
    pub base_url: String,
    pub api_key: String,
    pub model_id: String,
    pub custom_headers: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: &str, base_url: &str, api_key: &str, model_id: &str) -> Self {
        Self {
            provider_id: None,
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            custom_headers: HashMap::new(),
        }
    }

    pub fn with_provider_id(mut self, id: &str) -> Self {
        self.provider_id = Some(id.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.custom_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.custom_headers.extend(headers);
        self
    }
}

// Hand-written so the key never reaches logs through `{:?}`
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_id", &self.model_id)
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of a connectivity probe. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Shorten a secret to its first four characters
pub(crate) fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}

/// Replace every occurrence of `secret` in `text` with its redacted form
pub(crate) fn redact_in(text: &str, secret: &str) -> String {
    if secret.len() > 4 {
        text.replace(secret, &redact(secret))
    } else {
        text.to_string()
    }
}
