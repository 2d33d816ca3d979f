//! Records flowing through resolution: defaults layers in, resolved config out.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Fields ────────────────────────────────────────────────────────

/// A resolvable configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Engine,
    Url,
}

impl ConfigField {
    /// Every field, in the order resolution checks and reports them.
    pub const ALL: [ConfigField; 2] = [ConfigField::Engine, ConfigField::Url];

    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigField::Engine => "engine",
            ConfigField::Url => "url",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Defaults layer ────────────────────────────────────────────────

/// Optional fallback values for reaching a service.
///
/// Both fields are independently optional. An instance with neither set is
/// valid and means "no defaults". Instances are built once at configuration
/// time and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefaults {
    /// Default engine/model identifier (e.g. `"gpt-4o-mini"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Default service endpoint (e.g. `"https://api.openai.com/v1"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Caller-supplied override. Same shape as a defaults layer, but always
/// consulted before any layer.
pub type PartialConfiguration = ServiceDefaults;

impl ServiceDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Raw value of `field`, blank or not.
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        match field {
            ConfigField::Engine => self.engine.as_deref(),
            ConfigField::Url => self.url.as_deref(),
        }
    }

    /// Value of `field` if it is present and not blank, exactly as stored.
    pub fn value(&self, field: ConfigField) -> Option<&str> {
        self.get(field).filter(|value| !value.trim().is_empty())
    }

    /// True when neither field carries a usable value.
    pub fn is_empty(&self) -> bool {
        ConfigField::ALL
            .iter()
            .all(|field| self.value(*field).is_none())
    }
}

// ── Resolved output ───────────────────────────────────────────────

/// Fully resolved configuration handed to adapters.
///
/// Only [`resolve`](super::resolve) constructs this, and only once both
/// fields hold a non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfiguration {
    engine: String,
    url: String,
}

impl ResolvedConfiguration {
    pub(crate) fn new(engine: String, url: String) -> Self {
        Self { engine, url }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn get(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::Engine => &self.engine,
            ConfigField::Url => &self.url,
        }
    }
}
