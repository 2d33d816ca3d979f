//! Built-in service catalog.
//!
//! Each known AI service carries a default engine and endpoint. The catalog
//! entry is the least specific layer in a resolution chain; anything set in
//! config, the environment, or by the caller takes precedence.
//!
//! Besides canonical names and aliases, `custom:<URL>` names any
//! OpenAI-compatible endpoint and contributes only that URL.

pub mod registry;

#[allow(unused_imports)]
pub use registry::LayerRegistry;

use crate::defaults::ServiceDefaults;

/// Prefix selecting an arbitrary endpoint by URL.
pub const CUSTOM_SERVICE_PREFIX: &str = "custom:";

/// Information about a built-in service for display and defaults.
#[derive(Debug, Clone, Copy)]
pub struct ServiceInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// Whether the service runs locally (no API key required)
    pub local: bool,
    /// Default engine/model
    pub engine: &'static str,
    /// Default endpoint
    pub url: &'static str,
}

impl ServiceInfo {
    pub fn defaults(&self) -> ServiceDefaults {
        ServiceDefaults::new()
            .with_engine(self.engine)
            .with_url(self.url)
    }

    /// Case-insensitive match on the canonical name or any alias.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

const SERVICES: &[ServiceInfo] = &[
    ServiceInfo {
        name: "openai",
        display_name: "OpenAI",
        aliases: &[],
        local: false,
        engine: "gpt-4o-mini",
        url: "https://api.openai.com/v1",
    },
    ServiceInfo {
        name: "anthropic",
        display_name: "Anthropic",
        aliases: &["claude"],
        local: false,
        engine: "claude-sonnet-4-20250514",
        url: "https://api.anthropic.com/v1",
    },
    ServiceInfo {
        name: "openrouter",
        display_name: "OpenRouter",
        aliases: &[],
        local: false,
        engine: "anthropic/claude-sonnet-4.6",
        url: "https://openrouter.ai/api/v1",
    },
    ServiceInfo {
        name: "ollama",
        display_name: "Ollama",
        aliases: &["local"],
        local: true,
        engine: "llama3.2",
        url: "http://localhost:11434",
    },
];

/// Return every built-in service, in display order.
pub fn list_services() -> &'static [ServiceInfo] {
    SERVICES
}

/// Look up a built-in service by canonical name or alias.
pub fn find_service(name: &str) -> Option<&'static ServiceInfo> {
    SERVICES.iter().find(|info| info.matches(name))
}

/// Catalog defaults layer for `name`, if it names a known service or a
/// `custom:<URL>` endpoint.
pub fn builtin_defaults(name: &str) -> Option<ServiceDefaults> {
    if let Some(url) = custom_service_url(name) {
        if url.is_empty() {
            return None;
        }
        return Some(ServiceDefaults::new().with_url(url));
    }
    find_service(name).map(ServiceInfo::defaults)
}

/// True when `name` resolves to a catalog entry or a custom endpoint.
pub fn is_known_service(name: &str) -> bool {
    builtin_defaults(name).is_some()
}

/// Endpoint named by a `custom:<URL>` service, trimmed and possibly empty.
/// `None` when `name` is not a custom service.
pub fn custom_service_url(name: &str) -> Option<&str> {
    let name = name.trim();
    let prefix_len = CUSTOM_SERVICE_PREFIX.len();
    if name.len() >= prefix_len
        && name.is_char_boundary(prefix_len)
        && name[..prefix_len].eq_ignore_ascii_case(CUSTOM_SERVICE_PREFIX)
    {
        Some(name[prefix_len..].trim())
    } else {
        None
    }
}
