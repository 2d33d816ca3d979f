use super::traits::{ConfigIssueSeverity, ConfigValidator};
use super::validate::DefaultsValidator;
use crate::defaults::{
    resolve, PartialConfiguration, ResolvedConfiguration, ServiceDefaults, UnresolvedFieldError,
};
use crate::services::{self, LayerRegistry};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "ENGINE_DEFAULTS_CONFIG_DIR";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml`.
///
/// Directory resolution order: `ENGINE_DEFAULTS_CONFIG_DIR` env → `~/.engine-defaults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Service used when the caller names none (e.g. `"openai"`, `"ollama"`,
    /// `"custom:https://proxy.example.com/v1"`). Default: `"openai"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_service: Option<String>,
    /// Global fallback layer (`[defaults]`), consulted after any per-service layer.
    #[serde(default)]
    pub defaults: ServiceDefaults,
    /// Per-service layers (`[services.<name>]`). Keys match case-insensitively.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDefaults>,
    /// Layer built from environment variables - never serialized
    #[serde(skip)]
    pub env_layer: ServiceDefaults,
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".engine-defaults").join(CONFIG_FILE_NAME),
            default_service: Some("openai".to_string()),
            defaults: ServiceDefaults::default(),
            services: BTreeMap::new(),
            env_layer: ServiceDefaults::default(),
        }
    }
}

// ── Layer chain ───────────────────────────────────────────────────

/// Where a layer in a resolution chain came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    Environment,
    Service(String),
    Global,
    Registry(usize),
    Builtin(String),
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str("environment"),
            Self::Service(name) => write!(f, "services.{name}"),
            Self::Global => f.write_str("defaults"),
            Self::Registry(index) => write!(f, "registry[{index}]"),
            Self::Builtin(name) => write!(f, "builtin:{name}"),
        }
    }
}

// ── Directory resolution ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigResolutionSource {
    EnvConfigDir,
    DefaultConfigDir,
}

impl ConfigResolutionSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::EnvConfigDir => CONFIG_DIR_ENV,
            Self::DefaultConfigDir => "default",
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".engine-defaults"))
}

fn resolve_config_dir() -> Result<(PathBuf, ConfigResolutionSource)> {
    if let Ok(custom_config_dir) = std::env::var(CONFIG_DIR_ENV) {
        let custom_config_dir = custom_config_dir.trim();
        if !custom_config_dir.is_empty() {
            return Ok((
                PathBuf::from(custom_config_dir),
                ConfigResolutionSource::EnvConfigDir,
            ));
        }
    }

    Ok((default_config_dir()?, ConfigResolutionSource::DefaultConfigDir))
}

/// Path of the config file that [`Config::load_or_init`] would use.
pub fn resolve_config_path() -> Result<PathBuf> {
    let (dir, _) = resolve_config_dir()?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Read `primary`, falling back to `fallback` only when `primary` is unset.
/// Blank values count as absent.
fn env_value(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// ── Config impl ──────────────────────────────────────────────────

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let (config_dir, resolution_source) = resolve_config_dir()?;
        let config = Self::load_or_init_at(&config_dir).await?;
        tracing::info!(
            path = %config.config_path.display(),
            source = resolution_source.as_str(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, writing a default file first if
    /// none exists. Env overrides are applied and the result validated.
    pub async fn load_or_init_at(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let mut config = if config_path.exists() {
            // Warn if config file is world-readable
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config = Self::from_toml(&contents)?;
            config.config_path = config_path;
            tracing::debug!(path = %config.config_path.display(), initialized = false, "Config read");
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            tracing::debug!(path = %config.config_path.display(), initialized = true, "Config written");
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config document. Computed fields are left empty.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Validate configuration values that would make resolution misbehave.
    ///
    /// Fails on the first error-level issue; warnings are logged.
    pub fn validate(&self) -> Result<()> {
        let validator = DefaultsValidator;
        for issue in validator.validate(self) {
            match issue.severity {
                ConfigIssueSeverity::Error => {
                    anyhow::bail!("{}: {}", issue.field, issue.message);
                }
                ConfigIssueSeverity::Warning => {
                    tracing::warn!(
                        field = %issue.field,
                        validator = validator.name(),
                        "{}",
                        issue.message
                    );
                }
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // Engine: ENGINE_DEFAULTS_ENGINE or ENGINE
        if let Some(engine) = env_value("ENGINE_DEFAULTS_ENGINE", "ENGINE") {
            self.env_layer.engine = Some(engine);
        }

        // Endpoint: ENGINE_DEFAULTS_URL or API_URL
        if let Some(url) = env_value("ENGINE_DEFAULTS_URL", "API_URL") {
            self.env_layer.url = Some(url);
        }

        // Service: ENGINE_DEFAULTS_SERVICE
        if let Ok(service) = std::env::var("ENGINE_DEFAULTS_SERVICE") {
            let service = service.trim();
            if !service.is_empty() {
                self.default_service = Some(service.to_string());
            }
        }
    }

    /// The service a chain is built for: `requested` if non-blank, else
    /// `default_service`.
    pub fn effective_service<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.default_service
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
            })
    }

    /// Configured `[services.<name>]` layer for `name`.
    ///
    /// Matches keys case-insensitively, and accepts a built-in service's
    /// canonical name or aliases interchangeably.
    pub fn service_layer(&self, name: &str) -> Option<(&str, &ServiceDefaults)> {
        let name = name.trim();
        let mut candidates = vec![name];
        if let Some(info) = services::find_service(name) {
            candidates.push(info.name);
            candidates.extend(info.aliases.iter().copied());
        }

        candidates.iter().find_map(|candidate| {
            self.services
                .iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(candidate))
                .map(|(key, layer)| (key.as_str(), layer))
        })
    }

    /// Ordered, labelled layer chain for `service`, most specific first:
    /// environment, `[services.<name>]`, `[defaults]`, `registry`, built-in.
    /// Layers without a usable value are left out.
    pub fn labeled_layers_with(
        &self,
        service: Option<&str>,
        registry: &[ServiceDefaults],
    ) -> Vec<(LayerSource, ServiceDefaults)> {
        let service = self.effective_service(service);
        let mut layers = Vec::with_capacity(4 + registry.len());

        layers.push((LayerSource::Environment, self.env_layer.clone()));
        if let Some((key, layer)) = service.and_then(|name| self.service_layer(name)) {
            layers.push((LayerSource::Service(key.to_string()), layer.clone()));
        }
        layers.push((LayerSource::Global, self.defaults.clone()));
        layers.extend(
            registry
                .iter()
                .enumerate()
                .map(|(index, layer)| (LayerSource::Registry(index), layer.clone())),
        );
        if let Some(name) = service {
            if let Some(layer) = services::builtin_defaults(name) {
                layers.push((LayerSource::Builtin(name.to_string()), layer));
            }
        }

        layers.retain(|(_, layer)| !layer.is_empty());
        layers
    }

    /// Unlabelled chain against an explicit registry snapshot.
    pub fn layers_with(
        &self,
        service: Option<&str>,
        registry: &[ServiceDefaults],
    ) -> Vec<ServiceDefaults> {
        self.labeled_layers_with(service, registry)
            .into_iter()
            .map(|(_, layer)| layer)
            .collect()
    }

    /// Chain for `service` using the process-wide [`LayerRegistry`].
    pub fn layers_for(&self, service: Option<&str>) -> Vec<ServiceDefaults> {
        let registry = LayerRegistry::global().snapshot();
        self.layers_with(service, &registry)
    }

    /// Resolve `override_config` for `service` against this config's chain.
    pub fn resolve(
        &self,
        service: Option<&str>,
        override_config: &PartialConfiguration,
    ) -> std::result::Result<ResolvedConfiguration, UnresolvedFieldError> {
        resolve(override_config, &self.layers_for(service))
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::ConfigField;
    #[cfg(unix)]
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};
    use tokio::sync::{Mutex, MutexGuard};

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.default_service.as_deref(), Some("openai"));
        assert!(c.defaults.is_empty());
        assert!(c.services.is_empty());
        assert!(c.env_layer.is_empty());
        assert!(c.config_path.ends_with("config.toml"));
    }

    #[test]
    fn default_config_resolves_through_builtin_catalog() {
        let c = Config::default();
        let resolved = resolve(&ServiceDefaults::new(), &c.layers_with(None, &[])).unwrap();
        assert_eq!(resolved.engine(), "gpt-4o-mini");
        assert_eq!(resolved.url(), "https://api.openai.com/v1");
    }

    #[test]
    fn config_minimal_toml_uses_defaults() {
        let c = Config::from_toml("").unwrap();
        assert!(c.default_service.is_none());
        assert!(c.defaults.is_empty());
        assert!(c.services.is_empty());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config::default();
        config.defaults = ServiceDefaults::new().with_engine("gpt-x");
        config.services.insert(
            "internal".into(),
            ServiceDefaults::new().with_url("https://llm.internal.example/v1"),
        );
        config.env_layer = ServiceDefaults::new().with_engine("not-persisted");

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("not-persisted"));

        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.default_service, config.default_service);
        assert_eq!(parsed.defaults, config.defaults);
        assert_eq!(parsed.services, config.services);
        assert!(parsed.env_layer.is_empty());
    }

    #[test]
    fn config_rejects_unknown_top_level_keys() {
        let err = Config::from_toml("default_model = \"gpt-x\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    // ── Layer chain ──────────────────────────────────────────

    fn layered_config() -> Config {
        Config::from_toml(
            r#"
default_service = "openai"

[defaults]
engine = "global-engine"
url = "https://global.example/v1"

[services.openai]
engine = "service-engine"

[services.Internal]
url = "https://llm.internal.example/v1"
"#,
        )
        .unwrap()
    }

    #[test]
    fn layers_are_ordered_most_specific_first() {
        let mut config = layered_config();
        config.env_layer = ServiceDefaults::new().with_url("https://env.example");
        let registry = [ServiceDefaults::new().with_engine("registry-engine")];

        let sources: Vec<String> = config
            .labeled_layers_with(None, &registry)
            .into_iter()
            .map(|(source, _)| source.to_string())
            .collect();
        assert_eq!(
            sources,
            [
                "environment",
                "services.openai",
                "defaults",
                "registry[0]",
                "builtin:openai"
            ]
        );
    }

    #[test]
    fn service_layer_beats_global_defaults() {
        let config = layered_config();
        let resolved =
            resolve(&ServiceDefaults::new(), &config.layers_with(Some("openai"), &[])).unwrap();
        assert_eq!(resolved.engine(), "service-engine");
        assert_eq!(resolved.url(), "https://global.example/v1");
    }

    #[test]
    fn environment_layer_beats_service_layer() {
        let mut config = layered_config();
        config.env_layer = ServiceDefaults::new().with_engine("env-engine");
        let resolved =
            resolve(&ServiceDefaults::new(), &config.layers_with(Some("openai"), &[])).unwrap();
        assert_eq!(resolved.engine(), "env-engine");
    }

    #[test]
    fn caller_override_beats_everything() {
        let mut config = layered_config();
        config.env_layer = ServiceDefaults::new().with_engine("env-engine");
        let overrides = ServiceDefaults::new().with_engine("cli-engine");
        let resolved = resolve(&overrides, &config.layers_with(Some("openai"), &[])).unwrap();
        assert_eq!(resolved.engine(), "cli-engine");
    }

    #[test]
    fn service_keys_match_case_insensitively() {
        let config = layered_config();
        let (key, layer) = config.service_layer("internal").unwrap();
        assert_eq!(key, "Internal");
        assert_eq!(
            layer.value(ConfigField::Url),
            Some("https://llm.internal.example/v1")
        );
    }

    #[test]
    fn service_layer_accepts_builtin_aliases() {
        let config = Config::from_toml(
            r#"
[services.anthropic]
engine = "claude-custom"
"#,
        )
        .unwrap();
        let (key, _) = config.service_layer("claude").unwrap();
        assert_eq!(key, "anthropic");

        let resolved =
            resolve(&ServiceDefaults::new(), &config.layers_with(Some("claude"), &[])).unwrap();
        assert_eq!(resolved.engine(), "claude-custom");
        assert_eq!(resolved.url(), "https://api.anthropic.com/v1");
    }

    #[test]
    fn unknown_configured_service_without_url_is_unresolved() {
        let config = Config::from_toml(
            r#"
[services.internal]
engine = "in-house"
"#,
        )
        .unwrap();
        let err = resolve(&ServiceDefaults::new(), &config.layers_with(Some("internal"), &[]))
            .unwrap_err();
        assert_eq!(err.field, ConfigField::Url);
    }

    #[test]
    fn custom_service_supplies_url() {
        let config = Config {
            default_service: Some("custom:https://proxy.example.com/v1".into()),
            defaults: ServiceDefaults::new().with_engine("proxy-model"),
            ..Config::default()
        };
        let resolved = resolve(&ServiceDefaults::new(), &config.layers_with(None, &[])).unwrap();
        assert_eq!(resolved.engine(), "proxy-model");
        assert_eq!(resolved.url(), "https://proxy.example.com/v1");
    }

    #[test]
    fn no_service_and_no_defaults_fails_on_engine() {
        let config = Config {
            default_service: None,
            ..Config::default()
        };
        let err =
            resolve(&ServiceDefaults::new(), &config.layers_with(None, &[])).unwrap_err();
        assert_eq!(err.field, ConfigField::Engine);
    }

    #[test]
    fn config_resolve_applies_override_and_service() {
        let config = layered_config();
        let overrides = ServiceDefaults::new().with_url("https://cli.example");
        let resolved = config.resolve(Some("openai"), &overrides).unwrap();
        assert_eq!(resolved.engine(), "service-engine");
        assert_eq!(resolved.url(), "https://cli.example");
    }

    #[test]
    fn requested_service_overrides_default_service() {
        let config = Config::default();
        assert_eq!(config.effective_service(Some("ollama")), Some("ollama"));
        assert_eq!(config.effective_service(Some("  ")), Some("openai"));
        assert_eq!(config.effective_service(None), Some("openai"));
    }

    // ── Env override helpers ─────────────────────────────────

    async fn env_override_lock() -> MutexGuard<'static, ()> {
        static ENV_OVERRIDE_TEST_LOCK: Mutex<()> = Mutex::const_new(());
        ENV_OVERRIDE_TEST_LOCK.lock().await
    }

    fn clear_env_test_vars() {
        for key in [
            "ENGINE_DEFAULTS_ENGINE",
            "ENGINE",
            "ENGINE_DEFAULTS_URL",
            "API_URL",
            "ENGINE_DEFAULTS_SERVICE",
            CONFIG_DIR_ENV,
        ] {
            std::env::remove_var(key);
        }
    }

    // ── Env override tests ───────────────────────────────────

    #[tokio::test]
    async fn env_override_engine() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("ENGINE_DEFAULTS_ENGINE", "gpt-env");
        config.apply_env_overrides();
        assert_eq!(config.env_layer.engine.as_deref(), Some("gpt-env"));

        clear_env_test_vars();
    }

    #[tokio::test]
    async fn env_override_engine_fallback() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("ENGINE", "gpt-fallback");
        config.apply_env_overrides();
        assert_eq!(config.env_layer.engine.as_deref(), Some("gpt-fallback"));

        clear_env_test_vars();
    }

    #[tokio::test]
    async fn env_override_prefixed_var_wins_over_fallback() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("ENGINE_DEFAULTS_URL", "https://prefixed.example");
        std::env::set_var("API_URL", "https://generic.example");
        config.apply_env_overrides();
        assert_eq!(
            config.env_layer.url.as_deref(),
            Some("https://prefixed.example")
        );

        clear_env_test_vars();
    }

    #[tokio::test]
    async fn env_override_service() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("ENGINE_DEFAULTS_SERVICE", "ollama");
        config.apply_env_overrides();
        assert_eq!(config.default_service.as_deref(), Some("ollama"));

        let resolved = resolve(&ServiceDefaults::new(), &config.layers_with(None, &[])).unwrap();
        assert_eq!(resolved.url(), "http://localhost:11434");

        clear_env_test_vars();
    }

    #[tokio::test]
    async fn env_override_empty_values_ignored() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("ENGINE_DEFAULTS_ENGINE", "   ");
        std::env::set_var("ENGINE_DEFAULTS_SERVICE", "");
        config.apply_env_overrides();
        assert!(config.env_layer.is_empty());
        assert_eq!(config.default_service.as_deref(), Some("openai"));

        clear_env_test_vars();
    }

    // ── Load / save ──────────────────────────────────────────

    #[tokio::test]
    async fn sync_directory_handles_existing_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        sync_directory(tmp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn load_or_init_writes_default_config() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("nested");

        let config = Config::load_or_init_at(&dir).await.unwrap();
        assert_eq!(config.config_path, dir.join("config.toml"));
        assert!(config.config_path.exists());
        assert_eq!(config.default_service.as_deref(), Some("openai"));

        #[cfg(unix)]
        {
            let mode = std::fs::metadata(&config.config_path)
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600, "New config file should be owner-only, got {mode:o}");
        }
    }

    #[tokio::test]
    async fn load_or_init_reads_existing_config() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "default_service = \"ollama\"\n\n[defaults]\nengine = \"llama3.1\"\n",
        )
        .unwrap();

        let config = Config::load_or_init_at(tmp.path()).await.unwrap();
        let resolved = resolve(&ServiceDefaults::new(), &config.layers_with(None, &[])).unwrap();
        assert_eq!(resolved.engine(), "llama3.1");
        assert_eq!(resolved.url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn load_or_init_rejects_invalid_url() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[services.openai]\nurl = \"ftp://files.example.com\"\n",
        )
        .unwrap();

        let err = Config::load_or_init_at(tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("services.openai.url"));
    }

    #[tokio::test]
    async fn load_or_init_uses_env_config_dir() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, tmp.path());

        assert_eq!(resolve_config_path().unwrap(), tmp.path().join("config.toml"));
        let config = Config::load_or_init().await.unwrap();
        assert_eq!(config.config_path, tmp.path().join("config.toml"));

        clear_env_test_vars();
    }

    #[tokio::test]
    async fn config_save_and_load_tmpdir() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();

        let mut config = Config::default();
        config.config_path = tmp.path().join("config.toml");
        config.services.insert(
            "openai".into(),
            ServiceDefaults::new().with_engine("gpt-roundtrip"),
        );
        config.save().await.unwrap();

        let loaded = Config::load_or_init_at(tmp.path()).await.unwrap();
        assert_eq!(loaded.services, config.services);
    }

    #[tokio::test]
    async fn config_save_atomic_replaces_cleanly() {
        let tmp = tempfile::TempDir::new().unwrap();

        let mut config = Config::default();
        config.config_path = tmp.path().join("config.toml");
        config.defaults.engine = Some("model-a".into());
        config.save().await.unwrap();

        config.defaults.engine = Some("model-b".into());
        config.save().await.unwrap();

        let contents = tokio::fs::read_to_string(&config.config_path).await.unwrap();
        assert!(contents.contains("model-b"));

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(!names.iter().any(|name| name.contains(".tmp-")));
        assert!(!names.iter().any(|name| name.ends_with(".bak")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn world_readable_config_still_loads() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let tmp = tempfile::TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(&config_path, "default_service = \"anthropic\"\n").unwrap();
        std::fs::set_permissions(&config_path, Permissions::from_mode(0o644)).unwrap();

        let config = Config::load_or_init_at(tmp.path()).await.unwrap();
        assert_eq!(config.default_service.as_deref(), Some("anthropic"));
    }
}
