//! Built-in validator for defaults layers.

use super::traits::{ConfigIssue, ConfigValidator};
use crate::defaults::{ConfigField, ServiceDefaults};
use crate::services;

/// Checks every configured layer for blank values and unusable endpoints,
/// and that `default_service` names something resolvable.
pub struct DefaultsValidator;

impl ConfigValidator for DefaultsValidator {
    fn validate(&self, config: &crate::Config) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        check_layer("environment", &config.env_layer, &mut issues);
        check_layer("defaults", &config.defaults, &mut issues);
        for (name, layer) in &config.services {
            check_layer(&format!("services.{name}"), layer, &mut issues);
        }

        if let Some(service) = config.default_service.as_deref() {
            let service = service.trim();
            if service.is_empty() {
                issues.push(ConfigIssue::warning(
                    "default_service",
                    "is empty and will be ignored",
                ));
            } else if let Some(url) = services::custom_service_url(service) {
                if url.is_empty() {
                    issues.push(ConfigIssue::error(
                        "default_service",
                        format!("'{service}' does not name an endpoint after `custom:`"),
                    ));
                } else if let Err(message) = check_url(url) {
                    issues.push(ConfigIssue::error("default_service", message));
                }
            } else if config.service_layer(service).is_none() && !services::is_known_service(service)
            {
                issues.push(ConfigIssue::warning(
                    "default_service",
                    format!(
                        "'{service}' is neither a built-in service nor a [services.{service}] section"
                    ),
                ));
            }
        }

        issues
    }

    fn name(&self) -> &str {
        "defaults"
    }
}

fn check_layer(prefix: &str, layer: &ServiceDefaults, issues: &mut Vec<ConfigIssue>) {
    for field in ConfigField::ALL {
        let Some(raw) = layer.get(field) else {
            continue;
        };
        let key = format!("{prefix}.{field}");
        if raw.trim().is_empty() {
            issues.push(ConfigIssue::warning(
                key,
                "is blank and will be treated as unset",
            ));
            continue;
        }
        if field == ConfigField::Url {
            if let Err(message) = check_url(raw.trim()) {
                issues.push(ConfigIssue::error(key, message));
            }
        }
    }
}

fn check_url(url: &str) -> Result<(), String> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| format!("'{url}' is not a valid URL ({e})"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("scheme '{scheme}' is not supported (http, https)")),
    }

    if parsed.host_str().is_none() {
        return Err(format!("'{url}' has no host"));
    }

    Ok(())
}
