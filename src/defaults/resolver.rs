//! Layered defaults resolution.
//!
//! Merges an explicit override with an ordered chain of defaults layers.
//!
//! # Precedence (highest to lowest)
//!
//! 1. Caller override
//! 2. Each layer, in the order given (most specific first)
//!
//! Every field is resolved independently: the engine may come from one layer
//! and the url from another.

use super::types::{ConfigField, PartialConfiguration, ResolvedConfiguration, ServiceDefaults};
use thiserror::Error;

/// Neither the override nor any layer supplied a value for `field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no value for `{field}`: set it explicitly or add it to a defaults layer")]
pub struct UnresolvedFieldError {
    pub field: ConfigField,
}

/// First usable value for `field`, scanning the override then each layer.
fn first_value<'a>(
    field: ConfigField,
    override_config: &'a PartialConfiguration,
    layers: &'a [ServiceDefaults],
) -> Result<&'a str, UnresolvedFieldError> {
    std::iter::once(override_config)
        .chain(layers)
        .find_map(|source| source.value(field))
        .ok_or(UnresolvedFieldError { field })
}

/// Resolve `override_config` against `layers`.
///
/// Pure and synchronous. Fails with the first unresolved field in
/// [`ConfigField::ALL`] order.
///
/// ```
/// use engine_defaults::defaults::{resolve, ServiceDefaults};
///
/// let layers = [
///     ServiceDefaults::new().with_engine("gpt-x"),
///     ServiceDefaults::new().with_url("https://svc/default"),
/// ];
/// let resolved = resolve(&ServiceDefaults::new(), &layers).unwrap();
/// assert_eq!(resolved.engine(), "gpt-x");
/// assert_eq!(resolved.url(), "https://svc/default");
/// ```
pub fn resolve(
    override_config: &PartialConfiguration,
    layers: &[ServiceDefaults],
) -> Result<ResolvedConfiguration, UnresolvedFieldError> {
    let engine = first_value(ConfigField::Engine, override_config, layers)?;
    let url = first_value(ConfigField::Url, override_config, layers)?;
    Ok(ResolvedConfiguration::new(engine.to_owned(), url.to_owned()))
}

/// Owns a fixed layer chain so callers only supply the override.
#[derive(Debug, Clone, Default)]
pub struct DefaultsResolver {
    layers: Vec<ServiceDefaults>,
}

impl DefaultsResolver {
    pub fn new(layers: Vec<ServiceDefaults>) -> Self {
        Self { layers }
    }

    /// Append a less specific layer behind the existing ones.
    pub fn with_layer(mut self, layer: ServiceDefaults) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[ServiceDefaults] {
        &self.layers
    }

    pub fn resolve(
        &self,
        override_config: &PartialConfiguration,
    ) -> Result<ResolvedConfiguration, UnresolvedFieldError> {
        resolve(override_config, &self.layers)
    }
}
