//! Service-defaults resolution.
//!
//! A caller override and an ordered chain of [`ServiceDefaults`] layers are
//! merged into a [`ResolvedConfiguration`] by [`resolve`]. Layers are passed
//! explicitly, most specific first; nothing here reads global state.

pub mod resolver;
pub mod types;

#[allow(unused_imports)]
pub use resolver::{resolve, DefaultsResolver, UnresolvedFieldError};
#[allow(unused_imports)]
pub use types::{ConfigField, PartialConfiguration, ResolvedConfiguration, ServiceDefaults};
