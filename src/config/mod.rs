pub mod schema;
pub mod traits;
pub mod validate;

#[allow(unused_imports)]
pub use schema::{resolve_config_path, Config, LayerSource};
#[allow(unused_imports)]
pub use traits::{ConfigIssue, ConfigIssueSeverity, ConfigValidator};
#[allow(unused_imports)]
pub use validate::DefaultsValidator;
