//! Merge rules: built-in defaults, applied beneath every other source.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("store.bundle", "schemas")?
        .set_default("store.migrate_automatically", true)?
        .set_default("store.infer_mapping_automatically", true)?
        .set_default("contexts.read_only", false)?
        .set_default("contexts.auto_merge_incoming", true)
}
