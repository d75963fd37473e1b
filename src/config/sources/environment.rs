//! Environment variable source: FILEWATCH_* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix of every configuration environment variable
pub const ENV_PREFIX: &str = "FILEWATCH";

/// Add environment variable overlay to builder.
/// `FILEWATCH_NODE__NODE_ID=n1` sets `node.node_id`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
