//! MergeService: orchestrates sources and deserializes to FilewatchConfig.

use crate::config::sources::{environment, file};
use crate::config::FilewatchConfig;
use config::{Config, ConfigError};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from `path` and the environment.
    /// Precedence: field defaults (lowest) -> file -> environment (highest).
    pub fn load(path: &Path) -> Result<FilewatchConfig, ConfigError> {
        let builder = Config::builder();
        let builder = file::add_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
