//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::FilewatchConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from `path` (optional) with environment overlay.
    pub fn load(path: &Path) -> Result<FilewatchConfig, ConfigError> {
        MergeService::load(path)
    }

    /// Whether `path` would contribute to a load.
    pub fn is_present(path: &Path) -> bool {
        path.is_file()
    }
}
