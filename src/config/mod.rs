//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host config (~/.config/nova-mlops/config.toml)
//! 3. Project config (.nova-mlops/config.toml, or --config)
//! 4. CLI flags (--state-dir, --cloud)

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    default_host_config_path, CliOverrides, ConfigError, ConfigOrigin, ConfigSource,
    EffectiveConfig, PROJECT_CONFIG_PATH,
};
pub use merge::{deep_merge, merge_layers, merge_into};
pub use settings::{OpenStackSettings, PayloadSettings, Settings, WaitSettings};

/// Load settings from the standard locations plus CLI overrides
pub fn load(
    project_config_path: Option<&std::path::Path>,
    overrides: &CliOverrides,
) -> Result<(EffectiveConfig, Settings), ConfigError> {
    let host = default_host_config_path();
    let project = project_config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from(PROJECT_CONFIG_PATH));

    // An explicit --config must exist
    if let Some(explicit) = project_config_path {
        if !explicit.exists() {
            return Err(ConfigError::IoError(format!(
                "config file not found: {}",
                explicit.display()
            )));
        }
    }

    let effective = EffectiveConfig::build(host.as_deref(), Some(&project), overrides.to_value())?;
    let settings = effective.settings()?;
    Ok((effective, settings))
}
