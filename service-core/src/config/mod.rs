use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Where a service reads its configuration from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Base name of the config file, extension resolved by the `config` crate.
    pub file: String,
    /// Prefix for environment overrides, e.g. `PAYLINK` for `PAYLINK__SERVER__PORT`.
    pub env_prefix: String,
}

impl ConfigSource {
    pub fn new(file: impl Into<String>, env_prefix: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            env_prefix: env_prefix.into(),
        }
    }
}

/// Load a layered configuration: optional file first, then environment.
///
/// A missing file is fine, every field is expected to carry a serde default.
pub fn load<T: DeserializeOwned>(source: &ConfigSource) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(&source.file).required(false))
        .add_source(
            Environment::with_prefix(&source.env_prefix)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
