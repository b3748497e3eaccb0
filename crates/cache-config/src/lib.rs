//! Configuration of a normalized cache instance.
//!
//! Every cache is built from one [`CacheConfig`]. It is usually embedded in a larger
//! application configuration, but can be loaded on its own from TOML:
//!
//! ```toml
//! default_keys = ["id"]
//! default_list_position = "last"
//!
//! [types.Book]
//! keys = ["isbn"]
//! ```

pub mod identity;
pub mod lists;

use std::path::Path;

pub use identity::*;
pub use lists::*;

use indexmap::IndexMap;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read the cache configuration at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cache configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("type {type_name} is configured with an empty key list")]
    EmptyKeys { type_name: String },
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Settings shared by every operation of one cache instance.
pub struct CacheConfig {
    /// Fields used to identify records when a type has no explicit configuration
    pub default_keys: Vec<String>,
    /// Per-type identity overrides
    pub types: IndexMap<String, TypeConfig>,
    /// Where list insertions land when an operation does not say
    pub default_list_position: ListPosition,
    /// Which list instances an operation targets when it names no parent
    pub default_list_target: ListTarget,
    /// Number of garbage collection ticks an unused field survives
    pub default_lifetime: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_keys: vec![String::from("id")],
            types: IndexMap::new(),
            default_list_position: ListPosition::default(),
            default_list_target: ListTarget::default(),
            default_lifetime: 10,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(input)?;
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&input)
    }

    /// The key fields identifying records of the given type, in the order they compose the id.
    pub fn keys_for(&self, type_name: &str) -> &[String] {
        self.types
            .get(type_name)
            .and_then(|config| config.keys.as_deref())
            .unwrap_or(&self.default_keys)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (type_name, config) in &self.types {
            if config.keys.as_ref().is_some_and(|keys| keys.is_empty()) {
                return Err(ConfigError::EmptyKeys {
                    type_name: type_name.clone(),
                });
            }
        }

        Ok(())
    }
}
