//! Decoding raw config bytes into a keyed config map.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Routing key -> domain config, as produced by one successful decode.
pub type DecodedConfigMap<C> = HashMap<String, C>;

/// Error type for config decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("config does not match the expected shape: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Turns raw file bytes into a generic value tree.
///
/// Implementations must not have side effects: a failed decode leaves every
/// piece of live state untouched.
pub trait Decoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<Value, DecodeError>;
}

impl<F> Decoder for F
where
    F: Fn(&[u8]) -> Result<Value, DecodeError> + Send + Sync,
{
    fn decode(&self, data: &[u8]) -> Result<Value, DecodeError> {
        self(data)
    }
}

/// Built-in file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    /// YAML is a superset of JSON, so this also reads JSON files.
    #[default]
    Yaml,
    Toml,
}

impl Format {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Yaml => write!(f, "yaml"),
            Format::Toml => write!(f, "toml"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => Err(format!("unknown config format: {}", other)),
        }
    }
}

impl Decoder for Format {
    fn decode(&self, data: &[u8]) -> Result<Value, DecodeError> {
        match self {
            Format::Json => serde_json::from_slice(data).map_err(DecodeError::Json),
            Format::Yaml => Ok(serde_yaml::from_slice(data)?),
            Format::Toml => {
                let text = std::str::from_utf8(data)?;
                Ok(toml::from_str(text)?)
            }
        }
    }
}

/// Typed front of a decoder: yields the routing-key map for one config shape.
pub struct ConfigManager<C> {
    decoder: Arc<dyn Decoder>,
    _config: PhantomData<fn() -> C>,
}

impl<C> Clone for ConfigManager<C> {
    fn clone(&self) -> Self {
        Self {
            decoder: self.decoder.clone(),
            _config: PhantomData,
        }
    }
}

impl<C> fmt::Debug for ConfigManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("config", &std::any::type_name::<C>())
            .finish()
    }
}

impl<C: DeserializeOwned> ConfigManager<C> {
    pub fn new(decoder: impl Decoder + 'static) -> Self {
        Self {
            decoder: Arc::new(decoder),
            _config: PhantomData,
        }
    }

    /// Manager for the format implied by `path`, falling back to YAML.
    pub fn for_path(path: &Path) -> Self {
        Self::new(Format::from_path(path).unwrap_or_default())
    }

    /// Decode a whole file into a fresh map.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedConfigMap<C>, DecodeError> {
        let value = self.decoder.decode(data)?;
        serde_json::from_value(value).map_err(DecodeError::Shape)
    }
}
