//! Import configuration.
//!
//! The config file is JSON, e.g.
//!
//! ```json
//! {
//!   "atom_message_name": ".android.os.statsd.Atom",
//!   "track_name": "Statsd Atoms",
//!   "descriptor_path": "/path/to/atoms.descriptor"
//! }
//! ```
//!
//! Every key is optional. `descriptor_path` points at a binary
//! `FileDescriptorSet`; without it the built-in atom schema is used.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::descriptors::DescriptorError;
use crate::statsd::{AtomSchema, ATOM_MESSAGE_NAME, DEFAULT_TRACK_NAME};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid descriptor set {}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ImportConfig {
    /// Fully qualified name of the message whose fields are the atoms.
    pub atom_message_name: String,
    /// Name of the track every atom slice is placed on.
    pub track_name: String,
    pub descriptor_path: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            atom_message_name: ATOM_MESSAGE_NAME.to_string(),
            track_name: DEFAULT_TRACK_NAME.to_string(),
            descriptor_path: None,
        }
    }
}

impl ImportConfig {
    pub fn from_json(buf: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(buf)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let buf = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&buf).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the atom schema this config describes.
    pub fn load_schema(&self) -> Result<AtomSchema, ConfigError> {
        let Some(path) = &self.descriptor_path else {
            if self.atom_message_name == ATOM_MESSAGE_NAME {
                return Ok(AtomSchema::builtin());
            }
            return Ok(AtomSchema::new(
                AtomSchema::builtin().into_pool(),
                &self.atom_message_name,
            ));
        };

        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Loaded {} bytes of atom descriptors from {}", bytes.len(), path.display());
        AtomSchema::from_descriptor_set_bytes(&bytes, &self.atom_message_name).map_err(|source| {
            ConfigError::Descriptor {
                path: path.clone(),
                source,
            }
        })
    }
}
