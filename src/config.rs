//! Link configuration.
//!
//! A [`LinkConfig`] describes one endpoint's attachment to its router:
//! port identity, advertised bandwidth, virtual-network count and buffer
//! sizes. Configurations can be built programmatically or loaded from
//! YAML/JSON files.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! port_name: nic0
//! bandwidth: 10Gb/s
//! num_vns: 2
//! in_buf_size: 4KB
//! out_buf_size: 4KB
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{Bandwidth, BufferSize, UnitError};

/// Errors that can occur while loading or validating a link configuration.
///
/// These are fatal: a bad configuration indicates a misconfigured topology
/// and the run should abort with the diagnostic.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration of one link endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Name of the router port this endpoint attaches to.
    pub port_name: String,

    /// Advertised link bandwidth. The effective bandwidth after
    /// negotiation is the minimum of both sides' advertisements.
    pub bandwidth: Bandwidth,

    /// Number of virtual networks to request.
    pub num_vns: usize,

    /// Inbound buffer size per VN.
    pub in_buf_size: BufferSize,

    /// Outbound buffer size per VN.
    pub out_buf_size: BufferSize,
}

impl LinkConfig {
    /// Creates a configuration from string-form quantities.
    ///
    /// Fails if a quantity carries an unrecognized unit.
    pub fn new(
        port_name: impl Into<String>,
        bandwidth: &str,
        num_vns: usize,
        in_buf_size: &str,
        out_buf_size: &str,
    ) -> ConfigResult<Self> {
        let config = Self {
            port_name: port_name.into(),
            bandwidth: Bandwidth::parse(bandwidth)?,
            num_vns,
            in_buf_size: BufferSize::parse(in_buf_size)?,
            out_buf_size: BufferSize::parse(out_buf_size)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: LinkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: LinkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a file, auto-detecting the format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path)?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_vns == 0 {
            return Err(ConfigError::Validation(format!(
                "port {}: num_vns must be at least 1",
                self.port_name
            )));
        }
        if self.in_buf_size.bits() == 0 || self.out_buf_size.bits() == 0 {
            return Err(ConfigError::Validation(format!(
                "port {}: buffer sizes must be non-zero",
                self.port_name
            )));
        }
        if self.bandwidth.bits_per_sec() <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "port {}: bandwidth must be positive",
                self.port_name
            )));
        }
        Ok(())
    }

    /// Converts to a YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
