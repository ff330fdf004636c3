//! Codec configuration.
//!
//! [`CodecConfig`] is built programmatically through [`CodecConfigBuilder`] or
//! loaded from a TOML file or `GRIDWIRE_*` environment variables.
//!
//! # Example TOML
//!
//! ```toml
//! max-array-length = 1048576
//! max-nesting-depth = 32
//! initial-buffer-capacity = 512
//! encode-chunk-size = 16384
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GridwireError, Result};
use crate::protocol::MAX_ATOMIC_UNIT;

/// Default upper bound on decoded array, collection, map and blob lengths.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 16 * 1024 * 1024;

/// Default upper bound on message nesting and recursive value decoding.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

/// Default starting capacity of growable marshalling buffers.
pub const DEFAULT_INITIAL_BUFFER_CAPACITY: usize = 256;

/// Default buffer size handed to the encoder per step by [`MessageCodec`](crate::protocol::MessageCodec).
pub const DEFAULT_ENCODE_CHUNK_SIZE: usize = 8192;

/// Limits and sizing for the object codec and the message framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    max_array_length: usize,
    max_nesting_depth: usize,
    initial_buffer_capacity: usize,
    encode_chunk_size: usize,
}

impl CodecConfig {
    /// Creates a new builder.
    pub fn builder() -> CodecConfigBuilder {
        CodecConfigBuilder::new()
    }

    /// Returns the maximum accepted element or byte count.
    pub fn max_array_length(&self) -> usize {
        self.max_array_length
    }

    /// Returns the maximum nesting depth.
    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    /// Returns the initial capacity of marshalling buffers.
    pub fn initial_buffer_capacity(&self) -> usize {
        self.initial_buffer_capacity
    }

    /// Returns the per-step encode buffer size.
    pub fn encode_chunk_size(&self) -> usize {
        self.encode_chunk_size
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GridwireError::Configuration(format!("failed to read TOML config file: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file_config: FileCodecConfig = toml::from_str(content).map_err(|e| {
            GridwireError::Configuration(format!("failed to parse TOML config: {e}"))
        })?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// Recognized variables:
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `GRIDWIRE_MAX_ARRAY_LENGTH` | `max_array_length` |
    /// | `GRIDWIRE_MAX_NESTING_DEPTH` | `max_nesting_depth` |
    /// | `GRIDWIRE_INITIAL_BUFFER_CAPACITY` | `initial_buffer_capacity` |
    /// | `GRIDWIRE_ENCODE_CHUNK_SIZE` | `encode_chunk_size` |
    ///
    /// Unset variables keep their defaults. A variable that is set but does
    /// not parse as an unsigned integer is an error.
    pub fn from_env() -> Result<Self> {
        let file_config = FileCodecConfig {
            max_array_length: env_usize("GRIDWIRE_MAX_ARRAY_LENGTH")?,
            max_nesting_depth: env_usize("GRIDWIRE_MAX_NESTING_DEPTH")?,
            initial_buffer_capacity: env_usize("GRIDWIRE_INITIAL_BUFFER_CAPACITY")?,
            encode_chunk_size: env_usize("GRIDWIRE_ENCODE_CHUNK_SIZE")?,
        };
        file_config.try_into()
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            initial_buffer_capacity: DEFAULT_INITIAL_BUFFER_CAPACITY,
            encode_chunk_size: DEFAULT_ENCODE_CHUNK_SIZE,
        }
    }
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse::<usize>().map(Some).map_err(|e| {
            GridwireError::Configuration(format!("invalid value for {name}: {e}"))
        }),
        Err(_) => Ok(None),
    }
}

/// Builder for `CodecConfig`.
#[derive(Debug, Clone, Default)]
pub struct CodecConfigBuilder {
    max_array_length: Option<usize>,
    max_nesting_depth: Option<usize>,
    initial_buffer_capacity: Option<usize>,
    encode_chunk_size: Option<usize>,
}

impl CodecConfigBuilder {
    /// Creates a new codec configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum accepted element or byte count on decode.
    pub fn max_array_length(mut self, len: usize) -> Self {
        self.max_array_length = Some(len);
        self
    }

    /// Sets the maximum nesting depth.
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = Some(depth);
        self
    }

    /// Sets the initial capacity of marshalling buffers.
    pub fn initial_buffer_capacity(mut self, capacity: usize) -> Self {
        self.initial_buffer_capacity = Some(capacity);
        self
    }

    /// Sets the per-step encode buffer size.
    pub fn encode_chunk_size(mut self, size: usize) -> Self {
        self.encode_chunk_size = Some(size);
        self
    }

    /// Builds the configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `GridwireError::Configuration` if:
    /// - `max_array_length` is zero or does not fit in a signed 32-bit count
    /// - `max_nesting_depth` is zero
    /// - `encode_chunk_size` is smaller than the widest atomic wire unit
    pub fn build(self) -> Result<CodecConfig> {
        let max_array_length = self.max_array_length.unwrap_or(DEFAULT_MAX_ARRAY_LENGTH);
        let max_nesting_depth = self.max_nesting_depth.unwrap_or(DEFAULT_MAX_NESTING_DEPTH);
        let initial_buffer_capacity = self
            .initial_buffer_capacity
            .unwrap_or(DEFAULT_INITIAL_BUFFER_CAPACITY);
        let encode_chunk_size = self.encode_chunk_size.unwrap_or(DEFAULT_ENCODE_CHUNK_SIZE);

        if max_array_length == 0 || max_array_length > i32::MAX as usize {
            return Err(GridwireError::Configuration(format!(
                "max_array_length must be between 1 and {}",
                i32::MAX
            )));
        }

        if max_nesting_depth == 0 {
            return Err(GridwireError::Configuration(
                "max_nesting_depth must be at least 1".to_string(),
            ));
        }

        if encode_chunk_size < MAX_ATOMIC_UNIT {
            return Err(GridwireError::Configuration(format!(
                "encode_chunk_size must be at least {MAX_ATOMIC_UNIT} bytes"
            )));
        }

        Ok(CodecConfig {
            max_array_length,
            max_nesting_depth,
            initial_buffer_capacity,
            encode_chunk_size,
        })
    }
}

/// File-based mirror of [`CodecConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FileCodecConfig {
    /// Maximum accepted element or byte count.
    pub max_array_length: Option<usize>,
    /// Maximum nesting depth.
    pub max_nesting_depth: Option<usize>,
    /// Initial capacity of marshalling buffers.
    pub initial_buffer_capacity: Option<usize>,
    /// Per-step encode buffer size.
    pub encode_chunk_size: Option<usize>,
}

impl TryFrom<FileCodecConfig> for CodecConfig {
    type Error = GridwireError;

    fn try_from(fc: FileCodecConfig) -> Result<Self> {
        let mut builder = CodecConfigBuilder::new();
        if let Some(v) = fc.max_array_length {
            builder = builder.max_array_length(v);
        }
        if let Some(v) = fc.max_nesting_depth {
            builder = builder.max_nesting_depth(v);
        }
        if let Some(v) = fc.initial_buffer_capacity {
            builder = builder.initial_buffer_capacity(v);
        }
        if let Some(v) = fc.encode_chunk_size {
            builder = builder.encode_chunk_size(v);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.max_array_length(), DEFAULT_MAX_ARRAY_LENGTH);
        assert_eq!(config.max_nesting_depth(), DEFAULT_MAX_NESTING_DEPTH);
        assert_eq!(config.initial_buffer_capacity(), DEFAULT_INITIAL_BUFFER_CAPACITY);
        assert_eq!(config.encode_chunk_size(), DEFAULT_ENCODE_CHUNK_SIZE);
    }

    #[test]
    fn test_builder_matches_default() {
        assert_eq!(CodecConfig::builder().build().unwrap(), CodecConfig::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = CodecConfig::builder()
            .max_array_length(100)
            .max_nesting_depth(4)
            .initial_buffer_capacity(32)
            .encode_chunk_size(64)
            .build()
            .unwrap();
        assert_eq!(config.max_array_length(), 100);
        assert_eq!(config.max_nesting_depth(), 4);
        assert_eq!(config.initial_buffer_capacity(), 32);
        assert_eq!(config.encode_chunk_size(), 64);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = CodecConfig::builder().max_nesting_depth(0).build().unwrap_err();
        assert!(matches!(err, GridwireError::Configuration(_)));
    }

    #[test]
    fn test_oversized_array_limit_rejected() {
        let result = CodecConfig::builder()
            .max_array_length(i32::MAX as usize + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_chunk_rejected() {
        let result = CodecConfig::builder()
            .encode_chunk_size(MAX_ATOMIC_UNIT - 1)
            .build();
        assert!(result.is_err());
        assert!(CodecConfig::builder()
            .encode_chunk_size(MAX_ATOMIC_UNIT)
            .build()
            .is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = CodecConfig::from_toml_str(
            r#"
            max-array-length = 4096
            encode-chunk-size = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.max_array_length(), 4096);
        assert_eq!(config.encode_chunk_size(), 1024);
        assert_eq!(config.max_nesting_depth(), DEFAULT_MAX_NESTING_DEPTH);
    }

    #[test]
    fn test_from_toml_str_unknown_key() {
        let result = CodecConfig::from_toml_str("max-depth = 3");
        assert!(matches!(result, Err(GridwireError::Configuration(_))));
    }

    #[test]
    fn test_from_toml_str_invalid_value() {
        let result = CodecConfig::from_toml_str("max-nesting-depth = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml_missing_file() {
        let result = CodecConfig::from_toml("/definitely/not/here/gridwire.toml");
        assert!(matches!(result, Err(GridwireError::Configuration(_))));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(CodecConfig::from_toml_str("").unwrap(), CodecConfig::default());
    }
}
