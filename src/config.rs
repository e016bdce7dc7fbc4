//! Runtime configuration parameters
//!
//! All tunable parameters for the management runtime. Values can be
//! persisted as postcard bytes (flash / NVS) or supplied as JSON during
//! provisioning.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::mgmt::header::HEADER_SIZE;

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgmtConfig {
    // --- Call engine ---
    /// How long a caller waits for a correlated completion (milliseconds)
    pub call_timeout_ms: u32,
    /// Largest frame (header + payload) built or accepted by either role
    pub max_frame_size: usize,

    // --- File transfer ---
    /// Minimum MTU bytes reserved for header and CBOR framing on upload;
    /// long object names reserve more
    pub upload_overhead: usize,
    /// MTU bytes reserved for header and CBOR framing on download replies
    pub download_overhead: usize,
    /// Upper bound on a single download chunk served by the responder
    pub fs_max_chunk: usize,
    /// Longest accepted object name (bytes)
    pub max_name_len: usize,
    /// Consecutive upload re-synchronisations tolerated before failing
    pub upload_resync_limit: u8,
    /// Consecutive download replies without forward progress tolerated
    pub download_stall_limit: u8,

    // --- OS group ---
    /// Delay handed to the reset port before the device restarts
    pub reset_delay_ms: u32,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            // Call engine
            call_timeout_ms: 3000,
            max_frame_size: 1024,

            // File transfer
            upload_overhead: 48,
            download_overhead: 48,
            fs_max_chunk: 512,
            max_name_len: 64,
            upload_resync_limit: 3,
            download_stall_limit: 3,

            // OS group
            reset_delay_ms: 250,
        }
    }
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its permitted range.
    ValidationFailed(&'static str),
    /// The stored bytes could not be decoded.
    Malformed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(field) => write!(f, "invalid value for {field}"),
            Self::Malformed => write!(f, "malformed configuration"),
        }
    }
}

impl MgmtConfig {
    /// Reject values that would make the runtime unusable.
    ///
    /// Invalid ranges are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("call_timeout_ms"));
        }
        if self.max_frame_size <= HEADER_SIZE || self.max_frame_size > usize::from(u16::MAX) {
            return Err(ConfigError::ValidationFailed("max_frame_size"));
        }
        if self.upload_overhead >= self.max_frame_size {
            return Err(ConfigError::ValidationFailed("upload_overhead"));
        }
        if self.download_overhead >= self.max_frame_size {
            return Err(ConfigError::ValidationFailed("download_overhead"));
        }
        if self.fs_max_chunk == 0 {
            return Err(ConfigError::ValidationFailed("fs_max_chunk"));
        }
        if self.max_name_len == 0 {
            return Err(ConfigError::ValidationFailed("max_name_len"));
        }
        Ok(())
    }

    /// Largest payload that fits in one frame after the header.
    pub fn max_payload(&self) -> usize {
        self.max_frame_size.saturating_sub(HEADER_SIZE)
    }

    /// Serialize for persistent storage.
    pub fn to_postcard(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Malformed)
    }

    /// Load and validate a stored configuration.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a provisioning document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }
}
