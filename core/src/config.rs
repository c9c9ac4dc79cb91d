//! Bridge configuration
//!
//! Everything a coordinator needs to know about the local device:
//! - who we are (vendor and display identity)
//! - where the chat lives (channel name, token endpoint)
//! - whether we advertise backend access to mesh peers
//! - how much message history the dedup cache keeps

use crate::backend::DEFAULT_TOKEN_URL;
use crate::message::VendorIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default backend channel
pub const DEFAULT_CHANNEL: &str = "general";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Vendor identity must not be empty")]
    EmptyIdentity,

    #[error("Channel name must not be empty")]
    EmptyChannel,

    #[error("Invalid token URL: {0}")]
    InvalidTokenUrl(String),

    #[error("Invalid dedup capacity: must be > 0")]
    InvalidDedupCapacity,
}

// ============================================================================
// BRIDGE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Stable identity of this device
    pub vendor_identity: VendorIdentity,

    /// Name shown on the chat backend; falls back to the vendor identity
    pub display_identity: Option<String>,

    /// Backend channel every client joins
    pub channel_name: String,

    /// Access-token endpoint
    pub token_url: String,

    /// Value of `hasBackendAccess` in our announcements.
    /// Cleared when the backend connection fails.
    pub announce_backend_access: bool,

    /// Upper bound on remembered message sids; `None` keeps every sid
    pub dedup_capacity: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vendor_identity: VendorIdentity::generate(),
            display_identity: None,
            channel_name: DEFAULT_CHANNEL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            announce_backend_access: false,
            dedup_capacity: None,
        }
    }
}

impl BridgeConfig {
    pub fn new(vendor_identity: impl Into<VendorIdentity>) -> Self {
        Self {
            vendor_identity: vendor_identity.into(),
            ..Self::default()
        }
    }

    /// Display identity, or the vendor identity when none is set
    pub fn display_identity(&self) -> String {
        self.display_identity
            .clone()
            .unwrap_or_else(|| self.vendor_identity.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vendor_identity.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }

        if self.channel_name.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }

        if !(self.token_url.starts_with("http://") || self.token_url.starts_with("https://")) {
            return Err(ConfigError::InvalidTokenUrl(self.token_url.clone()));
        }

        if self.dedup_capacity == Some(0) {
            return Err(ConfigError::InvalidDedupCapacity);
        }

        Ok(())
    }
}
