// Message types: identities and the chat payloads relayed across the bridge

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable per-device identifier, independent of any mesh session.
///
/// This is the key for every mapping the bridge keeps. Two different
/// devices never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorIdentity(String);

impl VendorIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random identity (UUID v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VendorIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for VendorIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A chat message observed on the backend channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Backend-issued unique message ID
    pub sid: String,
    /// Message text
    pub body: String,
    /// Display identity of the author
    pub author: String,
}

impl RelayMessage {
    pub fn new(sid: impl Into<String>, body: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            body: body.into(),
            author: author.into(),
        }
    }
}

/// Outcome of posting a message to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Success,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Success => "Success",
            MessageStatus::Error => "Error",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
