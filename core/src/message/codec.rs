// Wire codec: the four mesh protocol messages and their JSON encoding
//
// Every frame on the mesh is a flat UTF-8 JSON object with a mandatory
// `type` field. Frames are decoded exactly once, here, into `WireMessage`.

use super::types::{RelayMessage, VendorIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum accepted frame size: 64 KB
pub const MAX_WIRE_SIZE: usize = 64 * 1024;

const KNOWN_TYPES: [&str; 4] = ["announcement", "client", "send", "receive"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Frame too large: {0} bytes (max {MAX_WIRE_SIZE})")]
    TooLarge(usize),
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Missing type field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// A protocol message exchanged between mesh peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Identity and backend-access declaration sent to every resolved peer
    Announcement {
        #[serde(rename = "vendorIdentifier")]
        vendor_identifier: VendorIdentity,
        #[serde(rename = "hasBackendAccess")]
        has_backend_access: bool,
    },
    /// Proxy joined a backend channel on the receiver's behalf
    Client {
        identity: String,
        #[serde(flatten)]
        extra: BTreeMap<String, String>,
    },
    /// Ask the proxy to post `message` for `identifier_for_vendor`
    Send {
        message: String,
        #[serde(rename = "identifierForVendor")]
        identifier_for_vendor: VendorIdentity,
    },
    /// Backend chat message relayed out to the mesh
    Receive(RelayMessage),
}

impl WireMessage {
    pub fn announcement(vendor_identifier: VendorIdentity, has_backend_access: bool) -> Self {
        WireMessage::Announcement {
            vendor_identifier,
            has_backend_access,
        }
    }

    pub fn client(identity: impl Into<String>) -> Self {
        WireMessage::Client {
            identity: identity.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn send(message: impl Into<String>, identifier_for_vendor: VendorIdentity) -> Self {
        WireMessage::Send {
            message: message.into(),
            identifier_for_vendor,
        }
    }

    /// Value of the `type` tag
    pub fn message_type(&self) -> &'static str {
        match self {
            WireMessage::Announcement { .. } => "announcement",
            WireMessage::Client { .. } => "client",
            WireMessage::Send { .. } => "send",
            WireMessage::Receive(_) => "receive",
        }
    }
}

/// Serialize a message to a UTF-8 JSON frame
pub fn encode_wire(msg: &WireMessage) -> Result<Vec<u8>, WireError> {
    let bytes = serde_json::to_vec(msg).map_err(|e| WireError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_WIRE_SIZE {
        return Err(WireError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Parse a JSON frame received from a peer
pub fn decode_wire(bytes: &[u8]) -> Result<WireMessage, WireError> {
    if bytes.len() > MAX_WIRE_SIZE {
        return Err(WireError::TooLarge(bytes.len()));
    }

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))?;

    let kind = value
        .as_object()
        .ok_or_else(|| WireError::Malformed("frame is not a JSON object".to_string()))?
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(WireError::MissingType)?;

    if !KNOWN_TYPES.contains(&kind) {
        return Err(WireError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| WireError::Malformed(e.to_string()))
}
