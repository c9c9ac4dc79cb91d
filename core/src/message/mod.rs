// Message module: identities, chat payloads and the mesh wire protocol

pub mod codec;
pub mod types;

pub use codec::{decode_wire, encode_wire, WireError, WireMessage, MAX_WIRE_SIZE};
pub use types::{MessageStatus, RelayMessage, VendorIdentity};
