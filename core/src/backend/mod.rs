// Backend module: chat SDK seam, access tokens and the in-memory chat service

pub mod abstraction;
pub mod memory;
pub mod token;

pub use abstraction::{BackendError, BackendEvent, ChannelHandle, ChatBackend};
pub use memory::{ChatServer, MemoryChatBackend};
pub use token::{
    parse_token_response, AccessTokenProvider, HttpTokenProvider, StaticTokenProvider,
    DEFAULT_TOKEN_URL,
};
