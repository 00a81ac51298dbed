//! Shared error types.

use thiserror::Error;

use crate::protocol::MessageKind;

/// Why an inbound frame could not be turned into a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}
