//! Error types for recall-core.

use thiserror::Error;

use crate::addr::Address;

/// Result type for recall-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in recall-core.
///
/// Evaluation errors raised by submitted code are not part of this enum:
/// they travel back to the client as response data. `Error::Evaluation`
/// only exists so a client can surface a raised error through `?`.
#[derive(Debug, Error)]
pub enum Error {
    /// No unused address could be generated.
    #[error("address allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: usize },

    /// Nothing is listening at the address.
    #[error("connection refused: no session is listening at {address}")]
    ConnectionRefused { address: Address },

    /// A live session already owns the address.
    #[error("address in use: a session is already listening at {0}")]
    AddressInUse(Address),

    /// Submitted code raised during execution.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The request could not be understood or its payload could not be read.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The peer broke the framing or hung up mid-message.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error together with a recovery hint for its category.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Self::AllocationExhausted { .. } => {
                "retry allocation; check that the runtime/temp directory is writable"
            }
            Self::ConnectionRefused { .. } => {
                "start a server first with `recall serve <address>` or re-check the address"
            }
            Self::AddressInUse(_) => "allocate a fresh address with `recall addr`",
            Self::Evaluation(_) => "fix the submitted code; session state before the error is intact",
            Self::MalformedRequest(_) => {
                "check the request mode and that any --file payload is readable by the server"
            }
            Self::Ipc(_) => "the session may have crashed; restart it and resubmit",
            Self::Serialization(_) | Self::Io(_) => return self.to_string(),
        };
        format!("{self}\n  hint: {hint}")
    }
}
