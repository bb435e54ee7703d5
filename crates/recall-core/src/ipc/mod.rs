//! Inter-process communication between session clients and the server.
//!
//! This module provides the wire protocol and the unix/TCP stream
//! transports a session address resolves to.

pub mod protocol;
mod transport;

pub use protocol::{
    ExecutionResponse, MAX_FRAME_BYTES, Payload, Request, Response, Status, read_message,
    write_message,
};
pub use transport::{Connection, Listener, connect};
