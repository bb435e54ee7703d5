//! Core library for recall sessions.
//!
//! This crate provides:
//! - Session address allocation (unix socket paths or loopback TCP)
//! - A length-prefixed JSON wire protocol and its transports
//! - The session server loop and a one-request-per-connection client
//! - A persistent namespace with a pre-seeded `results` store
//! - The session script evaluator behind the [`Evaluator`] trait
//! - Deterministic text measurement, boundary detection and chunking

pub mod addr;
pub mod chunk;
pub mod client;
pub mod error;
pub mod eval;
pub mod ipc;
pub mod namespace;
pub mod script;
pub mod server;
pub mod session;
pub mod value;

pub use addr::{Address, AddressKind, allocate, allocate_kind};
pub use chunk::{
    Boundary, BoundaryKind, Chunk, ChunkOptions, Measurement, chunk, detect_boundaries, measure,
    split,
};
pub use client::Client;
pub use error::{Error, Result};
pub use eval::{ErrorKind, EvalError, Evaluation, Evaluator};
pub use ipc::{ExecutionResponse, Payload, Request, Response, Status};
pub use namespace::{Namespace, RESULTS_KEY};
pub use script::ScriptEvaluator;
pub use server::{Server, ServerConfig, Stopped, serve};
pub use session::Session;
pub use value::Value;
