//! Client side of a session: one connection per request.

use indexmap::IndexMap;

use crate::addr::Address;
use crate::error::{Error, Result};
use crate::ipc::{ExecutionResponse, MAX_FRAME_BYTES, Request, Response};
use crate::ipc::{connect, read_message, write_message};

/// Handle for submitting requests to a running session.
///
/// Holds no connection: each call connects, sends one request, reads one
/// response and disconnects. Nothing is retried.
#[derive(Debug, Clone)]
pub struct Client {
    address: Address,
    max_frame_bytes: usize,
}

impl Client {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send one request and wait for its response.
    pub async fn submit(&self, request: &Request) -> Result<Response> {
        let mut conn = connect(&self.address).await?;
        tracing::debug!("Sending {} request to {}", request.mode(), self.address);
        write_message(&mut conn, request).await?;
        read_message(&mut conn, self.max_frame_bytes).await
    }

    /// Execute inline code.
    pub async fn execute(&self, code: impl Into<String>) -> Result<ExecutionResponse> {
        self.execute_request(&Request::execute(code)).await
    }

    /// Execute the contents of a file the server can read.
    pub async fn execute_file(
        &self,
        path: impl Into<std::path::PathBuf>,
    ) -> Result<ExecutionResponse> {
        self.execute_request(&Request::execute_file(path)).await
    }

    /// Visible names with their type names.
    pub async fn variables(&self) -> Result<IndexMap<String, String>> {
        match self.submit(&Request::IntrospectVariables).await? {
            Response::Variables { bindings } => Ok(bindings),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the server to stop and release its address.
    pub async fn shutdown(&self) -> Result<()> {
        match self.submit(&Request::Shutdown).await? {
            Response::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn execute_request(&self, request: &Request) -> Result<ExecutionResponse> {
        match self.submit(request).await? {
            Response::Executed(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> Error {
    match response {
        Response::Rejected { message } => Error::MalformedRequest(message),
        other => Error::Ipc(format!("Unexpected response: {:?}", other)),
    }
}

impl ExecutionResponse {
    /// Turn a raised error into [`Error::Evaluation`], keeping the response
    /// otherwise.
    pub fn into_result(self) -> Result<Self> {
        match &self.error_detail {
            Some(detail) if !self.is_success() => Err(Error::Evaluation(detail.clone())),
            _ => Ok(self),
        }
    }
}
