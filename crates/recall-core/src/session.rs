//! Session state and request dispatch.
//!
//! A [`Session`] owns the persistent namespace of one server. The server
//! loop hands it one decoded request at a time and never shares it.

use std::path::Path;

use crate::addr::Address;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::ipc::{ExecutionResponse, Payload, Request, Response, Status};
use crate::namespace::Namespace;
use crate::script::ScriptEvaluator;

/// One persistent execution session.
pub struct Session {
    address: Address,
    namespace: Namespace,
    evaluator: Box<dyn Evaluator>,
    open: bool,
}

impl Session {
    /// Create a session with a fresh namespace and the script evaluator.
    pub fn new(address: Address) -> Self {
        Self::with_evaluator(address, Box::new(ScriptEvaluator::new()))
    }

    /// Create a session that runs code through `evaluator`.
    pub fn with_evaluator(address: Address, evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            address,
            namespace: Namespace::new(),
            evaluator,
            open: true,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// False once a shutdown request has been processed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Dispatch one request and build its response.
    ///
    /// Never fails: requests whose payload cannot be read are answered with
    /// [`Response::Rejected`].
    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Execute { payload } => match load_source(payload).await {
                Ok(source) => Response::Executed(self.execute(&source)),
                Err(e) => {
                    tracing::warn!("Rejected execute request: {}", e);
                    Response::Rejected {
                        message: e.to_string(),
                    }
                }
            },
            Request::IntrospectVariables => Response::Variables {
                bindings: self.namespace.describe(),
            },
            Request::Shutdown => {
                self.open = false;
                Response::ShuttingDown
            }
        }
    }

    /// Run `source` against the namespace.
    pub fn execute(&mut self, source: &str) -> ExecutionResponse {
        let evaluation = self.evaluator.evaluate(source, &mut self.namespace);
        let (status, error_detail) = match evaluation.error {
            None => (Status::Success, None),
            Some(error) => {
                tracing::debug!("Submission raised: {}", error);
                (Status::RaisedError, Some(error.to_string()))
            }
        };
        ExecutionResponse {
            stdout: evaluation.stdout,
            status,
            error_detail,
            bindings: self.namespace.visible_names(),
        }
    }
}

/// Resolve an execute payload to source text.
pub(crate) async fn load_source(payload: Payload) -> Result<String> {
    match payload {
        Payload::Inline(source) => Ok(source),
        Payload::File(path) => read_payload_file(&path).await,
    }
}

async fn read_payload_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::MalformedRequest(format!("cannot read payload file {}: {}", path.display(), e))
    })
}
