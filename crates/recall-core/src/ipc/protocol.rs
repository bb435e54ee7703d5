//! Wire protocol between session clients and the server.
//!
//! One request and one response per connection, each framed as a 4-byte
//! big-endian length followed by that many bytes of UTF-8 JSON:
//!
//! ```text
//! {"mode": "execute", "payload": {"inline": "x = 1"}}
//! {"mode": "execute", "payload": {"file": "/tmp/job.rc"}}
//! {"mode": "introspect_variables"}
//! {"mode": "shutdown"}
//! ```

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Largest frame either side accepts (256 MiB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Request sent from a client to the session server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Request {
    /// Run code against the session namespace.
    Execute { payload: Payload },

    /// List visible bindings and their types.
    IntrospectVariables,

    /// Stop the server after acknowledging.
    Shutdown,
}

/// Source of the code to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Code carried in the request itself.
    Inline(String),
    /// Path to a file the server reads as the code.
    File(PathBuf),
}

impl Request {
    pub fn execute(code: impl Into<String>) -> Self {
        Self::Execute {
            payload: Payload::Inline(code.into()),
        }
    }

    pub fn execute_file(path: impl Into<PathBuf>) -> Self {
        Self::Execute {
            payload: Payload::File(path.into()),
        }
    }

    /// Short name used in logs.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::IntrospectVariables => "introspect_variables",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Response sent from the session server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Result of an `execute` request.
    Executed(ExecutionResponse),

    /// Visible bindings, name to type name, in first-bound order.
    Variables { bindings: IndexMap<String, String> },

    /// Acknowledgement of shutdown.
    ShuttingDown,

    /// The request was malformed; the server keeps running.
    Rejected { message: String },
}

/// Outcome of executing one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Everything the code printed.
    pub stdout: String,
    pub status: Status,
    /// `"<ErrorType>: <message> (line N)"` when the code raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Visible top-level names after the execution.
    #[serde(default)]
    pub bindings: Vec<String>,
}

impl ExecutionResponse {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    RaisedError,
}

/// Read one frame body, rejecting frames larger than `max_bytes`.
pub async fn read_frame<R>(reader: &mut R, max_bytes: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read message length: {}", e)))?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > max_bytes {
        return Err(Error::MalformedRequest(format!(
            "message of {} bytes exceeds the {} byte limit",
            len, max_bytes
        )));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read message body: {}", e)))?;
    Ok(bytes)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|&len| len as usize <= MAX_FRAME_BYTES)
        .ok_or_else(|| {
            Error::MalformedRequest(format!(
                "message of {} bytes exceeds the {} byte limit",
                bytes.len(),
                MAX_FRAME_BYTES
            ))
        })?;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write message length: {}", e)))?;
    writer
        .write_all(bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write message body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush stream: {}", e)))?;
    Ok(())
}

/// Read and decode one message.
///
/// A frame that arrives intact but does not decode is a
/// [`Error::MalformedRequest`], so the server can answer it.
pub async fn read_message<R, T>(reader: &mut R, max_bytes: usize) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let bytes = read_frame(reader, max_bytes).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedRequest(format!("invalid message: {}", e)))
}

/// Encode and write one message.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(message)?;
    write_frame(writer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn encode<T: Serialize>(message: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        write_message(&mut buf, message).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_frame_layout_is_big_endian_json() {
        let buf = encode(&Request::Shutdown).await;
        let body = br#"{"mode":"shutdown"}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[test]
    fn test_request_json_shapes() {
        assert_eq!(
            serde_json::to_value(Request::execute("x = 1")).unwrap(),
            json!({"mode": "execute", "payload": {"inline": "x = 1"}})
        );
        assert_eq!(
            serde_json::to_value(Request::execute_file("/tmp/job")).unwrap(),
            json!({"mode": "execute", "payload": {"file": "/tmp/job"}})
        );
        assert_eq!(
            serde_json::to_value(Request::IntrospectVariables).unwrap(),
            json!({"mode": "introspect_variables"})
        );
    }

    #[test]
    fn test_execution_response_omits_missing_detail() {
        let response = Response::Executed(ExecutionResponse {
            stdout: "hi\n".into(),
            status: Status::Success,
            error_detail: None,
            bindings: vec!["results".into()],
        });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"kind": "executed", "stdout": "hi\n", "status": "success", "bindings": ["results"]})
        );
    }

    #[tokio::test]
    async fn test_message_roundtrip() {
        let mut bindings = IndexMap::new();
        bindings.insert("results".to_string(), "dict".to_string());
        bindings.insert("x".to_string(), "int".to_string());
        let response = Response::Variables { bindings };

        let buf = encode(&response).await;
        let decoded: Response = read_message(&mut buf.as_slice(), MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_malformed() {
        let buf = encode(&Request::execute("x".repeat(64))).await;
        let err = read_message::<_, Request>(&mut buf.as_slice(), 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_mode_is_malformed() {
        let body = br#"{"mode":"explode"}"#;
        let mut buf = (body.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(body);
        let err = read_message::<_, Request>(&mut buf.as_slice(), MAX_FRAME_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_ipc_error() {
        let mut buf = 100u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"{\"mode\"");
        let err = read_message::<_, Request>(&mut buf.as_slice(), MAX_FRAME_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ipc(_)));
    }
}
