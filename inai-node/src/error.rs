// Error types for the Inai runtime
//
// INTENTION: Give every failure path of the runtime a typed variant that
// maps onto the status taxonomy of the internal RPC protocol, so that the
// pseudo-services and the dispatcher can always answer with a status-coded
// response instead of propagating an error.

use std::any::Any;
use thiserror::Error;

use crate::routing::Response;

/// Errors produced by the runtime's component contracts.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Unknown name, address, code id or resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed code, malformed policy or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Rejected by a policy matcher.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The `boot` handler of a new instance answered with a non-success status.
    #[error("boot rejected with status {}", .0.status)]
    BootRejected(Response),

    /// A service definition failed while installing its handlers.
    #[error("service definition for '{code_id}' failed: {reason}")]
    Definition { code_id: String, reason: String },

    /// The atomic queue no longer accepts tasks.
    #[error("atomic queue closed")]
    QueueClosed,

    /// An atomic task returned an error.
    #[error("atomic task failed: {0}")]
    Task(anyhow::Error),

    /// An atomic task panicked.
    #[error("atomic task panicked: {0}")]
    TaskPanicked(String),

    /// Handler failure, collaborator failure or internal invariant violation.
    #[error("server error: {0}")]
    Server(String),
}

impl MeshError {
    /// Status code this error is reported with.
    pub fn status(&self) -> u16 {
        match self {
            MeshError::NotFound(_) => 404,
            MeshError::BadRequest(_) => 400,
            MeshError::Forbidden(_) => 403,
            MeshError::BootRejected(response) => response.status,
            _ => 503,
        }
    }
}

impl From<MeshError> for Response {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::BootRejected(response) => response,
            MeshError::NotFound(_) => Response::not_found(),
            MeshError::BadRequest(msg) => Response::bad_request(msg),
            MeshError::Forbidden(msg) => Response::forbidden(msg),
            other => Response::server_error(other.to_string()),
        }
    }
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
