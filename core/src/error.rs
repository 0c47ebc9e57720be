//! Error types for the Mini App session client.
//!
//! # Design
//! Authentication failures, calls made without a session, and failed
//! resource calls each get their own variant so callers can branch on them.
//! Transport and JSON failures carry only a message. Response bodies are
//! truncated before they are stored in an error.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Maximum length for response bodies kept in errors.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// The resource call that failed, rendered as a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetProfile,
    ListItems,
    GetItem,
    CreateItem,
    UpdateItem,
    DeleteItem,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Operation::GetProfile => "failed to get profile",
            Operation::ListItems => "failed to get items",
            Operation::GetItem => "failed to get item",
            Operation::CreateItem => "failed to create item",
            Operation::UpdateItem => "failed to update item",
            Operation::DeleteItem => "failed to delete item",
        };
        f.write_str(msg)
    }
}

/// Errors returned by `SessionClient`.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The authentication endpoint returned a non-2xx status.
    #[error("authentication failed: HTTP {status}: {body}")]
    Authentication { status: u16, body: String },

    /// An authenticated operation was attempted without a session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A resource endpoint returned a non-2xx status.
    #[error("{operation}: HTTP {status}: {body}")]
    Request {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("session store: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    pub(crate) fn authentication(status: u16, body: &str) -> Self {
        ClientError::Authentication {
            status,
            body: truncate_body(body),
        }
    }

    pub(crate) fn request(operation: Operation, status: u16, body: &str) -> Self {
        ClientError::Request {
            operation,
            status,
            body: truncate_body(body),
        }
    }

    /// HTTP status of a rejected call, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Authentication { status, .. } | ClientError::Request { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_names_the_operation() {
        let err = ClientError::request(Operation::ListItems, 401, r#"{"error":"invalid token"}"#);
        assert_eq!(
            err.to_string(),
            r#"failed to get items: HTTP 401: {"error":"invalid token"}"#
        );
        assert!(err.is_unauthorized());
        assert!(!err.is_not_found());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(400);
        let err = ClientError::authentication(500, &body);
        let ClientError::Authentication { body: kept, .. } = err else {
            panic!("wrong variant");
        };
        assert!(kept.ends_with("(truncated, 800 total bytes)"));
        assert!(kept.len() < body.len());
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(ClientError::NotAuthenticated.status(), None);
        assert_eq!(ClientError::Transport("refused".into()).status(), None);
    }
}
