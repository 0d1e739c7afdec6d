use thiserror::Error;

use crate::jsonrpc::{self, Method};

/// Errors a host call can end in.
#[derive(Error, Debug)]
pub enum HostError {
    /// The connection to the host is gone or the connection actor died.
    #[error("host connection lost: {0}")]
    Transport(String),

    /// The host did not answer in time.
    #[error("{method} timed out after {after_ms} ms")]
    Timeout { method: Method, after_ms: u64 },

    /// The plugin manifest does not grant the permission this call needs.
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: &'static str },

    /// The host answered with a JSON-RPC error object.
    #[error("host error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The host answered `success: false`.
    #[error("host rejected request: {message}")]
    Rejected { message: String },

    /// The result could not be decoded into the expected type.
    #[error("malformed host payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub(crate) fn from_rpc(method: Method, err: jsonrpc::Error) -> Self {
        if err.code == jsonrpc::PERMISSION_DENIED {
            HostError::PermissionDenied { permission: method.permission() }
        } else {
            HostError::Rpc { code: err.code, message: err.message }
        }
    }

    /// Worth retrying on the next cycle. Permission errors never heal by
    /// themselves, so callers should turn the feature off instead.
    pub fn is_transient(&self) -> bool {
        !matches!(self, HostError::PermissionDenied { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, HostError::PermissionDenied { .. })
    }
}

pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_code_maps_to_named_permission() {
        let err = HostError::from_rpc(
            Method::PlayAudio,
            jsonrpc::Error { code: jsonrpc::PERMISSION_DENIED, message: "nope".into(), data: None },
        );
        assert!(err.is_permission_denied());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "permission denied: audio.play");
    }

    #[test]
    fn other_codes_stay_rpc_errors() {
        let err = HostError::from_rpc(
            Method::GetTheme,
            jsonrpc::Error { code: -32000, message: "boom".into(), data: None },
        );
        assert!(matches!(err, HostError::Rpc { code: -32000, .. }));
        assert!(err.is_transient());
    }
}
