// ── Core error types ──
//
// User-facing errors from excs-core. Consumers never see socket errors
// directly; the `From<excs_api::Error>` impl translates wire-layer
// failures into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to command station at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Not connected to command station")]
    NotConnected,

    #[error("Timed out waiting for command station: {message}")]
    Timeout { message: String },

    #[error("Connection to command station lost: {reason}")]
    ConnectionLost { reason: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Invalid {what} response: {response}")]
    InvalidResponse { what: String, response: String },

    #[error("{message}")]
    Version { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid(what: &str, response: &str) -> Self {
        Self::InvalidResponse {
            what: what.to_owned(),
            response: response.to_owned(),
        }
    }

    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// "Retry later": the station may be reachable again soon.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::NotConnected
                | Self::Timeout { .. }
                | Self::ConnectionLost { .. }
        )
    }

    /// Retrying will not help until the station or its data changes.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Version { .. } | Self::InvalidResponse { .. })
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<excs_api::Error> for CoreError {
    fn from(err: excs_api::Error) -> Self {
        match err {
            excs_api::Error::Connect { addr, reason } => CoreError::ConnectionFailed { addr, reason },
            excs_api::Error::ConnectTimeout { addr, timeout_secs } => CoreError::ConnectionFailed {
                addr,
                reason: format!("timed out after {timeout_secs}s"),
            },
            excs_api::Error::NotConnected => CoreError::NotConnected,
            excs_api::Error::Timeout { prefix, timeout_ms } => CoreError::Timeout {
                message: format!("no '{prefix}' response within {timeout_ms}ms"),
            },
            excs_api::Error::ConnectionLost { reason } => CoreError::ConnectionLost { reason },
            excs_api::Error::Io(e) => CoreError::ConnectionLost {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_are_not_ready() {
        let cases = [
            excs_api::Error::NotConnected,
            excs_api::Error::Timeout {
                prefix: "jA".into(),
                timeout_ms: 20_000,
            },
            excs_api::Error::ConnectionLost {
                reason: "eof".into(),
            },
            excs_api::Error::ConnectTimeout {
                addr: "10.0.0.5:2560".into(),
                timeout_secs: 10,
            },
        ];
        for err in cases {
            let core = CoreError::from(err);
            assert!(core.is_not_ready(), "{core:?}");
            assert!(!core.is_permanent(), "{core:?}");
        }
    }

    #[test]
    fn version_and_protocol_errors_are_permanent() {
        let version = CoreError::Version {
            message: "Unsupported".into(),
        };
        assert!(version.is_permanent());
        assert!(!version.is_not_ready());
        assert!(CoreError::invalid("route detail", "jA x").is_permanent());
    }

    #[test]
    fn timeout_message_names_prefix() {
        let err = CoreError::from(excs_api::Error::Timeout {
            prefix: "jT".into(),
            timeout_ms: 250,
        });
        assert_eq!(
            err.to_string(),
            "Timed out waiting for command station: no 'jT' response within 250ms"
        );
    }
}
