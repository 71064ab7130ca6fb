use thiserror::Error;

/// Top-level error type for the `excs-api` crate.
///
/// Covers every failure mode of the wire layer: opening the stream,
/// writing commands, waiting for correlated responses, and losing the
/// connection mid-flight. `excs-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection setup ────────────────────────────────────────────
    /// The TCP stream could not be opened.
    #[error("Cannot connect to command station at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The TCP stream did not open within the connection timeout.
    #[error("Connecting to command station at {addr} timed out after {timeout_secs}s")]
    ConnectTimeout { addr: String, timeout_secs: u64 },

    // ── Runtime ─────────────────────────────────────────────────────
    /// A command was issued while no connection is established.
    #[error("Not connected to command station")]
    NotConnected,

    /// No line with the expected prefix arrived in time.
    #[error("Timed out after {timeout_ms}ms waiting for response '{prefix}'")]
    Timeout { prefix: String, timeout_ms: u64 },

    /// The connection dropped while a request was outstanding.
    #[error("Connection to command station lost: {reason}")]
    ConnectionLost { reason: String },

    /// Socket-level failure while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }
}
