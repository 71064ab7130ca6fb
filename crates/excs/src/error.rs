//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use excs_config::ConfigError;
use excs_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PROTOCOL: i32 = 5;
    pub const UNSUPPORTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to command station at {addr}")]
    #[diagnostic(
        code(excs::connection_failed),
        help(
            "Check that the command station is powered and reachable on the network.\n\
             Reason: {reason}\n\
             Try: excs --host <address> info"
        )
    )]
    ConnectionFailed { addr: String, reason: String },

    #[error("Connection to command station lost: {reason}")]
    #[diagnostic(code(excs::connection_lost))]
    ConnectionLost { reason: String },

    #[error("Timed out waiting for command station: {message}")]
    #[diagnostic(
        code(excs::timeout),
        help("Increase the response timeout with --timeout or check the station's load.")
    )]
    Timeout { message: String },

    // ── Station ──────────────────────────────────────────────────────
    #[error("Unexpected reply from command station ({what}): {response}")]
    #[diagnostic(code(excs::invalid_response))]
    InvalidResponse { what: String, response: String },

    #[error("{message}")]
    #[diagnostic(
        code(excs::unsupported_version),
        help("Update the EX-CommandStation firmware to 5.4.0 or newer.")
    )]
    UnsupportedVersion { message: String },

    #[error("{resource_type} {identifier} not found")]
    #[diagnostic(
        code(excs::not_found),
        help("Run: excs {list_command} to see what the station knows")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(excs::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(excs::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No command station configured")]
    #[diagnostic(
        code(excs::no_config),
        help(
            "Pass --host <address>, set EXCS_HOST, or add a profile with `excs config add`.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(excs::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(excs::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(excs::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(excs::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::InvalidResponse { .. } => exit_code::PROTOCOL,
            Self::UnsupportedVersion { .. } => exit_code::UNSUPPORTED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { addr, reason } => CliError::ConnectionFailed { addr, reason },

            CoreError::NotConnected => CliError::ConnectionLost {
                reason: "not connected".into(),
            },

            CoreError::ConnectionLost { reason } => CliError::ConnectionLost { reason },

            CoreError::Timeout { message } => CliError::Timeout { message },

            CoreError::InvalidResponse { what, response } => CliError::InvalidResponse { what, response },

            CoreError::Version { message } => CliError::UnsupportedVersion { message },

            CoreError::Validation { field, reason } => CliError::Validation { field, reason },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
