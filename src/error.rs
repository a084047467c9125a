// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Gate errors.
//!
//! Request-level rejections all map to a single 403 class with a
//! per-reason plain-text body; configuration errors are surfaced at
//! construction time and never per request.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Terminal rejection reasons for one request.
///
/// Every variant renders as 403 Forbidden. The body text differs by
/// reason but the status code does not; clients must not be able to
/// distinguish a missing header from a revoked token by status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// No authorization header present (or empty)
    MissingAuthHeader,
    /// Header present but not a well-formed bearer credential
    InvalidAuthHeader,
    /// Verifier rejected the token, timed out, or failed
    InvalidToken,
    /// Authorizer hook returned a negative decision
    NotAuthorized,
}

impl GateError {
    /// Response body for this rejection.
    pub fn body(&self) -> &'static str {
        match self {
            GateError::MissingAuthHeader => "Missing authorization header",
            GateError::InvalidAuthHeader => "Invalid authorization header",
            GateError::InvalidToken => "Invalid authentication token",
            GateError::NotAuthorized => "Request not authorized",
        }
    }
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.body())
    }
}

impl std::error::Error for GateError {}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.body()).into_response()
    }
}

/// Construction-time configuration errors.
///
/// These are fatal: the gate must not be installed when any of them
/// occurs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("application credentials not found (set {0})")]
    MissingCredentials(&'static str),
    #[error("identity project id not found (set {0})")]
    MissingProjectId(&'static str),
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credentials file {path} is not valid JSON: {source}")]
    InvalidCredentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnvValue { var: &'static str, value: String },
}
