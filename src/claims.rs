// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Verified claims produced by the credential verifier.
//!
//! The gate never interprets these beyond forwarding them to the
//! authorizer hook; the structure exists so that common fields are
//! typed and everything else survives the round-trip in `extra`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Claims asserted about the caller by a successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (canonical caller identifier)
    pub sub: String,

    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    /// Expiration timestamp (seconds since epoch)
    #[serde(default)]
    pub exp: i64,

    /// Issued-at timestamp
    #[serde(default)]
    pub iat: i64,

    /// Time of the original end-user authentication, if the authority
    /// reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Everything else the authority asserted, passed through verbatim
    /// for the authorizer hook
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Minimal claims with only a subject set. Intended for tests and
    /// for verifier implementations that expose no other fields.
    pub fn for_subject(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            iss: String::new(),
            aud: None,
            exp: 0,
            iat: 0,
            auth_time: None,
            extra: HashMap::new(),
        }
    }
}
