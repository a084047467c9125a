// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! bearer-gate - Request Authentication Middleware
//!
//! An axum middleware that sits in front of an HTTP service and
//! authenticates every inbound request with a bearer token, verified
//! against an external identity authority. Verified tokens are held in
//! a short-lived in-memory cache keyed by caller identity, so repeated
//! requests inside the trust window skip the expensive round-trip.
//!
//! ## Flow
//!
//! 1. Optional trace event (diagnostics only, never gates the decision)
//! 2. Explicit development bypass, when configured
//! 3. Bearer credential extraction from the `Authorization` header
//! 4. Verification-cache lookup by identity key
//! 5. On a miss: external verification (bounded by a timeout), then the
//!    optional authorizer hook, then a cache store
//! 6. Admission runs the inner service exactly once; every rejection is
//!    a 403 with a reason-specific body
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bearer_gate::{AuthGate, GateOptions};
//! use tower_http::cors::CorsLayer;
//!
//! let gate = AuthGate::from_env(
//!     GateOptions::new()
//!         .with_cors(CorsLayer::permissive())
//!         .with_authorizer(|_req, claims| claims.sub.starts_with("user_")),
//! )?;
//!
//! let app = gate.apply(protected_router);
//! ```
//!
//! ## Modules
//!
//! - `middleware` - the gate itself (orchestration state machine)
//! - `cache` - TTL cache of verified tokens
//! - `extract` - bearer-header parsing
//! - `verifier` - identity-authority collaborator boundary
//! - `claims` - opaque verified claims
//! - `config` - startup configuration and per-mount options
//! - `error` - rejection and configuration errors
//! - `trace` - diagnostic side channel

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod trace;
pub mod verifier;

pub use cache::TokenCache;
pub use claims::Claims;
pub use config::{Authorizer, GateConfig, GateOptions, IdentityKeyPolicy};
pub use error::{ConfigError, GateError};
pub use middleware::{authenticate, AuthGate};
pub use verifier::{JwksVerifier, TokenVerifier, VerifyError};
