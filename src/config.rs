// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! # Gate Configuration
//!
//! Startup configuration for the authentication gate. Values are read
//! from the environment once, at construction; nothing here is
//! re-evaluated per request.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GOOGLE_APPLICATION_CREDENTIALS` | Path to the service-account credentials file for the identity authority | Required |
//! | `IDENTITY_PROJECT` | Identity-provider project/application identifier | Required |
//! | `GATE_DEV_BYPASS` | Admit every request without verification (`1`/`true`) | off |
//! | `GATE_TOKEN_TTL_SECS` | Trust window for cached verified tokens | `3600` |
//! | `GATE_VERIFY_TIMEOUT_SECS` | Upper bound on one external verification call | `10` |
//! | `GATE_CACHE_CAPACITY` | Max identity keys held in the verification cache | `4096` |

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use tower_http::cors::CorsLayer;

use crate::claims::Claims;
use crate::error::ConfigError;

/// Env var holding the path to the identity-authority credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Env var holding the identity project/application identifier.
pub const PROJECT_ENV: &str = "IDENTITY_PROJECT";

/// Env var enabling the development bypass.
pub const DEV_BYPASS_ENV: &str = "GATE_DEV_BYPASS";

/// Env var overriding the cached-token TTL, in seconds.
pub const TOKEN_TTL_ENV: &str = "GATE_TOKEN_TTL_SECS";

/// Env var overriding the verification timeout, in seconds.
pub const VERIFY_TIMEOUT_ENV: &str = "GATE_VERIFY_TIMEOUT_SECS";

/// Env var overriding the verification-cache capacity.
pub const CACHE_CAPACITY_ENV: &str = "GATE_CACHE_CAPACITY";

/// Default trust window for a cached verified token (one hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Default upper bound on one external verification call.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default verification-cache capacity (identity keys).
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// How the verification cache keys a caller.
///
/// The client address conflates "same network path" with "same caller"
/// under NAT or proxying; the token digest is the stronger substitute
/// when address spoofing is a concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityKeyPolicy {
    /// Key by client network address (falls back to the token digest
    /// when no address can be resolved).
    #[default]
    ClientAddr,
    /// Key by SHA-256 digest of the presented token.
    TokenDigest,
}

/// Authorization hook supplied by the embedding application.
///
/// Invoked after successful verification with the request and the
/// verified claims; returning `false` rejects the request. Independent
/// of credential validity and never cached.
pub type Authorizer = Arc<dyn Fn(&Request, &Claims) -> bool + Send + Sync>;

/// Startup configuration for one gate instance.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Path to the identity-authority credentials file.
    pub credentials_path: PathBuf,
    /// Identity project/application identifier.
    pub project_id: String,
    /// Admit everything without consulting cache or verifier. Must be
    /// set explicitly; never inferred.
    pub dev_bypass: bool,
    /// Trust window for cached verified tokens.
    pub token_ttl: Duration,
    /// Upper bound on one external verification call.
    pub verify_timeout: Duration,
    /// Max identity keys held in the verification cache.
    pub cache_capacity: usize,
    /// Cache key policy.
    pub identity_key: IdentityKeyPolicy,
}

impl GateConfig {
    /// Configuration with explicit credentials and project id, defaults
    /// for everything else.
    pub fn new(credentials_path: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            project_id: project_id.into(),
            dev_bypass: false,
            token_ttl: DEFAULT_TOKEN_TTL,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            identity_key: IdentityKeyPolicy::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// Missing credentials or project id are fatal here, not at request
    /// time.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials_path = env::var(CREDENTIALS_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredentials(CREDENTIALS_ENV))?;
        let project_id = env::var(PROJECT_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingProjectId(PROJECT_ENV))?;

        let mut config = Self::new(credentials_path, project_id);
        config.dev_bypass = env_flag(DEV_BYPASS_ENV);
        if let Some(secs) = env_secs(TOKEN_TTL_ENV)? {
            config.token_ttl = secs;
        }
        if let Some(secs) = env_secs(VERIFY_TIMEOUT_ENV)? {
            config.verify_timeout = secs;
        }
        if let Some(raw) = env::var(CACHE_CAPACITY_ENV).ok().filter(|v| !v.is_empty()) {
            config.cache_capacity =
                raw.parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::InvalidEnvValue {
                        var: CACHE_CAPACITY_ENV,
                        value: raw,
                    })?;
        }
        Ok(config)
    }

    /// Enable the development bypass.
    pub fn with_dev_bypass(mut self, enabled: bool) -> Self {
        self.dev_bypass = enabled;
        self
    }

    /// Override the cached-token TTL.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Override the verification timeout.
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Override the cache key policy.
    pub fn with_identity_key(mut self, policy: IdentityKeyPolicy) -> Self {
        self.identity_key = policy;
        self
    }
}

fn env_flag(var: &str) -> bool {
    matches!(
        env::var(var).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}

fn env_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidEnvValue {
                var,
                value: raw.clone(),
            })?;
            Ok(Some(Duration::from_secs(secs)))
        }
        _ => Ok(None),
    }
}

/// Per-mount options, forwarded by the embedding application.
///
/// Mirrors what the gate accepts when mounted in front of a router:
/// an optional authorization hook, a trace flag, and the CORS policy
/// forwarded opaquely to `tower-http`.
#[derive(Clone, Default)]
pub struct GateOptions {
    /// Emit diagnostic events at each stage of the decision.
    pub trace: bool,
    /// Optional authorization policy hook.
    pub authorizer: Option<Authorizer>,
    /// CORS policy, applied outside the gate. The gate never
    /// reinterprets it.
    pub cors: Option<CorsLayer>,
}

impl GateOptions {
    /// Options with everything off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable stage tracing.
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    /// Install an authorization hook.
    pub fn with_authorizer<F>(mut self, authorizer: F) -> Self
    where
        F: Fn(&Request, &Claims) -> bool + Send + Sync + 'static,
    {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Forward a CORS policy to be layered outside the gate.
    pub fn with_cors(mut self, cors: CorsLayer) -> Self {
        self.cors = Some(cors);
        self
    }
}
