// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Credential verifier collaborator.
//!
//! The gate talks to the identity authority through the
//! [`TokenVerifier`] trait so that the orchestrator never depends on a
//! concrete authority. The shipped [`JwksVerifier`] validates identity-
//! platform JWTs against the authority's published JWKS.
//!
//! All verification failures collapse into one opaque [`VerifyError`];
//! callers must not branch on why a token was rejected.

use std::fs;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::claims::Claims;
use crate::config::GateConfig;
use crate::error::ConfigError;

/// Clock skew tolerance for non-strict verification (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// How long a fetched JWKS is reused before refreshing (5 minutes).
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// JWKS endpoint publishing the identity platform's token-signing keys.
const SECURE_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Opaque verification failure.
///
/// Carries a human-readable message for logs only; the gate maps every
/// instance to the same rejection.
#[derive(Debug, thiserror::Error)]
#[error("token verification failed: {0}")]
pub struct VerifyError(pub String);

/// Abstraction over the identity-verification authority.
///
/// `strict` requests revocation-aware checking where the authority
/// supports it; implementations that cannot check revocation should
/// tighten whatever they do control (see [`JwksVerifier`]).
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw bearer token, returning the authority's claims.
    async fn verify(&self, token: &str, strict: bool) -> Result<Claims, VerifyError>;
}

/// Service-account credentials file shape. Only the fields needed to
/// fail fast on a wrong file are typed.
#[derive(Debug, Deserialize)]
struct ServiceAccount {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
}

/// Fetched JWKS + fetch instant.
#[derive(Debug)]
struct JwksCached {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// JWKS-backed token verifier for the identity platform.
///
/// Verifies signature, expiry, issuer (`https://securetoken.google.com/
/// <project>`) and audience (`<project>`). In strict mode no clock-skew
/// leeway is allowed and the token must name a known signing key.
#[derive(Debug)]
pub struct JwksVerifier {
    jwks_url: String,
    issuer: String,
    audience: String,
    jwks_cache: RwLock<Option<JwksCached>>,
    jwks_ttl: Duration,
    client: reqwest::Client,
}

impl JwksVerifier {
    /// Build a verifier from gate configuration.
    ///
    /// Reads and parses the credentials file immediately so that a
    /// missing or malformed file fails at startup, not mid-traffic.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(&config.credentials_path).map_err(|source| {
            ConfigError::CredentialsUnreadable {
                path: config.credentials_path.clone(),
                source,
            }
        })?;
        let account: ServiceAccount =
            serde_json::from_str(&raw).map_err(|source| ConfigError::InvalidCredentials {
                path: config.credentials_path.clone(),
                source,
            })?;
        if account.project_id.is_none() && account.client_email.is_none() {
            return Err(ConfigError::InvalidCredentials {
                path: config.credentials_path.clone(),
                source: serde::de::Error::custom(
                    "missing project_id and client_email; not a service-account file",
                ),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.verify_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidEnvValue {
                var: "reqwest client",
                value: e.to_string(),
            })?;

        Ok(Self {
            jwks_url: SECURE_TOKEN_JWKS_URL.to_string(),
            issuer: format!("https://securetoken.google.com/{}", config.project_id),
            audience: config.project_id.clone(),
            jwks_cache: RwLock::new(None),
            jwks_ttl: JWKS_CACHE_TTL,
            client,
        })
    }

    /// Point the verifier at a different JWKS endpoint. Intended for
    /// self-hosted authorities and tests.
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Fetch the JWKS, reusing a cached copy within its TTL and falling
    /// back to a stale copy when the refresh fails.
    async fn get_jwks(&self) -> Result<JwkSet, VerifyError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.jwks_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        match self.fetch_jwks().await {
            Ok(jwks) => {
                let mut cache = self.jwks_cache.write().await;
                *cache = Some(JwksCached {
                    jwks: jwks.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(jwks)
            }
            Err(e) => {
                // Refresh failed; a stale key set still beats rejecting
                // every caller while the endpoint is unreachable.
                let cache = self.jwks_cache.read().await;
                if let Some(entry) = &*cache {
                    warn!(error = %e, "JWKS refresh failed, reusing stale key set");
                    return Ok(entry.jwks.clone());
                }
                Err(e)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, VerifyError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| VerifyError(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(VerifyError(format!(
                "JWKS endpoint returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| VerifyError(format!("JWKS response malformed: {e}")))
    }

    /// Resolve the decoding key for a token header.
    async fn decoding_key(
        &self,
        kid: Option<&str>,
        strict: bool,
    ) -> Result<(DecodingKey, Algorithm), VerifyError> {
        let jwks = self.get_jwks().await?;

        if let Some(kid) = kid {
            let jwk = jwks
                .keys
                .iter()
                .find(|k| k.common.key_id.as_deref() == Some(kid))
                .ok_or_else(|| VerifyError(format!("no JWKS key matches kid {kid:?}")))?;
            return jwk_to_decoding_key(jwk);
        }

        if strict {
            return Err(VerifyError("token names no signing key".to_string()));
        }

        // No kid: try each published key.
        for jwk in &jwks.keys {
            if let Ok(result) = jwk_to_decoding_key(jwk) {
                return Ok(result);
            }
        }
        Err(VerifyError("no usable key in JWKS".to_string()))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str, strict: bool) -> Result<Claims, VerifyError> {
        let header =
            decode_header(token).map_err(|e| VerifyError(format!("malformed token: {e}")))?;

        let (key, algorithm) = self.decoding_key(header.kid.as_deref(), strict).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = if strict { 0 } else { CLOCK_SKEW_LEEWAY };
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| VerifyError(format!("invalid token: {e}")))?;

        Ok(data.claims)
    }
}

/// Convert a JWK to a decoding key with its algorithm.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), VerifyError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| VerifyError(format!("bad RSA key in JWKS: {e}")))?;
            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    jsonwebtoken::jwk::KeyAlgorithm::RS384 => Algorithm::RS384,
                    jsonwebtoken::jwk::KeyAlgorithm::RS512 => Algorithm::RS512,
                    _ => Algorithm::RS256,
                })
                .unwrap_or(Algorithm::RS256);
            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| VerifyError(format!("bad EC key in JWKS: {e}")))?;
            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    jsonwebtoken::jwk::KeyAlgorithm::ES384 => Algorithm::ES384,
                    _ => Algorithm::ES256,
                })
                .unwrap_or(Algorithm::ES256);
            Ok((key, alg))
        }
        _ => Err(VerifyError("unsupported key type in JWKS".to_string())),
    }
}
