// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Authentication gate middleware for Axum.
//!
//! [`AuthGate`] runs the per-request decision: extract the bearer
//! credential, consult the verification cache, verify externally on a
//! miss, apply the optional authorizer hook, then admit or reject.
//! Admission runs the inner service exactly once; every rejection is a
//! 403 with a reason-specific body.
//!
//! The gate is `Clone` (cheap, `Arc`-shared) and each constructed
//! instance owns its cache and verifier handle. Two mounts with
//! different options share nothing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::debug;

use crate::cache::TokenCache;
use crate::config::{GateConfig, GateOptions, IdentityKeyPolicy};
use crate::error::{ConfigError, GateError};
use crate::extract::bearer_token;
use crate::trace::trace_request;
use crate::verifier::{JwksVerifier, TokenVerifier};

struct GateInner {
    config: GateConfig,
    options: GateOptions,
    cache: TokenCache,
    verifier: Arc<dyn TokenVerifier>,
}

/// Request-authentication gate.
///
/// Construct once per mount, then install with [`AuthGate::apply`] or
/// directly via `axum::middleware::from_fn_with_state(gate, authenticate)`.
#[derive(Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

impl AuthGate {
    /// Build a gate from explicit configuration, using the shipped
    /// JWKS verifier.
    ///
    /// Fails fast on configuration problems (unreadable or malformed
    /// credentials file); a misconfigured gate must never be installed.
    pub fn new(config: GateConfig, options: GateOptions) -> Result<Self, ConfigError> {
        let verifier = Arc::new(JwksVerifier::new(&config)?);
        Ok(Self::with_verifier(config, options, verifier))
    }

    /// Build a gate from the environment (see [`crate::config`] for the
    /// recognized variables).
    pub fn from_env(options: GateOptions) -> Result<Self, ConfigError> {
        Self::new(GateConfig::from_env()?, options)
    }

    /// Build a gate around a caller-supplied verifier.
    ///
    /// The verifier is responsible for its own authority access; no
    /// credentials-file validation happens here.
    pub fn with_verifier(
        config: GateConfig,
        options: GateOptions,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let cache = TokenCache::new(config.cache_capacity, config.token_ttl);
        Self {
            inner: Arc::new(GateInner {
                config,
                options,
                cache,
                verifier,
            }),
        }
    }

    /// Mount the gate in front of a router, layering the forwarded
    /// CORS policy outside it so preflight handling runs first.
    pub fn apply(&self, router: Router) -> Router {
        let router = router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            authenticate,
        ));
        match &self.inner.options.cors {
            Some(cors) => router.layer(cors.clone()),
            None => router,
        }
    }

    /// Run the gate for one request: admit by running `next` exactly
    /// once, or convert the rejection into its response.
    pub async fn handle(&self, request: Request, next: Next) -> Response {
        if self.inner.options.trace {
            trace_request(&request);
        }

        // Explicit development bypass: skip cache and verifier entirely,
        // header or no header.
        if self.inner.config.dev_bypass {
            return next.run(request).await;
        }

        match self.decide(request).await {
            Ok(request) => next.run(request).await,
            Err(reason) => reason.into_response(),
        }
    }

    /// The linear decision path: extract, cache, verify, authorize,
    /// store. Early-returns are terminal rejections.
    ///
    /// Takes the request by value so no `&Request` (which is `!Send`,
    /// the body being `!Sync`) lives across the verifier await; the
    /// admitted request is handed back to the caller.
    async fn decide(&self, request: Request) -> Result<Request, GateError> {
        let token = bearer_token(request.headers().get(AUTHORIZATION))?;
        let key = self.identity_key(&request, token);

        if self.inner.cache.lookup(&key, token, Instant::now()) {
            if self.inner.options.trace {
                debug!("token found in cache");
            }
            return Ok(request);
        }

        let claims = match timeout(
            self.inner.config.verify_timeout,
            self.inner.verifier.verify(token, true),
        )
        .await
        {
            Ok(Ok(claims)) => claims,
            Ok(Err(e)) => {
                debug!(error = %e, "token verification failed");
                return Err(GateError::InvalidToken);
            }
            Err(_) => {
                debug!("token verification timed out");
                return Err(GateError::InvalidToken);
            }
        };

        if let Some(authorizer) = &self.inner.options.authorizer {
            if !authorizer(&request, &claims) {
                // Authorization is request-dependent; a negative hook
                // result must not populate the cache.
                return Err(GateError::NotAuthorized);
            }
        }

        self.inner.cache.store(&key, token, Instant::now());
        if self.inner.options.trace {
            debug!(sub = %claims.sub, "token verified and cached");
        }
        Ok(request)
    }

    /// Cache key for the caller, per the configured policy.
    fn identity_key(&self, request: &Request, token: &str) -> String {
        match self.inner.config.identity_key {
            IdentityKeyPolicy::TokenDigest => token_digest(token),
            IdentityKeyPolicy::ClientAddr => {
                client_addr(request).unwrap_or_else(|| token_digest(token))
            }
        }
    }
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn authenticate(
    State(gate): State<AuthGate>,
    request: Request,
    next: Next,
) -> Response {
    gate.handle(request, next).await
}

/// Resolve the client network address: `ConnectInfo` when the server
/// was built with it, else the first `x-forwarded-for` entry.
pub(crate) fn client_addr(request: &Request) -> Option<String> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip().to_string());
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hex SHA-256 of the token; never stores or logs the raw credential.
fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tower_http::cors::CorsLayer;

    use crate::claims::Claims;
    use crate::verifier::VerifyError;

    /// Verifier test double: accepts a fixed set of tokens (or all),
    /// counts invocations, optionally stalls to exercise the timeout.
    struct MockVerifier {
        valid: Option<Vec<&'static str>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl MockVerifier {
        fn accepting(tokens: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                valid: Some(tokens.to_vec()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn accepting_all() -> Arc<Self> {
            Arc::new(Self {
                valid: None,
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn rejecting_all() -> Arc<Self> {
            Arc::new(Self {
                valid: Some(Vec::new()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn stalled() -> Arc<Self> {
            Arc::new(Self {
                valid: None,
                delay: Some(Duration::from_secs(60)),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenVerifier for MockVerifier {
        async fn verify(&self, token: &str, _strict: bool) -> Result<Claims, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.valid {
                Some(tokens) if !tokens.contains(&token) => {
                    Err(VerifyError("unknown token".to_string()))
                }
                _ => Ok(Claims::for_subject("u1")),
            }
        }
    }

    fn test_config() -> GateConfig {
        GateConfig::new("/unused/credentials.json", "demo-project")
    }

    fn gate(verifier: Arc<MockVerifier>, config: GateConfig, options: GateOptions) -> AuthGate {
        AuthGate::with_verifier(config, options, verifier)
    }

    fn app(gate: &AuthGate) -> Router {
        gate.apply(Router::new().route("/", get(|| async { "ok" })))
    }

    fn request(addr: &str, auth: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let socket: SocketAddr = format!("{addr}:40000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(socket));
        request
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_header_rejected_before_verifier() {
        let verifier = MockVerifier::accepting_all();
        let app = app(&gate(verifier.clone(), test_config(), GateOptions::new()));

        let response = app.oneshot(request("10.0.0.1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "Missing authorization header");
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_header_rejected_before_verifier() {
        let verifier = MockVerifier::accepting_all();
        let app = app(&gate(verifier.clone(), test_config(), GateOptions::new()));

        let response = app
            .oneshot(request("10.0.0.1", Some("Basic abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "Invalid authorization header");
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn valid_token_admitted_and_cached() {
        let verifier = MockVerifier::accepting(&["abc123"]);
        let gate = gate(verifier.clone(), test_config(), GateOptions::new());

        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), 1);

        // Second identical request within the TTL: admitted from cache,
        // no second verifier invocation.
        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_token_not_cached() {
        let verifier = MockVerifier::rejecting_all();
        let gate = gate(verifier.clone(), test_config(), GateOptions::new());

        for _ in 0..2 {
            let response = app(&gate)
                .oneshot(request("10.0.0.1", Some("Bearer abc123")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_text(response).await, "Invalid authentication token");
        }
        // No cache entry was written on the failure path.
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entry_triggers_fresh_verification() {
        let verifier = MockVerifier::accepting(&["abc123"]);
        let config = test_config().with_token_ttl(Duration::ZERO);
        let gate = gate(verifier.clone(), config, GateOptions::new());

        for _ in 0..2 {
            let response = app(&gate)
                .oneshot(request("10.0.0.1", Some("Bearer abc123")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn different_token_invalidates_and_reverifies() {
        let verifier = MockVerifier::accepting_all();
        let gate = gate(verifier.clone(), test_config(), GateOptions::new());

        let app1 = app(&gate);
        app1.oneshot(request("10.0.0.1", Some("Bearer first")))
            .await
            .unwrap();
        assert_eq!(verifier.calls(), 1);

        // Same identity key, different token: old entry discarded,
        // fresh verification.
        app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer second")))
            .await
            .unwrap();
        assert_eq!(verifier.calls(), 2);

        // The first token must not have survived the eviction.
        app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer first")))
            .await
            .unwrap();
        assert_eq!(verifier.calls(), 3);
    }

    #[tokio::test]
    async fn distinct_identity_keys_verify_independently() {
        let verifier = MockVerifier::accepting(&["abc123"]);
        let gate = gate(verifier.clone(), test_config(), GateOptions::new());

        app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        app(&gate)
            .oneshot(request("10.0.0.2", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn authorizer_rejection_is_terminal_and_not_cached() {
        let allow = Arc::new(AtomicBool::new(false));
        let allow_hook = allow.clone();
        let verifier = MockVerifier::accepting(&["abc123"]);
        let options = GateOptions::new()
            .with_authorizer(move |_req, claims| {
                claims.sub == "u1" && allow_hook.load(Ordering::SeqCst)
            });
        let gate = gate(verifier.clone(), test_config(), options);

        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "Request not authorized");
        assert_eq!(verifier.calls(), 1);

        // The rejection must not have pre-populated the cache: once the
        // hook approves, the token is verified again from scratch.
        allow.store(true, Ordering::SeqCst);
        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn dev_bypass_admits_everything_without_verifier() {
        let verifier = MockVerifier::rejecting_all();
        let config = test_config().with_dev_bypass(true);
        let gate = gate(verifier.clone(), config, GateOptions::new());

        // No header at all.
        let response = app(&gate).oneshot(request("10.0.0.1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // A token the verifier would reject.
        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer bogus")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn verification_timeout_maps_to_invalid_token() {
        let verifier = MockVerifier::stalled();
        let config = test_config().with_verify_timeout(Duration::from_millis(20));
        let gate = gate(verifier.clone(), config, GateOptions::new());

        let response = app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "Invalid authentication token");

        // Nothing was cached: a retry reaches the verifier again.
        app(&gate)
            .oneshot(request("10.0.0.1", Some("Bearer abc123")))
            .await
            .unwrap();
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn token_digest_policy_works_without_client_addr() {
        let verifier = MockVerifier::accepting(&["abc123"]);
        let config = test_config().with_identity_key(IdentityKeyPolicy::TokenDigest);
        let gate = gate(verifier.clone(), config, GateOptions::new());

        // No ConnectInfo, no forwarded header.
        for _ in 0..2 {
            let request = HttpRequest::builder()
                .uri("/")
                .header(AUTHORIZATION, "Bearer abc123")
                .body(Body::empty())
                .unwrap();
            let response = app(&gate).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn client_addr_falls_back_to_forwarded_header() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.9, 198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_addr(&request).as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn cors_preflight_never_reaches_the_gate() {
        let verifier = MockVerifier::rejecting_all();
        let options = GateOptions::new().with_cors(CorsLayer::permissive());
        let gate = gate(verifier.clone(), test_config(), options);

        let preflight = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/")
            .header("origin", "https://app.example")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap();
        let response = app(&gate).oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn trace_option_does_not_affect_the_decision() {
        let verifier = MockVerifier::accepting(&["abc123"]);
        let options = GateOptions::new().with_trace();
        let gate = gate(verifier.clone(), test_config(), options);

        let mut request = request("10.0.0.1", Some("Bearer abc123"));
        request
            .headers_mut()
            .insert("x-appengine-city", "zurich".parse().unwrap());
        let response = app(&gate).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
