// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Request tracing side channel.
//!
//! Emits one diagnostic event per request when the gate's trace option
//! is on. Strictly best-effort: malformed or absent headers degrade to
//! empty fields and never affect the authentication decision.

use axum::extract::Request;
use tracing::info;

use crate::middleware::client_addr;

/// Origin fallback chain: `origin`, then `x-forwarded-for`, then the
/// App Engine user-ip header.
const ORIGIN_HEADERS: [&str; 3] = ["origin", "x-forwarded-for", "x-appengine-user-ip"];

/// App Engine geolocation hint headers, in display order.
const LOCATION_HEADERS: [&str; 3] = ["x-appengine-city", "x-appengine-region", "x-appengine-country"];

/// Emit the per-request diagnostic event.
pub fn trace_request(request: &Request) {
    let origin = ORIGIN_HEADERS
        .iter()
        .find_map(|name| header_str(request, name))
        .unwrap_or_default();

    let location = LOCATION_HEADERS
        .iter()
        .map(|name| header_str(request, name).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ");

    let client = client_addr(request).unwrap_or_default();
    info!(
        host = header_str(request, "host").unwrap_or_default(),
        method = %request.method(),
        path = %request.uri().path(),
        origin = %origin,
        client = %client,
        location = location.trim(),
        "request received",
    );
}

/// Read a header as UTF-8, swallowing anything malformed.
fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}
