// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! Bearer credential extraction.
//!
//! Pure parsing of the `Authorization` header value. The scheme
//! comparison is case-insensitive; the token is the verbatim substring
//! after the 7-character `"Bearer "` prefix.

use axum::http::HeaderValue;

use crate::error::GateError;

/// Length of the `"Bearer "` prefix, including the single space.
const BEARER_PREFIX_LEN: usize = 7;

/// Extract the bearer token from an `Authorization` header value.
///
/// - `None` or an empty value fails with [`GateError::MissingAuthHeader`].
/// - A non-UTF-8 value, or one that does not start with the
///   case-insensitive `"Bearer "` scheme, fails with
///   [`GateError::InvalidAuthHeader`].
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, GateError> {
    let value = header
        .map(HeaderValue::as_bytes)
        .filter(|v| !v.is_empty())
        .ok_or(GateError::MissingAuthHeader)?;

    let value = std::str::from_utf8(value).map_err(|_| GateError::InvalidAuthHeader)?;

    if value.len() <= BEARER_PREFIX_LEN
        || !value[..BEARER_PREFIX_LEN].eq_ignore_ascii_case("bearer ")
    {
        return Err(GateError::InvalidAuthHeader);
    }

    Ok(&value[BEARER_PREFIX_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn missing_header_rejected() {
        assert_eq!(bearer_token(None), Err(GateError::MissingAuthHeader));
    }

    #[test]
    fn empty_header_rejected_as_missing() {
        let value = header("");
        assert_eq!(bearer_token(Some(&value)), Err(GateError::MissingAuthHeader));
    }

    #[test]
    fn non_bearer_scheme_rejected() {
        let value = header("Basic dXNlcjpwYXNz");
        assert_eq!(bearer_token(Some(&value)), Err(GateError::InvalidAuthHeader));
    }

    #[test]
    fn prefix_without_token_rejected() {
        let value = header("Bearer ");
        assert_eq!(bearer_token(Some(&value)), Err(GateError::InvalidAuthHeader));
    }

    #[test]
    fn bare_scheme_rejected() {
        let value = header("Bearer");
        assert_eq!(bearer_token(Some(&value)), Err(GateError::InvalidAuthHeader));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        for raw in ["Bearer abc123", "bearer abc123", "BEARER abc123", "bEaReR abc123"] {
            let value = header(raw);
            assert_eq!(bearer_token(Some(&value)), Ok("abc123"));
        }
    }

    #[test]
    fn token_taken_verbatim() {
        // No trimming: a second space belongs to the token.
        let value = header("Bearer  padded");
        assert_eq!(bearer_token(Some(&value)), Ok(" padded"));
    }

    #[test]
    fn non_utf8_header_rejected() {
        let value = HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap();
        assert_eq!(bearer_token(Some(&value)), Err(GateError::InvalidAuthHeader));
    }
}
