//! Client-facing bearer authentication (spec.md §6.2).

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ProxyError;

/// Validates the inbound request against the configured shared secret, if any.
///
/// Accepts the key in either `x-api-key` or `Authorization: Bearer`. When no secret is
/// configured, every request is admitted.
pub fn authenticate(headers: &HeaderMap, configured_key: Option<&SecretString>) -> Result<(), ProxyError> {
    let Some(configured_key) = configured_key else {
        return Ok(());
    };

    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string))
        });

    match presented {
        Some(key) if key == configured_key.expose_secret() => Ok(()),
        _ => Err(ProxyError::AuthenticationFailed("Invalid API key provided".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn admits_all_requests_when_no_key_configured() {
        assert!(authenticate(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn accepts_matching_x_api_key_header() {
        let key = SecretString::from("secret".to_string());
        let headers = headers_with("x-api-key", "secret");
        assert!(authenticate(&headers, Some(&key)).is_ok());
    }

    #[test]
    fn accepts_matching_bearer_token() {
        let key = SecretString::from("secret".to_string());
        let headers = headers_with("authorization", "Bearer secret");
        assert!(authenticate(&headers, Some(&key)).is_ok());
    }

    #[test]
    fn rejects_missing_credential() {
        let key = SecretString::from("secret".to_string());
        assert!(authenticate(&HeaderMap::new(), Some(&key)).is_err());
    }

    #[test]
    fn rejects_mismatched_credential() {
        let key = SecretString::from("secret".to_string());
        let headers = headers_with("x-api-key", "wrong");
        assert!(authenticate(&headers, Some(&key)).is_err());
    }
}
