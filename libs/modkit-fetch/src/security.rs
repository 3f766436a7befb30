//! Scheme policy and error-preview limits.

use crate::error::{HttpError, InvalidUriKind};
use crate::profile::TransportSecurity;

/// Largest body excerpt copied into `HttpError::HttpStatus` (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Convert a built URL into a wire URI, enforcing the transport's scheme policy.
///
/// Applied to the initial URL and to every redirect target.
///
/// # Errors
///
/// `InvalidUri` when the URL cannot be expressed as an absolute URI with a host,
/// `InvalidScheme` for anything but `https` (or `http` when insecure HTTP is allowed).
pub fn validate_url(url: &str, security: TransportSecurity) -> Result<http::Uri, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match (uri.scheme_str(), security) {
        (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
        (Some("http"), TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
        }),
        (Some(scheme), _) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        (None, _) => Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_https_always_allowed() {
        let uri = validate_url("https://api.example.com/v1?a=1", TransportSecurity::TlsOnly).unwrap();
        assert_eq!(uri.host(), Some("api.example.com"));
        assert_eq!(uri.query(), Some("a=1"));
    }

    #[test]
    fn test_http_requires_insecure_mode() {
        match validate_url("http://localhost:8080/", TransportSecurity::TlsOnly) {
            Err(HttpError::InvalidScheme { scheme, .. }) => assert_eq!(scheme, "http"),
            other => panic!("expected InvalidScheme, got {other:?}"),
        }
        assert!(validate_url("http://localhost:8080/", TransportSecurity::AllowInsecureHttp).is_ok());
    }

    #[test]
    fn test_unsupported_scheme() {
        match validate_url("ftp://files.example.com/a", TransportSecurity::AllowInsecureHttp) {
            Err(HttpError::InvalidScheme { scheme, reason }) => {
                assert_eq!(scheme, "ftp");
                assert!(reason.contains("only http"));
            }
            other => panic!("expected InvalidScheme, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_host_or_garbage() {
        match validate_url("/relative/path", TransportSecurity::TlsOnly) {
            Err(HttpError::InvalidUri { kind, .. }) => {
                assert_eq!(kind, InvalidUriKind::MissingAuthority);
            }
            other => panic!("expected InvalidUri, got {other:?}"),
        }
        match validate_url("", TransportSecurity::TlsOnly) {
            Err(HttpError::InvalidUri { kind, .. }) => assert_eq!(kind, InvalidUriKind::ParseError),
            other => panic!("expected InvalidUri, got {other:?}"),
        }
    }
}
