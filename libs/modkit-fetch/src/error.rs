use std::time::Duration;
use thiserror::Error;

/// Boxed error type used at the transport and codec seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match &err {
///     HttpError::InvalidUri { kind, .. } => match kind {
///         InvalidUriKind::ParseError => println!("Malformed URL syntax"),
///         InvalidUriKind::MissingAuthority => println!("URL needs a host"),
///         InvalidUriKind::MissingScheme => println!("URL needs http:// or https://"),
///         _ => println!("Other URI error"),
///     },
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax, or the fail-soft URL builder produced nothing)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP client error types
///
/// No variant is retried internally: every failure aborts the pipeline and is
/// returned to the caller as-is.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// The request body could not be produced (stream failure, multipart error)
    #[error("Request body could not be produced: {0}")]
    Body(#[source] BoxError),

    /// JSON encoding or decoding failed
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML encoding failed
    #[error("XML serialization failed: {0}")]
    XmlSerialize(#[from] quick_xml::SeError),

    /// XML decoding failed
    #[error("XML deserialization failed: {0}")]
    XmlDeserialize(#[from] quick_xml::DeError),

    /// A caller-supplied marshal/unmarshal override failed
    #[error("Custom codec failed: {0}")]
    Marshal(#[source] BoxError),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Rejected by an interceptor.
    ///
    /// Interceptors may return any `HttpError`; this variant is a convenience
    /// for wrapping foreign errors. It is never produced by the pipeline itself.
    #[error("Rejected by interceptor: {0}")]
    Rejected(#[source] BoxError),

    /// The exchange did not complete within the resolved timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired
    #[error("Request cancelled")]
    Cancelled,

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// A 3xx response arrived without a `Location` header
    #[error("redirect missing location header")]
    RedirectMissingLocation,

    /// The redirect counter exceeded the configured maximum
    #[error("maximum number of redirects ({max}) exceeded")]
    TooManyRedirects { max: usize },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Decompression stream could not be constructed or failed mid-stream
    #[error("Failed to decode '{encoding}' response body: {source}")]
    Decompress {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Reading the raw response body failed
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] BoxError),

    /// HTTP non-2xx status (only from [`Response::error_for_status`](crate::Response::error_for_status))
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// Filesystem error (saving a response body)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only; do not match on its contents
    /// as the format is unstable and may change between releases.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl HttpError {
    /// Wrap a foreign error as an interceptor rejection.
    pub fn rejected(err: impl Into<BoxError>) -> Self {
        HttpError::Rejected(err.into())
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().unwrap();
        let downcast = source.downcast_ref::<TestError>();
        assert_eq!(downcast.unwrap().0, "connection refused");
    }

    #[test]
    fn test_rejected_preserves_source() {
        let err = HttpError::rejected(TestError("missing api key"));

        let source = err.source().unwrap();
        assert_eq!(source.downcast_ref::<TestError>().unwrap().0, "missing api key");
    }

    #[test]
    fn test_redirect_error_messages() {
        assert_eq!(
            HttpError::RedirectMissingLocation.to_string(),
            "redirect missing location header"
        );
        assert_eq!(
            HttpError::TooManyRedirects { max: 3 }.to_string(),
            "maximum number of redirects (3) exceeded"
        );
    }

    #[test]
    fn test_error_chain_traversal() {
        let err = HttpError::Decompress {
            encoding: "gzip",
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"),
        };

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }

        assert_eq!(count, 2, "HttpError and the io::Error");
    }
}
