use crate::codec::Codecs;
use crate::cookie::{Cookie, CookieStore};
use crate::interceptor::{RequestChain, ResponseChain};
use crate::query::{QueryMap, QuerySerializer};
use crate::transport::Transport;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-fetch/", env!("CARGO_PKG_VERSION"));

/// Default `Accept-Encoding` (every encoding the response decoder understands)
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, br, deflate";

/// Default `Accept`
pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

/// Default maximum number of redirects followed
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default maximum decoded response body size (10 MB)
pub const DEFAULT_MAX_BODY_LENGTH: usize = 10 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Connection-level settings used by [`Transport::build`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Transport security mode (default: `TlsOnly`)
    pub security: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for establishing a TCP connection (default: 10 seconds)
    pub connect_timeout: Option<Duration>,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            security: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            connect_timeout: Some(Duration::from_secs(10)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Small pool, short idle timeout
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }
}

/// Client-wide defaults shared by every request.
///
/// A request only reads the profile: it copies what it needs when it is
/// merged and snapshots both interceptor chains at that moment. Interceptors
/// may still be appended or prepended through the chains' own locking, but
/// registrations made while requests are in flight only affect later requests.
/// Everything else is changed by cloning the profile, modifying the copy, and
/// building a new client from it (see `HttpClient::clone_profile`).
#[derive(Clone)]
pub struct ClientProfile {
    /// Prefix for relative request URLs (`https://` is assumed when it has no scheme)
    pub base_url: String,

    /// Headers sent with every request; request headers of the same name replace them
    pub headers: HeaderMap,

    /// Cookies sent with every request
    pub cookies: Vec<Cookie>,

    /// Persistent cookie store shared by every request (default: none)
    pub cookie_store: Option<Arc<dyn CookieStore>>,

    /// Path parameters merged into requests that do not define them
    pub params: BTreeMap<String, String>,

    /// Query values merged into requests that do not define the key
    pub query: QueryMap,

    /// Query encoding used when a request does not bring its own
    pub query_serializer: QuerySerializer,

    /// Request-phase interceptors, run before the request's own
    pub request_interceptors: RequestChain,

    /// Response-phase interceptors, run before the request's own
    pub response_interceptors: ResponseChain,

    /// Maximum decoded response body size in bytes, `0` = unlimited (default: 10 MB)
    pub max_body_length: usize,

    /// Maximum redirects per request, `0` = unlimited (default: 10)
    pub max_redirects: usize,

    /// Deadline for a whole exchange, `None` or zero = no deadline (default: 30 seconds)
    pub timeout: Option<Duration>,

    /// User-Agent header value applied when a request sets none
    pub user_agent: String,

    /// Marshal/unmarshal overrides
    pub codecs: Codecs,

    /// Shared transport handle (filled in by the client builder)
    pub transport: Option<Transport>,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            cookie_store: None,
            params: BTreeMap::new(),
            query: QueryMap::new(),
            query_serializer: QuerySerializer::standard(),
            request_interceptors: RequestChain::new(),
            response_interceptors: ResponseChain::new(),
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: Some(Duration::from_secs(30)),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            codecs: Codecs::default(),
            transport: None,
        }
    }
}

impl ClientProfile {
    /// Profile for short-lived calls: 10 second deadline, 1 MB bodies, 5 redirects
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            max_body_length: 1024 * 1024,
            max_redirects: 5,
            timeout: Some(Duration::from_secs(10)),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProfile")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("cookie_store", &self.cookie_store.is_some())
            .field("params", &self.params)
            .field("query", &self.query)
            .field("query_serializer", &self.query_serializer)
            .field("request_interceptors", &self.request_interceptors)
            .field("response_interceptors", &self.response_interceptors)
            .field("max_body_length", &self.max_body_length)
            .field("max_redirects", &self.max_redirects)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("codecs", &self.codecs)
            .field("transport", &self.transport)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::descriptor::RequestDescriptor;
    use crate::error::HttpError;

    #[test]
    fn test_profile_default() {
        let profile = ClientProfile::default();
        assert_eq!(profile.max_redirects, 10);
        assert_eq!(profile.max_body_length, 10 * 1024 * 1024);
        assert_eq!(profile.timeout, Some(Duration::from_secs(30)));
        assert_eq!(profile.user_agent, DEFAULT_USER_AGENT);
        assert!(profile.transport.is_none());
        assert!(profile.request_interceptors.is_empty());
    }

    #[test]
    fn test_profile_minimal() {
        let profile = ClientProfile::minimal();
        assert_eq!(profile.max_body_length, 1024 * 1024);
        assert_eq!(profile.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.security, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert_eq!(config.pool_max_idle_per_host, 32);
        assert_eq!(TransportConfig::minimal().pool_max_idle_per_host, 8);
    }

    #[test]
    fn test_clone_copies_interceptor_lists() {
        let profile = ClientProfile::default();
        profile
            .request_interceptors
            .append(|_: &mut RequestDescriptor| -> Result<(), HttpError> { Ok(()) });

        let copy = profile.clone();
        copy.request_interceptors.clear();

        assert_eq!(profile.request_interceptors.len(), 1);
        assert!(copy.request_interceptors.is_empty());
    }
}
