use crate::codec::Codecs;
use crate::cookie::{Cookie, CookieJar, CookieStore};
use crate::error::HttpError;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::profile::{ClientProfile, TlsRootConfig, TransportConfig, TransportSecurity};
use crate::query::QuerySerializer;
use crate::settings::ClientSettings;
use crate::transport::Transport;
use http::header::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Builder for an [`HttpClient`](crate::HttpClient).
///
/// Collects a [`ClientProfile`] plus the connection settings used to build
/// the shared transport. Invalid header names or values are remembered and
/// reported by [`build`](Self::build).
pub struct HttpClientBuilder {
    profile: ClientProfile,
    transport: TransportConfig,
    error: Option<HttpError>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_profile(ClientProfile::default())
    }

    /// Start from an existing profile (for example a clone of another client's).
    ///
    /// A transport already present in the profile is reused as is.
    #[must_use]
    pub fn with_profile(profile: ClientProfile) -> Self {
        Self {
            profile,
            transport: TransportConfig::default(),
            error: None,
        }
    }

    /// Create a builder from file/env settings
    #[must_use]
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let mut builder = Self::new()
            .base_url(settings.base_url.clone())
            .max_body_length(settings.max_body_length)
            .max_redirects(settings.max_redirects)
            .tls_roots(settings.tls_roots)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host);
        builder.profile.timeout = settings.timeout;
        builder.transport.connect_timeout = settings.connect_timeout;

        if let Some(user_agent) = &settings.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if settings.allow_insecure_http {
            builder = builder.transport(TransportSecurity::AllowInsecureHttp);
        }
        if settings.cookie_jar {
            builder = builder.cookie_jar();
        }
        for (name, value) in &settings.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    /// Prefix for relative request URLs
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.profile.base_url = base_url.into();
        self
    }

    /// Header sent with every request
    #[must_use]
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if self.error.is_some() {
            return self;
        }
        let name = HeaderName::try_from(name).map_err(|e| HttpError::RequestBuild(e.into()));
        let value = HeaderValue::try_from(value).map_err(|e| HttpError::RequestBuild(e.into()));
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.profile.headers.insert(name, value);
            }
            (Err(e), _) | (_, Err(e)) => self.error = Some(e),
        }
        self
    }

    /// Cookie sent with every request
    #[must_use]
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.profile.cookies.push(cookie);
        self
    }

    /// Persist response cookies in `store` and replay them on matching requests
    #[must_use]
    pub fn cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.profile.cookie_store = Some(store);
        self
    }

    /// Shorthand for `.cookie_store(Arc::new(CookieJar::new()))`
    #[must_use]
    pub fn cookie_jar(self) -> Self {
        self.cookie_store(Arc::new(CookieJar::new()))
    }

    /// Default value for a `:name` path parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.params.insert(key.into(), value.into());
        self
    }

    /// Default query value, used by requests that do not set `key`
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile
            .query
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    #[must_use]
    pub fn query_serializer(mut self, serializer: QuerySerializer) -> Self {
        self.profile.query_serializer = serializer;
        self
    }

    /// Deadline for a whole exchange, redirects and body read included.
    ///
    /// `Duration::ZERO` disables the deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.profile.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.profile.user_agent = user_agent.into();
        self
    }

    /// Maximum decoded response body size in bytes, `0` = unlimited
    #[must_use]
    pub fn max_body_length(mut self, limit: usize) -> Self {
        self.profile.max_body_length = limit;
        self
    }

    /// Maximum redirects per request, `0` = unlimited
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.profile.max_redirects = max;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, security: TransportSecurity) -> Self {
        self.transport.security = security;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_fetch::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.transport.security = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.transport.tls_roots = roots;
        self
    }

    /// TCP connect timeout, `None` = wait for the OS
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transport.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout for the connection pool
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transport.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host (`0` disables reuse)
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.transport.pool_max_idle_per_host = max;
        self
    }

    /// Use a prebuilt transport instead of building one.
    ///
    /// Connection settings on this builder are ignored when a transport is given.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.profile.transport = Some(transport);
        self
    }

    /// JSON/XML marshal and unmarshal overrides
    #[must_use]
    pub fn codecs(mut self, codecs: Codecs) -> Self {
        self.profile.codecs = codecs;
        self
    }

    /// Append a client-wide request interceptor
    #[must_use]
    pub fn request_interceptor(self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.profile.request_interceptors.append(interceptor);
        self
    }

    /// Append a client-wide response interceptor
    #[must_use]
    pub fn response_interceptor(self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.profile.response_interceptors.append(interceptor);
        self
    }

    /// Build the client, creating the pooled transport unless one was supplied.
    ///
    /// # Errors
    /// Returns the first invalid header recorded by the builder, or
    /// `HttpError::Tls` if the TLS roots cannot be loaded.
    pub fn build(self) -> Result<crate::HttpClient, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let mut profile = self.profile;
        if profile.transport.is_none() {
            profile.transport = Some(Transport::build(&self.transport)?);
        }

        tracing::debug!(
            base_url = %profile.base_url,
            max_redirects = profile.max_redirects,
            max_body_length = profile.max_body_length,
            "http client built"
        );

        Ok(crate::HttpClient {
            profile: Arc::new(profile),
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::profile::DEFAULT_USER_AGENT;
    use serde_json::json;

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.profile.timeout, Some(Duration::from_secs(30)));
        assert_eq!(builder.profile.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.transport.security, TransportSecurity::TlsOnly);
        assert!(builder.error.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let builder = HttpClientBuilder::new()
            .base_url("https://api.example.com")
            .timeout(Duration::from_secs(5))
            .user_agent("custom/1.0")
            .max_body_length(1024)
            .max_redirects(2)
            .param("tenant", "acme")
            .query("v", "1")
            .cookie(Cookie::new("session", "abc"))
            .pool_max_idle_per_host(4);

        assert_eq!(builder.profile.base_url, "https://api.example.com");
        assert_eq!(builder.profile.timeout, Some(Duration::from_secs(5)));
        assert_eq!(builder.profile.user_agent, "custom/1.0");
        assert_eq!(builder.profile.max_body_length, 1024);
        assert_eq!(builder.profile.max_redirects, 2);
        assert_eq!(builder.profile.params["tenant"], "acme");
        assert_eq!(builder.profile.query["v"], vec!["1"]);
        assert_eq!(builder.profile.cookies.len(), 1);
        assert_eq!(builder.transport.pool_max_idle_per_host, 4);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let builder = HttpClientBuilder::new().timeout(Duration::ZERO);
        assert_eq!(builder.profile.timeout, None);
    }

    #[test]
    fn test_invalid_header_reported_on_build() {
        let result = HttpClientBuilder::new()
            .header("bad header", "value")
            .header("x-valid", "ok")
            .build();
        assert!(matches!(result, Err(HttpError::RequestBuild(_))));
    }

    #[test]
    fn test_from_settings() {
        let settings: ClientSettings = serde_json::from_value(json!({
            "base_url": "https://api.example.com/v1",
            "timeout": "15s",
            "max_redirects": 3,
            "user_agent": "svc/2",
            "allow_insecure_http": true,
            "cookie_jar": true,
            "headers": {"x-api-version": "2"}
        }))
        .unwrap();

        let builder = HttpClientBuilder::from_settings(&settings);
        assert_eq!(builder.profile.base_url, "https://api.example.com/v1");
        assert_eq!(builder.profile.timeout, Some(Duration::from_secs(15)));
        assert_eq!(builder.profile.max_redirects, 3);
        assert_eq!(builder.profile.user_agent, "svc/2");
        assert_eq!(builder.profile.headers["x-api-version"], "2");
        assert!(builder.profile.cookie_store.is_some());
        assert_eq!(
            builder.transport.security,
            TransportSecurity::AllowInsecureHttp
        );
    }

    #[test]
    fn test_interceptors_registered_on_profile() {
        let builder = HttpClientBuilder::new()
            .request_interceptor(|_: &mut crate::RequestDescriptor| -> Result<(), HttpError> {
                Ok(())
            })
            .response_interceptor(|_: &mut crate::Response| -> Result<(), HttpError> { Ok(()) });
        assert_eq!(builder.profile.request_interceptors.len(), 1);
        assert_eq!(builder.profile.response_interceptors.len(), 1);
    }

    #[tokio::test]
    async fn test_builder_build() {
        let client = HttpClientBuilder::new().build().unwrap();
        assert!(client.profile().transport.is_some());
    }

    #[tokio::test]
    async fn test_builder_build_with_insecure_http() {
        let client = HttpClientBuilder::new().allow_insecure_http().build().unwrap();
        let transport = client.profile().transport.as_ref().unwrap();
        assert_eq!(transport.security(), TransportSecurity::AllowInsecureHttp);
    }

    #[tokio::test]
    async fn test_with_transport_reused() {
        let transport = Transport::build(&TransportConfig {
            security: TransportSecurity::AllowInsecureHttp,
            ..TransportConfig::default()
        })
        .unwrap();

        // the builder's own security setting is ignored
        let client = HttpClientBuilder::new()
            .with_transport(transport)
            .build()
            .unwrap();
        let transport = client.profile().transport.as_ref().unwrap();
        assert_eq!(transport.security(), TransportSecurity::AllowInsecureHttp);
    }
}
