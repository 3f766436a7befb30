//! Per-call request configuration.

use crate::body::Body;
use crate::codec::Codecs;
use crate::cookie::{Cookie, CookieStore};
use crate::error::HttpError;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::profile::ClientProfile;
use crate::query::{QueryMap, QuerySerializer};
use crate::transport::Transport;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything one logical request needs: URL template, path parameters, query,
/// headers, cookies, body, limits and per-request hooks.
///
/// A descriptor is owned by exactly one call. Unset fields are filled from the
/// [`ClientProfile`] when the call starts; values set here always win.
#[derive(Default)]
pub struct RequestDescriptor {
    base_url: String,
    url: String,
    method: Option<Method>,
    params: BTreeMap<String, String>,
    query: QueryMap,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Option<Body>,
    body_revision: u64,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
    max_body_length: Option<usize>,
    max_redirects: Option<usize>,
    query_serializer: Option<QuerySerializer>,
    codecs: Codecs,
    transport: Option<Transport>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            url: url.into(),
            ..Self::default()
        }
    }

    // --- URL ---------------------------------------------------------------

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.base_url = base_url.into();
        self
    }

    /// Path parameters substituted for `:name` tokens.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Insert every entry of `params`, replacing existing keys.
    pub fn set_params<K, V>(&mut self, params: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.set_param(key, value);
        }
        self
    }

    #[must_use]
    pub fn query(&self) -> &QueryMap {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryMap {
        &mut self.query
    }

    /// Replace every value of `key` with `value`.
    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.insert(key.into(), vec![value.into()]);
        self
    }

    /// Append `value` to the values of `key`.
    pub fn add_query(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Append every value of `query`.
    pub fn extend_query(&mut self, query: QueryMap) -> &mut Self {
        for (key, values) in query {
            self.query.entry(key).or_default().extend(values);
        }
        self
    }

    #[must_use]
    pub fn query_serializer(&self) -> Option<&QuerySerializer> {
        self.query_serializer.as_ref()
    }

    pub fn set_query_serializer(&mut self, serializer: QuerySerializer) -> &mut Self {
        self.query_serializer = Some(serializer);
        self
    }

    /// Encoded query string, without the leading `?`.
    ///
    /// Uses the configured serializer's custom encoder when there is one, and
    /// the alphabetical default encoding otherwise.
    #[must_use]
    pub fn build_query(&self) -> String {
        self.query_serializer
            .as_ref()
            .map_or_else(QuerySerializer::standard, Clone::clone)
            .encode(&self.query)
    }

    /// Final request URL.
    ///
    /// - Without a base URL the template is used as-is.
    /// - A template containing `://` is absolute and ignores the base URL.
    /// - Otherwise the base (made to end with one `/`, given `https://` when it
    ///   has no scheme) and the template (leading `/` stripped) are joined and
    ///   parsed. A result that does not parse yields `""`.
    ///
    /// Path parameters are then substituted (plain text replacement of every
    /// `:name`; unknown tokens stay as they are) and the query string is
    /// appended with `?`, or `&` when the URL already has a query.
    #[must_use]
    pub fn build_url(&self) -> String {
        if self.base_url.is_empty() || self.url.contains("://") {
            return self.substitute_and_append_query(self.url.clone());
        }

        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        if !base.contains("://") {
            base.insert_str(0, "https://");
        }
        let joined = format!("{base}{}", self.url.trim_start_matches('/'));

        match url::Url::parse(&joined) {
            Ok(parsed) => self.substitute_and_append_query(parsed.into()),
            Err(e) => {
                tracing::debug!(error = %e, "request URL did not parse");
                String::new()
            }
        }
    }

    fn substitute_and_append_query(&self, mut url: String) -> String {
        for (key, value) in &self.params {
            url = url.replace(&format!(":{key}"), value);
        }

        let query = self.build_query();
        if query.is_empty() {
            return url;
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{query}")
    }

    // --- method, headers, cookies -------------------------------------------

    /// Method, `None` until set or merged (merging defaults it to `GET`).
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any existing values of that name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is not a valid header.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, HttpError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add a header value, keeping existing values of that name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is not a valid header.
    pub fn append_header<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, HttpError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    // --- body ------------------------------------------------------------------

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Replace the body.
    ///
    /// When this happens inside a request interceptor the new body is resolved
    /// again before sending.
    pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
        self.body = Some(body.into());
        self.body_revision += 1;
        self
    }

    pub fn clear_body(&mut self) -> &mut Self {
        if self.body.take().is_some() {
            self.body_revision += 1;
        }
        self
    }

    pub(crate) fn body_revision(&self) -> u64 {
        self.body_revision
    }

    /// Body and headers at once, for in-place resolution.
    pub(crate) fn body_and_headers_mut(&mut self) -> (Option<&mut Body>, &mut HeaderMap) {
        (self.body.as_mut(), &mut self.headers)
    }

    // --- limits, cancellation, codecs -----------------------------------------

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Deadline for the whole exchange. `Duration::ZERO` means "inherit".
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) -> &mut Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub fn max_body_length(&self) -> Option<usize> {
        self.max_body_length
    }

    /// Maximum decoded response body size; `0` disables the limit.
    pub fn set_max_body_length(&mut self, limit: usize) -> &mut Self {
        self.max_body_length = Some(limit);
        self
    }

    #[must_use]
    pub fn max_redirects(&self) -> Option<usize> {
        self.max_redirects
    }

    /// Maximum redirects followed; `0` disables the limit.
    pub fn set_max_redirects(&mut self, max: usize) -> &mut Self {
        self.max_redirects = Some(max);
        self
    }

    #[must_use]
    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    pub fn codecs_mut(&mut self) -> &mut Codecs {
        &mut self.codecs
    }

    #[must_use]
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    /// Use a specific transport for this request instead of the profile's.
    pub fn set_transport(&mut self, transport: Transport) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn cookie_store(&self) -> Option<&Arc<dyn CookieStore>> {
        self.cookie_store.as_ref()
    }

    pub fn set_cookie_store(&mut self, store: Arc<dyn CookieStore>) -> &mut Self {
        self.cookie_store = Some(store);
        self
    }

    // --- interceptors ------------------------------------------------------------

    pub fn append_request_interceptor(
        &mut self,
        interceptor: impl RequestInterceptor + 'static,
    ) -> &mut Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn prepend_request_interceptor(
        &mut self,
        interceptor: impl RequestInterceptor + 'static,
    ) -> &mut Self {
        self.request_interceptors.insert(0, Arc::new(interceptor));
        self
    }

    pub fn append_response_interceptor(
        &mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> &mut Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn prepend_response_interceptor(
        &mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> &mut Self {
        self.response_interceptors.insert(0, Arc::new(interceptor));
        self
    }

    pub(crate) fn request_interceptors(&self) -> Vec<Arc<dyn RequestInterceptor>> {
        self.request_interceptors.clone()
    }

    pub(crate) fn response_interceptors(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        self.response_interceptors.clone()
    }

    // --- merge -----------------------------------------------------------------------

    /// Fill unset fields from `profile`. Values already on the descriptor win.
    ///
    /// Timeouts of zero count as unset. Profile params and query keys are
    /// added only when the descriptor lacks them. Codecs fall back slot by
    /// slot to the profile's and finally to the built-in JSON/XML codecs.
    pub(crate) fn merge_profile(&mut self, profile: &ClientProfile) {
        if self.base_url.is_empty() {
            self.base_url.clone_from(&profile.base_url);
        }
        if self.transport.is_none() {
            self.transport.clone_from(&profile.transport);
        }
        if self.timeout.is_none_or(|t| t.is_zero()) {
            self.timeout = profile.timeout.filter(|t| !t.is_zero());
        }
        if self.cookie_store.is_none() {
            self.cookie_store.clone_from(&profile.cookie_store);
        }
        if self.method.is_none() {
            self.method = Some(Method::GET);
        }
        if self.query_serializer.is_none() {
            self.query_serializer = Some(profile.query_serializer.clone());
        }
        if self.max_body_length.is_none() {
            self.max_body_length = Some(profile.max_body_length);
        }
        if self.max_redirects.is_none() {
            self.max_redirects = Some(profile.max_redirects);
        }
        for (key, value) in &profile.params {
            self.params
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, values) in &profile.query {
            self.query
                .entry(key.clone())
                .or_insert_with(|| values.clone());
        }
        self.codecs = self.codecs.or(&profile.codecs);
    }
}

fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), HttpError>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = HeaderName::try_from(name).map_err(|e| HttpError::RequestBuild(e.into()))?;
    let value = HeaderValue::try_from(value).map_err(|e| HttpError::RequestBuild(e.into()))?;
    Ok((name, value))
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.len())
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("max_body_length", &self.max_body_length)
            .field("max_redirects", &self.max_redirects)
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn descriptor(base: &str, url: &str) -> RequestDescriptor {
        let mut d = RequestDescriptor::new(Method::GET, url);
        d.set_base_url(base);
        d
    }

    #[test]
    fn test_build_url_table() {
        let cases = [
            ("https://github.com", "/fupengl", "https://github.com/fupengl"),
            ("https://github.com", "fupengl", "https://github.com/fupengl"),
            ("https://github.com/", "/fupengl", "https://github.com/fupengl"),
            ("https://github.com/", "fupengl", "https://github.com/fupengl"),
            ("", "/fupengl", "/fupengl"),
            ("", "https://www.baidu.com", "https://www.baidu.com"),
            ("www.baidu.com", "a", "https://www.baidu.com/a"),
            ("www.baidu.com/", "/a", "https://www.baidu.com/a"),
            ("https://api.example.com/v1", "users", "https://api.example.com/v1/users"),
        ];
        for (base, url, expected) in cases {
            assert_eq!(descriptor(base, url).build_url(), expected, "base={base} url={url}");
        }
    }

    #[test]
    fn test_absolute_url_ignores_base() {
        let d = descriptor("https://base.example.com", "http://other.example.com/x");
        assert_eq!(d.build_url(), "http://other.example.com/x");

        let mut d = descriptor("https://base.example.com", "http://other.example.com/x");
        d.set_query("a", "1");
        assert_eq!(d.build_url(), "http://other.example.com/x?a=1");
    }

    #[test]
    fn test_build_url_appends_query() {
        let mut d = descriptor("www.baidu.com", "a");
        d.set_query("a", "a");
        assert_eq!(d.build_url(), "https://www.baidu.com/a?a=a");
    }

    #[test]
    fn test_params_substituted_before_query() {
        let mut d = descriptor("www.baidu.com/:id", "a");
        d.set_param("id", "xxx").set_query("a", "a");
        assert_eq!(d.build_url(), "https://www.baidu.com/xxx/a?a=a");
    }

    #[test]
    fn test_unresolved_param_left_verbatim() {
        let mut d = descriptor("", "/users/:id/posts/:post");
        d.set_param("id", "7");
        assert_eq!(d.build_url(), "/users/7/posts/:post");
    }

    #[test]
    fn test_existing_query_uses_ampersand() {
        let mut d = descriptor("", "https://x.com/search?q=1");
        d.add_query("page", "2");
        assert_eq!(d.build_url(), "https://x.com/search?q=1&page=2");
    }

    #[test]
    fn test_unparsable_url_fails_soft_to_empty() {
        let d = descriptor("http://[::1", "a");
        assert_eq!(d.build_url(), "");
    }

    #[test]
    fn test_build_query_default_and_custom() {
        let mut d = RequestDescriptor::default();
        d.add_query("a", "1");
        assert_eq!(d.build_query(), "a=1");

        d.set_query_serializer(QuerySerializer::new(|_: &QueryMap| String::new()));
        assert_eq!(d.build_query(), "");
        assert_eq!(d.build_url(), "");
    }

    #[test]
    fn test_set_query_replaces_add_query_appends() {
        let mut d = RequestDescriptor::default();
        d.add_query("k", "1").add_query("k", "2");
        assert_eq!(d.query()["k"], vec!["1", "2"]);
        d.set_query("k", "3");
        assert_eq!(d.query()["k"], vec!["3"]);
    }

    #[test]
    fn test_set_header_rejects_invalid() {
        let mut d = RequestDescriptor::default();
        assert!(d.set_header("bad header", "v").is_err());
        assert!(d.set_header("x-ok", "line\nbreak").is_err());
        d.set_header("x-ok", "1").unwrap();
        d.append_header("x-ok", "2").unwrap();
        assert_eq!(d.headers().get_all("x-ok").iter().count(), 2);
    }

    #[test]
    fn test_body_revision_tracks_changes() {
        let mut d = RequestDescriptor::default();
        let start = d.body_revision();
        d.clear_body();
        assert_eq!(d.body_revision(), start);
        d.set_body("x");
        d.clear_body();
        assert_eq!(d.body_revision(), start + 2);
    }

    #[test]
    fn test_merge_request_values_win() {
        let mut profile = ClientProfile::default();
        profile.base_url = "https://profile.example.com".into();
        profile.timeout = Some(Duration::from_secs(5));
        profile.max_body_length = 100;
        profile.max_redirects = 3;
        profile.params.insert("id".into(), "profile".into());
        profile.params.insert("org".into(), "acme".into());
        profile.query.insert("shared".into(), vec!["p".into()]);
        profile.query.insert("only".into(), vec!["p".into()]);

        let mut d = RequestDescriptor::default();
        d.set_base_url("https://mine.example.com")
            .set_param("id", "mine")
            .set_query("shared", "mine")
            .set_max_redirects(0)
            .set_timeout(Duration::ZERO);
        d.merge_profile(&profile);

        assert_eq!(d.base_url(), "https://mine.example.com");
        assert_eq!(d.method(), Some(&Method::GET));
        assert_eq!(d.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(d.max_body_length(), Some(100));
        assert_eq!(d.max_redirects(), Some(0));
        assert_eq!(d.params()["id"], "mine");
        assert_eq!(d.params()["org"], "acme");
        assert_eq!(d.query()["shared"], vec!["mine"]);
        assert_eq!(d.query()["only"], vec!["p"]);
    }

    #[test]
    fn test_merge_zero_timeouts_mean_none() {
        let mut profile = ClientProfile::default();
        profile.timeout = Some(Duration::ZERO);
        let mut d = RequestDescriptor::default();
        d.merge_profile(&profile);
        assert_eq!(d.timeout(), None);
    }

    #[test]
    fn test_merge_keeps_explicit_method() {
        let mut d = RequestDescriptor::new(Method::DELETE, "/x");
        d.merge_profile(&ClientProfile::default());
        assert_eq!(d.method(), Some(&Method::DELETE));
    }
}
