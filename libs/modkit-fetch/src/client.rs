use crate::builder::HttpClientBuilder;
use crate::descriptor::RequestDescriptor;
use crate::dispatch;
use crate::error::HttpError;
use crate::multipart::MultipartForm;
use crate::profile::{ClientProfile, TransportConfig};
use crate::request::RequestBuilder;
use crate::response::Response;
use crate::transport::Transport;
use http::Method;
use std::sync::Arc;

/// HTTP client bound to one [`ClientProfile`].
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Cloning is cheap (an `Arc` clone);
/// clones share the profile, the connection pool and the cookie store.
/// Callers do NOT need to wrap it in a `Mutex`.
///
/// The profile is read-only once the client exists. To derive a client with
/// different defaults, take [`clone_profile`](Self::clone_profile), edit the
/// copy and pass it to [`with_profile`](Self::with_profile).
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .base_url("https://api.example.com/v1")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// let user: User = client
///     .get("/users/:id")
///     .param("id", "42")
///     .send()
///     .await?
///     .error_for_status()?
///     .json()?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    pub(crate) profile: Arc<ClientProfile>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Client running on `profile`.
    ///
    /// A default transport is built when the profile has none.
    ///
    /// # Errors
    /// Returns an error if the transport cannot be built
    pub fn with_profile(mut profile: ClientProfile) -> Result<Self, HttpError> {
        if profile.transport.is_none() {
            profile.transport = Some(Transport::build(&TransportConfig::default())?);
        }
        Ok(Self {
            profile: Arc::new(profile),
        })
    }

    #[must_use]
    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    /// Independent copy of the profile.
    ///
    /// Interceptor lists are copied, so changes to the copy never reach this
    /// client. The transport and cookie store stay shared.
    #[must_use]
    pub fn clone_profile(&self) -> ClientProfile {
        ClientProfile::clone(&self.profile)
    }

    /// Request builder for `method` and `url`.
    ///
    /// `url` may be absolute or relative to the profile's base URL, and may
    /// contain `:name` path parameters.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), RequestDescriptor::new(method, url))
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn options(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::OPTIONS, url)
    }

    pub fn connect(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::CONNECT, url)
    }

    pub fn trace(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::TRACE, url)
    }

    /// POST a `multipart/form-data` body.
    pub fn upload(&self, url: impl Into<String>, form: MultipartForm) -> RequestBuilder {
        self.post(url).multipart(form)
    }

    /// Execute a prepared descriptor against this client's profile.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::send`].
    pub async fn execute(&self, request: RequestDescriptor) -> Result<Response, HttpError> {
        dispatch::execute(&self.profile, request).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::profile::TransportSecurity;
    use httpmock::prelude::{GET, MockServer};
    use serde_json::json;

    fn test_client() -> HttpClient {
        HttpClientBuilder::new().allow_insecure_http().build().unwrap()
    }

    #[tokio::test]
    async fn test_http_client_get() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/test");
            then.status(200).json_body(json!({"success": true}));
        });

        let client = test_client();
        let resp = client
            .get(format!("{}/test", server.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(resp.json::<serde_json::Value>().unwrap()["success"], true);
    }

    #[tokio::test]
    async fn test_method_helpers() {
        let client = test_client();
        let cases = [
            (client.get("/x"), Method::GET),
            (client.post("/x"), Method::POST),
            (client.put("/x"), Method::PUT),
            (client.patch("/x"), Method::PATCH),
            (client.delete("/x"), Method::DELETE),
            (client.head("/x"), Method::HEAD),
            (client.options("/x"), Method::OPTIONS),
            (client.connect("/x"), Method::CONNECT),
            (client.trace("/x"), Method::TRACE),
        ];
        for (builder, method) in cases {
            assert_eq!(builder.descriptor().method(), Some(&method));
        }
    }

    #[tokio::test]
    async fn test_upload_sets_multipart_body() {
        let client = test_client();
        let mut form = MultipartForm::new();
        form.add_field("name", "report");
        let builder = client.upload("/files", form);
        assert_eq!(builder.descriptor().method(), Some(&Method::POST));
        assert!(matches!(builder.descriptor().body(), Some(Body::Multipart(_))));
    }

    #[tokio::test]
    async fn test_base_url_and_params() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/v1/users/42").query_param("expand", "roles");
            then.status(200).body("ok");
        });

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .base_url(format!("{}/v1", server.base_url()))
            .build()
            .unwrap();
        let resp = client
            .get("/users/:id")
            .param("id", "42")
            .query("expand", "roles")
            .send()
            .await
            .unwrap();

        m.assert();
        assert_eq!(resp.text(), "ok");
    }

    #[tokio::test]
    async fn test_clone_profile_is_independent() {
        let client = test_client();
        let mut profile = client.clone_profile();
        profile.user_agent = "derived/1.0".to_owned();
        profile
            .request_interceptors
            .append(|_: &mut RequestDescriptor| -> Result<(), HttpError> { Ok(()) });

        let derived = HttpClient::with_profile(profile).unwrap();
        assert_eq!(derived.profile().user_agent, "derived/1.0");
        assert_eq!(derived.profile().request_interceptors.len(), 1);
        assert!(client.profile().request_interceptors.is_empty());
        assert_ne!(client.profile().user_agent, "derived/1.0");
    }

    #[tokio::test]
    async fn test_with_profile_builds_default_transport() {
        let client = HttpClient::with_profile(ClientProfile::default()).unwrap();
        let transport = client.profile().transport.as_ref().unwrap();
        assert_eq!(transport.security(), TransportSecurity::TlsOnly);
    }

    #[tokio::test]
    async fn test_url_scheme_http_rejected_with_tls_only() {
        let client = HttpClient::new().unwrap();
        match client.get("http://example.com/test").send().await {
            Err(HttpError::InvalidScheme { scheme, reason }) => {
                assert_eq!(scheme, "http");
                assert!(reason.contains("TlsOnly"), "{reason}");
            }
            other => panic!("expected InvalidScheme, got {other:?}"),
        }
    }

    #[test]
    fn test_http_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<HttpClient>();
    }
}
