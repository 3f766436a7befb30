use crate::body::{Body, StructuredBody, XML_CONTENT_TYPE};
use crate::client::HttpClient;
use crate::codec::Codecs;
use crate::cookie::Cookie;
use crate::descriptor::RequestDescriptor;
use crate::error::HttpError;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::multipart::MultipartForm;
use crate::query::{QuerySerializer, decode_query};
use crate::response::Response;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fluent wrapper around a [`RequestDescriptor`].
///
/// Created by [`HttpClient::request`], [`HttpClient::get`], etc. Setters that
/// can fail (invalid headers, unserializable bodies) remember the first error
/// and return it from [`send()`](RequestBuilder::send).
///
/// # Example
///
/// ```ignore
/// let user: User = client
///     .get("/users/:id")
///     .param("id", "42")
///     .query("expand", "roles")
///     .header("x-request-id", "abc123")
///     .send()
///     .await?
///     .json()?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: HttpClient,
    descriptor: RequestDescriptor,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, descriptor: RequestDescriptor) -> Self {
        Self {
            client,
            descriptor,
            error: None,
        }
    }

    /// Edit the descriptor directly.
    pub fn with(mut self, edit: impl FnOnce(&mut RequestDescriptor)) -> Self {
        edit(&mut self.descriptor);
        self
    }

    fn record(&mut self, result: Result<(), HttpError>) {
        if let Err(e) = result
            && self.error.is_none()
        {
            self.error = Some(e);
        }
    }

    /// Set a header, replacing profile and earlier values of that name.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let result = self.descriptor.set_header(name, value).map(|_| ());
        self.record(result);
        self
    }

    /// Add several headers, keeping repeated names.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        for (name, value) in headers {
            let result = self.descriptor.append_header(name, value).map(|_| ());
            self.record(result);
        }
        self
    }

    /// Append a query value.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.add_query(key, value);
        self
    }

    /// Replace every value of a query key.
    pub fn set_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.set_query(key, value);
        self
    }

    /// Append query values from any `Serialize` value that encodes as a form
    /// (structs, maps, pair slices).
    pub fn queries<T: Serialize + ?Sized>(mut self, values: &T) -> Self {
        match serde_urlencoded::to_string(values) {
            Ok(encoded) => {
                self.descriptor.extend_query(decode_query(&encoded));
            }
            Err(e) => self.record(Err(e.into())),
        }
        self
    }

    /// Path parameter substituted for `:key`.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.set_param(key, value);
        self
    }

    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.descriptor.set_params(params);
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.descriptor.add_cookie(cookie);
        self
    }

    pub fn cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        for cookie in cookies {
            self.descriptor.add_cookie(cookie);
        }
        self
    }

    /// Raw body: bytes, text, a query map (form), a multipart form or a stream.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.descriptor.set_body(body);
        self
    }

    /// Structured body, sent as JSON unless the content type says XML.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match StructuredBody::new(value) {
            Ok(body) => {
                self.descriptor.set_body(body);
            }
            Err(e) => self.record(Err(e)),
        }
        self
    }

    /// Structured body sent as XML under a `root` element.
    ///
    /// Sets `Content-Type: application/xml` unless one is already present.
    pub fn xml<T: Serialize + ?Sized>(mut self, value: &T, root: impl Into<String>) -> Self {
        match StructuredBody::new(value) {
            Ok(body) => {
                self.descriptor.set_body(body.with_xml_root(root));
                let headers = self.descriptor.headers_mut();
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
                }
            }
            Err(e) => self.record(Err(e)),
        }
        self
    }

    /// URL-encoded form body from any form-shaped `Serialize` value.
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Self {
        match serde_urlencoded::to_string(fields) {
            Ok(encoded) => {
                self.descriptor.set_body(Body::Form(decode_query(&encoded)));
            }
            Err(e) => self.record(Err(e.into())),
        }
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.descriptor.set_body(form);
        self
    }

    /// Deadline for this exchange; `Duration::ZERO` inherits the client's.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.set_timeout(timeout);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.descriptor.set_cancellation(token);
        self
    }

    pub fn max_body_length(mut self, limit: usize) -> Self {
        self.descriptor.set_max_body_length(limit);
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.descriptor.set_max_redirects(max);
        self
    }

    pub fn query_serializer(mut self, serializer: QuerySerializer) -> Self {
        self.descriptor.set_query_serializer(serializer);
        self
    }

    /// Codec overrides for this request; unset slots fall back to the client's.
    pub fn codecs(mut self, codecs: Codecs) -> Self {
        *self.descriptor.codecs_mut() = codecs;
        self
    }

    /// Interceptor run after the client's request interceptors.
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.descriptor.append_request_interceptor(interceptor);
        self
    }

    /// Interceptor run after the client's response interceptors.
    pub fn response_interceptor(
        mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> Self {
        self.descriptor.append_response_interceptor(interceptor);
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Give up the builder, keeping the descriptor for later execution.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while building.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, HttpError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.descriptor),
        }
    }

    /// Send the request and read the decoded response.
    ///
    /// Every HTTP status is returned as `Ok`; use
    /// [`Response::error_for_status`] to turn non-2xx into errors.
    ///
    /// # Errors
    ///
    /// Any error recorded while building, then every failure of the pipeline:
    /// URL validation, interceptors, transport, redirects, timeout,
    /// cancellation and body decoding.
    pub async fn send(self) -> Result<Response, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.client.execute(self.descriptor).await
    }
}
