use crate::codec::Codecs;
use crate::cookie::Cookie;
use crate::descriptor::RequestDescriptor;
use crate::error::HttpError;
use crate::performance::Performance;
use crate::security::ERROR_BODY_PREVIEW_LIMIT;
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, SET_COOKIE};
use http::{Extensions, HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use url::Url;

/// Fully materialized result of one logical exchange.
///
/// The body is already read, size-checked, and decoded. Nothing about the
/// response changes after the pipeline returns it except the extension map,
/// which response interceptors use to annotate it.
pub struct Response {
    status: StatusCode,
    status_text: String,
    version: Version,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Bytes,
    url: Url,
    request: RequestDescriptor,
    performance: Performance,
    codecs: Codecs,
    extensions: Extensions,
}

impl Response {
    pub(crate) fn new(
        parts: http::response::Parts,
        body: Bytes,
        url: Url,
        request: RequestDescriptor,
        performance: Performance,
    ) -> Self {
        let status_text = parts
            .extensions
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
            .or_else(|| parts.status.canonical_reason().map(str::to_owned))
            .unwrap_or_default();
        let cookies = parts
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect();
        let codecs = request.codecs().clone();

        Self {
            status: parts.status,
            status_text,
            version: parts.version,
            headers: parts.headers,
            cookies,
            body,
            url,
            request,
            performance,
            codecs,
            extensions: Extensions::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase sent by the server, or the canonical one for the status.
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// `true` for 2xx statuses.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Cookies set by the final response (`Set-Cookie`).
    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// `Content-Encoding` as sent by the server; the body is already decoded.
    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
    }

    /// URL of the final hop.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Descriptor that produced this response, after merge and interception.
    #[must_use]
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    #[must_use]
    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Body as UTF-8; invalid sequences are replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON using the request's unmarshal override, if any.
    ///
    /// # Errors
    ///
    /// `Json` for malformed documents, `Marshal` when the override fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        self.codecs.unmarshal_json(&self.body)
    }

    /// Decode the body as XML using the request's unmarshal override, if any.
    ///
    /// # Errors
    ///
    /// `XmlDeserialize` for malformed documents, `Marshal` when the override fails.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        self.codecs.unmarshal_xml(&self.body)
    }

    /// Write the decoded body to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Io` if the file cannot be written.
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), HttpError> {
        tokio::fs::write(path, &self.body).await?;
        Ok(())
    }

    /// Turn non-2xx responses into `HttpError::HttpStatus`.
    ///
    /// The error carries up to 8KB of the body for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let preview = &self.body[..self.body.len().min(ERROR_BODY_PREVIEW_LIMIT)];
        Err(HttpError::HttpStatus {
            status: self.status,
            body_preview: String::from_utf8_lossy(preview).into_owned(),
            content_type: self
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        })
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.len())
            .field("body_len", &self.body.len())
            .field("performance", &self.performance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub fn test_response(
    status: u16,
    headers: &[(&'static str, &'static str)],
    body: &'static str,
) -> Response {
    use crate::performance::PerformanceRecorder;

    let mut builder = http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    Response::new(
        parts,
        Bytes::from_static(body.as_bytes()),
        Url::parse("https://api.example.com/items").unwrap(),
        RequestDescriptor::default(),
        PerformanceRecorder::start().finish(),
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn test_status_text_canonical() {
        let response = test_response(404, &[], "");
        assert_eq!(response.status_text(), "Not Found");
        assert!(!response.is_ok());
    }

    #[test]
    fn test_json_and_text() {
        let response = test_response(200, &[("content-type", "application/json")], r#"{"id":7}"#);
        assert!(response.is_ok());
        assert_eq!(response.text(), r#"{"id":7}"#);
        assert_eq!(response.json::<Item>().unwrap(), Item { id: 7 });
    }

    #[test]
    fn test_xml() {
        let response = test_response(200, &[], "<item><id>3</id></item>");
        assert_eq!(response.xml::<Item>().unwrap(), Item { id: 3 });
    }

    #[test]
    fn test_set_cookie_parsed() {
        let response = test_response(
            200,
            &[("set-cookie", "session=abc; Path=/"), ("set-cookie", "theme=dark")],
            "",
        );
        let names: Vec<_> = response.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["session", "theme"]);
    }

    #[test]
    fn test_content_encoding_reported() {
        let response = test_response(200, &[("content-encoding", "gzip")], "plain");
        assert_eq!(response.content_encoding(), Some("gzip"));
    }

    #[test]
    fn test_error_for_status() {
        let ok = test_response(204, &[], "");
        assert!(ok.error_for_status().is_ok());

        let failed = test_response(503, &[("content-type", "text/plain")], "maintenance");
        match failed.error_for_status() {
            Err(HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body_preview, "maintenance");
                assert_eq!(content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_extensions_annotation() {
        #[derive(Clone, Debug, PartialEq)]
        struct Tag(&'static str);

        let mut response = test_response(200, &[], "");
        response.extensions_mut().insert(Tag("audited"));
        assert_eq!(response.extensions().get::<Tag>(), Some(&Tag("audited")));
    }

    #[tokio::test]
    async fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.txt");
        let response = test_response(200, &[], "saved body");
        response.save_to_file(&path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved body");
    }
}
