//! Request body values and their resolution to wire bytes.

use crate::codec::Codecs;
use crate::error::{BoxError, HttpError};
use crate::multipart::MultipartForm;
use crate::query::{QueryMap, encode_query};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Streaming body source.
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// A structured value waiting to be marshalled.
///
/// Holds the document form of the value plus the root element name used when
/// it is marshalled as XML.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredBody {
    value: Value,
    xml_root: String,
}

impl StructuredBody {
    /// Convert any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Json`] if the value cannot be represented as a document
    /// (for example a map with non-string keys).
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, HttpError> {
        Ok(Self::from_value(serde_json::to_value(value)?))
    }

    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            xml_root: "root".to_owned(),
        }
    }

    #[must_use]
    pub fn with_xml_root(mut self, root: impl Into<String>) -> Self {
        self.xml_root = root.into();
        self
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn xml_root(&self) -> &str {
        &self.xml_root
    }
}

/// Request body.
///
/// Each variant decides how it is turned into bytes and which default
/// `Content-Type` it gets when the caller did not set one:
///
/// | variant      | default content type                     |
/// |--------------|------------------------------------------|
/// | `Text`       | `text/plain; charset=utf-8`              |
/// | `Bytes`      | `application/octet-stream`               |
/// | `Stream`     | none (caller's responsibility)           |
/// | `Multipart`  | none (set from the form's boundary)      |
/// | `Form`       | `application/x-www-form-urlencoded`      |
/// | `Structured` | `application/json`                       |
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Stream(BodyStream),
    Form(QueryMap),
    Multipart(MultipartForm),
    Structured(StructuredBody),
}

impl Body {
    /// Structured body from any serializable value.
    ///
    /// # Errors
    ///
    /// See [`StructuredBody::new`].
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, HttpError> {
        Ok(Body::Structured(StructuredBody::new(value)?))
    }

    /// Streaming body.
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    /// Default `Content-Type` for this kind of body, if any.
    #[must_use]
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Body::Text(_) => Some(TEXT_CONTENT_TYPE),
            Body::Bytes(_) => Some(OCTET_STREAM_CONTENT_TYPE),
            Body::Stream(_) | Body::Multipart(_) => None,
            Body::Form(_) => Some(FORM_CONTENT_TYPE),
            Body::Structured(_) => Some(JSON_CONTENT_TYPE),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Body::Bytes(_) => "bytes",
            Body::Text(_) => "text",
            Body::Stream(_) => "stream",
            Body::Form(_) => "form",
            Body::Multipart(_) => "multipart",
            Body::Structured(_) => "structured",
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Body::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Form(q) => f.debug_tuple("Form").field(q).finish(),
            Body::Multipart(m) => f.debug_tuple("Multipart").field(m).finish(),
            Body::Structured(s) => f.debug_tuple("Structured").field(s).finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(b))
    }
}

impl From<&'static [u8]> for Body {
    fn from(b: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(b))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_owned())
    }
}

impl From<QueryMap> for Body {
    fn from(q: QueryMap) -> Self {
        Body::Form(q)
    }
}

impl From<MultipartForm> for Body {
    fn from(m: MultipartForm) -> Self {
        Body::Multipart(m)
    }
}

impl From<StructuredBody> for Body {
    fn from(s: StructuredBody) -> Self {
        Body::Structured(s)
    }
}

/// Whether a content type names an XML media type (`*/xml` or `*/*+xml`).
#[must_use]
pub fn is_xml_content_type(content_type: &str) -> bool {
    content_type.parse::<mime::Mime>().is_ok_and(|m| {
        m.subtype() == mime::XML || m.suffix().is_some_and(|s| s == mime::XML)
    })
}

/// Turn the body into wire bytes.
///
/// A stream is drained and replaced in place by the collected [`Body::Bytes`],
/// so the value can be replayed (redirect hops) without re-reading the source.
/// A multipart form writes its own `Content-Type` into `headers`. Structured
/// values pick the XML marshaller when the current `Content-Type` is XML and
/// JSON otherwise.
///
/// # Errors
///
/// Returns the stream's error as [`HttpError::Body`], the multipart
/// serialization error, or the marshaller's error. Nothing is retried.
pub async fn resolve(
    body: &mut Body,
    headers: &mut HeaderMap,
    codecs: &Codecs,
) -> Result<Bytes, HttpError> {
    tracing::trace!(kind = body.kind(), "resolving request body");
    match body {
        Body::Bytes(b) => Ok(b.clone()),
        Body::Text(s) => Ok(Bytes::from(s.clone())),
        Body::Stream(stream) => {
            let mut collected = Vec::new();
            while let Some(chunk) = stream.next().await {
                collected.extend_from_slice(&chunk.map_err(HttpError::Body)?);
            }
            let collected = Bytes::from(collected);
            *body = Body::Bytes(collected.clone());
            Ok(collected)
        }
        Body::Form(query) => Ok(Bytes::from(encode_query(query))),
        Body::Multipart(form) => {
            let (bytes, content_type) = form.serialize()?;
            headers.insert(CONTENT_TYPE, HeaderValue::try_from(content_type)?);
            Ok(bytes)
        }
        Body::Structured(structured) => {
            let xml = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(is_xml_content_type);
            let encoded = if xml {
                codecs.marshal_xml(structured.value(), structured.xml_root())?
            } else {
                codecs.marshal_json(structured.value())?
            };
            Ok(Bytes::from(encoded))
        }
    }
}

/// Set `default` as `Content-Type` unless one is already present.
///
/// `default` must be taken from the body before [`resolve`], which turns a
/// drained stream into plain bytes.
pub fn apply_default_content_type(default: Option<&'static str>, headers: &mut HeaderMap) {
    if headers.contains_key(CONTENT_TYPE) {
        return;
    }
    if let Some(default) = default {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(default));
    }
}
