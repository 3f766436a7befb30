#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP request execution for `ModKit`
//!
//! A request is described by a [`RequestDescriptor`] (URL template, path
//! parameters, query, headers, cookies, body, limits) and executed against a
//! [`ClientProfile`] holding client-wide defaults. One call runs a fixed
//! pipeline:
//!
//! 1. merge the descriptor with the profile (descriptor values win)
//! 2. resolve the body and its default `Content-Type`
//! 3. run request interceptors (profile chain, then the descriptor's)
//! 4. build the URL from base URL, template, params and query
//! 5. send over the pooled hyper transport, following redirects manually
//! 6. read the body under a size limit and decode gzip, deflate or brotli
//! 7. run response interceptors and return a fully materialized [`Response`]
//!
//! Every HTTP status is returned as `Ok`; only transport, validation, limit,
//! timeout, cancellation and interceptor failures are errors. Nothing is
//! retried.
//!
//! # Example
//!
//! ```ignore
//! use modkit_fetch::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .base_url("https://api.example.com/v1")
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .build()?;
//!
//! let item: Item = client
//!     .get("/items/:id")
//!     .param("id", "42")
//!     .send()
//!     .await?
//!     .error_for_status()?
//!     .json()?;
//! ```

mod body;
mod builder;
mod client;
mod codec;
mod cookie;
mod decode;
mod descriptor;
mod dispatch;
mod error;
mod interceptor;
mod multipart;
mod performance;
mod profile;
mod query;
mod request;
mod response;
pub mod security;
mod settings;
mod tls;
mod transport;

pub use body::{
    Body, BodyStream, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE,
    StructuredBody, TEXT_CONTENT_TYPE, XML_CONTENT_TYPE, is_xml_content_type,
};
pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use codec::{Codecs, MarshalFn, UnmarshalFn};
pub use cookie::{Cookie, CookieJar, CookieStore, cookie_header};
pub use decode::ContentEncoding;
pub use descriptor::RequestDescriptor;
pub use dispatch::execute;
pub use error::{BoxError, HttpError, InvalidUriKind};
pub use interceptor::{
    InterceptorChain, RequestChain, RequestInterceptor, ResponseChain, ResponseInterceptor,
};
pub use multipart::MultipartForm;
pub use performance::Performance;
pub use profile::{
    ClientProfile, DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING, DEFAULT_MAX_BODY_LENGTH,
    DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, TlsRootConfig, TransportConfig, TransportSecurity,
};
pub use query::{QueryEncoder, QueryMap, QuerySerializer, decode_query, encode_query, query_from_pairs};
pub use request::RequestBuilder;
pub use response::Response;
pub use settings::ClientSettings;
pub use transport::{ResponseBody, Transport, TransportService};
