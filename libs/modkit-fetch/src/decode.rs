//! Response body materialization: size cap plus `Content-Encoding` removal.

use crate::error::HttpError;
use crate::transport::ResponseBody;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use std::io::Read;

/// Buffer capacity when `Content-Length` is absent or unparsable.
const DEFAULT_CAPACITY: usize = 512;

/// Never preallocate more than this on the strength of a header alone.
const MAX_PREALLOCATION: usize = 1024 * 1024;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Encoding declared by `Content-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentEncoding {
    /// Unknown or missing encodings are treated as identity.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()) else {
            return Self::Identity;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" | "compress" | "x-compress" => Self::Gzip,
            "deflate" => Self::Deflate,
            "br" => Self::Brotli,
            _ => Self::Identity,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
        }
    }
}

/// Read the whole body and strip its content encoding.
///
/// `max_length` of zero disables the cap. A declared `Content-Length` above
/// the cap fails before the body is touched; otherwise the cap is enforced on
/// the raw bytes while reading and again on the decoded bytes, so a small
/// compressed payload cannot expand past it. A `204` answer to `HEAD` is
/// never decoded. The body is consumed exactly once on every path.
///
/// # Errors
///
/// `BodyTooLarge` when the cap is exceeded, `BodyRead` when the transport
/// fails mid-body, `Decompress` when the payload is not valid for its encoding.
pub async fn read_body(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
    body: ResponseBody,
    max_length: usize,
) -> Result<Bytes, HttpError> {
    let limit = (max_length > 0).then_some(max_length);
    let encoding = if status == StatusCode::NO_CONTENT && method == Method::HEAD {
        ContentEncoding::Identity
    } else {
        ContentEncoding::from_headers(headers)
    };

    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if let (Some(limit), Some(declared)) = (limit, declared)
        && declared > limit
    {
        return Err(HttpError::BodyTooLarge {
            limit,
            actual: declared,
        });
    }

    let capacity = declared.map_or(DEFAULT_CAPACITY, |n| n.min(MAX_PREALLOCATION));
    let raw = collect_limited(body, capacity, limit).await?;

    let decoded = match encoding {
        ContentEncoding::Identity => raw,
        encoding => decompress(encoding, &raw, limit)?,
    };
    tracing::debug!(
        encoding = encoding.as_str(),
        bytes = decoded.len(),
        "response body decoded"
    );
    Ok(decoded)
}

async fn collect_limited(
    body: ResponseBody,
    capacity: usize,
    limit: Option<usize>,
) -> Result<Bytes, HttpError> {
    let mut collected = Vec::with_capacity(capacity);
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::BodyRead)?;
        if let Some(chunk) = frame.data_ref() {
            let total = collected.len() + chunk.len();
            if let Some(limit) = limit
                && total > limit
            {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: total,
                });
            }
            collected.extend_from_slice(chunk);
        }
    }
    Ok(Bytes::from(collected))
}

fn decompress(
    encoding: ContentEncoding,
    raw: &[u8],
    limit: Option<usize>,
) -> Result<Bytes, HttpError> {
    let mut reader: Box<dyn Read + '_> = match encoding {
        ContentEncoding::Gzip => Box::new(MultiGzDecoder::new(raw)),
        ContentEncoding::Deflate if has_zlib_header(raw) => Box::new(ZlibDecoder::new(raw)),
        ContentEncoding::Deflate => Box::new(DeflateDecoder::new(raw)),
        ContentEncoding::Brotli => Box::new(brotli::Decompressor::new(raw, BROTLI_BUFFER_SIZE)),
        ContentEncoding::Identity => return Ok(Bytes::copy_from_slice(raw)),
    };

    let mut decoded = Vec::with_capacity(raw.len().saturating_mul(2).min(MAX_PREALLOCATION));
    let read = match limit {
        // one byte past the cap is enough to tell that it was exceeded
        Some(limit) => reader
            .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
            .read_to_end(&mut decoded),
        None => reader.read_to_end(&mut decoded),
    };
    read.map_err(|source| HttpError::Decompress {
        encoding: encoding.as_str(),
        source,
    })?;

    if let Some(limit) = limit
        && decoded.len() > limit
    {
        return Err(HttpError::BodyTooLarge {
            limit,
            actual: decoded.len(),
        });
    }
    Ok(Bytes::from(decoded))
}

/// Servers disagree on whether `deflate` means zlib-wrapped or raw deflate.
fn has_zlib_header(raw: &[u8]) -> bool {
    match raw {
        [cmf, flg, ..] => cmf & 0x0f == 8 && ((u16::from(*cmf) << 8) | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}
