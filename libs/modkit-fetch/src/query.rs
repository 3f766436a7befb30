//! Query string encoding.
//!
//! A [`QueryMap`] is an ordered key → multi-value mapping. The default encoder
//! emits keys in alphabetical order (the map is a `BTreeMap`) and values in
//! insertion order, percent-encoded the same way HTML forms are.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Key to multi-value mapping used for query strings and urlencoded forms.
pub type QueryMap = BTreeMap<String, Vec<String>>;

/// Pluggable query string encoder.
///
/// Any `Fn(&QueryMap) -> String` closure is an encoder.
pub trait QueryEncoder: Send + Sync {
    fn encode(&self, query: &QueryMap) -> String;
}

impl<F> QueryEncoder for F
where
    F: Fn(&QueryMap) -> String + Send + Sync,
{
    fn encode(&self, query: &QueryMap) -> String {
        self(query)
    }
}

/// Query encoding strategy with an optional custom encoder.
///
/// When no encoder is installed the stable alphabetical encoding of
/// [`encode_query`] is used. An installed encoder takes full precedence, even
/// when it returns an empty string.
#[derive(Clone, Default)]
pub struct QuerySerializer {
    encoder: Option<Arc<dyn QueryEncoder>>,
}

impl QuerySerializer {
    /// Serializer backed by a custom encoder.
    #[must_use]
    pub fn new(encoder: impl QueryEncoder + 'static) -> Self {
        Self {
            encoder: Some(Arc::new(encoder)),
        }
    }

    /// Serializer with no custom encoder (falls back to [`encode_query`]).
    #[must_use]
    pub fn standard() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    /// Encode `query` with the custom encoder, or the default encoding when none is set.
    #[must_use]
    pub fn encode(&self, query: &QueryMap) -> String {
        match &self.encoder {
            Some(encoder) => encoder.encode(query),
            None => encode_query(query),
        }
    }
}

impl fmt::Debug for QuerySerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySerializer")
            .field("custom_encoder", &self.encoder.is_some())
            .finish()
    }
}

/// Default query encoding: `k=v` pairs joined by `&`, keys sorted, form escaping.
#[must_use]
pub fn encode_query(query: &QueryMap) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, values) in query {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}

/// Parse a query string (with or without a leading `?`) into a [`QueryMap`].
#[must_use]
pub fn decode_query(raw: &str) -> QueryMap {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut query = QueryMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}

/// Build a [`QueryMap`] from `(key, value)` pairs, keeping repeated keys.
#[must_use]
pub fn query_from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> QueryMap
where
    K: Into<String>,
    V: Into<String>,
{
    let mut query = QueryMap::new();
    for (key, value) in pairs {
        query.entry(key.into()).or_default().push(value.into());
    }
    query
}
