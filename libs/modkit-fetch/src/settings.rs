//! File/env friendly client configuration.
//!
//! ```yaml
//! base_url: https://api.example.com/v1
//! timeout: 15s
//! max_redirects: 5
//! headers:
//!   x-api-version: "2"
//! ```

use crate::profile::{
    DEFAULT_MAX_BODY_LENGTH, DEFAULT_MAX_REDIRECTS, TlsRootConfig, TransportConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Serializable subset of the client profile and transport settings.
///
/// Durations are written in humantime form (`"30s"`, `"1m 30s"`); `null`
/// disables the corresponding timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Prefix for relative request URLs
    pub base_url: String,

    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Overrides the default User-Agent
    pub user_agent: Option<String>,

    /// Deadline for one exchange, redirects and body read included
    #[serde(with = "humantime_option")]
    pub timeout: Option<Duration>,

    /// Maximum decoded body size in bytes, `0` = unlimited
    pub max_body_length: usize,

    /// Maximum redirects per request, `0` = unlimited
    pub max_redirects: usize,

    /// Allow plain `http://` (testing only)
    pub allow_insecure_http: bool,

    /// Root certificate source
    pub tls_roots: TlsRootConfig,

    #[serde(with = "humantime_option")]
    pub connect_timeout: Option<Duration>,

    #[serde(with = "humantime_option")]
    pub pool_idle_timeout: Option<Duration>,

    pub pool_max_idle_per_host: usize,

    /// Give the client an in-memory cookie jar
    pub cookie_jar: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            base_url: String::new(),
            headers: BTreeMap::new(),
            user_agent: None,
            timeout: Some(Duration::from_secs(30)),
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_insecure_http: false,
            tls_roots: transport.tls_roots,
            connect_timeout: transport.connect_timeout,
            pool_idle_timeout: transport.pool_idle_timeout,
            pool_max_idle_per_host: transport.pool_max_idle_per_host,
            cookie_jar: false,
        }
    }
}

mod humantime_option {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[allow(clippy::ref_option)] // signature fixed by serde's `with`
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| {
                humantime::parse_duration(&raw)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&raw), &"a duration"))
            })
            .transpose()
    }
}
