//! Cookies and the shared cookie store.
//!
//! [`CookieJar`] is a small in-memory store with RFC 6265 style domain and
//! path matching. It is shared by every request of a client profile.

use parking_lot::RwLock;
use std::fmt;
use std::time::{Duration, SystemTime};
use url::Url;

/// A single cookie as sent on requests or received via `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<SystemTime>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    /// Parse one `Set-Cookie` header value.
    ///
    /// Returns `None` when the header has no `name=value` pair or the name is empty.
    /// Unknown attributes are ignored.
    #[must_use]
    pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'));
        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    cookie.domain = Some(val.trim_start_matches('.').to_ascii_lowercase());
                }
                "path" if val.starts_with('/') => cookie.path = Some(val.to_owned()),
                "max-age" => cookie.max_age = val.parse().ok(),
                "expires" => cookie.expires = httpdate::parse_http_date(val).ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }
        Some(cookie)
    }

    /// `name=value` form used inside a `Cookie` request header.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Absolute expiry, `Max-Age` taking precedence over `Expires`.
    fn expiry(&self, now: SystemTime) -> Option<SystemTime> {
        match self.max_age {
            Some(secs) if secs <= 0 => Some(SystemTime::UNIX_EPOCH),
            Some(secs) => Some(now + Duration::from_secs(secs.unsigned_abs())),
            None => self.expires,
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Join cookies into one `Cookie` header value.
#[must_use]
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(Cookie::pair)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persistent cookie storage shared across requests.
pub trait CookieStore: Send + Sync {
    /// Cookies to attach to a request for `url`.
    fn cookies_for(&self, url: &Url) -> Vec<Cookie>;

    /// Record cookies received in a response from `url`.
    fn store(&self, url: &Url, cookies: &[Cookie]);
}

#[derive(Debug, Clone)]
struct StoredCookie {
    cookie: Cookie,
    domain: String,
    host_only: bool,
    path: String,
    expires_at: Option<SystemTime>,
}

impl StoredCookie {
    fn matches(&self, url: &Url, now: SystemTime) -> bool {
        if self.expires_at.is_some_and(|at| at <= now) {
            return false;
        }
        if self.cookie.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_match(&host, &self.domain)
        };
        domain_ok && path_match(url.path(), &self.path)
    }
}

/// In-memory [`CookieStore`].
///
/// Cookies are replaced by `(name, domain, path)`. A cookie with `Max-Age<=0`
/// or an `Expires` in the past removes the stored entry.
#[derive(Default)]
pub struct CookieJar {
    entries: RwLock<Vec<StoredCookie>>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries are not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        let now = SystemTime::now();
        self.entries
            .read()
            .iter()
            .filter(|e| e.expires_at.is_none_or(|at| at > now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl CookieStore for CookieJar {
    fn cookies_for(&self, url: &Url) -> Vec<Cookie> {
        let now = SystemTime::now();
        let entries = self.entries.read();
        let mut matched: Vec<&StoredCookie> =
            entries.iter().filter(|e| e.matches(url, now)).collect();
        // Longer paths first.
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matched.into_iter().map(|e| e.cookie.clone()).collect()
    }

    fn store(&self, url: &Url, cookies: &[Cookie]) {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return;
        };
        let now = SystemTime::now();
        let mut entries = self.entries.write();

        for cookie in cookies {
            let (domain, host_only) = match &cookie.domain {
                Some(domain) if domain_match(&host, domain) => (domain.clone(), false),
                Some(domain) => {
                    tracing::debug!(cookie = %cookie.name, %domain, %host, "rejecting cookie for foreign domain");
                    continue;
                }
                None => (host.clone(), true),
            };
            let path = cookie
                .path
                .clone()
                .unwrap_or_else(|| default_path(url.path()));
            let expires_at = cookie.expiry(now);

            entries.retain(|e| {
                !(e.cookie.name == cookie.name && e.domain == domain && e.path == path)
            });
            if expires_at.is_some_and(|at| at <= now) {
                continue;
            }
            entries.push(StoredCookie {
                cookie: cookie.clone(),
                domain,
                host_only,
                path,
                expires_at,
            });
        }
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

/// Directory of the request path, per RFC 6265 section 5.1.4.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => request_path[..idx].to_owned(),
    }
}
