//! Execution of one logical exchange.
//!
//! Order of work: merge the profile into the descriptor, resolve the body,
//! run request interceptors (profile chain, then the descriptor's own list),
//! re-resolve the body if an interceptor replaced it, default the
//! `Content-Type`, build and validate the URL, then drive the redirect loop
//! until a non-redirect response is decoded. Response interceptors run last,
//! in the same profile-then-descriptor order.

use crate::body::{apply_default_content_type, resolve};
use crate::cookie::{Cookie, CookieStore, cookie_header};
use crate::decode::read_body;
use crate::descriptor::RequestDescriptor;
use crate::error::{HttpError, InvalidUriKind};
use crate::interceptor::{
    RequestInterceptor, ResponseInterceptor, run_request_interceptors, run_response_interceptors,
};
use crate::performance::{Performance, PerformanceRecorder};
use crate::profile::{ClientProfile, DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING};
use crate::response::Response;
use crate::security::validate_url;
use crate::transport::{ResponseBody, Transport};
use bytes::Bytes;
use http::header::{ACCEPT, ACCEPT_ENCODING, COOKIE, LOCATION, SET_COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::Full;
use std::sync::Arc;
use tracing::field::Empty;
use tracing::{Instrument, Span};
use url::{Position, Url};

/// Profile interceptor lists captured when the descriptor is merged.
///
/// The descriptor's own lists are read later, after the profile chain ran,
/// so profile interceptors may register per-request hooks.
struct Chains {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

/// Run `request` against `profile` and return the decoded final response.
///
/// The resolved timeout bounds everything after the merge, every redirect
/// hop and the body read included. A cancellation token on the descriptor
/// aborts the exchange as soon as it fires.
///
/// # Errors
///
/// Any [`HttpError`]; nothing is retried and no partial response is returned.
pub async fn execute(
    profile: &ClientProfile,
    mut request: RequestDescriptor,
) -> Result<Response, HttpError> {
    request.merge_profile(profile);

    let method = request.method().cloned().unwrap_or(Method::GET);
    let span = tracing::info_span!(
        "outgoing_http",
        http.method = %method,
        http.url = Empty,
        otel.kind = "client",
        http.status_code = Empty,
        redirects = Empty,
        error = Empty,
    );

    let chains = Chains {
        request: profile.request_interceptors.snapshot(),
        response: profile.response_interceptors.snapshot(),
    };
    let timeout = request.timeout();
    let cancellation = request.cancellation().cloned();

    let exchange = async {
        let pipeline = run_pipeline(profile, request, &chains);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, pipeline)
                .await
                .map_err(|_elapsed| HttpError::Timeout(limit))?,
            None => pipeline.await,
        }
    };
    let exchange = async {
        match cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(HttpError::Cancelled),
                result = exchange => result,
            },
            None => exchange.await,
        }
    };

    let result = exchange.instrument(span.clone()).await;
    match &result {
        Ok(response) => {
            span.record("http.status_code", response.status().as_u16());
        }
        Err(e) => {
            span.record("error", tracing::field::display(e));
        }
    }
    result
}

async fn run_pipeline(
    profile: &ClientProfile,
    mut request: RequestDescriptor,
    chains: &Chains,
) -> Result<Response, HttpError> {
    let revision = request.body_revision();
    let mut body = prepare_body(&mut request).await?;

    run_request_interceptors(&chains.request, &mut request)?;
    let own_request = request.request_interceptors();
    run_request_interceptors(&own_request, &mut request)?;

    if request.body_revision() != revision {
        tracing::trace!("request body replaced by interceptor, resolving again");
        body = prepare_body(&mut request).await?;
    }
    let (payload, default_content_type) = body.unwrap_or_default();
    let method = request.method().cloned().unwrap_or(Method::GET);
    apply_default_content_type(default_content_type, request.headers_mut());

    let built = request.build_url();
    if built.is_empty() {
        return Err(HttpError::InvalidUri {
            url: request.url().to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: "request URL could not be built".to_owned(),
        });
    }

    let transport = request
        .transport()
        .cloned()
        .ok_or_else(|| HttpError::Transport("no transport configured".into()))?;
    validate_url(&built, transport.security())?;
    let url = Url::parse(&built).map_err(|e| HttpError::InvalidUri {
        url: built.clone(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;
    Span::current().record("http.url", sanitize(&url).as_str());

    let mut cookies = profile.cookies.clone();
    cookies.extend_from_slice(request.cookies());

    let redirects = RedirectLoop {
        transport,
        method,
        headers: wire_headers(profile, &request)?,
        cookies,
        cookie_store: request.cookie_store().cloned(),
        body: payload,
        max_redirects: request.max_redirects().unwrap_or_default(),
        max_body_length: request.max_body_length().unwrap_or_default(),
        redirects: 0,
        url,
    };
    let exchange = redirects.run().await?;

    let own_response = request.response_interceptors();
    let mut response = Response::new(
        exchange.parts,
        exchange.body,
        exchange.url,
        request,
        exchange.performance,
    );
    run_response_interceptors(&chains.response, &mut response)?;
    run_response_interceptors(&own_response, &mut response)?;
    Ok(response)
}

/// Resolve the descriptor's body, remembering the default content type of
/// the value as it was before resolution turned streams into bytes.
async fn prepare_body(
    request: &mut RequestDescriptor,
) -> Result<Option<(Bytes, Option<&'static str>)>, HttpError> {
    let codecs = request.codecs().clone();
    let (body, headers) = request.body_and_headers_mut();
    let Some(body) = body else {
        return Ok(None);
    };
    let default_content_type = body.default_content_type();
    let bytes = resolve(body, headers, &codecs).await?;
    Ok(Some((bytes, default_content_type)))
}

/// Profile headers overlaid by descriptor headers, plus the client defaults.
fn wire_headers(
    profile: &ClientProfile,
    request: &RequestDescriptor,
) -> Result<HeaderMap, HttpError> {
    let mut headers = profile.headers.clone();
    for name in request.headers().keys() {
        headers.remove(name);
    }
    for (name, value) in request.headers() {
        headers.append(name.clone(), value.clone());
    }

    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::try_from(profile.user_agent.as_str())?);
    }
    if !headers.contains_key(ACCEPT_ENCODING) {
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        );
    }
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    }
    Ok(headers)
}

/// scheme://host[:port]/path, never the query or user info.
fn sanitize(url: &Url) -> String {
    format!(
        "{}://{}",
        url.scheme(),
        &url[Position::BeforeHost..Position::AfterPath]
    )
}

struct Exchange {
    parts: http::response::Parts,
    body: Bytes,
    url: Url,
    performance: Performance,
}

enum State {
    Sending,
    AwaitingBody(http::Response<ResponseBody>, PerformanceRecorder),
    Redirecting(Url),
    Done(Exchange),
}

/// Redirect state machine.
///
/// Every hop re-sends the same method, headers, cookies, and body to the new
/// location. `max_redirects` of zero follows redirects without limit.
struct RedirectLoop {
    transport: Transport,
    method: Method,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    body: Bytes,
    max_redirects: usize,
    max_body_length: usize,
    redirects: usize,
    url: Url,
}

impl RedirectLoop {
    async fn run(mut self) -> Result<Exchange, HttpError> {
        let mut state = State::Sending;
        loop {
            state = match state {
                State::Sending => self.send().await?,
                State::AwaitingBody(response, recorder) => {
                    self.await_body(response, recorder).await?
                }
                State::Redirecting(target) => self.redirect(target)?,
                State::Done(exchange) => return Ok(exchange),
            };
        }
    }

    async fn send(&mut self) -> Result<State, HttpError> {
        let uri = validate_url(self.url.as_str(), self.transport.security())?;

        let mut headers = self.headers.clone();
        self.attach_cookies(&mut headers)?;

        let mut request = http::Request::new(Full::new(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        tracing::debug!(method = %self.method, url = %sanitize(&self.url), "sending request");
        let mut recorder = PerformanceRecorder::start();
        let response = self.transport.send(request).await?;
        recorder.record_head(&response);
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = recorder.elapsed().as_millis(),
            "response head received"
        );

        self.store_cookies(response.headers());

        let status = response.status();
        if !status.is_redirection() {
            return Ok(State::AwaitingBody(response, recorder));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(HttpError::RedirectMissingLocation)?;
        let location = location.to_str().map_err(|e| HttpError::InvalidUri {
            url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        let target = self.url.join(location).map_err(|e| HttpError::InvalidUri {
            url: location.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        Ok(State::Redirecting(target))
    }

    async fn await_body(
        &self,
        response: http::Response<ResponseBody>,
        recorder: PerformanceRecorder,
    ) -> Result<State, HttpError> {
        let (parts, body) = response.into_parts();
        let body = read_body(
            &self.method,
            parts.status,
            &parts.headers,
            body,
            self.max_body_length,
        )
        .await?;
        Ok(State::Done(Exchange {
            parts,
            body,
            url: self.url.clone(),
            performance: recorder.finish(),
        }))
    }

    fn redirect(&mut self, target: Url) -> Result<State, HttpError> {
        self.redirects += 1;
        Span::current().record("redirects", self.redirects);

        if self.max_redirects > 0 && self.redirects > self.max_redirects {
            tracing::warn!(
                max = self.max_redirects,
                url = %sanitize(&target),
                "redirect limit exceeded"
            );
            return Err(HttpError::TooManyRedirects {
                max: self.max_redirects,
            });
        }

        tracing::debug!(
            from = %sanitize(&self.url),
            to = %sanitize(&target),
            count = self.redirects,
            "following redirect"
        );
        self.url = target;
        Ok(State::Sending)
    }

    /// Static cookies first, then whatever the store holds for this hop.
    fn attach_cookies(&self, headers: &mut HeaderMap) -> Result<(), HttpError> {
        let mut cookies = self.cookies.clone();
        if let Some(store) = &self.cookie_store {
            cookies.extend(store.cookies_for(&self.url));
        }
        if cookies.is_empty() {
            return Ok(());
        }

        let mut value = cookie_header(&cookies);
        if let Some(existing) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            value = format!("{existing}; {value}");
        }
        headers.insert(COOKIE, HeaderValue::try_from(value)?);
        Ok(())
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let Some(store) = &self.cookie_store else {
            return;
        };
        let received: Vec<Cookie> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect();
        if !received.is_empty() {
            store.store(&self.url, &received);
        }
    }
}
