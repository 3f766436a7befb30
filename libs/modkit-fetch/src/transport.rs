use crate::error::{BoxError, HttpError};
use crate::profile::{TransportConfig, TransportSecurity};
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

/// Raw (still encoded) response body as produced by the transport.
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// Type-erased round-trip service behind a [`Transport`].
pub type TransportService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Shared handle to the connection layer.
///
/// Cloning is cheap; every clone drives the same connection pool. The
/// transport performs exactly one round trip per call: it never follows
/// redirects, decodes bodies, or retries.
#[derive(Clone)]
pub struct Transport {
    service: TransportService,
    security: TransportSecurity,
}

impl Transport {
    /// Build a hyper-based transport with a pooled HTTPS connector.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if the configured root store cannot be loaded.
    pub fn build(config: &TransportConfig) -> Result<Self, HttpError> {
        if config.security == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let https = build_https_connector(config)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }

        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = hyper_client
            .map_response(|response: Response<hyper::body::Incoming>| {
                response.map(|body| body.map_err(|e| -> BoxError { Box::new(e) }).boxed())
            })
            .map_err(HttpError::from);

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            security: config.security,
        })
    }

    /// Wrap any tower service as a transport.
    ///
    /// Used to stack custom middleware under the pipeline, or to plug in a
    /// canned service in tests.
    #[must_use]
    pub fn from_service<S>(service: S, security: TransportSecurity) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            service: BoxCloneSyncService::new(service),
            security,
        }
    }

    /// Scheme policy enforced on every hop.
    #[must_use]
    pub fn security(&self) -> TransportSecurity {
        self.security
    }

    /// One round trip.
    pub(crate) async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let mut service = self.service.clone();
        service.ready().await?.call(request).await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

/// Build the HTTPS connector for the configured root store.
///
/// ALPN advertises both h2 and http/1.1; the protocol is picked during the
/// handshake.
fn build_https_connector(
    config: &TransportConfig,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let mut http = HttpConnector::new();
    // the TLS wrapper decides which schemes are acceptable
    http.enforce_http(false);
    http.set_connect_timeout(config.connect_timeout);

    let allow_http = config.security == TransportSecurity::AllowInsecureHttp;

    let builder = tls::connector_builder(config.tls_roots)?;

    let connector = if allow_http {
        builder
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http)
    } else {
        builder.https_only().enable_all_versions().wrap_connector(http)
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::profile::TlsRootConfig;

    #[tokio::test]
    async fn test_build_default() {
        let transport = Transport::build(&TransportConfig::default()).unwrap();
        assert_eq!(transport.security(), TransportSecurity::TlsOnly);
    }

    #[tokio::test]
    async fn test_build_insecure() {
        let config = TransportConfig {
            security: TransportSecurity::AllowInsecureHttp,
            ..TransportConfig::minimal()
        };
        let transport = Transport::build(&config).unwrap();
        assert_eq!(transport.security(), TransportSecurity::AllowInsecureHttp);
    }

    #[tokio::test]
    async fn test_build_native_roots() {
        let config = TransportConfig {
            tls_roots: TlsRootConfig::Native,
            ..TransportConfig::default()
        };
        // containers without OS certificates fail with a TLS error, never a panic
        match Transport::build(&config) {
            Ok(_) | Err(HttpError::Tls(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_from_service_round_trip() {
        let service = tower::service_fn(|request: Request<Full<Bytes>>| async move {
            let path = request.uri().path().to_owned();
            let body: ResponseBody = Full::new(Bytes::from(path))
                .map_err(|never| match never {})
                .boxed();
            Ok::<_, HttpError>(Response::new(body))
        });
        let transport = Transport::from_service(service, TransportSecurity::AllowInsecureHttp);

        let request = Request::get("http://local.test/echo")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = transport.send(request).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "/echo");
    }

    #[tokio::test]
    async fn test_insecure_http_warning_emitted() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture {
            warnings: Arc<Mutex<Vec<String>>>,
        }

        struct MessageVisitor(String);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.warnings.lock().unwrap().push(visitor.0);
                }
            }
        }

        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = WarningCapture::default();
        let warnings = capture.warnings.clone();
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            let config = TransportConfig {
                security: TransportSecurity::AllowInsecureHttp,
                ..TransportConfig::default()
            };
            _ = Transport::build(&config);
        });

        let captured = warnings.lock().unwrap();
        assert!(
            captured.iter().any(|w| w.contains("insecure HTTP")),
            "warning should mention insecure HTTP: {:?}",
            *captured
        );
    }
}
