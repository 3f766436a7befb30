//! TLS setup for the HTTPS connector.

use crate::error::HttpError;
use crate::profile::TlsRootConfig;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_rustls::builderstates::WantsSchemes;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, OnceLock};

/// Parsed OS trust store, read at most once per process.
///
/// A failed read is cached too; every later transport reports the same error.
static OS_ROOTS: OnceLock<Result<Arc<RootCertStore>, String>> = OnceLock::new();

fn read_os_roots() -> Result<Arc<RootCertStore>, String> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "skipping unreadable OS root certificate");
    }
    if loaded.certs.is_empty() {
        return Err("OS trust store contains no root certificates".to_owned());
    }

    let total = loaded.certs.len();
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(loaded.certs);
    if added == 0 {
        return Err(format!("none of the {total} OS root certificates could be parsed"));
    }
    tracing::debug!(added, ignored, "OS root certificates loaded");
    Ok(Arc::new(store))
}

/// The process-wide provider when the application installed one, otherwise
/// a local aws-lc-rs provider.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// HTTPS connector builder trusting `roots`.
///
/// # Errors
///
/// [`HttpError::Tls`] when the provider offers no safe protocol versions or,
/// for [`TlsRootConfig::Native`], when the OS trust store is empty or unparsable.
pub(crate) fn connector_builder(
    roots: TlsRootConfig,
) -> Result<HttpsConnectorBuilder<WantsSchemes>, HttpError> {
    match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e))),
        TlsRootConfig::Native => {
            let store = OS_ROOTS
                .get_or_init(read_os_roots)
                .clone()
                .map_err(|e| HttpError::Tls(e.into()))?;
            let config = ClientConfig::builder_with_provider(crypto_provider())
                .with_safe_default_protocol_versions()
                .map_err(|e| HttpError::Tls(Box::new(e)))?
                .with_root_certificates(store)
                .with_no_client_auth();
            Ok(HttpsConnectorBuilder::new().with_tls_config(config))
        }
    }
}
