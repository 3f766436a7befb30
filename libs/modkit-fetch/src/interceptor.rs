//! Request and response interceptors.
//!
//! Interceptors run synchronously, inline with dispatch, in a fixed order:
//! the profile's chain first, then the descriptor's own list, each in
//! registration order. The first error aborts the remaining chain and is
//! returned to the caller unchanged.

use crate::descriptor::RequestDescriptor;
use crate::error::HttpError;
use crate::response::Response;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Hook invoked on the descriptor before the wire request is built.
///
/// Any `Fn(&mut RequestDescriptor) -> Result<(), HttpError>` closure is an interceptor.
pub trait RequestInterceptor: Send + Sync {
    /// # Errors
    ///
    /// Returning an error aborts the request before anything is sent.
    fn intercept(&self, request: &mut RequestDescriptor) -> Result<(), HttpError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut RequestDescriptor) -> Result<(), HttpError> + Send + Sync,
{
    fn intercept(&self, request: &mut RequestDescriptor) -> Result<(), HttpError> {
        self(request)
    }
}

/// Hook invoked on the fully decoded response.
///
/// Any `Fn(&mut Response) -> Result<(), HttpError>` closure is an interceptor.
pub trait ResponseInterceptor: Send + Sync {
    /// # Errors
    ///
    /// Returning an error discards the response and fails the call.
    fn intercept(&self, response: &mut Response) -> Result<(), HttpError>;
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&mut Response) -> Result<(), HttpError> + Send + Sync,
{
    fn intercept(&self, response: &mut Response) -> Result<(), HttpError> {
        self(response)
    }
}

/// Ordered, shareable list of interceptors.
///
/// `append`/`prepend` take a write lock and may be called from several
/// initialization sites. Dispatch only reads a [`snapshot`](Self::snapshot)
/// taken when the request is merged, so requests already in flight never
/// observe later registrations. Cloning produces an independent copy of the list.
pub struct InterceptorChain<T: ?Sized> {
    items: RwLock<Vec<Arc<T>>>,
}

/// Request-phase chain.
pub type RequestChain = InterceptorChain<dyn RequestInterceptor>;
/// Response-phase chain.
pub type ResponseChain = InterceptorChain<dyn ResponseInterceptor>;

impl<T: ?Sized> InterceptorChain<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn append_shared(&self, interceptor: Arc<T>) {
        self.items.write().push(interceptor);
    }

    pub fn prepend_shared(&self, interceptor: Arc<T>) {
        self.items.write().insert(0, interceptor);
    }

    /// Copy of the current list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }
}

impl RequestChain {
    pub fn append(&self, interceptor: impl RequestInterceptor + 'static) {
        self.append_shared(Arc::new(interceptor));
    }

    pub fn prepend(&self, interceptor: impl RequestInterceptor + 'static) {
        self.prepend_shared(Arc::new(interceptor));
    }
}

impl ResponseChain {
    pub fn append(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.append_shared(Arc::new(interceptor));
    }

    pub fn prepend(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.prepend_shared(Arc::new(interceptor));
    }
}

impl<T: ?Sized> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            items: RwLock::new(self.snapshot()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.items.read().len())
            .finish()
    }
}

/// Run request interceptors in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the failing interceptor's error as-is.
pub fn run_request_interceptors(
    chain: &[Arc<dyn RequestInterceptor>],
    request: &mut RequestDescriptor,
) -> Result<(), HttpError> {
    for (index, interceptor) in chain.iter().enumerate() {
        if let Err(e) = interceptor.intercept(request) {
            tracing::debug!(index, error = %e, "request interceptor rejected request");
            return Err(e);
        }
    }
    Ok(())
}

/// Run response interceptors in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the failing interceptor's error as-is.
pub fn run_response_interceptors(
    chain: &[Arc<dyn ResponseInterceptor>],
    response: &mut Response,
) -> Result<(), HttpError> {
    for (index, interceptor) in chain.iter().enumerate() {
        if let Err(e) = interceptor.intercept(response) {
            tracing::debug!(index, error = %e, "response interceptor rejected response");
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl RequestInterceptor + use<> {
        let log = Arc::clone(log);
        move |_: &mut RequestDescriptor| -> Result<(), HttpError> {
            log.lock().push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_append_and_prepend_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = RequestChain::new();
        chain.append(recorder(&log, "b"));
        chain.append(recorder(&log, "c"));
        chain.prepend(recorder(&log, "a"));

        let mut request = RequestDescriptor::default();
        run_request_interceptors(&chain.snapshot(), &mut request).unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_first_failure_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = RequestChain::new();
        chain.append(|_: &mut RequestDescriptor| -> Result<(), HttpError> {
            Err(HttpError::rejected("no token"))
        });
        chain.append(recorder(&log, "never"));

        let mut request = RequestDescriptor::default();
        let err = run_request_interceptors(&chain.snapshot(), &mut request).unwrap_err();
        assert!(matches!(err, HttpError::Rejected(_)));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_interceptor_can_mutate_descriptor() {
        let chain = RequestChain::new();
        chain.append(|r: &mut RequestDescriptor| -> Result<(), HttpError> {
            r.set_header("x-trace", "abc")?;
            Ok(())
        });

        let mut request = RequestDescriptor::default();
        run_request_interceptors(&chain.snapshot(), &mut request).unwrap();
        assert_eq!(request.headers().get("x-trace").unwrap(), "abc");
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = RequestChain::new();
        chain.append(recorder(&log, "first"));
        let snapshot = chain.snapshot();
        chain.append(recorder(&log, "late"));

        run_request_interceptors(&snapshot, &mut RequestDescriptor::default()).unwrap();
        assert_eq!(*log.lock(), vec!["first"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_clone_is_deep() {
        let chain = ResponseChain::new();
        chain.append(|_: &mut Response| -> Result<(), HttpError> { Ok(()) });
        let copy = chain.clone();
        copy.clear();
        assert_eq!(chain.len(), 1);
        assert!(copy.is_empty());
    }
}
