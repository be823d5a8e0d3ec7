use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};

/// Sent on every response. API payloads carry personal data (tickets,
/// phone numbers, payments), so nothing may be cached on the way.
const API_HEADERS: [(&str, &str); 7] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    // Geolocation stays allowed for the "nearby organizations" lookup.
    ("permissions-policy", "geolocation=(self), microphone=(), camera=()"),
    ("cache-control", "no-store"),
];

const HSTS: (&str, &str) = ("strict-transport-security", "max-age=31536000; includeSubDomains");

type HeaderSet = Arc<[(HeaderName, HeaderValue)]>;

/// Adds the fixed security headers to every response; HSTS only in production.
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    headers: HeaderSet,
}

impl SecurityHeadersLayer {
    pub fn new(include_hsts: bool) -> Self {
        if include_hsts {
            tracing::info!("Security: HSTS header enabled (production mode)");
        } else {
            tracing::info!("Security: HSTS header disabled (development mode)");
        }
        let headers = API_HEADERS
            .iter()
            .chain(include_hsts.then_some(&HSTS))
            .map(|(name, value)| {
                (
                    HeaderName::from_static(*name),
                    HeaderValue::from_static(*value),
                )
            })
            .collect();
        Self { headers }
    }

    #[cfg(test)]
    fn sends(&self, name: &str) -> bool {
        self.headers.iter().any(|(header, _)| header == name)
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    headers: HeaderSet,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SecurityHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = SecurityHeadersFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        SecurityHeadersFuture {
            future: self.inner.call(request),
            headers: self.headers.clone(),
        }
    }
}

#[pin_project::pin_project]
pub struct SecurityHeadersFuture<F> {
    #[pin]
    future: F,
    headers: HeaderSet,
}

impl<F, ResBody, E> Future for SecurityHeadersFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let mut response = match this.future.poll(cx) {
            Poll::Ready(Ok(response)) => response,
            other => return other,
        };
        let headers = response.headers_mut();
        for (name, value) in this.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        Poll::Ready(Ok(response))
    }
}

pub fn create_security_headers_layer(production: bool) -> SecurityHeadersLayer {
    SecurityHeadersLayer::new(production)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn respond(layer: SecurityHeadersLayer) -> Response<()> {
        let inner = tower::service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(()))
        });
        layer.layer(inner).oneshot(Request::new(())).await.unwrap()
    }

    #[test]
    fn test_hsts_follows_production_flag() {
        assert!(!SecurityHeadersLayer::new(false).sends("strict-transport-security"));
        assert!(SecurityHeadersLayer::new(true).sends("strict-transport-security"));
    }

    #[tokio::test]
    async fn test_headers_are_added_to_responses() {
        let response = respond(SecurityHeadersLayer::new(true)).await;
        let headers = response.headers();
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["cache-control"], "no-store");
        assert!(headers.contains_key("strict-transport-security"));
    }

    #[tokio::test]
    async fn test_hsts_omitted_outside_production() {
        let response = respond(SecurityHeadersLayer::new(false)).await;
        assert!(!response.headers().contains_key("strict-transport-security"));
        assert!(response.headers().contains_key("permissions-policy"));
    }
}
