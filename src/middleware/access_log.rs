//! Access logging for gated routes.
//!
//! The outermost stage of every pipeline. It:
//!
//! 1. Propagates the caller's `X-Request-Id` or generates a UUIDv4
//! 2. Logs one `info` entry per completed request
//! 3. Records the request duration histogram
//! 4. Echoes `X-Request-Id` on the response, including gate rejections
//!
//! Durations are labelled with the matched route template (`/users/{id}`)
//! rather than the raw path to keep metric cardinality bounded.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::info;
use uuid::Uuid;

use super::ip::{TrustedProxyConfig, extract_client_ip};
use crate::metrics;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fallback header value when request ID parsing fails.
static UNKNOWN_REQUEST_ID: HeaderValue = HeaderValue::from_static("unknown");

/// Access log layer for Tower middleware stack.
#[derive(Clone)]
pub struct AccessLogLayer {
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl AccessLogLayer {
    pub fn new(trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self { trusted_proxies }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Access log service wrapper.
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for AccessLogService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let started = Instant::now();
        let request_id = extract_or_generate_request_id(&req);
        let header_value = request_id
            .parse::<HeaderValue>()
            .unwrap_or_else(|_| UNKNOWN_REQUEST_ID.clone());
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, header_value.clone());

        let method = req.method().to_string();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_owned())
            .unwrap_or_else(|| req.uri().path().to_owned());
        let client_ip = extract_client_ip(&req, &self.trusted_proxies).into_owned();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let status = response.status().as_u16();
            let elapsed = started.elapsed();

            info!(
                request_id = %request_id,
                method = %method,
                route = %route,
                status,
                client_ip = %client_ip,
                latency_ms = elapsed.as_millis() as u64,
                "Request completed"
            );
            metrics::record_request_duration(&route, &method, status, elapsed.as_secs_f64());

            response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
            Ok(response)
        })
    }
}

/// Extract request ID from headers or generate a new one.
fn extract_or_generate_request_id<B>(req: &Request<B>) -> String {
    if let Some(header_value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(value) = header_value.to_str()
        && !value.is_empty()
    {
        return value.to_string();
    }

    Uuid::new_v4().to_string()
}
