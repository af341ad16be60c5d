//! Request observation for the HTTP server: per-route counters plus a debug
//! line for every completed request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::metrics::{HttpMethod, Metrics, RequestLabels};

/// Routes reported under their own label; everything else is `other`.
const KNOWN_ROUTES: &[&str] = &[
    "/api/v1/lines",
    "/api/v1/flush",
    "/metrics",
    "/-/healthy",
    "/-/ready",
];

#[derive(Clone)]
pub struct ObserveLayer {
    metrics: Arc<Metrics>,
}

impl ObserveLayer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = ObserveService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObserveService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ObserveService<S> {
    inner: S,
    metrics: Arc<Metrics>,
}

type BoxedResponse<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send>>;

impl<S, B> Service<Request<Body>> for ObserveService<S>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send,
{
    type Response = Response<B>;
    type Error = S::Error;
    type Future = BoxedResponse<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().clone();
        let route = route_label(request.uri().path());
        let metrics = self.metrics.clone();
        let started = Instant::now();
        let pending = self.inner.call(request);

        Box::pin(async move {
            let response = pending.await?;
            let status = response.status().as_u16();
            metrics
                .http_requests_total
                .get_or_create(&RequestLabels {
                    method: HttpMethod::from(&method),
                    route: route.clone(),
                    status,
                })
                .inc();
            tracing::debug!(
                %method,
                route = %route,
                status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request served"
            );
            Ok(response)
        })
    }
}

fn route_label(path: &str) -> String {
    if KNOWN_ROUTES.contains(&path) {
        path.to_string()
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use rstest::rstest;
    use tower::service_fn;

    use super::*;

    #[rstest]
    #[case::lines("/api/v1/lines", "/api/v1/lines")]
    #[case::ready("/-/ready", "/-/ready")]
    #[case::unknown("/api/v1/query", "other")]
    #[case::traversal("/api/v1/lines/../../etc/passwd", "other")]
    fn should_label_routes(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(route_label(path), expected);
    }

    #[tokio::test]
    async fn should_count_requests_by_route_and_status() {
        // given
        let metrics = Arc::new(Metrics::new());
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(204).body(Body::empty()).unwrap(),
            )
        });
        let mut service = ObserveLayer::new(metrics.clone()).layer(inner);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/flush")
            .body(Body::empty())
            .unwrap();

        // when
        let response = service.call(request).await.unwrap();

        // then
        assert_eq!(response.status().as_u16(), 204);
        let count = metrics
            .http_requests_total
            .get_or_create(&RequestLabels {
                method: HttpMethod::Post,
                route: "/api/v1/flush".to_string(),
                status: 204,
            })
            .get();
        assert_eq!(count, 1);
    }
}
