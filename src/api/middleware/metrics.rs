//! Records Prometheus metrics for every HTTP request: count by
//! method/endpoint/status, duration histogram, in-flight gauge (ground:
//! teacher's `api::middleware::metrics::metrics_middleware`, kept verbatim).

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics;

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    metrics::set_http_requests_in_flight(1);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    metrics::record_http_request(&method, &path, status, duration);
    metrics::set_http_requests_in_flight(-1);

    response
}
