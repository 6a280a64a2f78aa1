//! Prometheus metrics (ground: teacher's `src/metrics/mod.rs` structure —
//! named constants module + thin recording functions — generalized from
//! prediction-market label families to the spot-exchange ones this crate
//! emits).

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_QUOTE: &str = "trade_volume_quote";

    pub const ORDERBOOK_DEPTH: &str = "orderbook_depth";
    pub const ORDERBOOK_SPREAD: &str = "orderbook_spread";
    pub const MATCHER_QUEUE_DEPTH: &str = "matcher_queue_depth";

    pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";
    pub const DB_CONNECTIONS_ACTIVE: &str = "db_connections_active";

    pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
    pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
}

pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ORDER_SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const MARKET_SYMBOL: &str = "market";
}

/// Builds the Prometheus recorder and returns a handle for `GET /metrics`
/// (ground: teacher's `init_metrics()`).
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::DB_QUERY_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0],
        )
        .unwrap();

    builder.install_recorder().expect("failed to install Prometheus recorder")
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

pub fn set_http_requests_in_flight(delta: i64) {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).set(delta as f64);
}

pub fn record_order_submitted(side: &str, order_type: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ORDER_SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

pub fn record_order_rejected() {
    counter!(names::ORDERS_REJECTED_TOTAL).increment(1);
}

pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

pub fn record_trade_executed(market_symbol: &str, volume_quote: f64) {
    counter!(
        names::TRADES_EXECUTED_TOTAL,
        labels::MARKET_SYMBOL => market_symbol.to_string()
    )
    .increment(1);
    counter!(names::TRADE_VOLUME_QUOTE, labels::MARKET_SYMBOL => market_symbol.to_string()).increment(volume_quote as u64);
}

pub fn set_orderbook_depth(market_symbol: &str, side: &str, depth: i64) {
    gauge!(
        names::ORDERBOOK_DEPTH,
        labels::MARKET_SYMBOL => market_symbol.to_string(),
        labels::ORDER_SIDE => side.to_string()
    )
    .set(depth as f64);
}

pub fn set_matcher_queue_depth(market_symbol: &str, depth: i64) {
    gauge!(names::MATCHER_QUEUE_DEPTH, labels::MARKET_SYMBOL => market_symbol.to_string()).set(depth as f64);
}

pub fn set_ws_connections_active(delta: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(delta as f64);
}

pub fn record_ws_message_sent() {
    counter!(names::WS_MESSAGES_SENT_TOTAL).increment(1);
}

pub fn record_ws_message_received() {
    counter!(names::WS_MESSAGES_RECEIVED_TOTAL).increment(1);
}
