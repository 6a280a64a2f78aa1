//! Duplex session wire protocol (spec §6): one JSON message per frame.
//!
//! - Client → Server: `{ id, type, data? }`.
//! - Server → Client response: `{ id, type, data, timestamp }`.
//! - Server → Client push: `{ type, data, timestamp }`.
//! - Error: `{ id?, type: "error", error: { code, message }, timestamp }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ServerResponse {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), kind: kind.into(), data, timestamp: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerPush {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ServerPush {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data, timestamp: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub error: ErrorPayload,
    pub timestamp: DateTime<Utc>,
}

impl ServerError {
    pub fn new(id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: "error",
            error: ErrorPayload { code, message: message.into() },
            timestamp: Utc::now(),
        }
    }
}

/// Required error codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidJson,
    InvalidMessage,
    UnknownMessageType,
    RateLimitExceeded,
    MissingToken,
    AuthFailed,
    NotAuthenticated,
    InvalidChannel,
    SubscriptionLimit,
    MissingParams,
    MissingSymbol,
    MissingOrderId,
    InvalidOrderData,
    OrderFailed,
    CancelFailed,
}
