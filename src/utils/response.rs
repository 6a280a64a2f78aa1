//! REST response envelope (ground: teacher's `utils/response.rs` —
//! `ApiResponse<T>`/`ApiError`/`AppError` wrapped around `IntoResponse`).

#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::ExchangeError;
use crate::hub::protocol::ErrorCode;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(code: &str, message: &str) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Maps a REST handler's outcome to a response; implements `IntoResponse` so
/// handlers can return `Result<Json<T>, AppError>` directly.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(&self.code, &self.message);
        (self.status, Json(body)).into_response()
    }
}

/// Status/code mapping for the REST surface, reusing the hub's wire
/// `ErrorCode` taxonomy (spec §7) so both transports agree on vocabulary.
impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        let code = err.code();
        let status = match code {
            ErrorCode::NotAuthenticated | ErrorCode::MissingToken => StatusCode::UNAUTHORIZED,
            ErrorCode::AuthFailed => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidOrderData
            | ErrorCode::InvalidJson
            | ErrorCode::InvalidMessage
            | ErrorCode::MissingParams
            | ErrorCode::MissingSymbol
            | ErrorCode::MissingOrderId
            | ErrorCode::InvalidChannel
            | ErrorCode::SubscriptionLimit
            | ErrorCode::UnknownMessageType => StatusCode::BAD_REQUEST,
            ErrorCode::OrderFailed | ErrorCode::CancelFailed => StatusCode::UNPROCESSABLE_ENTITY,
        };
        AppError::new(status, &format!("{:?}", code), &err.to_string())
    }
}
