//! API 错误响应
//!
//! 把 `AppError` 映射为 HTTP 状态码和 `{error, kind, remediation}` 响应体。

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, ScoringError};

/// 错误响应体
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: String,
    pub remediation: String,
}

/// HTTP 层错误
#[derive(Debug)]
pub enum ApiError {
    /// 业务错误
    App(AppError),
    /// 请求体无法解析
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(err) => match err {
                AppError::Input(_) => StatusCode::BAD_REQUEST,
                AppError::Scoring(ScoringError::UpstreamRateLimited { .. }) => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                AppError::Scoring(ScoringError::UpstreamUnavailable { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                AppError::Scoring(_) | AppError::Relay(_) | AppError::Notify(_) => {
                    StatusCode::BAD_GATEWAY
                }
                AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(message) => ErrorBody {
                success: false,
                error: message.clone(),
                kind: "input_invalid".to_string(),
                remediation: "Check the request body and submit again.".to_string(),
            },
            ApiError::App(err) => ErrorBody {
                success: false,
                error: err.to_string(),
                kind: err.kind().to_string(),
                remediation: err.remediation().to_string(),
            },
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        warn!("⚠️ 请求失败 ({}): {}", status.as_u16(), body.error);
        (status, Json(body)).into_response()
    }
}
