use application::{ApplicationError, RateLimitError};
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
            retry_after_secs: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                ApiError::validation(format!("{}: {}", field, reason))
            }
            ApplicationError::Conflict { .. } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "CONFLICT",
                "Note with this signature already exists",
            ),
            ApplicationError::Repository(err) => {
                tracing::error!(error = %err, "note store unavailable");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_UNAVAILABLE",
                    "note storage is temporarily unavailable",
                )
            }
            ApplicationError::Serialization(err) => {
                tracing::error!(error = %err, "failed to serialize note");
                ApiError::internal_server_error("internal server error")
            }
            ApplicationError::Task(err) => {
                tracing::error!(error = %err, "note submission task failed");
                ApiError::internal_server_error("internal server error")
            }
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(error: RateLimitError) -> Self {
        let RateLimitError::RateLimitExceeded {
            retry_after_secs, ..
        } = &error;
        let retry_after_secs = *retry_after_secs;
        let mut api_error =
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", error.to_string());
        api_error.retry_after_secs = Some(retry_after_secs);
        api_error
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // 超出请求体上限保留 413，其余一律视为参数错误
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                rejection.body_text(),
            );
        }
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
