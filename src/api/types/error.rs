//! API error envelope
//!
//! Every rejection shares one JSON shape: a short `error` title, an optional
//! human-readable `message`, a machine-readable `code`, and, on 429s, the
//! fields a well-behaved client needs to back off. Internal error text,
//! stack traces, and database errors never leak into responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::admission::AdmissionError;
use crate::domain::DomainError;

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub code: String,
    /// Seconds to wait before retrying (rate limits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Requests consumed this month (quota)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<u32>,
    /// Monthly limit (quota)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Plan tier (quota)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// When the quota window resets, RFC 3339 (quota)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets: Option<String>,
}

impl ApiErrorBody {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            code: code.into(),
            retry_after: None,
            used: None,
            limit: None,
            plan: None,
            resets: None,
        }
    }
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorBody {
                message: Some(message.into()),
                ..ApiErrorBody::new("bad request", "bad_request")
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ApiErrorBody {
                message: Some(message.into()),
                ..ApiErrorBody::new("unauthorized", "unauthorized")
            },
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ApiErrorBody {
                message: Some(message.into()),
                ..ApiErrorBody::new("forbidden", "forbidden")
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ApiErrorBody {
                message: Some(message.into()),
                ..ApiErrorBody::new("not found", "not_found")
            },
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ApiErrorBody {
                message: Some("an internal error occurred".to_string()),
                ..ApiErrorBody::new("internal error", "internal_error")
            },
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: ApiErrorBody {
                retry_after: Some(retry_after_secs),
                ..ApiErrorBody::new("rate limit exceeded", "too_many_requests")
            },
        }
    }

    pub fn quota_exceeded(used: u32, limit: u32, plan: &str, resets: String) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: ApiErrorBody {
                used: Some(used),
                limit: Some(limit),
                plan: Some(plan.to_string()),
                resets: Some(resets),
                ..ApiErrorBody::new("monthly quota exceeded", "quota_exceeded")
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.body.retry_after;
        let mut response = (self.status, Json(self.body)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Authentication { message } => Self::unauthorized(message),
            DomainError::Authorization { message } => Self::forbidden(message),
            DomainError::Conflict { message } => Self::bad_request(message),
            // Storage, configuration and internal failures share a generic
            // body; details go to the logs only.
            DomainError::Configuration { .. }
            | DomainError::Storage { .. }
            | DomainError::Internal { .. } => {
                tracing::error!(error = %err, "request failed with internal error");
                Self::internal()
            }
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited {
                retry_after_secs, ..
            } => Self::rate_limited(retry_after_secs),
            AdmissionError::QuotaExceeded {
                used,
                limit,
                plan,
                resets,
            } => Self::quota_exceeded(used, limit, plan.as_str(), resets.to_rfc3339()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.body.error)
    }
}

impl std::error::Error for ApiError {}
