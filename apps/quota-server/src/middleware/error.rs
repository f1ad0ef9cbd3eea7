//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode, http::header};
use chrono::{DateTime, Utc};
use quota_core::QuotaError;
use quota_shared::{ErrorResponse, QuotaProblem};
use std::fmt;

use crate::observability::RequestId;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    /// Enforcement failure, with the retry hint computed when it happened.
    Quota {
        error: QuotaError,
        retry_after: Option<u64>,
        request_id: Option<String>,
    },
}

impl AppError {
    pub fn quota(error: QuotaError, now: DateTime<Utc>) -> Self {
        let retry_after = error.retry_after(now);
        AppError::Quota {
            error,
            retry_after,
            request_id: None,
        }
    }

    pub fn with_request_id(self, id: &RequestId) -> Self {
        match self {
            AppError::Quota {
                error, retry_after, ..
            } => AppError::Quota {
                error,
                retry_after,
                request_id: Some(id.as_str().to_string()),
            },
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Quota { error, .. } => write!(f, "{}", error),
        }
    }
}

fn problem_for(error: &QuotaError, retry_after: Option<u64>) -> QuotaProblem {
    let mut problem = QuotaProblem::new(error.kind());
    if let QuotaError::RateLimited {
        window,
        limit,
        used,
    }
    | QuotaError::QuotaExceeded {
        window,
        limit,
        used,
    } = error
    {
        problem.window = Some(window.to_string());
        problem.limit = Some(*limit);
        problem.used = Some(*used);
    }
    problem.retry_after_seconds = retry_after;
    problem
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Quota { error, .. } => match error {
                QuotaError::RateLimited { .. } | QuotaError::QuotaExceeded { .. } => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                QuotaError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                QuotaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::Quota {
                error,
                retry_after,
                request_id,
            } => {
                let body = match error {
                    QuotaError::RateLimited { .. } | QuotaError::QuotaExceeded { .. } => {
                        ErrorResponse::too_many_requests(error.to_string())
                    }
                    // Store details stay in the logs
                    QuotaError::Unavailable(_) => ErrorResponse::service_unavailable()
                        .with_detail("Quota could not be verified, try again shortly."),
                    QuotaError::InvalidRequest(msg) => ErrorResponse::bad_request(msg.clone()),
                };
                let body = body.with_quota(problem_for(error, *retry_after));
                match request_id {
                    Some(id) => body.with_request_id(id.clone()),
                    None => body,
                }
            }
        };

        let mut response = HttpResponse::build(self.status_code());
        if let AppError::Quota {
            retry_after: Some(secs),
            ..
        } = self
        {
            response.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        response.json(error)
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use chrono::TimeZone;
    use quota_core::domain::WindowKind;

    #[actix_rt::test]
    async fn test_rate_limited_maps_to_429_with_retry_after() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 40).unwrap();
        let err = AppError::quota(
            QuotaError::RateLimited {
                window: WindowKind::Minute,
                limit: 6,
                used: 6,
            },
            now,
        )
        .with_request_id(&RequestId("req-1".to_string()));

        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "20");

        let body = to_bytes(response.into_body()).await.unwrap();
        let problem: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.request_id.as_deref(), Some("req-1"));
        let quota = problem.quota.unwrap();
        assert_eq!(quota.kind, "RateLimited");
        assert_eq!(quota.window.as_deref(), Some("minute"));
        assert_eq!(quota.retry_after_seconds, Some(20));
    }

    #[actix_rt::test]
    async fn test_unavailable_hides_store_details() {
        let err = AppError::quota(
            QuotaError::Unavailable("connection refused 10.0.0.3".to_string()),
            Utc::now(),
        );

        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.3"));
        assert!(text.contains("\"kind\":\"Unavailable\""));
    }

    #[test]
    fn test_invalid_request_is_400() {
        let err = AppError::quota(QuotaError::InvalidRequest("bad scope".into()), Utc::now());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
