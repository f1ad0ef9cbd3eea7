//! Standardized error responses (RFC 7807) with quota extension members.

use serde::{Deserialize, Serialize};

/// Quota-specific members of a problem document.
///
/// Lets a client tell "try again in N seconds" apart from "daily cap reached".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaProblem {
    /// One of `RateLimited`, `QuotaExceeded`, `Unavailable`, `InvalidRequest`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl QuotaProblem {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            window: None,
            limit: None,
            used: None,
            retry_after_seconds: None,
        }
    }

    pub fn is_limit(&self) -> bool {
        self.kind == "RateLimited" || self.kind == "QuotaExceeded"
    }
}

/// RFC 7807 Problem Details for HTTP APIs.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Request ID for debugging purposes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Quota extension members, present on enforcement failures.
    #[serde(flatten)]
    pub quota: Option<QuotaProblem>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            request_id: None,
            quota: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_quota(mut self, quota: QuotaProblem) -> Self {
        self.quota = Some(quota);
        self
    }

    // Common error constructors
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_detail(detail)
    }

    pub fn too_many_requests(detail: impl Into<String>) -> Self {
        Self::new(429, "Too Many Requests").with_detail(detail)
    }

    pub fn service_unavailable() -> Self {
        Self::new(503, "Service Unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_members_are_flattened() {
        let problem = QuotaProblem {
            window: Some("minute".to_string()),
            limit: Some(6),
            used: Some(6),
            retry_after_seconds: Some(12),
            ..QuotaProblem::new("RateLimited")
        };
        let body = ErrorResponse::too_many_requests("slow down").with_quota(problem.clone());

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "RateLimited");
        assert_eq!(json["retryAfterSeconds"], 12);
        assert_eq!(json["status"], 429);

        let parsed: ErrorResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.quota, Some(problem));
    }

    #[test]
    fn test_plain_problem_has_no_quota_members() {
        let json = serde_json::to_value(ErrorResponse::new(401, "Unauthorized")).unwrap();
        assert!(json.get("kind").is_none());

        let parsed: ErrorResponse = serde_json::from_value(json).unwrap();
        assert!(parsed.quota.is_none());
    }
}
