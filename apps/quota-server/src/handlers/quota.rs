//! Quota enforcement handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;

use quota_core::domain::{QuotaSnapshot, Role};
use quota_core::services::principal_fingerprint;
use quota_shared::dto::{EnforceRequest, QuotaUsageResponse, UsageQuery};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::observability::RequestId;
use crate::state::AppState;

fn usage_body(snapshot: QuotaSnapshot) -> QuotaUsageResponse {
    QuotaUsageResponse {
        used_day: snapshot.day.used,
        limit_day: snapshot.day.limit,
        remaining_day: snapshot.day.remaining,
        used_minute: snapshot.minute.used,
        limit_minute: snapshot.minute.limit,
        remaining_minute: snapshot.minute.remaining,
        day_key: snapshot.day_key,
        minute_key: snapshot.minute_key,
    }
}

fn resolve_role(
    identity: &Identity,
    principal_id: &str,
    request_id: &RequestId,
) -> Result<Role, AppError> {
    identity.quota_role().map_err(|e| {
        tracing::warn!(
            principal = %principal_fingerprint(principal_id),
            roles = ?identity.roles,
            "Token carries no recognized role"
        );
        AppError::quota(e, Utc::now()).with_request_id(request_id)
    })
}

/// Record one guarded call for the authenticated principal.
///
/// POST /api/quota/enforce
pub async fn enforce(
    state: web::Data<AppState>,
    identity: Identity,
    request_id: RequestId,
    body: web::Json<EnforceRequest>,
) -> AppResult<HttpResponse> {
    let principal_id = identity.principal_id();
    let role = resolve_role(&identity, &principal_id, &request_id)?;
    let now = Utc::now();

    let snapshot = state
        .ledger
        .enforce_and_record(&principal_id, role, &body.scope, now)
        .await
        .map_err(|e| AppError::quota(e, now).with_request_id(&request_id))?;

    Ok(HttpResponse::Ok().json(usage_body(snapshot)))
}

/// Current usage without recording a call.
///
/// GET /api/quota/usage?scope=...
pub async fn usage(
    state: web::Data<AppState>,
    identity: Identity,
    request_id: RequestId,
    query: web::Query<UsageQuery>,
) -> AppResult<HttpResponse> {
    let principal_id = identity.principal_id();
    let role = resolve_role(&identity, &principal_id, &request_id)?;
    let now = Utc::now();

    let snapshot = state
        .ledger
        .peek(&principal_id, role, &query.scope, now)
        .await
        .map_err(|e| AppError::quota(e, now).with_request_id(&request_id))?;

    Ok(HttpResponse::Ok().json(usage_body(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, http::header, test as actix_test};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use quota_core::domain::QuotaConfig;
    use quota_infra::{InMemoryCounterStore, JwtConfig, JwtTokenService};
    use quota_shared::ErrorResponse;
    use uuid::Uuid;

    const SECRET: &str = "handler-test-secret";

    fn token_service() -> Arc<JwtTokenService> {
        Arc::new(JwtTokenService::new(JwtConfig {
            secret: SECRET.to_string(),
            ..JwtConfig::default()
        }))
    }

    fn state(quota: QuotaConfig, tokens: Arc<JwtTokenService>) -> AppState {
        AppState::from_parts(
            Arc::new(InMemoryCounterStore::new()),
            quota,
            tokens,
            "memory",
        )
    }

    /// Bearer header for a fresh principal, signed for the default issuer.
    fn bearer(roles: &[&str]) -> String {
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "sub": Uuid::new_v4().to_string(),
            "roles": roles,
            "iat": now,
            "exp": now + 3600,
            "iss": JwtConfig::default().issuer,
        });
        let token =
            encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        format!("Bearer {token}")
    }

    macro_rules! app {
        ($state:expr) => {
            actix_test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(crate::handlers::configure_routes),
            )
            .await
        };
    }

    fn enforce_request(auth: &str, scope: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri("/api/quota/enforce")
            .insert_header((header::AUTHORIZATION, auth.to_string()))
            .set_json(EnforceRequest {
                scope: scope.to_string(),
            })
    }

    #[actix_rt::test]
    async fn test_enforce_counts_and_then_rejects_daily() {
        let tokens = token_service();
        let auth = bearer(&["user"]);
        let quota = QuotaConfig {
            per_day_override: Some(3),
            ..QuotaConfig::default()
        };
        let app = app!(state(quota, tokens));

        for expected in 1..=3u64 {
            let res = actix_test::call_service(&app, enforce_request(&auth, "tenant-a").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            let body: QuotaUsageResponse = actix_test::read_body_json(res).await;
            assert_eq!(body.used_day, expected);
            assert_eq!(body.limit_day, 3);
            assert_eq!(body.remaining_day, 3 - expected);
            assert_eq!(body.limit_minute, 6);
        }

        let res = actix_test::call_service(&app, enforce_request(&auth, "tenant-a").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().get(header::RETRY_AFTER).is_some());
        let problem: ErrorResponse = actix_test::read_body_json(res).await;
        let quota = problem.quota.unwrap();
        assert_eq!(quota.kind, "QuotaExceeded");
        assert_eq!(quota.window.as_deref(), Some("day"));
        assert_eq!(quota.used, Some(3));
    }

    #[actix_rt::test]
    async fn test_enforce_rate_limited() {
        let tokens = token_service();
        let auth = bearer(&["admin"]);
        let quota = QuotaConfig {
            per_minute_override: Some(0),
            ..QuotaConfig::default()
        };
        let app = app!(state(quota, tokens));

        let res = actix_test::call_service(&app, enforce_request(&auth, "tenant-a").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = res
            .headers()
            .get(header::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry));

        let problem: ErrorResponse = actix_test::read_body_json(res).await;
        let quota = problem.quota.unwrap();
        assert_eq!(quota.kind, "RateLimited");
        assert_eq!(quota.limit, Some(0));
    }

    #[actix_rt::test]
    async fn test_missing_token_is_unauthorized() {
        let tokens = token_service();
        let app = app!(state(QuotaConfig::default(), tokens));

        let req = actix_test::TestRequest::post()
            .uri("/api/quota/enforce")
            .set_json(EnforceRequest {
                scope: "tenant-a".to_string(),
            })
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_unknown_role_is_bad_request() {
        let tokens = token_service();
        let auth = bearer(&["auditor"]);
        let app = app!(state(QuotaConfig::default(), tokens));

        let res = actix_test::call_service(&app, enforce_request(&auth, "tenant-a").to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let problem: ErrorResponse = actix_test::read_body_json(res).await;
        assert_eq!(problem.quota.unwrap().kind, "InvalidRequest");
    }

    #[actix_rt::test]
    async fn test_malformed_scope_is_bad_request() {
        let tokens = token_service();
        let auth = bearer(&["user"]);
        let app = app!(state(QuotaConfig::default(), tokens));

        let res = actix_test::call_service(&app, enforce_request(&auth, "tenant a").to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_usage_does_not_record() {
        let tokens = token_service();
        let auth = bearer(&["superadmin", "user"]);
        let app = app!(state(QuotaConfig::default(), tokens));

        let res = actix_test::call_service(&app, enforce_request(&auth, "tenant-b").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        for _ in 0..2 {
            let req = actix_test::TestRequest::get()
                .uri("/api/quota/usage?scope=tenant-b")
                .insert_header((header::AUTHORIZATION, auth.clone()))
                .to_request();
            let body: QuotaUsageResponse = actix_test::call_and_read_body_json(&app, req).await;
            assert_eq!(body.used_day, 1);
            assert_eq!(body.limit_day, 500);
            assert_eq!(body.limit_minute, 60);
        }
    }

    #[actix_rt::test]
    async fn test_malformed_body_is_problem_json() {
        let tokens = token_service();
        let auth = bearer(&["user"]);
        let app = app!(state(QuotaConfig::default(), tokens));

        let req = actix_test::TestRequest::post()
            .uri("/api/quota/enforce")
            .insert_header((header::AUTHORIZATION, auth))
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{}")
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let problem: ErrorResponse = actix_test::read_body_json(res).await;
        assert_eq!(problem.status, 400);
        assert_eq!(problem.quota.unwrap().kind, "InvalidRequest");
    }

    #[actix_rt::test]
    async fn test_missing_usage_scope_is_problem_json() {
        let tokens = token_service();
        let auth = bearer(&["user"]);
        let app = app!(state(QuotaConfig::default(), tokens));

        let req = actix_test::TestRequest::get()
            .uri("/api/quota/usage")
            .insert_header((header::AUTHORIZATION, auth))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let problem: ErrorResponse = actix_test::read_body_json(res).await;
        assert_eq!(problem.quota.unwrap().kind, "InvalidRequest");
    }
}
