//! Authentication extractor - the only source of principal and role.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::StatusCode, http::header, web};
use std::future::{Ready, ready};

use quota_core::QuotaError;
use quota_core::domain::Role;
use quota_core::ports::{AuthError, TokenClaims};
use quota_shared::ErrorResponse;

use crate::state::AppState;

/// Authenticated caller identity.
///
/// ```ignore
/// async fn guarded(identity: Identity) -> impl Responder {
///     format!("Hello, principal {}!", identity.principal_id())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: uuid::Uuid,
    pub roles: Vec<String>,
}

impl Identity {
    /// Principal the quota is charged to.
    pub fn principal_id(&self) -> String {
        self.user_id.to_string()
    }

    /// Most privileged recognized role. A token without roles is a plain user.
    pub fn quota_role(&self) -> Result<Role, QuotaError> {
        if self.roles.is_empty() {
            return Ok(Role::User);
        }
        Role::highest(&self.roles).ok_or_else(|| {
            QuotaError::InvalidRequest(format!("no recognized role in {:?}", self.roles))
        })
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            roles: claims.roles,
        }
    }
}

/// Error type for authentication failures.
#[derive(Debug)]
pub struct AuthenticationError(pub AuthError);

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl actix_web::ResponseError for AuthenticationError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        let error = match &self.0 {
            AuthError::TokenExpired => ErrorResponse::new(401, "Token Expired")
                .with_detail("Your authentication token has expired."),
            AuthError::InvalidToken(msg) => {
                ErrorResponse::new(401, "Invalid Token").with_detail(msg.clone())
            }
            AuthError::MissingAuth => ErrorResponse::new(401, "Authentication Required")
                .with_detail("Please provide a valid Bearer token in the Authorization header."),
        };

        actix_web::HttpResponse::build(self.status_code()).json(error)
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Invalid authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidToken("Expected Bearer token".to_string()))
}

impl FromRequest for Identity {
    type Error = AuthenticationError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState not found in app data");
            return ready(Err(AuthenticationError(AuthError::InvalidToken(
                "Server configuration error".to_string(),
            ))));
        };

        let result = bearer_token(req)
            .and_then(|token| state.token_service.validate_token(token))
            .map(Identity::from)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AuthenticationError(e)
            });

        ready(result)
    }
}
