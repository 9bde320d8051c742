use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use qryptic_common::{
    auth::claims::Claims,
    db::models::{Gateway, Settings, User, UserRole},
};
use uuid::Uuid;

use crate::{appstate::AppState, error::WebError};

static GATEWAY_UUID_HEADER: &str = "VPN-Gateway-UUID";

fn bearer_token(parts: &Parts) -> Result<&str, WebError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| WebError::Unauthorized("missing bearer token".into()))
}

fn verify_user_token(parts: &Parts) -> Result<(Uuid, UserRole), WebError> {
    let token = bearer_token(parts)?;
    let settings = Settings::get_current_settings();
    let claims = Claims::verify(token, &settings.user_auth_jwt_secret_key)?;
    let role = claims.aud.parse().unwrap_or_default();
    Ok((claims.sub, role))
}

/// The authenticated end user behind a request, loaded from the store.
pub struct SessionInfo {
    pub user: User,
    pub role: UserRole,
}

impl SessionInfo {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl<S> FromRequestParts<S> for SessionInfo
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let appstate = AppState::from_ref(state);
        let (user_uuid, role) = verify_user_token(parts)?;
        let user = User::find_by_uuid(&appstate.pool, user_uuid)
            .await?
            .ok_or_else(|| WebError::Unauthorized("unknown user".into()))?;

        Ok(SessionInfo { user, role })
    }
}

/// Marker extractor gating admin routes on the token role.
pub struct AdminRole;

impl<S> FromRequestParts<S> for AdminRole
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (_, role) = verify_user_token(parts)?;
        if role != UserRole::Admin {
            return Err(WebError::Forbidden);
        }

        Ok(AdminRole)
    }
}

/// A gateway authenticating itself to pull its configuration. The
/// `VPN-Gateway-UUID` header selects the verification secret.
pub struct GatewayAuth {
    pub gateway: Gateway,
}

impl<S> FromRequestParts<S> for GatewayAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let appstate = AppState::from_ref(state);
        let token = bearer_token(parts)?;
        let gateway_uuid: Uuid = parts
            .headers
            .get(GATEWAY_UUID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| WebError::Unauthorized("missing gateway identity".into()))?;

        // Unknown UUIDs fail the same way as bad signatures so the
        // endpoint can't be used to probe the fleet.
        let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
            .await?
            .ok_or_else(|| WebError::Unauthorized("unknown gateway".into()))?;
        let claims = Claims::verify(token, &gateway.jwt_secret_key)?;
        if claims.sub != gateway.uuid {
            return Err(WebError::Unauthorized("gateway identity mismatch".into()));
        }

        Ok(GatewayAuth { gateway })
    }
}
