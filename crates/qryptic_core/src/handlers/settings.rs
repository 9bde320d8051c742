use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use qryptic_common::db::models::{NewSsoConfig, Settings, SsoConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    error::WebError,
    handlers::{ApiResponse, ApiResult},
    sso,
};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

#[derive(Serialize)]
struct AdminConfigDetails {
    #[serde(flatten)]
    settings: Settings,
    #[serde(rename = "ssoConfigs")]
    sso_configs: Vec<SsoConfig>,
}

/// GET /api/v1/admin/config
pub(crate) async fn get_admin_config(
    _role: AdminRole,
    State(appstate): State<AppState>,
) -> ApiResult {
    let settings = Settings::get(&appstate.pool)
        .await?
        .ok_or(WebError::NotFound("settings"))?;
    let sso_configs = SsoConfig::all(&appstate.pool).await?;

    Ok(ApiResponse::ok(AdminConfigDetails {
        settings,
        sso_configs,
    }))
}

/// GET /api/v1/sso-config (public): which platforms may start SSO, and
/// with which client ids.
pub(crate) async fn public_sso_config(State(appstate): State<AppState>) -> ApiResult {
    let settings = Settings::get_current_settings();
    if !settings.allow_sso_login {
        return Err(WebError::SsoLoginDisabled);
    }

    let configs = SsoConfig::all(&appstate.pool).await?;
    let response: serde_json::Map<String, serde_json::Value> = configs
        .into_iter()
        .filter(|config| config.enabled)
        .map(|config| (config.platform, config.client_id.into()))
        .collect();

    Ok(ApiResponse::ok(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordLoginRequest {
    pub allow_password_login: bool,
}

/// PUT /api/v1/admin/config/password-login: DB write-through, then
/// publish to the in-process cache.
pub(crate) async fn update_password_login(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<UpdatePasswordLoginRequest>,
) -> ApiResult {
    let mut settings = Settings::get(&appstate.pool)
        .await?
        .ok_or(WebError::NotFound("settings"))?;
    settings.allow_password_login = data.allow_password_login;
    settings.save(&appstate.pool).await?;
    Settings::set_current_settings(settings);
    info!(
        "User {} set allowPasswordLogin = {}",
        session.user.email, data.allow_password_login
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSsoLoginRequest {
    pub allow_sso_login: bool,
}

/// PUT /api/v1/admin/config/sso-login
pub(crate) async fn update_sso_login(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<UpdateSsoLoginRequest>,
) -> ApiResult {
    let mut settings = Settings::get(&appstate.pool)
        .await?
        .ok_or(WebError::NotFound("settings"))?;
    settings.allow_sso_login = data.allow_sso_login;
    settings.save(&appstate.pool).await?;
    Settings::set_current_settings(settings);
    sso::refresh_provider_cache(&appstate.pool).await?;
    info!(
        "User {} set allowSSOLogin = {}",
        session.user.email, data.allow_sso_login
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSsoConfigRequest {
    pub domain: String,
    pub platform: String,
    pub provider: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: String,
}

/// POST /api/v1/admin/config/sso: one live config per platform.
pub(crate) async fn add_sso_config(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<AddSsoConfigRequest>,
) -> ApiResult {
    if data.provider != "google" {
        return Err(WebError::BadRequest(format!(
            "unsupported sso provider {:?}",
            data.provider
        )));
    }

    let result = NewSsoConfig {
        domain: data.domain,
        platform: data.platform.clone(),
        provider: data.provider,
        client_id: data.client_id,
        client_secret: data.client_secret,
    }
    .save(&appstate.pool)
    .await;
    let config = match result {
        Ok(config) => config,
        Err(err) if is_unique_violation(&err) => {
            return Err(WebError::Conflict(format!(
                "sso config for platform {:?} already present",
                data.platform
            )));
        }
        Err(err) => return Err(err.into()),
    };

    sso::refresh_provider_cache(&appstate.pool).await?;
    info!(
        "User {} added sso config for platform {}",
        session.user.email, config.platform
    );

    Ok(ApiResponse::json(json!({ "success": true }), StatusCode::CREATED))
}

/// DELETE /api/v1/admin/config/sso/{id}
pub(crate) async fn delete_sso_config(
    _role: AdminRole,
    session: SessionInfo,
    Path(config_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let config = SsoConfig::find_by_uuid(&appstate.pool, config_uuid)
        .await?
        .ok_or(WebError::NotFound("sso config"))?;
    SsoConfig::mark_deleted(&appstate.pool, config.id).await?;
    sso::refresh_provider_cache(&appstate.pool).await?;
    info!(
        "User {} deleted sso config for platform {}",
        session.user.email, config.platform
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}
