use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    appstate::AppState,
    error::WebError,
    handlers::{ApiResponse, ApiResult},
    sso::{self, WebTokenPoll},
};

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn require<'q>(value: &'q str, name: &str) -> Result<&'q str, WebError> {
    if value.is_empty() {
        return Err(WebError::BadRequest(format!("Missing {name}")));
    }
    Ok(value)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub(crate) async fn login(
    State(appstate): State<AppState>,
    Json(data): Json<LoginRequest>,
) -> ApiResult {
    debug!("Password login attempt for {}", data.email);
    let token = sso::password_login(&appstate.pool, &data.email, &data.password).await?;

    Ok(ApiResponse::ok(json!({ "authToken": token })))
}

fn default_challenge_method() -> String {
    "S256".into()
}

#[derive(Deserialize)]
pub struct InitiateSsoParams {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_challenge_method")]
    pub code_challenge_method: String,
}

/// GET /api/v1/auth/{provider}/sso/initiate: native PKCE entry point;
/// redirects to the provider.
pub(crate) async fn initiate_sso_auth(
    Path(provider): Path<String>,
    Query(params): Query<InitiateSsoParams>,
) -> Result<Response, WebError> {
    sso::validate_provider(&provider)?;
    require(&params.platform, "platform")?;
    require(&params.code_challenge, "code challenge")?;
    require(&params.redirect_uri, "redirect uri")?;

    debug!(
        "Initiating native SSO for platform {} via {provider}",
        params.platform
    );
    let auth_url = sso::initiate_native_auth(
        Some(&params.client_id),
        &params.code_challenge,
        &params.redirect_uri,
        &params.code_challenge_method,
    )?;

    Ok(found(auth_url))
}

#[derive(Deserialize)]
pub struct SsoCallbackParams {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code_verifier: String,
}

/// GET /api/v1/auth/{provider}/sso/callback: native PKCE completion.
pub(crate) async fn sso_callback(
    Path(provider): Path<String>,
    State(appstate): State<AppState>,
    Query(params): Query<SsoCallbackParams>,
) -> ApiResult {
    sso::validate_provider(&provider)?;
    require(&params.code, "code")?;
    require(&params.state, "state")?;
    require(&params.code_verifier, "code verifier")?;

    let token = sso::native_auth_callback(
        &appstate.pool,
        &appstate.http,
        &params.code,
        &params.state,
        &params.code_verifier,
    )
    .await?;

    Ok(ApiResponse::ok(json!({ "authToken": token })))
}

#[derive(Deserialize)]
pub struct IdTokenParams {
    #[serde(default)]
    pub token: String,
}

/// GET /api/v1/auth/{provider}/sso/token: provider ID-token
/// verification for mobile clients.
pub(crate) async fn verify_sso_token(
    Path(provider): Path<String>,
    State(appstate): State<AppState>,
    Query(params): Query<IdTokenParams>,
) -> ApiResult {
    sso::validate_provider(&provider)?;
    require(&params.token, "token")?;

    let token = sso::id_token_login(&appstate.pool, &appstate.http, &params.token).await?;

    Ok(ApiResponse::ok(json!({ "authToken": token })))
}

#[derive(Deserialize)]
pub struct WebInitiateParams {
    #[serde(default)]
    pub code_challenge: String,
}

/// GET /api/v1/auth/{provider}/web/sso/initiate: browser flow entry;
/// persists the pending session and redirects to the provider.
pub(crate) async fn web_sso_initiate(
    Path(provider): Path<String>,
    State(appstate): State<AppState>,
    Query(params): Query<WebInitiateParams>,
) -> Result<Response, WebError> {
    sso::validate_provider(&provider)?;
    require(&params.code_challenge, "code challenge")?;

    let auth_url = sso::web_login_initiate(&appstate.pool, &params.code_challenge).await?;

    Ok(found(auth_url))
}

#[derive(Deserialize)]
pub struct WebCallbackParams {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
}

/// GET /api/v1/auth/{provider}/web/sso/callback: landing point of the
/// provider redirect in the user's browser.
pub(crate) async fn web_sso_callback(
    Path(provider): Path<String>,
    State(appstate): State<AppState>,
    Query(params): Query<WebCallbackParams>,
) -> ApiResult {
    sso::validate_provider(&provider)?;
    require(&params.state, "state")?;
    require(&params.code, "code")?;

    sso::web_login_callback(&appstate.pool, &appstate.http, &params.state, &params.code).await?;

    Ok(ApiResponse::ok(json!({
        "success": true,
        "message": "Authentication Completed. You can close this tab"
    })))
}

#[derive(Deserialize)]
pub struct WebTokenParams {
    #[serde(default)]
    pub code_verifier: String,
    #[serde(default)]
    pub code_challenge: String,
}

/// GET /api/v1/auth/{provider}/web/sso/token: polled by the app until
/// the browser round trip completes. A pending session answers 401 with
/// a "keep polling" message; terminal failures answer 401 with an error.
pub(crate) async fn web_sso_token(
    Path(provider): Path<String>,
    State(appstate): State<AppState>,
    Query(params): Query<WebTokenParams>,
) -> ApiResult {
    sso::validate_provider(&provider)?;
    require(&params.code_verifier, "code_verifier")?;
    require(&params.code_challenge, "code_challenge")?;

    match sso::web_login_token(&appstate.pool, &params.code_verifier, &params.code_challenge)
        .await?
    {
        WebTokenPoll::Ready(token) => Ok(ApiResponse::ok(json!({ "authToken": token }))),
        WebTokenPoll::Pending => Ok(ApiResponse::json(
            json!({ "message": "waiting for authentication to complete" }),
            StatusCode::UNAUTHORIZED,
        )),
    }
}
