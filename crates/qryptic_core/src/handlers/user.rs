use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::Query;
use qryptic_common::{
    auth::password::hash_password,
    db::models::{Client, Gateway, Group, NewUser, User, UserRole},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    error::WebError,
    handlers::{ApiResponse, ApiResult, IncludeParams},
    provisioning,
};

const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 50;

fn validate_password(password: &str, is_password_set: bool) -> Result<(), WebError> {
    if is_password_set && (password.len() < PASSWORD_MIN || password.len() > PASSWORD_MAX) {
        return Err(WebError::BadRequest(format!(
            "password length should be between {PASSWORD_MIN} and {PASSWORD_MAX}"
        )));
    }
    if !is_password_set && !password.is_empty() {
        return Err(WebError::BadRequest(
            "password found in request even if isPasswordSet is false".into(),
        ));
    }

    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    pub role: UserRole,
    #[serde(default)]
    pub is_password_set: bool,
}

/// POST /api/v1/admin/user
pub(crate) async fn register_user(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<RegisterUserRequest>,
) -> ApiResult {
    debug!(
        "User {} registering user {}",
        session.user.email, data.email
    );
    validate_password(&data.password, data.is_password_set)?;
    if User::email_exists(&appstate.pool, &data.email).await? {
        return Err(WebError::Conflict("email id already present".into()));
    }
    let password_hash = if data.is_password_set {
        hash_password(&data.password)
            .map_err(|err| WebError::Internal(format!("password hashing failed: {err}")))?
    } else {
        String::new()
    };

    let user = NewUser {
        name: data.name,
        email: data.email,
        is_password_set: data.is_password_set,
        password_hash,
        role: data.role,
    }
    .save(&appstate.pool)
    .await?;
    info!("User {} registered user {}", session.user.email, user.email);

    Ok(ApiResponse::json(
        json!({ "status": "User Created" }),
        StatusCode::CREATED,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub is_password_set: bool,
}

/// PUT /api/v1/admin/user/{id}: role and/or password.
pub(crate) async fn update_user(
    _role: AdminRole,
    session: SessionInfo,
    Path(user_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Json(data): Json<UpdateUserRequest>,
) -> ApiResult {
    debug!("User {} updating user {user_uuid}", session.user.email);
    validate_password(&data.new_password, data.is_password_set)?;

    let mut user = User::find_by_uuid(&appstate.pool, user_uuid)
        .await?
        .ok_or(WebError::NotFound("user"))?;
    if !data.new_password.is_empty() {
        user.password_hash = hash_password(&data.new_password)
            .map_err(|err| WebError::Internal(format!("password hashing failed: {err}")))?;
        user.is_password_set = true;
    }
    if let Some(role) = data.role {
        user.role = role;
    }
    user.save(&appstate.pool).await?;
    info!("User {} updated user {user_uuid}", session.user.email);

    Ok(ApiResponse::ok(json!({ "status": true })))
}

/// DELETE /api/v1/admin/user/{id}: deactivates the user's clients and
/// releases their IPs in the same transaction that removes the user.
pub(crate) async fn delete_user(
    _role: AdminRole,
    session: SessionInfo,
    Path(user_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    debug!("User {} deleting user {user_uuid}", session.user.email);
    let user = User::find_by_uuid(&appstate.pool, user_uuid)
        .await?
        .ok_or(WebError::NotFound("user"))?;

    let mut transaction = appstate.pool.begin().await?;
    let clients = provisioning::deactivate_user_clients(&mut transaction, user.id).await?;
    User::mark_deleted(&mut *transaction, user.id).await?;
    transaction.commit().await?;

    provisioning::push_peer_removals(&appstate, &clients).await;
    info!("User {} deleted user {}", session.user.email, user.email);

    Ok(ApiResponse::ok(json!({ "status": true })))
}

#[derive(Serialize)]
struct UserGatewayEntry {
    #[serde(flatten)]
    gateway: Gateway,
    #[serde(skip_serializing_if = "Option::is_none")]
    clients: Option<Vec<Client>>,
}

#[derive(Serialize)]
struct UserDetails {
    #[serde(flatten)]
    user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateways: Option<Vec<UserGatewayEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clients: Option<Vec<Client>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<Group>>,
}

async fn load_user_details(
    pool: &PgPool,
    user: User,
    include: &IncludeParams,
) -> Result<UserDetails, sqlx::Error> {
    let gateways = if include.has("gateways") || include.has("gateways-clients") {
        let with_clients = include.has("gateways-clients");
        let mut entries = Vec::new();
        for gateway in Gateway::linked_to_user(pool, user.id).await? {
            let clients = if with_clients {
                Some(Client::active_for_gateway(pool, gateway.id).await?)
            } else {
                None
            };
            entries.push(UserGatewayEntry { gateway, clients });
        }
        Some(entries)
    } else {
        None
    };
    let clients = if include.has("clients") {
        Some(Client::active_for_user(pool, user.id).await?)
    } else {
        None
    };
    let groups = if include.has("groups") {
        Some(Group::linked_to_user(pool, user.id).await?)
    } else {
        None
    };

    Ok(UserDetails {
        user,
        gateways,
        clients,
        groups,
    })
}

/// GET /api/v1/admin/user/list
pub(crate) async fn list_users(
    _role: AdminRole,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let mut details = Vec::new();
    for user in User::all(&appstate.pool).await? {
        details.push(load_user_details(&appstate.pool, user, &include).await?);
    }

    Ok(ApiResponse::ok(details))
}

/// GET /api/v1/admin/user/{id}
pub(crate) async fn get_user(
    _role: AdminRole,
    Path(user_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let user = User::find_by_uuid(&appstate.pool, user_uuid)
        .await?
        .ok_or(WebError::NotFound("user"))?;
    let details = load_user_details(&appstate.pool, user, &include).await?;

    Ok(ApiResponse::ok(details))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        claims::assert_ok!(validate_password("longenough", true));
        claims::assert_ok!(validate_password("", false));
        claims::assert_err!(validate_password("short", true));
        claims::assert_err!(validate_password(&"x".repeat(51), true));
        claims::assert_err!(validate_password("surprise", false));
    }
}
