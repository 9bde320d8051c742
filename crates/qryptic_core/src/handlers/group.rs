use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::Query;
use qryptic_common::db::models::{Gateway, Group, NewGroup, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    error::WebError,
    handlers::{ApiResponse, ApiResult, IncludeParams, MembershipAction},
};

#[derive(Deserialize)]
pub struct GroupRequest {
    pub name: String,
}

/// POST /api/v1/admin/group
pub(crate) async fn create_group(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<GroupRequest>,
) -> ApiResult {
    let group = NewGroup { name: data.name }.save(&appstate.pool).await?;
    info!(
        "User {} created group {} ({})",
        session.user.email, group.name, group.uuid
    );

    Ok(ApiResponse::json(json!({ "success": true }), StatusCode::CREATED))
}

/// PUT /api/v1/admin/group/{id}
pub(crate) async fn update_group(
    _role: AdminRole,
    session: SessionInfo,
    Path(group_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Json(data): Json<GroupRequest>,
) -> ApiResult {
    let mut group = Group::find_by_uuid(&appstate.pool, group_uuid)
        .await?
        .ok_or(WebError::NotFound("group"))?;
    group.name = data.name;
    group.save(&appstate.pool).await?;
    info!("User {} updated group {group_uuid}", session.user.email);

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// DELETE /api/v1/admin/group/{id}: drops the group's memberships, then
/// the group itself. Gateways and users are untouched.
pub(crate) async fn delete_group(
    _role: AdminRole,
    session: SessionInfo,
    Path(group_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let group = Group::find_by_uuid(&appstate.pool, group_uuid)
        .await?
        .ok_or(WebError::NotFound("group"))?;

    let mut transaction = appstate.pool.begin().await?;
    Group::remove_memberships(&mut transaction, group.id).await?;
    Group::mark_deleted(&mut *transaction, group.id).await?;
    transaction.commit().await?;
    info!(
        "User {} deleted group {} ({group_uuid})",
        session.user.email, group.name
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}

#[derive(Serialize)]
struct GroupDetails {
    #[serde(flatten)]
    group: Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    users: Option<Vec<User>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateways: Option<Vec<Gateway>>,
}

async fn load_group_details(
    pool: &PgPool,
    group: Group,
    include: &IncludeParams,
) -> Result<GroupDetails, sqlx::Error> {
    let users = if include.has("users") {
        Some(User::linked_to_group(pool, group.id).await?)
    } else {
        None
    };
    let gateways = if include.has("gateways") {
        Some(Gateway::linked_to_group(pool, group.id).await?)
    } else {
        None
    };

    Ok(GroupDetails {
        group,
        users,
        gateways,
    })
}

/// GET /api/v1/admin/group/list
pub(crate) async fn list_groups(
    _role: AdminRole,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let mut details = Vec::new();
    for group in Group::all(&appstate.pool).await? {
        details.push(load_group_details(&appstate.pool, group, &include).await?);
    }

    Ok(ApiResponse::ok(details))
}

/// GET /api/v1/admin/group/{id}
pub(crate) async fn get_group(
    _role: AdminRole,
    Path(group_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let group = Group::find_by_uuid(&appstate.pool, group_uuid)
        .await?
        .ok_or(WebError::NotFound("group"))?;
    let details = load_group_details(&appstate.pool, group, &include).await?;

    Ok(ApiResponse::ok(details))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembersRequest {
    pub user_uuids: Vec<Uuid>,
}

/// PUT /api/v1/admin/group/{id}/{action}/users: transactional set edit;
/// `add` silently skips unknown users, `remove` intersects with current
/// members.
pub(crate) async fn update_group_users(
    _role: AdminRole,
    session: SessionInfo,
    Path((group_uuid, action)): Path<(Uuid, String)>,
    State(appstate): State<AppState>,
    Json(data): Json<GroupMembersRequest>,
) -> ApiResult {
    let action: MembershipAction = action.parse()?;
    let group = Group::find_by_uuid(&appstate.pool, group_uuid)
        .await?
        .ok_or(WebError::NotFound("group"))?;

    let mut transaction = appstate.pool.begin().await?;
    match action {
        MembershipAction::Add => {
            for user_uuid in &data.user_uuids {
                if let Some(user) = User::find_by_uuid(&mut *transaction, *user_uuid).await? {
                    Group::add_user(&mut *transaction, group.id, user.id).await?;
                }
            }
        }
        MembershipAction::Remove => {
            let members = User::linked_to_group(&mut *transaction, group.id).await?;
            for member in members
                .iter()
                .filter(|member| data.user_uuids.contains(&member.uuid))
            {
                Group::remove_user(&mut *transaction, group.id, member.id).await?;
            }
        }
    }
    transaction.commit().await?;
    info!(
        "User {} applied {action:?} of {} user(s) on group {group_uuid}",
        session.user.email,
        data.user_uuids.len()
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}
