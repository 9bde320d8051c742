use axum::{
    Json,
    extract::{Path, State},
};
use qryptic_common::db::models::{Gateway, Group, User};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    error::WebError,
    handlers::{ApiResponse, ApiResult, MembershipAction},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayUsersRequest {
    pub user_uuids: Vec<Uuid>,
}

/// PUT /api/v1/admin/access/gateway/{id}/{action}/users: edit the
/// direct user grants of a gateway.
pub(crate) async fn update_gateway_users(
    _role: AdminRole,
    session: SessionInfo,
    Path((gateway_uuid, action)): Path<(Uuid, String)>,
    State(appstate): State<AppState>,
    Json(data): Json<GatewayUsersRequest>,
) -> ApiResult {
    let action: MembershipAction = action.parse()?;
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    let mut transaction = appstate.pool.begin().await?;
    match action {
        MembershipAction::Add => {
            for user_uuid in &data.user_uuids {
                if let Some(user) = User::find_by_uuid(&mut *transaction, *user_uuid).await? {
                    Gateway::add_user(&mut *transaction, gateway.id, user.id).await?;
                }
            }
        }
        MembershipAction::Remove => {
            let members = User::linked_to_gateway(&mut *transaction, gateway.id).await?;
            for member in members
                .iter()
                .filter(|member| data.user_uuids.contains(&member.uuid))
            {
                Gateway::remove_user(&mut *transaction, gateway.id, member.id).await?;
            }
        }
    }
    transaction.commit().await?;
    info!(
        "User {} applied {action:?} of {} user(s) on gateway {gateway_uuid}",
        session.user.email,
        data.user_uuids.len()
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayGroupsRequest {
    pub group_uuids: Vec<Uuid>,
}

/// PUT /api/v1/admin/access/gateway/{id}/{action}/groups: edit the
/// transitive group grants of a gateway.
pub(crate) async fn update_gateway_groups(
    _role: AdminRole,
    session: SessionInfo,
    Path((gateway_uuid, action)): Path<(Uuid, String)>,
    State(appstate): State<AppState>,
    Json(data): Json<GatewayGroupsRequest>,
) -> ApiResult {
    let action: MembershipAction = action.parse()?;
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    let mut transaction = appstate.pool.begin().await?;
    match action {
        MembershipAction::Add => {
            for group_uuid in &data.group_uuids {
                if let Some(group) = Group::find_by_uuid(&mut *transaction, *group_uuid).await? {
                    Gateway::add_group(&mut *transaction, gateway.id, group.id).await?;
                }
            }
        }
        MembershipAction::Remove => {
            let groups = Group::linked_to_gateway(&mut *transaction, gateway.id).await?;
            for group in groups
                .iter()
                .filter(|group| data.group_uuids.contains(&group.uuid))
            {
                Gateway::remove_group(&mut *transaction, gateway.id, group.id).await?;
            }
        }
    }
    transaction.commit().await?;
    info!(
        "User {} applied {action:?} of {} group(s) on gateway {gateway_uuid}",
        session.user.email,
        data.group_uuids.len()
    );

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// GET /api/v1/admin/access/user/{id}/gateways: the user's effective
/// gateway set (direct ∪ group-transitive).
pub(crate) async fn list_user_gateways(
    _role: AdminRole,
    Path(user_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateways = User::accessible_gateways(&appstate.pool, user_uuid).await?;

    Ok(ApiResponse::ok(gateways))
}

/// GET /api/v1/admin/access/group/{id}/gateways
pub(crate) async fn list_group_gateways(
    _role: AdminRole,
    Path(group_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateways = Group::accessible_gateways(&appstate.pool, group_uuid).await?;

    Ok(ApiResponse::ok(gateways))
}
