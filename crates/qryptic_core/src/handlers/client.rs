use axum::extract::{Path, State};
use serde_json::json;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    handlers::{ApiResponse, ApiResult},
    provisioning,
};

/// GET /api/v1/gateway/{id}/client: issue a fresh client config for the
/// calling user on the gateway.
pub(crate) async fn issue_client_config(
    session: SessionInfo,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let config = provisioning::issue_client(&appstate, session.user.uuid, gateway_uuid).await?;

    Ok(ApiResponse::ok(config))
}

/// DELETE /api/v1/client/{id}: end users may only revoke their own
/// clients; admins may revoke any.
pub(crate) async fn revoke_own_client(
    session: SessionInfo,
    Path(client_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    if session.is_admin() {
        provisioning::revoke_client(&appstate, client_uuid).await?;
    } else {
        provisioning::revoke_client_by_user(&appstate, client_uuid, session.user.uuid).await?;
    }

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// DELETE /api/v1/admin/client/{id}
pub(crate) async fn revoke_client_admin(
    _role: AdminRole,
    session: SessionInfo,
    Path(client_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    debug!(
        "User {} revoking client {client_uuid}",
        session.user.email
    );
    provisioning::revoke_client(&appstate, client_uuid).await?;

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// DELETE /api/v1/admin/client/expired: expiry sweep, triggered by an
/// external scheduler.
pub(crate) async fn reap_expired(
    _role: AdminRole,
    State(appstate): State<AppState>,
) -> ApiResult {
    provisioning::reap_expired_clients(&appstate).await?;

    Ok(ApiResponse::ok(json!({ "success": true })))
}
