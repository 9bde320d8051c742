use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::Query;
use ipnetwork::{IpNetwork, Ipv4Network};
use qryptic_common::{
    config::server_config,
    db::models::{
        Client, Gateway, Group, IpPoolEntry, NewGateway, User, ip_pool::pool_addresses,
    },
    utils::random_alphanumeric,
    wireguard::generate_wireguard_keypair,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    appstate::AppState,
    auth::{AdminRole, GatewayAuth, SessionInfo},
    error::WebError,
    handlers::{ApiResponse, ApiResult, IncludeParams},
    provisioning,
};

const GATEWAY_APP_PORT: &str = "8080";
const WIREGUARD_PORT: &str = "51820";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCreateRequest {
    pub name: String,
    pub domain: String,
    pub ip_address: String,
    #[serde(rename = "vpnCIDR")]
    pub vpn_cidr: String,
    pub port: i32,
    pub dns_server: String,
}

fn parse_vpn_cidr(cidr: &str) -> Result<Ipv4Network, WebError> {
    match cidr.parse::<IpNetwork>() {
        Ok(IpNetwork::V4(network)) => Ok(network),
        Ok(IpNetwork::V6(_)) => Err(WebError::BadRequest(
            "vpnCIDR must be an IPv4 network".into(),
        )),
        Err(_) => Err(WebError::BadRequest(format!("invalid vpnCIDR {cidr:?}"))),
    }
}

/// POST /api/v1/admin/gateway: key generation, gateway insert and IP
/// pool materialization commit atomically.
pub(crate) async fn create_gateway(
    _role: AdminRole,
    session: SessionInfo,
    State(appstate): State<AppState>,
    Json(data): Json<GatewayCreateRequest>,
) -> ApiResult {
    debug!("User {} creating gateway {}", session.user.email, data.name);
    let network = parse_vpn_cidr(&data.vpn_cidr)?;
    let addresses = pool_addresses(network)?;
    let keypair = generate_wireguard_keypair();

    let mut transaction = appstate.pool.begin().await?;
    let gateway = NewGateway {
        name: data.name,
        domain: data.domain,
        ip_address: data.ip_address,
        vpn_cidr: IpNetwork::V4(network),
        port: data.port,
        dns_server: data.dns_server,
        server_public_key: keypair.public,
        server_private_key: keypair.private,
        jwt_secret_key: random_alphanumeric(32),
    }
    .save(&mut *transaction)
    .await?;
    let entries = IpPoolEntry::materialize(&mut transaction, gateway.id, &addresses).await?;
    transaction.commit().await?;
    info!(
        "User {} created {gateway} with {entries} pool entries",
        session.user.email
    );

    Ok(ApiResponse::json(json!({ "success": true }), StatusCode::CREATED))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayUpdateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub dns_server: String,
}

/// PUT /api/v1/admin/gateway/{id}: empty fields keep their current
/// values; the CIDR and key material never change.
pub(crate) async fn update_gateway(
    _role: AdminRole,
    session: SessionInfo,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Json(data): Json<GatewayUpdateRequest>,
) -> ApiResult {
    let mut gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    if !data.name.is_empty() {
        gateway.name = data.name;
    }
    if !data.domain.is_empty() {
        gateway.domain = data.domain;
    }
    if !data.ip_address.is_empty() {
        gateway.ip_address = data.ip_address;
    }
    if data.port != 0 {
        gateway.port = data.port;
    }
    if !data.dns_server.is_empty() {
        gateway.dns_server = data.dns_server;
    }
    gateway.save(&appstate.pool).await?;
    info!("User {} updated gateway {gateway_uuid}", session.user.email);

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// DELETE /api/v1/admin/gateway/{id}: clear first (deactivate clients,
/// free the pool, restart push), then drop the row; cascades remove the
/// pool entries.
pub(crate) async fn delete_gateway(
    _role: AdminRole,
    session: SessionInfo,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    provisioning::clear_gateway(&appstate, &gateway).await?;
    Gateway::delete(&appstate.pool, gateway.id).await?;
    info!("User {} deleted {gateway}", session.user.email);

    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// DELETE /api/v1/admin/gateway/{id}/reset
pub(crate) async fn reset_gateway(
    _role: AdminRole,
    session: SessionInfo,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    provisioning::clear_gateway(&appstate, &gateway).await?;
    info!("User {} reset {gateway}", session.user.email);

    Ok(ApiResponse::ok(json!({ "success": true })))
}

#[derive(Serialize)]
struct GatewayUserEntry {
    #[serde(flatten)]
    user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    clients: Option<Vec<Client>>,
}

#[derive(Serialize)]
struct GatewayDetails {
    #[serde(flatten)]
    gateway: Gateway,
    #[serde(skip_serializing_if = "Option::is_none")]
    users: Option<Vec<GatewayUserEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clients: Option<Vec<Client>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<Group>>,
    #[serde(rename = "ipPool", skip_serializing_if = "Option::is_none")]
    ip_pool: Option<Vec<IpPoolEntry>>,
}

async fn load_gateway_details(
    pool: &PgPool,
    gateway: Gateway,
    include: &IncludeParams,
) -> Result<GatewayDetails, sqlx::Error> {
    let users = if include.has("users") || include.has("users-clients") {
        let with_clients = include.has("users-clients");
        let mut entries = Vec::new();
        for user in User::linked_to_gateway(pool, gateway.id).await? {
            let clients = if with_clients {
                Some(Client::active_for_user(pool, user.id).await?)
            } else {
                None
            };
            entries.push(GatewayUserEntry { user, clients });
        }
        Some(entries)
    } else {
        None
    };
    let clients = if include.has("clients") {
        Some(Client::active_for_gateway(pool, gateway.id).await?)
    } else {
        None
    };
    let groups = if include.has("groups") {
        Some(Group::linked_to_gateway(pool, gateway.id).await?)
    } else {
        None
    };
    let ip_pool = if include.has("ipPool") {
        Some(IpPoolEntry::for_gateway(pool, gateway.id).await?)
    } else {
        None
    };

    Ok(GatewayDetails {
        gateway,
        users,
        clients,
        groups,
        ip_pool,
    })
}

/// GET /api/v1/admin/gateway/list
pub(crate) async fn list_gateways(
    _role: AdminRole,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let mut details = Vec::new();
    for gateway in Gateway::all(&appstate.pool).await? {
        details.push(load_gateway_details(&appstate.pool, gateway, &include).await?);
    }

    Ok(ApiResponse::ok(details))
}

/// GET /api/v1/admin/gateway/{id}
pub(crate) async fn get_gateway(
    _role: AdminRole,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
    Query(include): Query<IncludeParams>,
) -> ApiResult {
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;
    let details = load_gateway_details(&appstate.pool, gateway, &include).await?;

    Ok(ApiResponse::ok(details))
}

/// The `docker run` command that brings up a gateway container wired to
/// this controller.
fn deployment_command(gateway: &Gateway) -> String {
    let config = server_config();
    format!(
        "docker run -d --cap-add=NET_ADMIN --cap-add=SYS_MODULE \
         --sysctl='net.ipv4.conf.all.src_valid_mark=1' \
         --sysctl='net.ipv4.ip_forward=1' \
         --sysctl='net.ipv6.conf.all.forwarding=1' \
         -p {WIREGUARD_PORT}:51820/udp -p {GATEWAY_APP_PORT}:{GATEWAY_APP_PORT} \
         -e VpnGatewayUuid='{}' \
         -e VpnGatewayControllerJWTSecretKey='{}' \
         -e VpnGatewayControllerJWTAlgorithm='{}' \
         -e ControllerVGWConfigUrlEndpoint='{}' \
         -e ApplicationPort='{GATEWAY_APP_PORT}' {}",
        gateway.uuid,
        gateway.jwt_secret_key,
        gateway.jwt_algorithm,
        config.pull_config_url(),
        config.gateway_image,
    )
}

/// GET /api/v1/admin/gateway/{id}/deployment-config
pub(crate) async fn deployment_config(
    _role: AdminRole,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    Ok(ApiResponse::ok(
        json!({ "deploymentConfig": deployment_command(&gateway) }),
    ))
}

/// GET /api/v1/gateway/{id}/health: reachability probe any
/// authenticated user may run.
pub(crate) async fn gateway_health(
    session: SessionInfo,
    Path(gateway_uuid): Path<Uuid>,
    State(appstate): State<AppState>,
) -> ApiResult {
    debug!(
        "User {} checking health of gateway {gateway_uuid}",
        session.user.email
    );
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;
    let healthy = appstate.gateway_client.health_check(&gateway).await.is_ok();

    Ok(ApiResponse::ok(json!({ "healthy": healthy })))
}

/// GET /api/v1/gateway/list: gateways the calling user can obtain a
/// client on.
pub(crate) async fn list_accessible_gateways(
    session: SessionInfo,
    State(appstate): State<AppState>,
) -> ApiResult {
    let gateways = User::accessible_gateways(&appstate.pool, session.user.uuid).await?;

    Ok(ApiResponse::ok(gateways))
}

#[derive(Serialize)]
struct WgServerInterfaceConfig {
    #[serde(rename = "vpnGatewayUuid")]
    vpn_gateway_uuid: Uuid,
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "privateKey")]
    private_key: String,
    #[serde(rename = "ipAddress")]
    ip_address: String,
    #[serde(rename = "listenPort")]
    listen_port: i32,
    #[serde(rename = "dnsServer")]
    dns_server: String,
}

#[derive(Serialize)]
struct WgServerConfig {
    #[serde(rename = "wgServerInterfaceConfig")]
    interface: WgServerInterfaceConfig,
    #[serde(rename = "wgServerPeerConfigs")]
    peers: Vec<qryptic_gateway_client::WgServerPeerConfig>,
}

/// GET /api/v1/gateway/get-gateway-config: the pull endpoint: a gateway
/// fetches its authoritative interface + peer set. Only active clients
/// appear.
pub(crate) async fn pull_gateway_config(
    GatewayAuth { gateway }: GatewayAuth,
    State(appstate): State<AppState>,
) -> ApiResult {
    debug!("{gateway} pulling its configuration");
    let clients = Client::active_for_gateway(&appstate.pool, gateway.id).await?;
    let peers = clients
        .iter()
        .map(qryptic_gateway_client::WgServerPeerConfig::for_pull)
        .collect();

    let config = WgServerConfig {
        interface: WgServerInterfaceConfig {
            vpn_gateway_uuid: gateway.uuid,
            public_key: gateway.server_public_key.clone(),
            private_key: gateway.server_private_key.clone(),
            ip_address: gateway.vpn_cidr.to_string(),
            listen_port: gateway.port,
            dns_server: gateway.dns_server.clone(),
        },
        peers,
    };

    Ok(ApiResponse::ok(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpn_cidr_parsing() {
        claims::assert_ok!(parse_vpn_cidr("10.8.0.0/24"));
        claims::assert_err!(parse_vpn_cidr("not-a-network"));
        claims::assert_err!(parse_vpn_cidr("fd00::/64"));
    }

    #[test]
    fn deployment_command_embeds_gateway_identity() {
        qryptic_common::config::Config {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "qryptic".into(),
            db_password: "qryptic".into(),
            db_name: "qryptic".into(),
            db_ssl_mode: "prefer".into(),
            controller_domain: "controller.example.com".into(),
            web_domain: None,
            environment: qryptic_common::config::Environment::Production,
            jwt_token_timeout: None,
            client_expiry: None,
            http_port: 8080,
            gateway_image: "ghcr.io/qryptic/gateway:latest".into(),
            reconcile_interval: 5,
        }
        .init();

        let gateway = Gateway {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "eu-west".into(),
            domain: "gw.example.com".into(),
            ip_address: "198.51.100.7".into(),
            vpn_cidr: "10.8.0.0/24".parse().unwrap(),
            port: 51820,
            dns_server: "1.1.1.1".into(),
            server_public_key: "pub".into(),
            server_private_key: "priv".into(),
            jwt_secret_key: "gatewaysecret".into(),
            jwt_algorithm: "HS256".into(),
        };
        let command = deployment_command(&gateway);

        assert!(command.starts_with("docker run -d"));
        assert!(command.contains(&format!("VpnGatewayUuid='{}'", gateway.uuid)));
        assert!(command.contains("VpnGatewayControllerJWTSecretKey='gatewaysecret'"));
        assert!(command.contains("VpnGatewayControllerJWTAlgorithm='HS256'"));
        assert!(command.contains(
            "ControllerVGWConfigUrlEndpoint='https://controller.example.com/api/v1/gateway/get-gateway-config'"
        ));
        assert!(command.ends_with("ghcr.io/qryptic/gateway:latest"));
    }
}
