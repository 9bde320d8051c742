use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use qryptic_common::{
    config::server_config,
    db::{
        Id,
        models::{Client, Gateway, IpPoolEntry, NewClient, User},
    },
    wireguard::generate_wireguard_keypair,
};
use qryptic_gateway_client::WgServerPeerConfig;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{appstate::AppState, error::WebError};

/// Everything a user needs to bring a tunnel up, returned once at issue
/// time; the private key is not retrievable afterwards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WgClientConfig {
    pub client_uuid: Uuid,
    #[serde(rename = "clientInterfaceConfig")]
    pub interface: WgClientInterfaceConfig,
    #[serde(rename = "clientPeerConfig")]
    pub peer: WgClientPeerConfig,
    pub expiry_time: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct WgClientInterfaceConfig {
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    #[serde(rename = "dnsServer")]
    pub dns_server: String,
}

#[derive(Debug, Serialize)]
pub struct WgClientPeerConfig {
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    #[serde(rename = "publicKey")]
    pub server_public_key: String,
    #[serde(rename = "presharedKey")]
    pub preshared_key: String,
    #[serde(rename = "persistentAlive")]
    pub persistent_alive: i32,
    #[serde(rename = "vpnGatewayDomain")]
    pub vpn_gateway_domain: String,
    #[serde(rename = "vpnGatewayIP")]
    pub vpn_gateway_ip: String,
    #[serde(rename = "vpnGatewayPort")]
    pub vpn_gateway_port: i32,
}

const PERSISTENT_KEEPALIVE_SECS: i32 = 25;

impl WgClientConfig {
    #[must_use]
    pub fn new(client: &Client, gateway: &Gateway) -> Self {
        Self {
            client_uuid: client.uuid,
            interface: WgClientInterfaceConfig {
                private_key: client.private_key.clone(),
                ip_address: client.allocated_ip.clone(),
                dns_server: client.dns_server.clone(),
            },
            peer: WgClientPeerConfig {
                allowed_ips: vec![client.allowed_ips.clone()],
                server_public_key: gateway.server_public_key.clone(),
                preshared_key: String::new(),
                persistent_alive: PERSISTENT_KEEPALIVE_SECS,
                vpn_gateway_domain: gateway.domain.clone(),
                vpn_gateway_ip: gateway.ip_address.clone(),
                vpn_gateway_port: gateway.port,
            },
            expiry_time: client.expiry_time,
        }
    }
}

/// Issue a client for the user on the gateway: access check, first-fit IP
/// reservation and client insert in one transaction, then a best-effort
/// peer push ordered after the commit.
pub async fn issue_client(
    appstate: &AppState,
    user_uuid: Uuid,
    gateway_uuid: Uuid,
) -> Result<WgClientConfig, WebError> {
    if !User::has_access_to_gateway(&appstate.pool, user_uuid, gateway_uuid).await? {
        info!("User {user_uuid} denied a client on gateway {gateway_uuid}");
        return Err(WebError::Forbidden);
    }

    let user = User::find_by_uuid(&appstate.pool, user_uuid)
        .await?
        .ok_or(WebError::NotFound("user"))?;
    let gateway = Gateway::find_by_uuid(&appstate.pool, gateway_uuid)
        .await?
        .ok_or(WebError::NotFound("gateway"))?;

    let keypair = generate_wireguard_keypair();
    let expiry_time = (Utc::now() + server_config().client_expiry()).naive_utc();

    let mut transaction = appstate.pool.begin().await?;
    let Some(entry) = IpPoolEntry::reserve(&mut transaction, gateway.id).await? else {
        return Err(WebError::NoIpAvailable);
    };
    let client = NewClient {
        user_id: user.id,
        gateway_id: gateway.id,
        public_key: keypair.public,
        private_key: keypair.private,
        preshared_key: String::new(),
        allocated_ip: format!("{}/32", entry.ip),
        allowed_ips: "0.0.0.0/0".into(),
        dns_server: gateway.dns_server.clone(),
        expiry_time,
    }
    .save(&mut *transaction)
    .await?;
    transaction.commit().await?;
    info!(
        "Issued client {} ({}) for user {} on {gateway}",
        client.uuid, client.allocated_ip, user.email
    );

    // The controller's state is authoritative; a failed push is only
    // logged and the gateway converges through pull or reconciliation.
    let peer = WgServerPeerConfig::for_add(&client);
    if let Err(err) = appstate
        .gateway_client
        .add_peers(&gateway, std::slice::from_ref(&peer))
        .await
    {
        warn!("Failed to push peer for client {} to {gateway}: {err}", client.uuid);
    }

    Ok(WgClientConfig::new(&client, &gateway))
}

async fn teardown_client(appstate: &AppState, client: &Client) -> Result<(), WebError> {
    let gateway = Gateway::find_by_id(&appstate.pool, client.gateway_id).await?;

    let mut transaction = appstate.pool.begin().await?;
    Client::deactivate(&mut *transaction, client.id).await?;
    IpPoolEntry::release(&mut *transaction, client.gateway_id, client.ip()).await?;
    transaction.commit().await?;
    info!("Revoked client {} ({})", client.uuid, client.allocated_ip);

    if let Some(gateway) = gateway {
        let peer = WgServerPeerConfig::for_delete(client);
        if let Err(err) = appstate
            .gateway_client
            .delete_peers(&gateway, std::slice::from_ref(&peer))
            .await
        {
            warn!(
                "Failed to remove peer of client {} from {gateway}: {err}",
                client.uuid
            );
        }
    }

    Ok(())
}

/// Unconditional revocation (admin path).
pub async fn revoke_client(appstate: &AppState, client_uuid: Uuid) -> Result<(), WebError> {
    let client = Client::find_by_uuid(&appstate.pool, client_uuid)
        .await?
        .ok_or(WebError::NotFound("client"))?;

    teardown_client(appstate, &client).await
}

/// Revocation by the owning end user; anyone else's client is off limits.
pub async fn revoke_client_by_user(
    appstate: &AppState,
    client_uuid: Uuid,
    user_uuid: Uuid,
) -> Result<(), WebError> {
    if !User::owns_active_client(&appstate.pool, user_uuid, client_uuid).await? {
        info!("User {user_uuid} denied revocation of client {client_uuid}");
        return Err(WebError::Forbidden);
    }

    revoke_client(appstate, client_uuid).await
}

/// Sweep all active clients past their expiry: push the peer deletions,
/// then release the IPs and flip the rows in one transaction. Running it
/// twice back-to-back is a no-op the second time.
pub async fn reap_expired_clients(appstate: &AppState) -> Result<u64, WebError> {
    let now = Utc::now().naive_utc();
    let expired = Client::expired_active(&appstate.pool, now).await?;
    if expired.is_empty() {
        return Ok(0);
    }
    debug!("Reaping {} expired client(s)", expired.len());

    let mut gateways: HashMap<Id, Gateway> = HashMap::new();
    for client in &expired {
        if !gateways.contains_key(&client.gateway_id) {
            if let Some(gateway) = Gateway::find_by_id(&appstate.pool, client.gateway_id).await? {
                gateways.insert(client.gateway_id, gateway);
            }
        }
        if let Some(gateway) = gateways.get(&client.gateway_id) {
            let peer = WgServerPeerConfig::for_delete(client);
            if let Err(err) = appstate
                .gateway_client
                .delete_peers(gateway, std::slice::from_ref(&peer))
                .await
            {
                warn!(
                    "Failed to remove expired peer of client {} from {gateway}: {err}",
                    client.uuid
                );
            }
        }
    }

    let mut transaction = appstate.pool.begin().await?;
    for client in &expired {
        IpPoolEntry::release(&mut *transaction, client.gateway_id, client.ip()).await?;
    }
    let reaped = Client::deactivate_expired(&mut *transaction, now).await?;
    transaction.commit().await?;
    info!("Reaped {reaped} expired client(s)");

    Ok(reaped)
}

/// Deactivate every active client of a gateway and free its whole pool,
/// then ask the gateway to restart so stale peers drop off.
pub async fn clear_gateway(appstate: &AppState, gateway: &Gateway) -> Result<(), WebError> {
    let mut transaction = appstate.pool.begin().await?;
    Client::deactivate_for_gateway(&mut *transaction, gateway.id).await?;
    IpPoolEntry::release_all(&mut *transaction, gateway.id).await?;
    transaction.commit().await?;
    info!("Cleared clients and IP pool of {gateway}");

    if let Err(err) = appstate.gateway_client.restart(gateway).await {
        warn!("Failed to restart {gateway} after clearing: {err}");
    }

    Ok(())
}

/// Deactivate a user's active clients and release their IPs inside the
/// caller's transaction; returns the affected rows so peers can be
/// removed from the gateways afterwards.
pub async fn deactivate_user_clients(
    transaction: &mut PgConnection,
    user_id: Id,
) -> Result<Vec<Client>, sqlx::Error> {
    let clients = Client::deactivate_for_user(&mut *transaction, user_id).await?;
    for client in &clients {
        IpPoolEntry::release(&mut *transaction, client.gateway_id, client.ip()).await?;
    }

    Ok(clients)
}

/// Best-effort peer removal for a batch of already-deactivated clients.
pub async fn push_peer_removals(appstate: &AppState, clients: &[Client]) {
    let mut gateways: HashMap<Id, Gateway> = HashMap::new();
    for client in clients {
        if !gateways.contains_key(&client.gateway_id) {
            match Gateway::find_by_id(&appstate.pool, client.gateway_id).await {
                Ok(Some(gateway)) => {
                    gateways.insert(client.gateway_id, gateway);
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!("Failed to load gateway {}: {err}", client.gateway_id);
                    continue;
                }
            }
        }
        if let Some(gateway) = gateways.get(&client.gateway_id) {
            let peer = WgServerPeerConfig::for_delete(client);
            if let Err(err) = appstate
                .gateway_client
                .delete_peers(gateway, std::slice::from_ref(&peer))
                .await
            {
                warn!(
                    "Failed to remove peer of client {} from {gateway}: {err}",
                    client.uuid
                );
            }
        }
    }
}

/// Re-push every gateway's full active peer list. Keeps gateways that
/// missed a delta converged with the controller's state.
pub async fn reconcile_gateways(appstate: &AppState) -> Result<(), WebError> {
    for gateway in Gateway::all(&appstate.pool).await? {
        let clients = Client::active_for_gateway(&appstate.pool, gateway.id).await?;
        let peers: Vec<WgServerPeerConfig> =
            clients.iter().map(WgServerPeerConfig::for_add).collect();
        if peers.is_empty() {
            continue;
        }
        match appstate.gateway_client.add_peers(&gateway, &peers).await {
            Ok(()) => debug!("Reconciled {} peer(s) on {gateway}", peers.len()),
            Err(err) => warn!("Failed to reconcile {gateway}: {err}"),
        }
    }

    Ok(())
}
