use std::time::Duration;

use qryptic_common::{
    auth::claims::Claims,
    config::server_config,
    db::models::{Client as VpnClient, Gateway},
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub use crate::error::GatewayClientError;

#[macro_use]
extern crate tracing;

pub mod error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One peer entry in the controller→gateway protocol, both for delta
/// pushes and the full pull configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WgServerPeerConfig {
    #[serde(rename = "clientAllowedIPs")]
    pub client_allowed_ips: String,
    #[serde(rename = "clientPublicKey")]
    pub client_public_key: String,
    #[serde(rename = "presharedKey")]
    pub preshared_key: String,
}

impl WgServerPeerConfig {
    /// Peer entry for an add-peers push: the bare tunnel address, no
    /// prefix length.
    #[must_use]
    pub fn for_add(client: &VpnClient) -> Self {
        Self {
            client_allowed_ips: client.ip().to_string(),
            client_public_key: client.public_key.clone(),
            preshared_key: String::new(),
        }
    }

    /// Peer entry for a delete-peers push; gateways match on the public
    /// key alone.
    #[must_use]
    pub fn for_delete(client: &VpnClient) -> Self {
        Self {
            client_allowed_ips: String::new(),
            client_public_key: client.public_key.clone(),
            preshared_key: String::new(),
        }
    }

    /// Peer entry as served by the pull endpoint, which reports the
    /// allocated address in CIDR form.
    #[must_use]
    pub fn for_pull(client: &VpnClient) -> Self {
        Self {
            client_allowed_ips: client.allocated_ip.clone(),
            client_public_key: client.public_key.clone(),
            preshared_key: String::new(),
        }
    }
}

/// Outbound HTTP client for the gateway fleet. Every request is
/// authenticated with a freshly minted token signed by the target
/// gateway's own secret.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    fn gateway_url(gateway: &Gateway, path: &str) -> String {
        format!(
            "{}://{}{path}",
            server_config().http_scheme(),
            gateway.domain
        )
    }

    fn gateway_token(gateway: &Gateway) -> Result<String, GatewayClientError> {
        let claims = Claims::gateway_auth(gateway.uuid, server_config().jwt_token_timeout());
        Ok(claims.sign(&gateway.jwt_secret_key)?)
    }

    /// GET /health; the gateway must answer 200 with a non-empty body.
    pub async fn health_check(&self, gateway: &Gateway) -> Result<String, GatewayClientError> {
        let url = Self::gateway_url(gateway, "/health");
        debug!("Checking health of {gateway}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(Self::gateway_token(gateway)?)
            .send()
            .await
            .map_err(GatewayClientError::Unreachable)?;

        if response.status() != StatusCode::OK {
            return Err(GatewayClientError::RequestFailed(response.status()));
        }
        let body = response
            .text()
            .await
            .map_err(GatewayClientError::Unreachable)?;
        if body.is_empty() {
            return Err(GatewayClientError::EmptyHealthResponse);
        }

        Ok(body)
    }

    async fn post_peers(
        &self,
        gateway: &Gateway,
        path: &str,
        peers: &[WgServerPeerConfig],
    ) -> Result<(), GatewayClientError> {
        let url = Self::gateway_url(gateway, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(Self::gateway_token(gateway)?)
            .json(peers)
            .send()
            .await
            .map_err(GatewayClientError::Unreachable)?;

        if response.status() != StatusCode::OK {
            return Err(GatewayClientError::RequestFailed(response.status()));
        }

        Ok(())
    }

    /// Push new peer entries to the gateway.
    pub async fn add_peers(
        &self,
        gateway: &Gateway,
        peers: &[WgServerPeerConfig],
    ) -> Result<(), GatewayClientError> {
        debug!("Pushing {} peer(s) to {gateway}", peers.len());
        self.post_peers(gateway, "/controller/add-peers", peers)
            .await
    }

    /// Remove peer entries from the gateway.
    pub async fn delete_peers(
        &self,
        gateway: &Gateway,
        peers: &[WgServerPeerConfig],
    ) -> Result<(), GatewayClientError> {
        debug!("Removing {} peer(s) from {gateway}", peers.len());
        self.post_peers(gateway, "/controller/delete-peers", peers)
            .await
    }

    /// Ask the gateway to restart its WireGuard interface; used after a
    /// pool reset so stale peers drop off.
    pub async fn restart(&self, gateway: &Gateway) -> Result<(), GatewayClientError> {
        let url = Self::gateway_url(gateway, "/controller/restart");
        info!("Requesting restart of {gateway}");
        let response = self
            .http
            .post(&url)
            .bearer_auth(Self::gateway_token(gateway)?)
            .send()
            .await
            .map_err(GatewayClientError::Unreachable)?;

        if response.status() != StatusCode::OK {
            return Err(GatewayClientError::RequestFailed(response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use claims::assert_ok;
    use qryptic_common::config::{Config, Environment};
    use uuid::Uuid;

    use super::*;

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, String, Vec<WgServerPeerConfig>)>>>,
    }

    fn init_test_config() {
        Config {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "qryptic".into(),
            db_password: "qryptic".into(),
            db_name: "qryptic".into(),
            db_ssl_mode: "prefer".into(),
            controller_domain: "localhost".into(),
            web_domain: None,
            environment: Environment::Local,
            jwt_token_timeout: None,
            client_expiry: None,
            http_port: 8080,
            gateway_image: "ghcr.io/qryptic/gateway:latest".into(),
            reconcile_interval: 0,
        }
        .init();
    }

    fn test_gateway(domain: String) -> Gateway {
        Gateway {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "test".into(),
            domain,
            ip_address: "198.51.100.7".into(),
            vpn_cidr: "10.8.0.0/24".parse().unwrap(),
            port: 51820,
            dns_server: "1.1.1.1".into(),
            server_public_key: "serverpub".into(),
            server_private_key: "serverpriv".into(),
            jwt_secret_key: "0WOsQTpvM9lTRSe1OppbUVJXLKEY6sxN".into(),
            jwt_algorithm: "HS256".into(),
        }
    }

    fn record_peers(
        path: &'static str,
        recorded: &Recorded,
        headers: &HeaderMap,
        peers: Vec<WgServerPeerConfig>,
    ) -> StatusCode {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        recorded
            .requests
            .lock()
            .unwrap()
            .push((path.to_string(), authorization, peers));
        StatusCode::OK
    }

    async fn record_add(
        State(recorded): State<Recorded>,
        headers: HeaderMap,
        Json(peers): Json<Vec<WgServerPeerConfig>>,
    ) -> StatusCode {
        record_peers("add", &recorded, &headers, peers)
    }

    async fn record_delete(
        State(recorded): State<Recorded>,
        headers: HeaderMap,
        Json(peers): Json<Vec<WgServerPeerConfig>>,
    ) -> StatusCode {
        record_peers("delete", &recorded, &headers, peers)
    }

    async fn spawn_gateway_double(recorded: Recorded) -> SocketAddr {
        let app = Router::new()
            .route("/health", get(|| async { "healthy" }))
            .route("/controller/add-peers", post(record_add))
            .route("/controller/delete-peers", post(record_delete))
            .with_state(recorded);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn peer_pushes_carry_gateway_tokens() {
        init_test_config();
        let recorded = Recorded::default();
        let addr = spawn_gateway_double(recorded.clone()).await;
        let gateway = test_gateway(addr.to_string());

        let peers = vec![WgServerPeerConfig {
            client_allowed_ips: "10.8.0.2".into(),
            client_public_key: "peerpub".into(),
            preshared_key: String::new(),
        }];

        let client = GatewayClient::new().unwrap();
        assert_ok!(client.add_peers(&gateway, &peers).await);
        assert_ok!(client.delete_peers(&gateway, &peers).await);

        let requests = recorded.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, "add");
        assert_eq!(requests[1].0, "delete");

        for (_, authorization, body) in requests.iter() {
            assert_eq!(body, &peers);
            let token = authorization.strip_prefix("Bearer ").unwrap();
            let claims = Claims::verify(token, &gateway.jwt_secret_key).unwrap();
            assert_eq!(claims.sub, gateway.uuid);
            assert_eq!(claims.aud, "Controller");
        }
    }

    #[tokio::test]
    async fn health_check_requires_a_body() {
        init_test_config();
        let app = Router::new().route("/health", get(|| async { "" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = GatewayClient::new().unwrap();
        let result = client.health_check(&test_gateway(addr.to_string())).await;
        assert!(matches!(result, Err(GatewayClientError::EmptyHealthResponse)));

        let recorded = Recorded::default();
        let healthy_addr = spawn_gateway_double(recorded).await;
        let body = assert_ok!(
            client
                .health_check(&test_gateway(healthy_addr.to_string()))
                .await
        );
        assert_eq!(body, "healthy");
    }

    #[tokio::test]
    async fn non_200_surfaces_the_status() {
        init_test_config();
        let app = Router::new().route(
            "/controller/add-peers",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = GatewayClient::new().unwrap();
        let result = client
            .add_peers(&test_gateway(addr.to_string()), &[])
            .await;
        assert!(matches!(
            result,
            Err(GatewayClientError::RequestFailed(
                StatusCode::INTERNAL_SERVER_ERROR
            ))
        ));
    }

    #[tokio::test]
    async fn transport_errors_are_unreachable() {
        init_test_config();
        // Bind and immediately drop a listener so the port refuses
        // connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GatewayClient::new().unwrap();
        let result = client.restart(&test_gateway(addr.to_string())).await;
        assert!(matches!(result, Err(GatewayClientError::Unreachable(_))));
    }
}
