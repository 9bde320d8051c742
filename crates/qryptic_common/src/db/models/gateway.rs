use std::fmt;

use ipnetwork::IpNetwork;
use serde::Serialize;
use sqlx::{PgExecutor, prelude::FromRow, query, query_as};
use uuid::Uuid;

use crate::db::Id;

/// A managed WireGuard gateway. `vpn_cidr` is the tunnel-interior network
/// the IP pool was materialized from; `jwt_secret_key` authenticates the
/// controller↔gateway protocol in both directions.
#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    pub name: String,
    pub domain: String,
    pub ip_address: String,
    #[serde(rename = "vpnCIDR")]
    pub vpn_cidr: IpNetwork,
    pub port: i32,
    pub dns_server: String,
    pub server_public_key: String,
    #[serde(skip_serializing)]
    pub server_private_key: String,
    #[serde(skip_serializing)]
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
}

/// Gateway fields exposed to end users listing their accessible VPNs.
#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySummary {
    pub uuid: Uuid,
    pub name: String,
    pub domain: String,
    pub ip_address: String,
    pub port: i32,
    pub server_public_key: String,
}

const GATEWAY_COLUMNS: &str = "id, uuid, name, domain, ip_address, vpn_cidr, port, dns_server, \
     server_public_key, server_private_key, jwt_secret_key, jwt_algorithm";

#[derive(Clone, Debug)]
pub struct NewGateway {
    pub name: String,
    pub domain: String,
    pub ip_address: String,
    pub vpn_cidr: IpNetwork,
    pub port: i32,
    pub dns_server: String,
    pub server_public_key: String,
    pub server_private_key: String,
    pub jwt_secret_key: String,
}

impl NewGateway {
    pub async fn save<'e, E>(self, executor: E) -> Result<Gateway, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Gateway>(&format!(
            "INSERT INTO gateway (uuid, name, domain, ip_address, vpn_cidr, port, dns_server, \
             server_public_key, server_private_key, jwt_secret_key, jwt_algorithm) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'HS256') \
             RETURNING {GATEWAY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&self.name)
        .bind(&self.domain)
        .bind(&self.ip_address)
        .bind(self.vpn_cidr)
        .bind(self.port)
        .bind(&self.dns_server)
        .bind(&self.server_public_key)
        .bind(&self.server_private_key)
        .bind(&self.jwt_secret_key)
        .fetch_one(executor)
        .await
    }
}

impl Gateway {
    pub async fn find_by_id<'e, E>(executor: E, id: Id) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM gateway WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_uuid<'e, E>(executor: E, uuid: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM gateway WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM gateway WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(executor)
        .await
    }

    /// Partial update; key material and the CIDR are immutable after
    /// creation.
    pub async fn save<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "UPDATE gateway SET name = $2, domain = $3, ip_address = $4, port = $5, \
             dns_server = $6 WHERE id = $1",
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.domain)
        .bind(&self.ip_address)
        .bind(self.port)
        .bind(&self.dns_server)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Hard delete; FK cascades remove the IP pool and the (previously
    /// deactivated) client rows.
    pub async fn delete<'e, E>(executor: E, id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("DELETE FROM gateway WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Gateways directly granted to a user.
    pub async fn linked_to_user<'e, E>(executor: E, user_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT g.id, g.uuid, g.name, g.domain, g.ip_address, g.vpn_cidr, g.port, \
             g.dns_server, g.server_public_key, g.server_private_key, g.jwt_secret_key, \
             g.jwt_algorithm \
             FROM gateway g \
             JOIN user_gateway ug ON ug.gateway_id = g.id \
             WHERE ug.user_id = $1 AND g.deleted_at IS NULL \
             ORDER BY g.id",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Gateways granted to a group.
    pub async fn linked_to_group<'e, E>(executor: E, group_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT g.id, g.uuid, g.name, g.domain, g.ip_address, g.vpn_cidr, g.port, \
             g.dns_server, g.server_public_key, g.server_private_key, g.jwt_secret_key, \
             g.jwt_algorithm \
             FROM gateway g \
             JOIN group_gateway gg ON gg.gateway_id = g.id \
             WHERE gg.group_id = $1 AND g.deleted_at IS NULL \
             ORDER BY g.id",
        )
        .bind(group_id)
        .fetch_all(executor)
        .await
    }

    pub async fn add_user<'e, E>(executor: E, gateway_id: Id, user_id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "INSERT INTO user_gateway (user_id, gateway_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(gateway_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn remove_user<'e, E>(
        executor: E,
        gateway_id: Id,
        user_id: Id,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("DELETE FROM user_gateway WHERE user_id = $1 AND gateway_id = $2")
            .bind(user_id)
            .bind(gateway_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn add_group<'e, E>(
        executor: E,
        gateway_id: Id,
        group_id: Id,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "INSERT INTO group_gateway (group_id, gateway_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(gateway_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn remove_group<'e, E>(
        executor: E,
        gateway_id: Id,
        group_id: Id,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("DELETE FROM group_gateway WHERE group_id = $1 AND gateway_id = $2")
            .bind(group_id)
            .bind(gateway_id)
            .execute(executor)
            .await?;

        Ok(())
    }

}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gateway({}; {})", self.uuid, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_material_is_never_serialized() {
        let gateway = Gateway {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "eu-west".into(),
            domain: "gw.example.com".into(),
            ip_address: "198.51.100.7".into(),
            vpn_cidr: "10.8.0.0/24".parse().unwrap(),
            port: 51820,
            dns_server: "1.1.1.1".into(),
            server_public_key: "pubkey".into(),
            server_private_key: "privkey".into(),
            jwt_secret_key: "gatewaysecret".into(),
            jwt_algorithm: "HS256".into(),
        };
        let json = serde_json::to_string(&gateway).unwrap();
        assert!(json.contains("\"vpnCIDR\":\"10.8.0.0/24\""));
        assert!(json.contains("\"serverPublicKey\":\"pubkey\""));
        assert!(!json.contains("privkey"));
        assert!(!json.contains("gatewaysecret"));
    }
}
