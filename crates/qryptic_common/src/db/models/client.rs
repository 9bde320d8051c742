use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{PgExecutor, prelude::FromRow, query, query_as};
use uuid::Uuid;

use crate::db::Id;

/// An ephemeral peer entry held by a user on a gateway. While
/// `is_active` is set, exactly one IP pool entry of the gateway is
/// assigned on its behalf.
#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Id,
    #[serde(skip_serializing)]
    pub gateway_id: Id,
    pub public_key: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    #[serde(skip_serializing)]
    pub preshared_key: String,
    #[serde(rename = "allocatedIP")]
    pub allocated_ip: String,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: String,
    pub dns_server: String,
    pub expiry_time: NaiveDateTime,
    pub is_active: bool,
}

const CLIENT_COLUMNS: &str = "id, uuid, user_id, gateway_id, public_key, private_key, \
     preshared_key, allocated_ip, allowed_ips, dns_server, expiry_time, is_active";

#[derive(Clone, Debug)]
pub struct NewClient {
    pub user_id: Id,
    pub gateway_id: Id,
    pub public_key: String,
    pub private_key: String,
    pub preshared_key: String,
    pub allocated_ip: String,
    pub allowed_ips: String,
    pub dns_server: String,
    pub expiry_time: NaiveDateTime,
}

impl NewClient {
    pub async fn save<'e, E>(self, executor: E) -> Result<Client, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Client>(&format!(
            "INSERT INTO client (uuid, user_id, gateway_id, public_key, private_key, \
             preshared_key, allocated_ip, allowed_ips, dns_server, expiry_time, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, true) \
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(self.user_id)
        .bind(self.gateway_id)
        .bind(&self.public_key)
        .bind(&self.private_key)
        .bind(&self.preshared_key)
        .bind(&self.allocated_ip)
        .bind(&self.allowed_ips)
        .bind(&self.dns_server)
        .bind(self.expiry_time)
        .fetch_one(executor)
        .await
    }
}

impl Client {
    pub async fn find_by_uuid<'e, E>(executor: E, uuid: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!("SELECT {CLIENT_COLUMNS} FROM client WHERE uuid = $1"))
            .bind(uuid)
            .fetch_optional(executor)
            .await
    }

    pub async fn active_for_user<'e, E>(executor: E, user_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM client \
             WHERE user_id = $1 AND is_active ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn active_for_gateway<'e, E>(
        executor: E,
        gateway_id: Id,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM client \
             WHERE gateway_id = $1 AND is_active ORDER BY id"
        ))
        .bind(gateway_id)
        .fetch_all(executor)
        .await
    }

    /// Active clients whose expiry time has passed.
    pub async fn expired_active<'e, E>(
        executor: E,
        now: NaiveDateTime,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM client \
             WHERE is_active AND expiry_time < $1 ORDER BY id"
        ))
        .bind(now)
        .fetch_all(executor)
        .await
    }

    pub async fn deactivate<'e, E>(executor: E, id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE client SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn deactivate_for_gateway<'e, E>(
        executor: E,
        gateway_id: Id,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE client SET is_active = false WHERE gateway_id = $1 AND is_active")
            .bind(gateway_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Deactivate all of a user's active clients, returning the rows as
    /// they were so their IPs can be released.
    pub async fn deactivate_for_user<'e, E>(
        executor: E,
        user_id: Id,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "UPDATE client SET is_active = false \
             WHERE user_id = $1 AND is_active \
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Bulk flip for the expiry sweep; returns the number of rows touched.
    pub async fn deactivate_expired<'e, E>(
        executor: E,
        now: NaiveDateTime,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = query("UPDATE client SET is_active = false WHERE is_active AND expiry_time < $1")
            .bind(now)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// The bare tunnel address, without the `/32` suffix stored in
    /// `allocated_ip`.
    #[must_use]
    pub fn ip(&self) -> &str {
        self.allocated_ip
            .split('/')
            .next()
            .unwrap_or(&self.allocated_ip)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn test_client() -> Client {
        Client {
            id: 7,
            uuid: Uuid::new_v4(),
            user_id: 1,
            gateway_id: 2,
            public_key: "clientpub".into(),
            private_key: "clientpriv".into(),
            preshared_key: String::new(),
            allocated_ip: "10.8.0.2/32".into(),
            allowed_ips: "0.0.0.0/0".into(),
            dns_server: "1.1.1.1".into(),
            expiry_time: Utc::now().naive_utc(),
            is_active: true,
        }
    }

    #[test]
    fn ip_strips_prefix_length() {
        let mut client = test_client();
        assert_eq!(client.ip(), "10.8.0.2");

        client.allocated_ip = "10.8.0.2".into();
        assert_eq!(client.ip(), "10.8.0.2");
    }

    #[test]
    fn key_material_is_never_serialized() {
        let json = serde_json::to_string(&test_client()).unwrap();
        assert!(json.contains("\"publicKey\":\"clientpub\""));
        assert!(json.contains("\"allocatedIP\":\"10.8.0.2/32\""));
        assert!(json.contains("\"allowedIPs\":\"0.0.0.0/0\""));
        assert!(!json.contains("clientpriv"));
    }
}
