use serde::Serialize;
use sqlx::{PgExecutor, prelude::FromRow, query, query_as};
use uuid::Uuid;

use crate::db::Id;

/// External identity provider credentials for one platform. A partial
/// unique index keeps at most one live config per platform.
#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoConfig {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    pub domain: String,
    pub platform: String,
    pub provider: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub enabled: bool,
}

const SSO_CONFIG_COLUMNS: &str =
    "id, uuid, domain, platform, provider, client_id, client_secret, enabled";

#[derive(Clone, Debug)]
pub struct NewSsoConfig {
    pub domain: String,
    pub platform: String,
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
}

impl NewSsoConfig {
    pub async fn save<'e, E>(self, executor: E) -> Result<SsoConfig, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, SsoConfig>(&format!(
            "INSERT INTO sso_config (uuid, domain, platform, provider, client_id, \
             client_secret, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, true) \
             RETURNING {SSO_CONFIG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&self.domain)
        .bind(&self.platform)
        .bind(&self.provider)
        .bind(&self.client_id)
        .bind(&self.client_secret)
        .fetch_one(executor)
        .await
    }
}

impl SsoConfig {
    pub async fn find_by_uuid<'e, E>(executor: E, uuid: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {SSO_CONFIG_COLUMNS} FROM sso_config WHERE uuid = $1 AND deleted_at IS NULL"
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
            "SELECT {SSO_CONFIG_COLUMNS} FROM sso_config WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(executor)
        .await
    }

    /// The single live config for a platform, if any.
    pub async fn active_for_platform<'e, E>(
        executor: E,
        platform: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {SSO_CONFIG_COLUMNS} FROM sso_config \
             WHERE platform = $1 AND enabled AND deleted_at IS NULL"
        ))
        .bind(platform)
        .fetch_optional(executor)
        .await
    }

    pub async fn mark_deleted<'e, E>(executor: E, id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE sso_config SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }
}
