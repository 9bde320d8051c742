use std::sync::RwLock;

use serde::Serialize;
use sqlx::{PgExecutor, prelude::FromRow, query, query_as};
use tracing::debug;

use crate::{db::Id, utils::random_alphanumeric};

static CURRENT_SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// The controller-wide configuration row (exactly one, id = 1). The login
/// toggles and JWT secrets are also cached in-process; readers may lag a
/// concurrent admin update by one request.
#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing)]
    pub id: Id,
    pub allow_password_login: bool,
    #[serde(rename = "allowSSOLogin")]
    pub allow_sso_login: bool,
    #[serde(skip_serializing)]
    pub user_auth_jwt_secret_key: String,
    #[serde(skip_serializing)]
    pub user_auth_sso_jwt_secret_key: String,
    #[serde(skip_serializing)]
    pub user_jwt_algorithm: String,
    #[serde(skip_serializing)]
    pub gateway_jwt_algorithm: String,
    #[serde(skip_serializing)]
    pub temp_user_created: bool,
    pub temp_user_active: bool,
}

const SETTINGS_COLUMNS: &str = "id, allow_password_login, allow_sso_login, \
     user_auth_jwt_secret_key, user_auth_sso_jwt_secret_key, user_jwt_algorithm, \
     gateway_jwt_algorithm, temp_user_created, temp_user_active";

impl Settings {
    pub async fn get<'e, E>(executor: E) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!("SELECT {SETTINGS_COLUMNS} FROM settings WHERE id = 1"))
            .fetch_optional(executor)
            .await
    }

    /// Create the singleton row with fresh secrets. Called once, on the
    /// first start against an empty database.
    pub async fn create_defaults<'e, E>(executor: E) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        debug!("Creating initial controller settings");
        query_as::<_, Self>(&format!(
            "INSERT INTO settings (id, allow_password_login, allow_sso_login, \
             user_auth_jwt_secret_key, user_auth_sso_jwt_secret_key, user_jwt_algorithm, \
             gateway_jwt_algorithm, temp_user_created, temp_user_active) \
             VALUES (1, true, false, $1, $2, 'HS256', 'HS256', false, false) \
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(random_alphanumeric(32))
        .bind(random_alphanumeric(32))
        .fetch_one(executor)
        .await
    }

    pub async fn save<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "UPDATE settings SET allow_password_login = $1, allow_sso_login = $2, \
             user_auth_jwt_secret_key = $3, user_auth_sso_jwt_secret_key = $4, \
             temp_user_created = $5, temp_user_active = $6 WHERE id = 1",
        )
        .bind(self.allow_password_login)
        .bind(self.allow_sso_login)
        .bind(&self.user_auth_jwt_secret_key)
        .bind(&self.user_auth_sso_jwt_secret_key)
        .bind(self.temp_user_created)
        .bind(self.temp_user_active)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Snapshot of the process-wide settings cache. Set during startup,
    /// refreshed by every settings write path.
    #[must_use]
    pub fn get_current_settings() -> Settings {
        CURRENT_SETTINGS
            .read()
            .expect("Failed to acquire lock on current settings.")
            .clone()
            .expect("Controller settings accessed before initialization")
    }

    /// Publish a new snapshot to the cache.
    pub fn set_current_settings(settings: Settings) {
        *CURRENT_SETTINGS
            .write()
            .expect("Failed to acquire lock on current settings.") = Some(settings);
    }
}
