use chrono::{NaiveDateTime, Utc};
use sqlx::{PgExecutor, prelude::FromRow, query, query_as};
use uuid::Uuid;

use crate::db::Id;

/// Short-lived state of one web SSO round trip, polled by the app until
/// the browser callback lands. Never referenced after expiry.
#[derive(Clone, Debug, FromRow)]
pub struct AuthSession {
    pub id: Id,
    pub uuid: Uuid,
    pub provider: String,
    pub state: String,
    pub code_challenge: String,
    pub expiry_time: NaiveDateTime,
    pub email: String,
    pub authenticated: bool,
}

const AUTH_SESSION_COLUMNS: &str =
    "id, uuid, provider, state, code_challenge, expiry_time, email, authenticated";

#[derive(Clone, Debug)]
pub struct NewAuthSession {
    pub provider: String,
    pub state: String,
    pub code_challenge: String,
    pub expiry_time: NaiveDateTime,
}

impl NewAuthSession {
    pub async fn save<'e, E>(self, executor: E) -> Result<AuthSession, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, AuthSession>(&format!(
            "INSERT INTO auth_session (uuid, provider, state, code_challenge, expiry_time, \
             email, authenticated) \
             VALUES ($1, $2, $3, $4, $5, '', false) \
             RETURNING {AUTH_SESSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&self.provider)
        .bind(&self.state)
        .bind(&self.code_challenge)
        .bind(self.expiry_time)
        .fetch_one(executor)
        .await
    }
}

impl AuthSession {
    pub async fn find_by_state<'e, E>(executor: E, state: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {AUTH_SESSION_COLUMNS} FROM auth_session WHERE state = $1"
        ))
        .bind(state)
        .fetch_optional(executor)
        .await
    }

    /// Most recent session created for a code challenge.
    pub async fn latest_by_code_challenge<'e, E>(
        executor: E,
        code_challenge: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {AUTH_SESSION_COLUMNS} FROM auth_session \
             WHERE code_challenge = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(code_challenge)
        .fetch_optional(executor)
        .await
    }

    /// Record the authenticated identity delivered by the provider.
    pub async fn mark_authenticated<'e, E>(
        &mut self,
        executor: E,
        email: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        self.email = email.to_string();
        self.authenticated = true;
        query("UPDATE auth_session SET email = $2, authenticated = true WHERE id = $1")
            .bind(self.id)
            .bind(email)
            .execute(executor)
            .await?;

        Ok(())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiry_time < Utc::now().naive_utc()
    }

    /// Garbage-collect long-expired sessions.
    pub async fn purge_expired<'e, E>(executor: E) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = query("DELETE FROM auth_session WHERE expiry_time < now() - INTERVAL '1 hour'")
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
