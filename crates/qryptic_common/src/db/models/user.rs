use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, prelude::FromRow, query, query_as, query_scalar};
use uuid::Uuid;

use crate::db::{Id, models::gateway::GatewaySummary};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, sqlx::Type)]
pub enum UserRole {
    Admin,
    User,
    #[default]
    Default,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "Admin"),
            UserRole::User => write!(f, "User"),
            UserRole::Default => write!(f, "Default"),
        }
    }
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role {
            "Admin" => Ok(UserRole::Admin),
            "User" => Ok(UserRole::User),
            "Default" => Ok(UserRole::Default),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub is_password_set: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
}

const USER_COLUMNS: &str = "id, uuid, name, email, is_password_set, password_hash, role";

/// An unsaved user; `save` assigns the id and UUID.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub is_password_set: bool,
    pub password_hash: String,
    pub role: UserRole,
}

impl NewUser {
    pub async fn save<'e, E>(self, executor: E) -> Result<User, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, User>(
            "INSERT INTO \"user\" (uuid, name, email, is_password_set, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, uuid, name, email, is_password_set, password_hash, role",
        )
        .bind(Uuid::new_v4())
        .bind(&self.name)
        .bind(&self.email)
        .bind(self.is_password_set)
        .bind(&self.password_hash)
        .bind(self.role)
        .fetch_one(executor)
        .await
    }
}

impl User {
    pub async fn find_by_uuid<'e, E>(executor: E, uuid: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {USER_COLUMNS} FROM \"user\" WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {USER_COLUMNS} FROM \"user\" WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(&format!(
            "SELECT {USER_COLUMNS} FROM \"user\" WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(executor)
        .await
    }

    pub async fn email_exists<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM \"user\" WHERE email = $1 AND deleted_at IS NULL)",
        )
        .bind(email)
        .fetch_one(executor)
        .await
    }

    pub async fn save<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "UPDATE \"user\" SET name = $2, email = $3, is_password_set = $4, \
             password_hash = $5, role = $6 WHERE id = $1",
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.email)
        .bind(self.is_password_set)
        .bind(&self.password_hash)
        .bind(self.role)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn mark_deleted<'e, E>(executor: E, id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE \"user\" SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// All users directly granted access to a gateway.
    pub async fn linked_to_gateway<'e, E>(
        executor: E,
        gateway_id: Id,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT u.id, u.uuid, u.name, u.email, u.is_password_set, u.password_hash, u.role \
             FROM \"user\" u \
             JOIN user_gateway ug ON ug.user_id = u.id \
             WHERE ug.gateway_id = $1 AND u.deleted_at IS NULL \
             ORDER BY u.id",
        )
        .bind(gateway_id)
        .fetch_all(executor)
        .await
    }

    /// Members of a group.
    pub async fn linked_to_group<'e, E>(executor: E, group_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT u.id, u.uuid, u.name, u.email, u.is_password_set, u.password_hash, u.role \
             FROM \"user\" u \
             JOIN group_user gu ON gu.user_id = u.id \
             WHERE gu.group_id = $1 AND u.deleted_at IS NULL \
             ORDER BY u.id",
        )
        .bind(group_id)
        .fetch_all(executor)
        .await
    }

    /// Gateways this user may obtain a client on: the direct grants
    /// unioned with the group-transitive grants, one query, distinct by
    /// gateway.
    pub async fn accessible_gateways<'e, E>(
        executor: E,
        user_uuid: Uuid,
    ) -> Result<Vec<GatewaySummary>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, GatewaySummary>(
            "SELECT g.uuid, g.name, g.domain, g.ip_address, g.port, g.server_public_key \
             FROM gateway g \
             JOIN user_gateway ug ON ug.gateway_id = g.id \
             JOIN \"user\" u ON u.id = ug.user_id \
             WHERE u.uuid = $1 AND u.deleted_at IS NULL AND g.deleted_at IS NULL \
             UNION \
             SELECT g.uuid, g.name, g.domain, g.ip_address, g.port, g.server_public_key \
             FROM gateway g \
             JOIN group_gateway gg ON gg.gateway_id = g.id \
             JOIN \"group\" gr ON gr.id = gg.group_id \
             JOIN group_user gu ON gu.group_id = gg.group_id \
             JOIN \"user\" u ON u.id = gu.user_id \
             WHERE u.uuid = $1 AND u.deleted_at IS NULL \
             AND g.deleted_at IS NULL AND gr.deleted_at IS NULL",
        )
        .bind(user_uuid)
        .fetch_all(executor)
        .await
    }

    /// True iff the gateway is reachable for the user through either edge.
    pub async fn has_access_to_gateway<'e, E>(
        executor: E,
        user_uuid: Uuid,
        gateway_uuid: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM gateway g \
                 JOIN user_gateway ug ON ug.gateway_id = g.id \
                 JOIN \"user\" u ON u.id = ug.user_id \
                 WHERE u.uuid = $1 AND g.uuid = $2 \
                 AND u.deleted_at IS NULL AND g.deleted_at IS NULL \
             ) OR EXISTS( \
                 SELECT 1 FROM gateway g \
                 JOIN group_gateway gg ON gg.gateway_id = g.id \
                 JOIN \"group\" gr ON gr.id = gg.group_id \
                 JOIN group_user gu ON gu.group_id = gg.group_id \
                 JOIN \"user\" u ON u.id = gu.user_id \
                 WHERE u.uuid = $1 AND g.uuid = $2 AND u.deleted_at IS NULL \
                 AND g.deleted_at IS NULL AND gr.deleted_at IS NULL \
             )",
        )
        .bind(user_uuid)
        .bind(gateway_uuid)
        .fetch_one(executor)
        .await
    }

    /// True iff the client exists, is active and belongs to the user.
    pub async fn owns_active_client<'e, E>(
        executor: E,
        user_uuid: Uuid,
        client_uuid: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM client c \
                 JOIN \"user\" u ON u.id = c.user_id \
                 WHERE u.uuid = $1 AND c.uuid = $2 AND c.is_active \
                 AND u.deleted_at IS NULL \
             )",
        )
        .bind(user_uuid)
        .bind(client_uuid)
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_round_trip() {
        for role in [UserRole::Admin, UserRole::User, UserRole::Default] {
            assert_eq!(role.to_string().parse::<UserRole>(), Ok(role));
        }
        assert_eq!("Superuser".parse::<UserRole>(), Err(()));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            is_password_set: true,
            password_hash: "$argon2id$v=19$secret".into(),
            role: UserRole::Admin,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("passwordHash"));
        assert!(json.contains("\"isPasswordSet\":true"));
        assert!(json.contains("\"role\":\"Admin\""));
    }
}
