use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, prelude::FromRow, query, query_as};
use uuid::Uuid;

use crate::db::{Id, models::gateway::GatewaySummary};

#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct NewGroup {
    pub name: String,
}

impl NewGroup {
    pub async fn save<'e, E>(self, executor: E) -> Result<Group, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Group>(
            "INSERT INTO \"group\" (uuid, name) VALUES ($1, $2) RETURNING id, uuid, name",
        )
        .bind(Uuid::new_v4())
        .bind(&self.name)
        .fetch_one(executor)
        .await
    }
}

impl Group {
    pub async fn find_by_uuid<'e, E>(executor: E, uuid: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT id, uuid, name FROM \"group\" WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT id, uuid, name FROM \"group\" WHERE deleted_at IS NULL ORDER BY id",
        )
        .fetch_all(executor)
        .await
    }

    pub async fn save<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE \"group\" SET name = $2 WHERE id = $1")
            .bind(self.id)
            .bind(&self.name)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn mark_deleted<'e, E>(executor: E, id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE \"group\" SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Drop all user and gateway memberships of the group.
    pub async fn remove_memberships(
        transaction: &mut PgConnection,
        id: Id,
    ) -> Result<(), sqlx::Error> {
        query("DELETE FROM group_user WHERE group_id = $1")
            .bind(id)
            .execute(&mut *transaction)
            .await?;
        query("DELETE FROM group_gateway WHERE group_id = $1")
            .bind(id)
            .execute(&mut *transaction)
            .await?;

        Ok(())
    }

    /// Groups the user is a member of.
    pub async fn linked_to_user<'e, E>(executor: E, user_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT gr.id, gr.uuid, gr.name FROM \"group\" gr \
             JOIN group_user gu ON gu.group_id = gr.id \
             WHERE gu.user_id = $1 AND gr.deleted_at IS NULL \
             ORDER BY gr.id",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Groups granted access to a gateway.
    pub async fn linked_to_gateway<'e, E>(
        executor: E,
        gateway_id: Id,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT gr.id, gr.uuid, gr.name FROM \"group\" gr \
             JOIN group_gateway gg ON gg.group_id = gr.id \
             WHERE gg.gateway_id = $1 AND gr.deleted_at IS NULL \
             ORDER BY gr.id",
        )
        .bind(gateway_id)
        .fetch_all(executor)
        .await
    }

    /// Gateways directly linked to the group, in summary form.
    pub async fn accessible_gateways<'e, E>(
        executor: E,
        group_uuid: Uuid,
    ) -> Result<Vec<GatewaySummary>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, GatewaySummary>(
            "SELECT g.uuid, g.name, g.domain, g.ip_address, g.port, g.server_public_key \
             FROM gateway g \
             JOIN group_gateway gg ON gg.gateway_id = g.id \
             JOIN \"group\" gr ON gr.id = gg.group_id \
             WHERE gr.uuid = $1 AND gr.deleted_at IS NULL AND g.deleted_at IS NULL",
        )
        .bind(group_uuid)
        .fetch_all(executor)
        .await
    }

    pub async fn add_user<'e, E>(executor: E, group_id: Id, user_id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query(
            "INSERT INTO group_user (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn remove_user<'e, E>(
        executor: E,
        group_id: Id,
        user_id: Id,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("DELETE FROM group_user WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(())
    }
}
