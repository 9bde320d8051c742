use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, prelude::FromRow, query, query_as};
use thiserror::Error;
use uuid::Uuid;

use crate::db::Id;

#[derive(Debug, Error, PartialEq)]
pub enum IpPoolError {
    #[error("CIDR {0} leaves no addresses for clients")]
    CidrTooSmall(Ipv4Network),
}

/// One allocatable tunnel address of a gateway. Entries are created once
/// when the gateway is provisioned and only ever flip `assigned`.
#[derive(Clone, Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPoolEntry {
    #[serde(skip_serializing)]
    pub id: Id,
    pub uuid: Uuid,
    #[serde(skip_serializing)]
    pub gateway_id: Id,
    pub ip: String,
    pub assigned: bool,
}

/// Every address of the network usable by clients, ascending. The network
/// address, the broadcast address and the first host (reserved for the
/// gateway interface) are excluded.
pub fn pool_addresses(network: Ipv4Network) -> Result<Vec<Ipv4Addr>, IpPoolError> {
    let start = u32::from(network.network());
    let end = u32::from(network.broadcast());
    let first_host = match start.checked_add(1) {
        Some(host) if host < end => host,
        _ => return Err(IpPoolError::CidrTooSmall(network)),
    };

    Ok((start..=end)
        .filter(|addr| *addr != start && *addr != end && *addr != first_host)
        .map(Ipv4Addr::from)
        .collect())
}

impl IpPoolEntry {
    /// Bulk-insert pool entries in the given order; serial ids preserve it
    /// as the allocation order.
    pub async fn materialize(
        transaction: &mut PgConnection,
        gateway_id: Id,
        addresses: &[Ipv4Addr],
    ) -> Result<u64, sqlx::Error> {
        let ips: Vec<String> = addresses.iter().map(Ipv4Addr::to_string).collect();
        let result = query(
            "INSERT INTO ip_pool_entry (uuid, gateway_id, ip, assigned) \
             SELECT gen_random_uuid(), $1, ip, false FROM UNNEST($2::text[]) AS ip",
        )
        .bind(gateway_id)
        .bind(ips)
        .execute(transaction)
        .await?;

        Ok(result.rows_affected())
    }

    /// First-fit reservation. The row lock makes concurrent reservations
    /// on the same gateway pick distinct entries; `SKIP LOCKED` keeps them
    /// from queueing on each other. `None` means the pool is exhausted.
    pub async fn reserve(
        transaction: &mut PgConnection,
        gateway_id: Id,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(entry) = query_as::<_, Self>(
            "SELECT id, uuid, gateway_id, ip, assigned FROM ip_pool_entry \
             WHERE gateway_id = $1 AND assigned = false \
             ORDER BY id LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(gateway_id)
        .fetch_optional(&mut *transaction)
        .await?
        else {
            return Ok(None);
        };

        query("UPDATE ip_pool_entry SET assigned = true WHERE id = $1")
            .bind(entry.id)
            .execute(&mut *transaction)
            .await?;

        Ok(Some(Self {
            assigned: true,
            ..entry
        }))
    }

    /// Idempotent; unknown addresses are a no-op.
    pub async fn release<'e, E>(executor: E, gateway_id: Id, ip: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE ip_pool_entry SET assigned = false WHERE gateway_id = $1 AND ip = $2")
            .bind(gateway_id)
            .bind(ip)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn release_all<'e, E>(executor: E, gateway_id: Id) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query("UPDATE ip_pool_entry SET assigned = false WHERE gateway_id = $1 AND assigned")
            .bind(gateway_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn for_gateway<'e, E>(executor: E, gateway_id: Id) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        query_as::<_, Self>(
            "SELECT id, uuid, gateway_id, ip, assigned FROM ip_pool_entry \
             WHERE gateway_id = $1 ORDER BY id",
        )
        .bind(gateway_id)
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_ok;

    use super::*;

    #[test]
    fn slash_24_yields_253_addresses() {
        let network: Ipv4Network = "10.8.0.0/24".parse().unwrap();
        let addresses = assert_ok!(pool_addresses(network));

        assert_eq!(addresses.len(), 253);
        assert!(!addresses.contains(&"10.8.0.0".parse().unwrap()));
        assert!(!addresses.contains(&"10.8.0.1".parse().unwrap()));
        assert!(!addresses.contains(&"10.8.0.255".parse().unwrap()));
    }

    #[test]
    fn allocation_order_is_ascending() {
        let network: Ipv4Network = "10.8.0.0/24".parse().unwrap();
        let addresses = pool_addresses(network).unwrap();

        assert_eq!(addresses[0], "10.8.0.2".parse::<Ipv4Addr>().unwrap());
        assert_eq!(addresses[1], "10.8.0.3".parse::<Ipv4Addr>().unwrap());
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);
    }

    #[test]
    fn slash_30_yields_a_single_address() {
        let network: Ipv4Network = "10.9.0.0/30".parse().unwrap();
        let addresses = pool_addresses(network).unwrap();
        assert_eq!(addresses, vec!["10.9.0.2".parse::<Ipv4Addr>().unwrap()]);
    }

    #[test]
    fn tiny_networks_are_rejected() {
        for cidr in ["10.9.0.0/31", "10.9.0.0/32"] {
            let network: Ipv4Network = cidr.parse().unwrap();
            assert_eq!(
                pool_addresses(network),
                Err(IpPoolError::CidrTooSmall(network))
            );
        }
    }

    #[test]
    fn address_space_edge_does_not_overflow() {
        let network: Ipv4Network = "255.255.255.255/32".parse().unwrap();
        assert_eq!(
            pool_addresses(network),
            Err(IpPoolError::CidrTooSmall(network))
        );
    }
}
