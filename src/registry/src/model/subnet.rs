//! Subnet entity: CIDR block plus upstream inventory metadata.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::net::IpAddr;

use super::decode_enum;
use crate::types::{RegistryError, RegistryResult, SubnetId, SubnetState};

/// A CIDR block under monitoring, with the inventory metadata the upstream
/// IP-pool sync attaches to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    /// Canonical CIDR text, e.g. "10.20.30.0/24"
    pub network: String,
    /// Prefix length; always agrees with `network`
    pub network_size: i32,
    pub gateway_ip: Option<String>,
    pub first_usable: String,
    pub last_usable: String,
    pub pilot_subnet_id: Option<String>,
    pub vlan_id: Option<String>,
    pub service_id: Option<String>,
    pub subscriber_id: Option<String>,
    pub location_id: Option<String>,
    pub subscriber_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub pop_name: Option<String>,
    pub gateway_device: Option<String>,
    pub state: SubnetState,
    /// Cap on representatives for this subnet; None means the default of one
    pub max_representatives: Option<i32>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Subnet {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            network: row.try_get("network")?,
            network_size: row.try_get("network_size")?,
            gateway_ip: row.try_get("gateway_ip")?,
            first_usable: row.try_get("first_usable")?,
            last_usable: row.try_get("last_usable")?,
            pilot_subnet_id: row.try_get("pilot_subnet_id")?,
            vlan_id: row.try_get("vlan_id")?,
            service_id: row.try_get("service_id")?,
            subscriber_id: row.try_get("subscriber_id")?,
            location_id: row.try_get("location_id")?,
            subscriber_name: row.try_get("subscriber_name")?,
            city: row.try_get("city")?,
            region: row.try_get("region")?,
            pop_name: row.try_get("pop_name")?,
            gateway_device: row.try_get("gateway_device")?,
            state: decode_enum(row, "state")?,
            max_representatives: row.try_get("max_representatives")?,
            archived_at: row.try_get("archived_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Attributes for creating or updating a subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub network: String,
    pub gateway_ip: Option<String>,
    pub pilot_subnet_id: Option<String>,
    pub vlan_id: Option<String>,
    pub service_id: Option<String>,
    pub subscriber_id: Option<String>,
    pub location_id: Option<String>,
    pub subscriber_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub pop_name: Option<String>,
    pub gateway_device: Option<String>,
    pub max_representatives: Option<i32>,
}

/// Parse and canonicalize a CIDR, rejecting non-canonical forms.
///
/// "10.0.0.1/24" is rejected: the network invariant requires the host bits
/// to be zero so that equality and containment checks stay meaningful.
pub fn parse_canonical_network(cidr: &str) -> RegistryResult<IpNet> {
    let net: IpNet = cidr
        .trim()
        .parse()
        .map_err(|_| RegistryError::Validation(format!("invalid CIDR: {cidr:?}")))?;
    if net.addr() != net.network() {
        return Err(RegistryError::Validation(format!(
            "non-canonical CIDR {cidr:?}; expected {}/{}",
            net.network(),
            net.prefix_len()
        )));
    }
    Ok(net)
}

/// First and last usable host addresses of a network.
///
/// /31 and /32 (and the v6 equivalents) have no network/broadcast reserve,
/// so the whole block is usable.
pub fn usable_range(net: &IpNet) -> (IpAddr, IpAddr) {
    match net {
        IpNet::V4(v4) => {
            let base = u32::from(v4.network());
            let last = u32::from(v4.broadcast());
            if v4.prefix_len() >= 31 {
                (
                    IpAddr::V4(std::net::Ipv4Addr::from(base)),
                    IpAddr::V4(std::net::Ipv4Addr::from(last)),
                )
            } else {
                (
                    IpAddr::V4(std::net::Ipv4Addr::from(base + 1)),
                    IpAddr::V4(std::net::Ipv4Addr::from(last - 1)),
                )
            }
        }
        IpNet::V6(v6) => {
            let base = u128::from(v6.network());
            let last = u128::from(v6.broadcast());
            if v6.prefix_len() >= 127 {
                (
                    IpAddr::V6(std::net::Ipv6Addr::from(base)),
                    IpAddr::V6(std::net::Ipv6Addr::from(last)),
                )
            } else {
                (
                    IpAddr::V6(std::net::Ipv6Addr::from(base + 1)),
                    IpAddr::V6(std::net::Ipv6Addr::from(last - 1)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_cidr_is_accepted() {
        let net = parse_canonical_network("10.20.30.0/24").unwrap();
        assert_eq!(net.prefix_len(), 24);
    }

    #[test]
    fn host_bits_are_rejected() {
        let err = parse_canonical_network("10.20.30.1/24").unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[test]
    fn usable_range_reserves_network_and_broadcast() {
        let net = parse_canonical_network("192.0.2.0/29").unwrap();
        let (first, last) = usable_range(&net);
        assert_eq!(first.to_string(), "192.0.2.1");
        assert_eq!(last.to_string(), "192.0.2.6");
    }

    #[test]
    fn point_to_point_uses_whole_block() {
        let net = parse_canonical_network("192.0.2.0/31").unwrap();
        let (first, last) = usable_range(&net);
        assert_eq!(first.to_string(), "192.0.2.0");
        assert_eq!(last.to_string(), "192.0.2.1");
    }
}
