//! Subnet persistence with CIDR canonicalization.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{parse_canonical_network, usable_range, Subnet, SubnetSpec};
use crate::types::{ChangeKind, EntityKind, RegistryError, RegistryResult, SubnetId, SubnetState};

use super::changes::{bump_version, record_change};
use super::MetadataRegistry;

impl MetadataRegistry {
    /// Create a subnet. The network must be canonical CIDR; the usable range
    /// is derived, not supplied.
    pub async fn create_subnet(&self, spec: SubnetSpec) -> RegistryResult<Subnet> {
        let net = parse_canonical_network(&spec.network)?;
        let (first, last) = usable_range(&net);

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let subnet = sqlx::query_as::<_, Subnet>(
            r#"
            INSERT INTO subnets (
                id, network, network_size, gateway_ip, first_usable, last_usable,
                pilot_subnet_id, vlan_id, service_id, subscriber_id, location_id,
                subscriber_name, city, region, pop_name, gateway_device,
                state, max_representatives, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $19)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(net.to_string())
        .bind(i32::from(net.prefix_len()))
        .bind(&spec.gateway_ip)
        .bind(first.to_string())
        .bind(last.to_string())
        .bind(&spec.pilot_subnet_id)
        .bind(&spec.vlan_id)
        .bind(&spec.service_id)
        .bind(&spec.subscriber_id)
        .bind(&spec.location_id)
        .bind(&spec.subscriber_name)
        .bind(&spec.city)
        .bind(&spec.region)
        .bind(&spec.pop_name)
        .bind(&spec.gateway_device)
        .bind(SubnetState::Active.as_str())
        .bind(spec.max_representatives)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Subnet,
            &subnet.id.to_string(),
            ChangeKind::Created,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(subnet = %subnet.id, network = %subnet.network, "subnet created");
        Ok(subnet)
    }

    /// Update the descriptive metadata of a subnet. The network itself is
    /// immutable; replacing a block means archiving and re-creating it.
    pub async fn update_subnet(&self, id: SubnetId, spec: SubnetSpec) -> RegistryResult<Subnet> {
        let current = self.get_subnet(id).await?;
        if spec.network != current.network {
            return Err(RegistryError::Conflict(
                "subnet network is immutable; archive and re-create instead".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let subnet = sqlx::query_as::<_, Subnet>(
            r#"
            UPDATE subnets SET
                gateway_ip = $2, pilot_subnet_id = $3, vlan_id = $4, service_id = $5,
                subscriber_id = $6, location_id = $7, subscriber_name = $8, city = $9,
                region = $10, pop_name = $11, gateway_device = $12,
                max_representatives = $13, updated_at = $14
            WHERE id = $1 AND archived_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&spec.gateway_ip)
        .bind(&spec.pilot_subnet_id)
        .bind(&spec.vlan_id)
        .bind(&spec.service_id)
        .bind(&spec.subscriber_id)
        .bind(&spec.location_id)
        .bind(&spec.subscriber_name)
        .bind(&spec.city)
        .bind(&spec.region)
        .bind(&spec.pop_name)
        .bind(&spec.gateway_device)
        .bind(spec.max_representatives)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("subnet {id}")))?;

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Subnet,
            &id.to_string(),
            ChangeKind::Updated,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(subnet)
    }

    pub async fn get_subnet(&self, id: SubnetId) -> RegistryResult<Subnet> {
        sqlx::query_as::<_, Subnet>("SELECT * FROM subnets WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("subnet {id}")))
    }

    pub async fn list_subnets(&self) -> RegistryResult<Vec<Subnet>> {
        let subnets = sqlx::query_as::<_, Subnet>(
            "SELECT * FROM subnets WHERE archived_at IS NULL ORDER BY network",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(subnets)
    }

    /// Soft-archive a subnet. Its targets stay; the lifecycle sweep and
    /// assignment engine stop considering them through the subnet filter.
    pub async fn archive_subnet(&self, id: SubnetId) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let done = sqlx::query(
            r#"
            UPDATE subnets SET archived_at = $2, state = $3, updated_at = $2
            WHERE id = $1 AND archived_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(SubnetState::Archived.as_str())
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("subnet {id}")));
        }

        let version = bump_version(&mut tx).await?;
        record_change(
            &mut tx,
            version,
            EntityKind::Subnet,
            &id.to_string(),
            ChangeKind::Archived,
            now,
        )
        .await?;
        tx.commit().await?;
        debug!(subnet = %id, "subnet archived");
        Ok(())
    }
}
