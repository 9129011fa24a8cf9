use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};

use crate::crawler::models::{Improvement, PropertyRecord};
use crate::error::{ProxyError, StorageError, StorageResult};
use crate::proxy::{Proxy, ProxyRotator};
use crate::storage::{is_populated, PropertyStore};

/// Rounds of pick-and-stamp before `acquire` gives up while usable
/// proxies still exist but keep getting blacklisted under it.
const ACQUIRE_ATTEMPTS: usize = 3;

pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Outstanding work in random order, like a fresh pass over the backlog.
    pub async fn pending_urls(&self, limit: Option<i64>) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT url FROM pending_urls
            ORDER BY random()
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("url")).collect())
    }

    /// Picks the least recently used usable proxy and stamps it in one
    /// statement. Concurrent callers queue on the row lock rather than skip
    /// it, so a busy proxy is never mistaken for a missing one. After the
    /// wait the row is re-checked, which yields no row only if it was
    /// blacklisted in the meantime.
    async fn stamp_next_proxy(&self) -> StorageResult<Option<Proxy>> {
        let row = sqlx::query(
            r#"
            UPDATE proxies
            SET uses = COALESCE(uses, 0) + 1,
                last_used = now()
            WHERE address = (
                SELECT address FROM proxies
                WHERE NOT COALESCE(is_bad, false) AND address <> ''
                ORDER BY last_used ASC NULLS FIRST
                LIMIT 1
                FOR UPDATE
            )
            RETURNING address, last_used, uses, is_bad
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Proxy {
            address: row.get("address"),
            last_used: row.get::<Option<DateTime<Utc>>, _>("last_used"),
            uses: row.get::<Option<i32>, _>("uses").unwrap_or_default(),
            is_bad: row.get::<Option<bool>, _>("is_bad").unwrap_or_default(),
        }))
    }

    async fn has_usable_proxy(&self) -> StorageResult<bool> {
        let usable: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM proxies WHERE NOT COALESCE(is_bad, false) AND address <> '')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(usable)
    }

    async fn insert_property(
        tx: &mut Transaction<'_, Postgres>,
        record: &PropertyRecord,
    ) -> StorageResult<()> {
        // A shell row with a blank address may be re-populated; a populated
        // row is never overwritten and the write fails instead. The guard
        // matches `is_populated`: any non-whitespace character counts.
        let inserted = sqlx::query(
            r#"
            INSERT INTO properties (
                id,
                zoning,
                neighborhood_cd,
                neighborhood,
                address,
                legal_description,
                geographic_id,
                exemptions,
                ownership_percentage,
                mapsco_map_id
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ON CONFLICT (id) DO UPDATE SET
                zoning = EXCLUDED.zoning,
                neighborhood_cd = EXCLUDED.neighborhood_cd,
                neighborhood = EXCLUDED.neighborhood,
                address = EXCLUDED.address,
                legal_description = EXCLUDED.legal_description,
                geographic_id = EXCLUDED.geographic_id,
                exemptions = EXCLUDED.exemptions,
                ownership_percentage = EXCLUDED.ownership_percentage,
                mapsco_map_id = EXCLUDED.mapsco_map_id
            WHERE COALESCE(properties.address, '') !~ '\S'
            RETURNING id
            "#,
        )
        .bind(record.property_id)
        .bind(&record.zoning)
        .bind(&record.neighborhood_code)
        .bind(&record.neighborhood)
        .bind(&record.address)
        .bind(&record.legal_description)
        .bind(&record.geographic_id)
        .bind(&record.exemptions)
        .bind(&record.ownership_percentage)
        .bind(&record.mapsco_id)
        .fetch_optional(&mut **tx)
        .await?;

        if inserted.is_none() {
            return Err(StorageError::Conflict {
                property_id: record.property_id,
            });
        }

        sqlx::query(
            r#"
            DELETE FROM improvement_details
            WHERE improvement_id IN (SELECT id FROM improvements WHERE property_id = $1)
            "#,
        )
        .bind(record.property_id)
        .execute(&mut **tx)
        .await?;

        for table in ["land", "improvements", "roll_values", "jurisdictions"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE property_id = $1"))
                .bind(record.property_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    async fn insert_land(
        tx: &mut Transaction<'_, Postgres>,
        record: &PropertyRecord,
    ) -> StorageResult<()> {
        for land in &record.land {
            sqlx::query(
                r#"
                INSERT INTO land (
                    number, land_type, description, acres, square_feet,
                    eff_front, eff_depth, market_value, property_id
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                "#,
            )
            .bind(to_i32(&land.number))
            .bind(&land.land_type)
            .bind(&land.description)
            .bind(to_f64(&land.acres))
            .bind(to_f64(&land.sqft))
            .bind(to_f64(&land.eff_front))
            .bind(to_f64(&land.eff_depth))
            .bind(to_i64(&land.market_value))
            .bind(record.property_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Details reference the generated improvement id, so each improvement
    /// is followed directly by its detail rows.
    async fn insert_improvement(
        tx: &mut Transaction<'_, Postgres>,
        property_id: i32,
        improvement: &Improvement,
    ) -> StorageResult<()> {
        let improvement_id: i32 = sqlx::query(
            r#"
            INSERT INTO improvements (
                name, description, state_code, living_area, value, property_id
            )
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING id
            "#,
        )
        .bind(&improvement.name)
        .bind(&improvement.description)
        .bind(&improvement.state_code)
        .bind(to_f64(&improvement.living_area))
        .bind(to_f64(&improvement.value))
        .bind(property_id)
        .fetch_one(&mut **tx)
        .await?
        .get("id");

        for detail in &improvement.details {
            sqlx::query(
                r#"
                INSERT INTO improvement_details (
                    improvement_id, improvement_type, description, class,
                    exterior_wall, year_built, square_feet
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7)
                "#,
            )
            .bind(improvement_id)
            .bind(&detail.detail_type)
            .bind(&detail.description)
            .bind(&detail.class)
            .bind(&detail.exterior_wall)
            .bind(to_i32(&detail.year_built))
            .bind(to_i32(&detail.sqft))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_roll_values(
        tx: &mut Transaction<'_, Postgres>,
        record: &PropertyRecord,
    ) -> StorageResult<()> {
        for r in &record.roll_values {
            sqlx::query(
                r#"
                INSERT INTO roll_values (
                    year, improvements, land_market, ag_valuation,
                    appraised, homestead_cap, assessed, property_id
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                "#,
            )
            .bind(to_i32(&r.year))
            .bind(to_i64(&r.improvements))
            .bind(to_i64(&r.land_market))
            .bind(to_i64(&r.ag_valuation))
            .bind(to_i64(&r.appraised))
            .bind(to_i64(&r.homestead_cap))
            .bind(to_i64(&r.assessed))
            .bind(record.property_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_jurisdictions(
        tx: &mut Transaction<'_, Postgres>,
        record: &PropertyRecord,
    ) -> StorageResult<()> {
        for j in &record.jurisdictions {
            sqlx::query(
                r#"
                INSERT INTO jurisdictions (
                    entity, description, tax_rate, appraised_value,
                    taxable_value, estimated_tax, property_id
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7)
                "#,
            )
            .bind(&j.entity)
            .bind(&j.description)
            .bind(to_f64(&j.tax_rate))
            .bind(to_i64(&j.appraised_value))
            .bind(to_i64(&j.taxable_value))
            .bind(to_f64(&j.estimated_tax))
            .bind(record.property_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for Storage {
    async fn exists(&self, property_id: i32) -> StorageResult<bool> {
        let address: Option<Option<String>> =
            sqlx::query_scalar("SELECT address FROM properties WHERE id = $1")
                .bind(property_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(address.flatten().is_some_and(|a| is_populated(&a)))
    }

    async fn persist(&self, record: &PropertyRecord) -> StorageResult<()> {
        // Any early return drops `tx` uncommitted, which rolls it back.
        let mut tx = self.pool.begin().await?;

        Self::insert_property(&mut tx, record).await?;
        Self::insert_land(&mut tx, record).await?;
        for improvement in &record.improvements {
            Self::insert_improvement(&mut tx, record.property_id, improvement).await?;
        }
        Self::insert_roll_values(&mut tx, record).await?;
        Self::insert_jurisdictions(&mut tx, record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn retire(&self, url: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM pending_urls WHERE url = $1")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProxyRotator for Storage {
    async fn acquire(&self) -> Result<Proxy, ProxyError> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            if let Some(proxy) = self.stamp_next_proxy().await? {
                return Ok(proxy);
            }
            if !self.has_usable_proxy().await? {
                break;
            }
        }
        Err(ProxyError::NotFound)
    }

    async fn blacklist(&self, address: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE proxies SET is_bad = true WHERE address = $1")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn numeric(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect()
}

fn to_i32(text: &str) -> Option<i32> {
    to_i64(text).and_then(|v| i32::try_from(v).ok())
}

fn to_i64(text: &str) -> Option<i64> {
    let cleaned = numeric(text);
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(|f| f.round() as i64))
}

fn to_f64(text: &str) -> Option<f64> {
    numeric(text).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_junk_text_is_null() {
        assert_eq!(to_i32(""), None);
        assert_eq!(to_i32("N/A"), None);
        assert_eq!(to_f64("   "), None);
    }

    #[test]
    fn currency_text_parses() {
        assert_eq!(to_i64("$123,456"), Some(123_456));
        assert_eq!(to_i64("1,234.60"), Some(1_235));
        assert_eq!(to_f64("$1,234.56"), Some(1234.56));
        assert_eq!(to_i32(" 1998 "), Some(1998));
        assert_eq!(to_i32("1500.0"), Some(1500));
    }
}
