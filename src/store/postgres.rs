use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{Page, TaxpayerStore};
use crate::models::invoice::Address;
use crate::models::taxpayer::{NewTaxpayer, Taxpayer, TaxpayerUpdate, ValidationRecord};

const TAXPAYER_COLUMNS: &str = "id, tin, id_type, id_value, is_valid, business_name, full_name, \
     address_street, address_city, address_postcode, address_state, address_country_code, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TaxpayerStore for PgStore {
    async fn record_validation(&self, record: &ValidationRecord) -> anyhow::Result<Taxpayer> {
        // Single statement so concurrent validations of one TIN cannot insert twice.
        let sql = format!(
            r#"INSERT INTO taxpayers (tin, id_type, id_value, is_valid)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (tin) DO UPDATE
                 SET id_type = EXCLUDED.id_type,
                     id_value = EXCLUDED.id_value,
                     is_valid = EXCLUDED.is_valid,
                     updated_at = NOW()
               RETURNING {TAXPAYER_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(&record.tin)
            .bind(&record.id_type)
            .bind(&record.id_value)
            .bind(record.is_valid)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, new: &NewTaxpayer) -> anyhow::Result<Option<Taxpayer>> {
        let sql = format!(
            r#"INSERT INTO taxpayers (tin, id_type, id_value, is_valid, business_name, full_name,
                                      address_street, address_city, address_postcode,
                                      address_state, address_country_code)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (tin) DO NOTHING
               RETURNING {TAXPAYER_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(&new.tin)
            .bind(&new.id_type)
            .bind(&new.id_value)
            .bind(new.is_valid)
            .bind(&new.business_name)
            .bind(&new.full_name)
            .bind(&new.address_street)
            .bind(&new.address_city)
            .bind(&new.address_postcode)
            .bind(&new.address_state)
            .bind(&new.address_country_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get(&self, tin: &str) -> anyhow::Result<Option<Taxpayer>> {
        let sql = format!("SELECT {TAXPAYER_COLUMNS} FROM taxpayers WHERE tin = $1");
        let row = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(tin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update(&self, tin: &str, update: &TaxpayerUpdate) -> anyhow::Result<Option<Taxpayer>> {
        let sql = format!(
            r#"UPDATE taxpayers
               SET is_valid = COALESCE($2, is_valid),
                   id_type = COALESCE($3, id_type),
                   id_value = COALESCE($4, id_value),
                   business_name = COALESCE($5, business_name),
                   full_name = COALESCE($6, full_name),
                   address_street = COALESCE($7, address_street),
                   address_city = COALESCE($8, address_city),
                   address_postcode = COALESCE($9, address_postcode),
                   address_state = COALESCE($10, address_state),
                   address_country_code = COALESCE($11, address_country_code),
                   updated_at = NOW()
               WHERE tin = $1
               RETURNING {TAXPAYER_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(tin)
            .bind(update.is_valid)
            .bind(&update.id_type)
            .bind(&update.id_value)
            .bind(&update.business_name)
            .bind(&update.full_name)
            .bind(&update.address_street)
            .bind(&update.address_city)
            .bind(&update.address_postcode)
            .bind(&update.address_state)
            .bind(&update.address_country_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self, page: Page) -> anyhow::Result<Vec<Taxpayer>> {
        let sql = format!("SELECT {TAXPAYER_COLUMNS} FROM taxpayers ORDER BY id ASC OFFSET $1 LIMIT $2");
        let rows = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(page.skip())
            .bind(page.limit())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_by_name_and_address(
        &self,
        full_name: &str,
        address: &Address,
    ) -> anyhow::Result<Option<Taxpayer>> {
        let sql = format!(
            r#"SELECT {TAXPAYER_COLUMNS} FROM taxpayers
               WHERE full_name = $1
                 AND address_street = $2
                 AND address_city = $3
                 AND address_postcode = $4
                 AND address_state = $5
               ORDER BY id ASC
               LIMIT 1"#
        );
        let row = sqlx::query_as::<_, Taxpayer>(&sql)
            .bind(full_name)
            .bind(&address.street)
            .bind(&address.city)
            .bind(&address.postcode)
            .bind(&address.state)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
