pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::invoice::Address;
use crate::models::taxpayer::{NewTaxpayer, Taxpayer, TaxpayerUpdate, ValidationRecord};

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Offset/limit window for listing. Built through [`Page::new`] so the limit
/// is always within `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    skip: i64,
    limit: i64,
}

impl Page {
    /// Oversized limits are clamped; limits below 1 and negative offsets are rejected.
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Result<Self, String> {
        let skip = skip.unwrap_or(0);
        if skip < 0 {
            return Err("skip must be zero or greater".into());
        }
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit < 1 {
            return Err("limit must be at least 1".into());
        }
        Ok(Self {
            skip,
            limit: limit.min(MAX_PAGE_LIMIT),
        })
    }

    pub fn skip(&self) -> i64 {
        self.skip
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Persistence for mirrored taxpayer records.
/// Implementations: PgStore (Postgres), MemoryStore (in-process).
#[async_trait]
pub trait TaxpayerStore: Send + Sync {
    /// Insert or update the row for `record.tin`. Always leaves exactly one row.
    async fn record_validation(&self, record: &ValidationRecord) -> anyhow::Result<Taxpayer>;

    /// Insert a new row. `Ok(None)` when the TIN is already present.
    async fn create(&self, new: &NewTaxpayer) -> anyhow::Result<Option<Taxpayer>>;

    async fn get(&self, tin: &str) -> anyhow::Result<Option<Taxpayer>>;

    /// Apply a partial update. `Ok(None)` when no row has this TIN.
    async fn update(&self, tin: &str, update: &TaxpayerUpdate) -> anyhow::Result<Option<Taxpayer>>;

    /// Rows ordered by id.
    async fn list(&self, page: Page) -> anyhow::Result<Vec<Taxpayer>>;

    /// First row whose full name and address match exactly.
    async fn find_by_name_and_address(
        &self,
        full_name: &str,
        address: &Address,
    ) -> anyhow::Result<Option<Taxpayer>>;
}
