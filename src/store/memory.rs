//! In-process taxpayer store for local runs (`DATABASE_URL=memory://`) and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Page, TaxpayerStore};
use crate::models::invoice::Address;
use crate::models::taxpayer::{NewTaxpayer, Taxpayer, TaxpayerUpdate, ValidationRecord};

#[derive(Default)]
struct Inner {
    next_id: i64,
    by_tin: HashMap<String, Taxpayer>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_tin.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn apply<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

#[async_trait]
impl TaxpayerStore for MemoryStore {
    async fn record_validation(&self, record: &ValidationRecord) -> anyhow::Result<Taxpayer> {
        let mut inner = self.inner.write().await;
        if let Some(row) = inner.by_tin.get_mut(&record.tin) {
            row.id_type = record.id_type.clone();
            row.id_value = record.id_value.clone();
            row.is_valid = record.is_valid;
            row.updated_at = Some(Utc::now());
            return Ok(row.clone());
        }

        let id = inner.allocate_id();
        let row = Taxpayer {
            id,
            tin: record.tin.clone(),
            id_type: record.id_type.clone(),
            id_value: record.id_value.clone(),
            is_valid: record.is_valid,
            business_name: None,
            full_name: None,
            address_street: None,
            address_city: None,
            address_postcode: None,
            address_state: None,
            address_country_code: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.by_tin.insert(row.tin.clone(), row.clone());
        Ok(row)
    }

    async fn create(&self, new: &NewTaxpayer) -> anyhow::Result<Option<Taxpayer>> {
        let mut inner = self.inner.write().await;
        if inner.by_tin.contains_key(&new.tin) {
            return Ok(None);
        }

        let id = inner.allocate_id();
        let row = Taxpayer {
            id,
            tin: new.tin.clone(),
            id_type: new.id_type.clone(),
            id_value: new.id_value.clone(),
            is_valid: new.is_valid,
            business_name: new.business_name.clone(),
            full_name: new.full_name.clone(),
            address_street: new.address_street.clone(),
            address_city: new.address_city.clone(),
            address_postcode: new.address_postcode.clone(),
            address_state: new.address_state.clone(),
            address_country_code: new.address_country_code.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.by_tin.insert(row.tin.clone(), row.clone());
        Ok(Some(row))
    }

    async fn get(&self, tin: &str) -> anyhow::Result<Option<Taxpayer>> {
        Ok(self.inner.read().await.by_tin.get(tin).cloned())
    }

    async fn update(&self, tin: &str, update: &TaxpayerUpdate) -> anyhow::Result<Option<Taxpayer>> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.by_tin.get_mut(tin) else {
            return Ok(None);
        };

        if let Some(v) = update.is_valid {
            row.is_valid = v;
        }
        if let Some(v) = &update.id_type {
            row.id_type = v.clone();
        }
        if let Some(v) = &update.id_value {
            row.id_value = v.clone();
        }
        apply(&mut row.business_name, &update.business_name);
        apply(&mut row.full_name, &update.full_name);
        apply(&mut row.address_street, &update.address_street);
        apply(&mut row.address_city, &update.address_city);
        apply(&mut row.address_postcode, &update.address_postcode);
        apply(&mut row.address_state, &update.address_state);
        apply(&mut row.address_country_code, &update.address_country_code);
        row.updated_at = Some(Utc::now());

        Ok(Some(row.clone()))
    }

    async fn list(&self, page: Page) -> anyhow::Result<Vec<Taxpayer>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Taxpayer> = inner.by_tin.values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn find_by_name_and_address(
        &self,
        full_name: &str,
        address: &Address,
    ) -> anyhow::Result<Option<Taxpayer>> {
        let inner = self.inner.read().await;
        let is_match = |r: &&Taxpayer| {
            r.full_name.as_deref() == Some(full_name)
                && r.address_street.as_deref() == Some(address.street.as_str())
                && r.address_city.as_deref() == Some(address.city.as_str())
                && r.address_postcode.as_deref() == Some(address.postcode.as_str())
                && r.address_state.as_deref() == Some(address.state.as_str())
        };
        Ok(inner
            .by_tin
            .values()
            .filter(is_match)
            .min_by_key(|r| r.id)
            .cloned())
    }
}
