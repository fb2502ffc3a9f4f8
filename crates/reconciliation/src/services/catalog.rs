//! Product catalog: current prices and advisory stock counts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId, StockKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid catalog data: {0}")]
    InvalidData(#[from] serde_json::Error),
}

/// Read-only view of the product catalog.
///
/// Stock numbers from here are advisory. The inventory ledger decides
/// whether a reservation succeeds.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Current unit price, `None` if the product is not sold any more.
    async fn current_price(&self, product_id: &ProductId) -> Result<Option<Money>, CatalogError>;

    async fn stock_hint(&self, key: &StockKey) -> Result<Option<u32>, CatalogError>;
}

/// One product in a catalog seed file.
///
/// ```json
/// [{ "product_id": "TEE-01", "price_paise": 49900, "stock": { "M": 10, "L": 4 } }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub price_paise: i64,
    #[serde(default)]
    pub stock: BTreeMap<String, u32>,
}

impl CatalogEntry {
    pub fn price(&self) -> Money {
        Money::from_paise(self.price_paise)
    }

    /// Stock keys and counts for every size of this product.
    pub fn stock_keys(&self) -> impl Iterator<Item = (StockKey, u32)> + '_ {
        self.stock.iter().map(|(size, count)| {
            (StockKey::new(self.product_id.clone(), size.as_str()), *count)
        })
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    prices: HashMap<ProductId, Money>,
    stock: HashMap<StockKey, u32>,
    unavailable: bool,
}

/// In-memory catalog, seeded from JSON or populated by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from seed entries.
    pub fn from_entries(entries: &[CatalogEntry]) -> Self {
        let mut state = CatalogState::default();
        for entry in entries {
            state.prices.insert(entry.product_id.clone(), entry.price());
            state.stock.extend(entry.stock_keys());
        }
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn parse_entries(json: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn set_price(&self, product_id: impl Into<ProductId>, price: Money) {
        self.state
            .write()
            .await
            .prices
            .insert(product_id.into(), price);
    }

    pub async fn remove_product(&self, product_id: &ProductId) {
        self.state.write().await.prices.remove(product_id);
    }

    pub async fn set_stock(&self, key: StockKey, count: u32) {
        self.state.write().await.stock.insert(key, count);
    }

    /// Makes every lookup fail until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn current_price(&self, product_id: &ProductId) -> Result<Option<Money>, CatalogError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        Ok(state.prices.get(product_id).copied())
    }

    async fn stock_hint(&self, key: &StockKey) -> Result<Option<u32>, CatalogError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        Ok(state.stock.get(key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"[
        { "product_id": "TEE-01", "price_paise": 49900, "stock": { "M": 10, "L": 4 } },
        { "product_id": "CAP-02", "price_paise": 29900 }
    ]"#;

    #[tokio::test]
    async fn seeds_prices_and_stock_from_json() {
        let entries = InMemoryCatalog::parse_entries(SEED).unwrap();
        let catalog = InMemoryCatalog::from_entries(&entries);

        assert_eq!(
            catalog.current_price(&ProductId::new("TEE-01")).await.unwrap(),
            Some(Money::from_paise(49_900))
        );
        assert_eq!(
            catalog
                .stock_hint(&StockKey::new("TEE-01", "L"))
                .await
                .unwrap(),
            Some(4)
        );
        assert_eq!(
            catalog
                .stock_hint(&StockKey::new("CAP-02", "M"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(entries[0].stock_keys().count(), 2);
    }

    #[tokio::test]
    async fn removed_product_has_no_price() {
        let catalog = InMemoryCatalog::new();
        catalog.set_price("TEE-01", Money::from_rupees(499)).await;
        catalog.remove_product(&ProductId::new("TEE-01")).await;

        assert!(
            catalog
                .current_price(&ProductId::new("TEE-01"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unavailable_catalog_fails_lookups() {
        let catalog = InMemoryCatalog::new();
        catalog.set_unavailable(true).await;
        assert!(matches!(
            catalog.current_price(&ProductId::new("TEE-01")).await,
            Err(CatalogError::Unavailable(_))
        ));
    }

    #[test]
    fn malformed_seed_is_rejected() {
        assert!(matches!(
            InMemoryCatalog::parse_entries("{\"product_id\": 1}"),
            Err(CatalogError::InvalidData(_))
        ));
    }
}
