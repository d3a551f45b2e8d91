//! Inventory Domain Ports
//!
//! [`StockPort::apply_delta`] must be one atomic operation at the storage
//! layer (a guarded `UPDATE … SET stock = stock + delta` together with the
//! movement insert), so two concurrent delivery notes touching the same
//! product never lose an update.

use async_trait::async_trait;
use rust_decimal::Decimal;

use core_kernel::{DomainPort, PortError, ProductId};

use crate::stock::{StockItem, StockMovement};

/// Result of an atomic stock delta
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOutcome {
    /// The movement was recorded
    Applied { quantity_after: Decimal },
    /// A movement with the same idempotency key already exists
    Replayed { quantity_after: Decimal },
    /// Refused: the result would be negative and negatives are not allowed
    Insufficient { available: Decimal },
}

#[async_trait]
pub trait StockPort: DomainPort {
    async fn get_item(&self, product_id: ProductId) -> Result<Option<StockItem>, PortError>;

    /// Inserts or replaces the product slice
    async fn upsert_item(&self, item: &StockItem) -> Result<(), PortError>;

    /// Atomically adds `movement.delta` to the stock and records the movement
    ///
    /// The movement's `quantity_after` is set by the store.
    async fn apply_delta(
        &self,
        movement: &StockMovement,
        allow_negative: bool,
    ) -> Result<DeltaOutcome, PortError>;

    async fn movements_for(&self, product_id: ProductId) -> Result<Vec<StockMovement>, PortError>;
}

/// In-memory stock store for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct State {
        items: HashMap<ProductId, StockItem>,
        movements: Vec<StockMovement>,
    }

    #[derive(Default, Clone)]
    pub struct MockStockStore {
        state: Arc<RwLock<State>>,
        unavailable: Arc<AtomicBool>,
        /// Fail every apply whose product matches
        failing_product: Arc<RwLock<Option<ProductId>>>,
    }

    impl MockStockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn with_items(items: Vec<StockItem>) -> Self {
            let store = Self::new();
            {
                let mut state = store.state.write().await;
                for item in items {
                    state.items.insert(item.product_id, item);
                }
            }
            store
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Makes deltas on one product fail with `ServiceUnavailable`
        pub async fn fail_product(&self, product_id: Option<ProductId>) {
            *self.failing_product.write().await = product_id;
        }

        pub async fn quantity(&self, product_id: ProductId) -> Option<Decimal> {
            self.state
                .read()
                .await
                .items
                .get(&product_id)
                .map(|i| i.stock_quantity)
        }

        fn check(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("stock store"));
            }
            Ok(())
        }
    }

    impl DomainPort for MockStockStore {}

    #[async_trait]
    impl StockPort for MockStockStore {
        async fn get_item(&self, product_id: ProductId) -> Result<Option<StockItem>, PortError> {
            self.check()?;
            Ok(self.state.read().await.items.get(&product_id).cloned())
        }

        async fn upsert_item(&self, item: &StockItem) -> Result<(), PortError> {
            self.check()?;
            self.state.write().await.items.insert(item.product_id, item.clone());
            Ok(())
        }

        async fn apply_delta(
            &self,
            movement: &StockMovement,
            allow_negative: bool,
        ) -> Result<DeltaOutcome, PortError> {
            self.check()?;
            if *self.failing_product.read().await == Some(movement.product_id) {
                return Err(PortError::unavailable("stock store"));
            }

            let mut state = self.state.write().await;
            if let Some(existing) = state
                .movements
                .iter()
                .find(|m| m.idempotency_key == movement.idempotency_key)
            {
                return Ok(DeltaOutcome::Replayed {
                    quantity_after: existing.quantity_after,
                });
            }

            let item = state
                .items
                .get_mut(&movement.product_id)
                .ok_or_else(|| PortError::not_found("Product", movement.product_id))?;
            let next = item.stock_quantity + movement.delta;
            if next < Decimal::ZERO && !allow_negative {
                return Ok(DeltaOutcome::Insufficient {
                    available: item.stock_quantity,
                });
            }
            item.stock_quantity = next;
            item.updated_at = chrono::Utc::now();

            let mut recorded = movement.clone();
            recorded.quantity_after = next;
            state.movements.push(recorded);
            Ok(DeltaOutcome::Applied { quantity_after: next })
        }

        async fn movements_for(&self, product_id: ProductId) -> Result<Vec<StockMovement>, PortError> {
            self.check()?;
            Ok(self
                .state
                .read()
                .await
                .movements
                .iter()
                .filter(|m| m.product_id == product_id)
                .cloned()
                .collect())
        }
    }
}
