//! Stock ledger service
//!
//! Applies quantity deltas to products. Services (`is_service`) are skipped
//! entirely. Whether a decrement may take stock below zero is decided by the
//! configured [`NegativeStockPolicy`].

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::{NotificationPort, ProductId, StockMovementId};

use crate::error::InventoryError;
use crate::ports::{DeltaOutcome, StockPort};
use crate::stock::{MovementReason, StockChange, StockItem, StockMovement, StockRequest};

/// What to do when a decrement would make stock negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStockPolicy {
    /// Refuse the movement with `InsufficientStock`
    #[default]
    Reject,
    /// Let stock go negative, log a warning and raise a low-stock alert
    AllowWithAlert,
}

impl NegativeStockPolicy {
    fn allows_negative(&self) -> bool {
        matches!(self, NegativeStockPolicy::AllowWithAlert)
    }
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn StockPort>,
    notifier: Option<Arc<dyn NotificationPort>>,
    policy: NegativeStockPolicy,
}

impl StockLedger {
    pub fn new(store: Arc<dyn StockPort>) -> Self {
        Self {
            store,
            notifier: None,
            policy: NegativeStockPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: NegativeStockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publishes notifications for standalone [`apply`](Self::apply) calls
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationPort>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> NegativeStockPolicy {
        self.policy
    }

    /// Registers or updates the stock slice of a product
    pub async fn register(&self, item: StockItem) -> Result<StockItem, InventoryError> {
        item.validate()?;
        self.store.upsert_item(&item).await?;
        Ok(item)
    }

    pub async fn get(&self, product_id: ProductId) -> Result<StockItem, InventoryError> {
        self.store
            .get_item(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.to_string()))
    }

    pub async fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, InventoryError> {
        Ok(self.store.movements_for(product_id).await?)
    }

    /// Applies one delta and publishes its notifications
    ///
    /// Returns `None` for services. Replays publish nothing.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` for an unknown product
    /// - `InsufficientStock` when the reject policy refuses a decrement
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, delta = %request.delta))]
    pub async fn apply(&self, request: StockRequest) -> Result<Option<StockChange>, InventoryError> {
        let change = self.apply_one(&request).await?;
        if let Some(change) = change.as_ref().filter(|c| c.applied) {
            self.publish(change).await;
        }
        Ok(change)
    }

    /// Applies every request or none of them
    ///
    /// When a request fails, the movements already applied by this call are
    /// compensated before the error is returned. Notifications are not
    /// published; callers derive them from the returned changes once their
    /// own write has succeeded.
    #[tracing::instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn apply_all(&self, requests: &[StockRequest]) -> Result<Vec<StockChange>, InventoryError> {
        let mut changes = Vec::with_capacity(requests.len());
        for request in requests {
            match self.apply_one(request).await {
                Ok(Some(change)) => changes.push(change),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, applied = changes.len(), "Stock batch failed, compensating");
                    self.compensate(&changes).await;
                    return Err(e);
                }
            }
        }
        Ok(changes)
    }

    /// Undoes applied changes with inverse movements
    ///
    /// Best effort: failures are logged, the remaining changes are still
    /// compensated.
    pub async fn compensate(&self, changes: &[StockChange]) {
        for change in changes.iter().rev().filter(|c| c.applied) {
            let movement = StockMovement {
                id: StockMovementId::new(),
                product_id: change.product_id,
                delta: -change.delta,
                reason: MovementReason::Compensation,
                source: None,
                idempotency_key: format!("{}:compensation", change.idempotency_key),
                quantity_after: Decimal::ZERO,
                created_at: Utc::now(),
            };
            if let Err(e) = self.store.apply_delta(&movement, true).await {
                tracing::error!(
                    product_id = %change.product_id,
                    key = %change.idempotency_key,
                    error = %e,
                    "Stock compensation failed"
                );
            }
        }
    }

    async fn apply_one(&self, request: &StockRequest) -> Result<Option<StockChange>, InventoryError> {
        if request.delta.is_zero() {
            return Err(InventoryError::Validation("stock delta must not be zero".into()));
        }
        let item = self.get(request.product_id).await?;
        if item.is_service {
            tracing::debug!(reference = %item.reference, "Service product, no stock tracking");
            return Ok(None);
        }

        let movement = StockMovement {
            id: StockMovementId::new(),
            product_id: request.product_id,
            delta: request.delta,
            reason: request.reason,
            source: request.source.clone(),
            idempotency_key: request.idempotency_key.clone(),
            quantity_after: Decimal::ZERO,
            created_at: Utc::now(),
        };

        let (quantity_after, applied) = match self
            .store
            .apply_delta(&movement, self.policy.allows_negative())
            .await?
        {
            DeltaOutcome::Applied { quantity_after } => (quantity_after, true),
            DeltaOutcome::Replayed { quantity_after } => {
                tracing::debug!(key = %request.idempotency_key, "Stock movement already applied");
                (quantity_after, false)
            }
            DeltaOutcome::Insufficient { available } => {
                tracing::warn!(
                    reference = %item.reference,
                    %available,
                    requested = %-request.delta,
                    "Stock movement rejected"
                );
                return Err(InventoryError::InsufficientStock {
                    reference: item.reference,
                    available,
                    requested: -request.delta,
                });
            }
        };

        if quantity_after < Decimal::ZERO {
            tracing::warn!(reference = %item.reference, %quantity_after, "Stock is negative");
        }
        tracing::info!(
            reference = %item.reference,
            delta = %request.delta,
            %quantity_after,
            reason = %request.reason,
            "Stock updated"
        );

        Ok(Some(StockChange {
            product_id: item.product_id,
            reference: item.reference,
            delta: request.delta,
            quantity_after,
            critical_threshold: item.critical_threshold,
            idempotency_key: request.idempotency_key.clone(),
            applied,
        }))
    }

    async fn publish(&self, change: &StockChange) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for notification in change.notifications() {
            if let Err(e) = notifier.publish(&notification).await {
                tracing::warn!(event = notification.event_name(), error = %e, "Notification failed");
            }
        }
    }
}
