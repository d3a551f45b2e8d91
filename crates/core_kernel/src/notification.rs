//! Fire-and-forget domain notifications
//!
//! Stock movements, low-stock alerts and received payments are pushed to a
//! [`NotificationPort`]. Delivery is never awaited for correctness: callers
//! log a failed publish and carry on.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identifiers::{InvoiceId, ProductId};
use crate::ports::{DomainPort, PortError};

/// Notification emitted by the domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainNotification {
    /// A product's stock changed
    StockUpdated {
        product_id: ProductId,
        reference: String,
        quantity: Decimal,
    },
    /// A product fell to or below its critical threshold
    #[serde(rename = "low_stock_alert")]
    LowStock {
        product_id: ProductId,
        reference: String,
        quantity: Decimal,
        threshold: Decimal,
    },
    /// A payment was recorded against an invoice
    PaymentReceived {
        invoice_id: InvoiceId,
        invoice_number: String,
        amount: Decimal,
        amount_paid: Decimal,
    },
}

impl DomainNotification {
    /// Event name used on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainNotification::StockUpdated { .. } => "stock_updated",
            DomainNotification::LowStock { .. } => "low_stock_alert",
            DomainNotification::PaymentReceived { .. } => "payment_received",
        }
    }
}

/// Outbound notification channel
#[async_trait]
pub trait NotificationPort: DomainPort {
    async fn publish(&self, notification: &DomainNotification) -> Result<(), PortError>;
}

/// Publishes notifications as structured log events
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl DomainPort for TracingNotifier {}

#[async_trait]
impl NotificationPort for TracingNotifier {
    async fn publish(&self, notification: &DomainNotification) -> Result<(), PortError> {
        match notification {
            DomainNotification::LowStock {
                product_id,
                reference,
                quantity,
                threshold,
            } => {
                tracing::warn!(
                    event = notification.event_name(),
                    %product_id,
                    reference = %reference,
                    %quantity,
                    %threshold,
                    "Low stock"
                );
            }
            _ => {
                let payload = serde_json::to_string(notification)
                    .map_err(|e| PortError::internal(e.to_string()))?;
                tracing::info!(event = notification.event_name(), payload = %payload, "Notification");
            }
        }
        Ok(())
    }
}

/// Recording notifier for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MockNotifier {
        published: RwLock<Vec<DomainNotification>>,
        failing: AtomicBool,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent publish fail
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub async fn published(&self) -> Vec<DomainNotification> {
            self.published.read().await.clone()
        }

        /// Notifications carrying the given event name
        pub async fn named(&self, event: &str) -> Vec<DomainNotification> {
            self.published
                .read()
                .await
                .iter()
                .filter(|n| n.event_name() == event)
                .cloned()
                .collect()
        }
    }

    impl DomainPort for MockNotifier {}

    #[async_trait]
    impl NotificationPort for MockNotifier {
        async fn publish(&self, notification: &DomainNotification) -> Result<(), PortError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("notifications"));
            }
            self.published.write().await.push(notification.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_names() {
        let low = DomainNotification::LowStock {
            product_id: ProductId::new(),
            reference: "REF-1".into(),
            quantity: dec!(2),
            threshold: dec!(5),
        };
        assert_eq!(low.event_name(), "low_stock_alert");

        let json = serde_json::to_value(&low).unwrap();
        assert_eq!(json["event"], "low_stock_alert");
    }

    #[tokio::test]
    async fn test_mock_records_and_fails_on_demand() {
        let notifier = mock::MockNotifier::new();
        let event = DomainNotification::StockUpdated {
            product_id: ProductId::new(),
            reference: "REF-2".into(),
            quantity: dec!(7),
        };

        notifier.publish(&event).await.unwrap();
        notifier.set_failing(true);
        assert!(notifier.publish(&event).await.is_err());

        assert_eq!(notifier.named("stock_updated").await.len(), 1);
    }
}
