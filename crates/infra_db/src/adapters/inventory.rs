//! PostgreSQL stock store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, PortError, ProductId};
use domain_inventory::{DeltaOutcome, MovementReason, StockItem, StockMovement, StockPort};

use super::db_to_port_error;
use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresStockStore {}

#[async_trait]
impl StockPort for PostgresStockStore {
    async fn get_item(&self, product_id: ProductId) -> Result<Option<StockItem>, PortError> {
        let row = sqlx::query_as::<_, StockItemRow>(
            "SELECT product_id, reference, name, stock_quantity, critical_threshold, is_service, updated_at \
             FROM stock_items WHERE product_id = $1",
        )
        .bind(Uuid::from(product_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_to_port_error)?;
        Ok(row.map(StockItem::from))
    }

    #[instrument(skip(self, item), fields(reference = %item.reference))]
    async fn upsert_item(&self, item: &StockItem) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO stock_items (product_id, reference, name, stock_quantity, critical_threshold, is_service, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id) DO UPDATE SET
                reference = EXCLUDED.reference,
                name = EXCLUDED.name,
                stock_quantity = EXCLUDED.stock_quantity,
                critical_threshold = EXCLUDED.critical_threshold,
                is_service = EXCLUDED.is_service,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(item.product_id))
        .bind(&item.reference)
        .bind(&item.name)
        .bind(item.stock_quantity)
        .bind(item.critical_threshold)
        .bind(item.is_service)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_to_port_error)?;
        Ok(())
    }

    /// Guarded increment plus movement insert in one transaction
    ///
    /// The row lock taken by the `UPDATE` serializes concurrent movements on
    /// the same product; the guard refuses a negative result unless allowed.
    #[instrument(skip(self, movement), fields(key = %movement.idempotency_key, delta = %movement.delta))]
    async fn apply_delta(
        &self,
        movement: &StockMovement,
        allow_negative: bool,
    ) -> Result<DeltaOutcome, PortError> {
        let mut tx = self.pool.begin().await.map_err(db_to_port_error)?;

        let replayed: Option<Decimal> =
            sqlx::query_scalar("SELECT quantity_after FROM stock_movements WHERE idempotency_key = $1")
                .bind(&movement.idempotency_key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_to_port_error)?;
        if let Some(quantity_after) = replayed {
            return Ok(DeltaOutcome::Replayed { quantity_after });
        }

        let updated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE stock_items
            SET stock_quantity = stock_quantity + $2, updated_at = NOW()
            WHERE product_id = $1 AND ($3 OR stock_quantity + $2 >= 0)
            RETURNING stock_quantity
            "#,
        )
        .bind(Uuid::from(movement.product_id))
        .bind(movement.delta)
        .bind(allow_negative)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_to_port_error)?;

        let Some(quantity_after) = updated else {
            let available: Option<Decimal> =
                sqlx::query_scalar("SELECT stock_quantity FROM stock_items WHERE product_id = $1")
                    .bind(Uuid::from(movement.product_id))
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_to_port_error)?;
            return match available {
                Some(available) => Ok(DeltaOutcome::Insufficient { available }),
                None => Err(PortError::not_found("StockItem", movement.product_id)),
            };
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_movements (movement_id, product_id, delta, reason, source, idempotency_key, quantity_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(Uuid::from(movement.id))
        .bind(Uuid::from(movement.product_id))
        .bind(movement.delta)
        .bind(movement.reason.as_str())
        .bind(&movement.source)
        .bind(&movement.idempotency_key)
        .bind(quantity_after)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_to_port_error)?
        .rows_affected();

        if inserted == 0 {
            // A concurrent call with the same key won the insert
            tx.rollback().await.map_err(db_to_port_error)?;
            let quantity_after: Decimal =
                sqlx::query_scalar("SELECT quantity_after FROM stock_movements WHERE idempotency_key = $1")
                    .bind(&movement.idempotency_key)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_to_port_error)?;
            return Ok(DeltaOutcome::Replayed { quantity_after });
        }

        tx.commit().await.map_err(db_to_port_error)?;
        debug!(%quantity_after, "Stock movement applied");
        Ok(DeltaOutcome::Applied { quantity_after })
    }

    async fn movements_for(&self, product_id: ProductId) -> Result<Vec<StockMovement>, PortError> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT movement_id, product_id, delta, reason, source, idempotency_key, quantity_after, created_at \
             FROM stock_movements WHERE product_id = $1 ORDER BY created_at, movement_id",
        )
        .bind(Uuid::from(product_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_to_port_error)?;
        rows.into_iter()
            .map(StockMovement::try_from)
            .collect::<Result<_, _>>()
            .map_err(db_to_port_error)
    }
}

#[derive(Debug, FromRow)]
struct StockItemRow {
    product_id: Uuid,
    reference: String,
    name: String,
    stock_quantity: Decimal,
    critical_threshold: Decimal,
    is_service: bool,
    updated_at: DateTime<Utc>,
}

impl From<StockItemRow> for StockItem {
    fn from(row: StockItemRow) -> Self {
        StockItem {
            product_id: row.product_id.into(),
            reference: row.reference,
            name: row.name,
            stock_quantity: row.stock_quantity,
            critical_threshold: row.critical_threshold,
            is_service: row.is_service,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    movement_id: Uuid,
    product_id: Uuid,
    delta: Decimal,
    reason: String,
    source: Option<String>,
    idempotency_key: String,
    quantity_after: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = DatabaseError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let reason = MovementReason::parse(&row.reason).ok_or_else(|| DatabaseError::decode("reason", &row.reason))?;
        Ok(StockMovement {
            id: row.movement_id.into(),
            product_id: row.product_id.into(),
            delta: row.delta,
            reason,
            source: row.source,
            idempotency_key: row.idempotency_key,
            quantity_after: row.quantity_after,
            created_at: row.created_at,
        })
    }
}
