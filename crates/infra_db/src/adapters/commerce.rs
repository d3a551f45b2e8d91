//! PostgreSQL document and outbox store
//!
//! Quotes, invoices and delivery notes share one `documents` table: the
//! aggregate is kept as JSONB next to the columns the workflow filters on.
//! A change set is written in a single transaction together with its outbox
//! messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DeliveryNoteId, DomainPort, InvoiceId, OutboxMessageId, PortError, QuoteId};
use domain_commerce::{
    ChangeSet, DeliveryNote, DocumentPort, Invoice, InvoiceStatus, OutboxCommand, OutboxMessage, OutboxPort,
    OutboxStatus, Quote, QuoteStatus, Versioned,
};

use super::db_to_port_error;
use crate::error::DatabaseError;

/// Columns shared by every stored document kind
trait StoredDocument: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const KIND: &'static str;

    fn document_id(&self) -> Uuid;
    fn number(&self) -> &str;
    fn status(&self) -> &'static str;
    fn version(&self) -> u64;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
}

macro_rules! stored_document {
    ($type:ty, $kind:literal) => {
        impl StoredDocument for $type {
            const KIND: &'static str = $kind;

            fn document_id(&self) -> Uuid {
                self.id.into()
            }
            fn number(&self) -> &str {
                &self.number
            }
            fn status(&self) -> &'static str {
                self.status.as_str()
            }
            fn version(&self) -> u64 {
                self.version
            }
            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }
    };
}

stored_document!(Quote, "QUOTE");
stored_document!(Invoice, "INVOICE");
stored_document!(DeliveryNote, "DELIVERY_NOTE");

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load<T: StoredDocument>(&self, id: Uuid) -> Result<Option<T>, PortError> {
        let body: Option<Json<T>> = sqlx::query_scalar("SELECT body FROM documents WHERE kind = $1 AND document_id = $2")
            .bind(T::KIND)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_to_port_error)?;
        Ok(body.map(|Json(document)| document))
    }

    async fn with_statuses<T: StoredDocument>(&self, statuses: Vec<&'static str>) -> Result<Vec<T>, PortError> {
        let bodies: Vec<Json<T>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE kind = $1 AND status = ANY($2) ORDER BY number",
        )
        .bind(T::KIND)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(db_to_port_error)?;
        Ok(bodies.into_iter().map(|Json(document)| document).collect())
    }
}

/// Inserts a new document or updates one stored at the expected version
async fn save<T: StoredDocument>(
    tx: &mut Transaction<'_, Postgres>,
    versioned: &Versioned<T>,
) -> Result<(), DatabaseError> {
    let document = &versioned.document;
    let written = if versioned.expected_version == 0 {
        sqlx::query(
            r#"
            INSERT INTO documents (document_id, kind, number, status, version, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (document_id) DO NOTHING
            "#,
        )
        .bind(document.document_id())
        .bind(T::KIND)
        .bind(document.number())
        .bind(document.status())
        .bind(document.version() as i64)
        .bind(Json(document))
        .bind(document.created_at())
        .bind(document.updated_at())
        .execute(&mut **tx)
        .await?
        .rows_affected()
    } else {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = $3, version = $4, body = $5, updated_at = $6
            WHERE document_id = $1 AND kind = $2 AND version = $7
            "#,
        )
        .bind(document.document_id())
        .bind(T::KIND)
        .bind(document.status())
        .bind(document.version() as i64)
        .bind(Json(document))
        .bind(document.updated_at())
        .bind(versioned.expected_version as i64)
        .execute(&mut **tx)
        .await?
        .rows_affected()
    };

    if written == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "{} {}: expected version {}",
            T::KIND,
            document.number(),
            versioned.expected_version
        )));
    }
    Ok(())
}

impl DomainPort for PostgresDocumentStore {}

#[async_trait]
impl DocumentPort for PostgresDocumentStore {
    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, PortError> {
        self.load(id.into()).await
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.load(id.into()).await
    }

    async fn get_delivery_note(&self, id: DeliveryNoteId) -> Result<Option<DeliveryNote>, PortError> {
        self.load(id.into()).await
    }

    async fn quotes_with_status(&self, status: QuoteStatus) -> Result<Vec<Quote>, PortError> {
        self.with_statuses(vec![status.as_str()]).await
    }

    async fn invoices_with_status(&self, statuses: &[InvoiceStatus]) -> Result<Vec<Invoice>, PortError> {
        self.with_statuses(statuses.iter().map(|s| s.as_str()).collect()).await
    }

    #[instrument(
        skip(self, changes),
        fields(
            quotes = changes.quotes.len(),
            invoices = changes.invoices.len(),
            delivery_notes = changes.delivery_notes.len(),
            messages = changes.messages.len()
        )
    )]
    async fn commit(&self, changes: &ChangeSet) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(db_to_port_error)?;

        for quote in &changes.quotes {
            save(&mut tx, quote).await.map_err(db_to_port_error)?;
        }
        for invoice in &changes.invoices {
            save(&mut tx, invoice).await.map_err(db_to_port_error)?;
        }
        for note in &changes.delivery_notes {
            save(&mut tx, note).await.map_err(db_to_port_error)?;
        }
        for message in &changes.messages {
            insert_message(&mut tx, message).await.map_err(db_to_port_error)?;
        }

        tx.commit().await.map_err(db_to_port_error)?;
        debug!("Change set committed");
        Ok(())
    }

    async fn delete_quote(&self, id: QuoteId, expected_version: u64) -> Result<(), PortError> {
        let deleted = sqlx::query("DELETE FROM documents WHERE kind = $1 AND document_id = $2 AND version = $3")
            .bind(Quote::KIND)
            .bind(Uuid::from(id))
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await
            .map_err(db_to_port_error)?
            .rows_affected();
        if deleted > 0 {
            return Ok(());
        }

        let stored: Option<i64> = sqlx::query_scalar("SELECT version FROM documents WHERE kind = $1 AND document_id = $2")
            .bind(Quote::KIND)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_to_port_error)?;
        Err(match stored {
            None => PortError::not_found("Quote", id),
            Some(version) => PortError::conflict(format!(
                "quote {id}: expected version {expected_version}, stored {version}"
            )),
        })
    }
}

async fn insert_message(tx: &mut Transaction<'_, Postgres>, message: &OutboxMessage) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (message_id, command, status, attempts, last_error, created_at, dispatched_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(message.id))
    .bind(Json(&message.command))
    .bind(message.status.as_str())
    .bind(message.attempts as i32)
    .bind(&message.last_error)
    .bind(message.created_at)
    .bind(message.dispatched_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl OutboxPort for PostgresDocumentStore {
    async fn pending(&self, limit: u32) -> Result<Vec<OutboxMessage>, PortError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT message_id, command, status, attempts, last_error, created_at, dispatched_at
            FROM outbox_messages
            WHERE status = 'pending'
            ORDER BY created_at, message_id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_to_port_error)?;
        rows.into_iter()
            .map(OutboxMessage::try_from)
            .collect::<Result<_, _>>()
            .map_err(db_to_port_error)
    }

    async fn mark_dispatched(&self, id: OutboxMessageId) -> Result<(), PortError> {
        let updated = sqlx::query(
            "UPDATE outbox_messages SET status = 'dispatched', attempts = attempts + 1, dispatched_at = NOW() \
             WHERE message_id = $1",
        )
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(db_to_port_error)?
        .rows_affected();
        if updated == 0 {
            return Err(PortError::not_found("OutboxMessage", id));
        }
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn record_failure(&self, id: OutboxMessageId, error: &str, dead: bool) -> Result<(), PortError> {
        let updated = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN $3 THEN 'dead' ELSE status END
            WHERE message_id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(error)
        .bind(dead)
        .execute(&self.pool)
        .await
        .map_err(db_to_port_error)?
        .rows_affected();
        if updated == 0 {
            return Err(PortError::not_found("OutboxMessage", id));
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    message_id: Uuid,
    command: Json<OutboxCommand>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = DatabaseError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let status = OutboxStatus::parse(&row.status).ok_or_else(|| DatabaseError::decode("status", &row.status))?;
        Ok(OutboxMessage {
            id: row.message_id.into(),
            command: row.command.0,
            status,
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
            dispatched_at: row.dispatched_at,
        })
    }
}
