//! PostgreSQL document counters
//!
//! `next_value` is a single upsert, so concurrent callers serialize on the
//! counter row and never receive the same value.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, PortError, SequencePort};

use super::db_to_port_error;
use crate::error::DatabaseError;

const NEXT_VALUE: &str = r#"
    INSERT INTO sequences (key, value) VALUES ($1, 1)
    ON CONFLICT (key) DO UPDATE SET value = sequences.value + 1
    RETURNING value
"#;

#[derive(Debug, Clone)]
pub struct PostgresSequenceStore {
    pool: PgPool,
}

impl PostgresSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresSequenceStore {}

#[async_trait]
impl SequencePort for PostgresSequenceStore {
    #[instrument(skip(self))]
    async fn next_value(&self, key: &str) -> Result<u64, PortError> {
        let value: i64 = sqlx::query_scalar(NEXT_VALUE)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(db_to_port_error)?;
        counter(value)
    }

    async fn current_value(&self, key: &str) -> Result<u64, PortError> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sequences WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_to_port_error)?;
        counter(value.unwrap_or(0))
    }
}

/// Counter column value; the schema never stores a negative one
fn counter(value: i64) -> Result<u64, PortError> {
    u64::try_from(value).map_err(|_| db_to_port_error(DatabaseError::decode("sequences.value", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accepts_stored_values() {
        assert_eq!(counter(0).unwrap(), 0);
        assert_eq!(counter(42).unwrap(), 42);
    }

    #[test]
    fn test_negative_counter_is_a_decode_error() {
        let error = counter(-1).unwrap_err();
        assert!(error.to_string().contains("sequences.value"));
    }
}
