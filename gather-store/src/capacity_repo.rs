use async_trait::async_trait;
use gather_catalog::{CapacitySnapshot, RateCategory};
use gather_core::{CapacityLedger, LedgerError, SeatReservation};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::{count, ledger_error};

/// Seat counters in Postgres.
///
/// Every reservation updates the `events` row first, so its row lock
/// serializes concurrent bookers of the same event across API instances,
/// and the `reserved_total < max_capacity` predicate is evaluated under that
/// lock. The category counter is bumped in the same transaction.
pub struct PgCapacityLedger {
    pool: PgPool,
}

impl PgCapacityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn max_capacity(tx: &mut Transaction<'_, Postgres>, event_id: Uuid) -> Result<Option<i32>, LedgerError> {
        sqlx::query_scalar("SELECT max_capacity FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(ledger_error)
    }
}

#[async_trait]
impl CapacityLedger for PgCapacityLedger {
    async fn reserve_seat(&self, event_id: Uuid, category: &RateCategory) -> Result<SeatReservation, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_error)?;

        let totals: Option<(i32, i32)> = sqlx::query_as(
            r#"
            UPDATE events
            SET reserved_total = reserved_total + 1, updated_at = NOW()
            WHERE id = $1 AND reserved_total < max_capacity
            RETURNING reserved_total, max_capacity
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ledger_error)?;

        let Some((total, max_capacity)) = totals else {
            // Dropping `tx` rolls back.
            return match Self::max_capacity(&mut tx, event_id).await? {
                Some(max_capacity) => Err(LedgerError::CapacityExceeded {
                    event_id,
                    max_capacity: count(max_capacity),
                }),
                None => Err(LedgerError::UnknownEvent(event_id)),
            };
        };

        let category_count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE event_categories
            SET participants = participants + 1
            WHERE event_id = $1 AND category = $2
            RETURNING participants
            "#,
        )
        .bind(event_id)
        .bind(category.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(ledger_error)?;

        let Some(category_count) = category_count else {
            return Err(LedgerError::UnknownCategory(category.to_string()));
        };

        tx.commit().await.map_err(ledger_error)?;

        Ok(SeatReservation {
            event_id,
            category: category.clone(),
            category_count: count(category_count),
            total: count(total),
            max_capacity: count(max_capacity),
        })
    }

    async fn release_seat(&self, event_id: Uuid, category: &RateCategory) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_error)?;

        let released: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE events
            SET reserved_total = reserved_total - 1, updated_at = NOW()
            WHERE id = $1 AND reserved_total > 0
            RETURNING reserved_total
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ledger_error)?;

        if released.is_none() {
            return match Self::max_capacity(&mut tx, event_id).await? {
                Some(_) => Err(LedgerError::NothingToRelease(category.to_string())),
                None => Err(LedgerError::UnknownEvent(event_id)),
            };
        }

        let category_released: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE event_categories
            SET participants = participants - 1
            WHERE event_id = $1 AND category = $2 AND participants > 0
            RETURNING participants
            "#,
        )
        .bind(event_id)
        .bind(category.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(ledger_error)?;

        if category_released.is_none() {
            return Err(LedgerError::NothingToRelease(category.to_string()));
        }

        tx.commit().await.map_err(ledger_error)?;
        Ok(())
    }

    async fn snapshot(&self, event_id: Uuid) -> Result<CapacitySnapshot, LedgerError> {
        let max_capacity: Option<i32> = sqlx::query_scalar("SELECT max_capacity FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ledger_error)?;
        let max_capacity = max_capacity.ok_or(LedgerError::UnknownEvent(event_id))?;

        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT category, participants FROM event_categories WHERE event_id = $1")
                .bind(event_id)
                .fetch_all(&self.pool)
                .await
                .map_err(ledger_error)?;

        Ok(CapacitySnapshot::new(
            count(max_capacity),
            rows.into_iter().map(|(c, n)| (RateCategory::new(&c), count(n))),
        ))
    }
}
