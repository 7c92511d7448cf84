use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use gather_catalog::{CategoryRate, Event, Price, RateCategory, Schedule, Venue};
use gather_core::{EventCatalog, StoreError};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{count, store_error};

pub struct PgEventCatalog {
    pool: PgPool,
}

impl PgEventCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    event_date: NaiveDate,
    start_time: NaiveTime,
    duration: String,
    venue_name: String,
    venue_address: String,
    max_capacity: i32,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    event_id: Uuid,
    category: String,
    price_minor: Option<i64>,
    price_label: Option<String>,
    participants: i32,
}

const EVENT_COLUMNS: &str =
    "id, title, event_date, start_time, duration, venue_name, venue_address, max_capacity";
const CATEGORY_COLUMNS: &str = "event_id, category, price_minor, price_label, participants";

pub(crate) fn price_from_columns(minor: Option<i64>, label: Option<String>) -> Result<Price, StoreError> {
    match (minor, label) {
        (Some(amount), _) if amount > 0 => Ok(Price::fixed(amount)),
        (None, Some(label)) => Ok(Price::placeholder(label)),
        (minor, label) => Err(StoreError::Invalid(format!(
            "price columns out of shape: minor={:?} label={:?}",
            minor, label
        ))),
    }
}

pub(crate) fn price_columns(price: &Price) -> (Option<i64>, Option<String>) {
    match price {
        Price::Fixed { amount_minor } => (Some(*amount_minor), None),
        Price::Placeholder { label } => (None, Some(label.clone())),
    }
}

fn assemble(row: EventRow, categories: Vec<CategoryRow>) -> Result<Event, StoreError> {
    let categories = categories
        .into_iter()
        .map(|c| -> Result<CategoryRate, StoreError> {
            Ok(CategoryRate {
                category: RateCategory::new(&c.category),
                price: price_from_columns(c.price_minor, c.price_label)?,
                participants: count(c.participants),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Event {
        id: row.id,
        title: row.title,
        schedule: Schedule {
            date: row.event_date,
            start_time: row.start_time,
            duration: row.duration,
        },
        venue: Venue {
            name: row.venue_name,
            address: row.venue_address,
        },
        max_capacity: count(row.max_capacity),
        categories,
    })
}

#[async_trait]
impl EventCatalog for PgEventCatalog {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let categories: Vec<CategoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM event_categories WHERE event_id = $1 ORDER BY position, category",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        assemble(row, categories).map(Some)
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM events ORDER BY event_date, title",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let categories: Vec<CategoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM event_categories ORDER BY event_id, position, category",
            CATEGORY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut by_event: HashMap<Uuid, Vec<CategoryRow>> = HashMap::new();
        for c in categories {
            by_event.entry(c.event_id).or_default().push(c);
        }

        rows.into_iter()
            .map(|row| {
                let categories = by_event.remove(&row.id).unwrap_or_default();
                assemble(row, categories)
            })
            .collect()
    }

    /// Writes descriptive fields and prices. Participant counters are left
    /// to the ledger; a category that still has participants cannot be removed.
    async fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        event.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;
        let max_capacity = i32::try_from(event.max_capacity)
            .map_err(|_| StoreError::Invalid("max capacity too large".to_string()))?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let reserved: Option<i32> = sqlx::query_scalar("SELECT reserved_total FROM events WHERE id = $1 FOR UPDATE")
            .bind(event.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

        match reserved {
            Some(reserved) => {
                if max_capacity < reserved {
                    return Err(StoreError::Invalid(format!(
                        "max capacity {} is below the {} seats already reserved",
                        max_capacity, reserved
                    )));
                }
                sqlx::query(
                    r#"
                    UPDATE events
                    SET title = $2, event_date = $3, start_time = $4, duration = $5,
                        venue_name = $6, venue_address = $7, max_capacity = $8, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(event.id)
                .bind(&event.title)
                .bind(event.schedule.date)
                .bind(event.schedule.start_time)
                .bind(&event.schedule.duration)
                .bind(&event.venue.name)
                .bind(&event.venue.address)
                .bind(max_capacity)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO events (id, title, event_date, start_time, duration, venue_name, venue_address, max_capacity)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(event.id)
                .bind(&event.title)
                .bind(event.schedule.date)
                .bind(event.schedule.start_time)
                .bind(&event.schedule.duration)
                .bind(&event.venue.name)
                .bind(&event.venue.address)
                .bind(max_capacity)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            }
        }

        let existing: Vec<(String, i32)> = sqlx::query_as(
            "SELECT category, participants FROM event_categories WHERE event_id = $1 FOR UPDATE",
        )
        .bind(event.id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_error)?;

        for (category, participants) in existing {
            let kept = event.categories.iter().any(|r| r.category.as_str() == category);
            if kept {
                continue;
            }
            if participants > 0 {
                return Err(StoreError::Invalid(format!(
                    "category {} has {} participants and cannot be removed",
                    category, participants
                )));
            }
            sqlx::query("DELETE FROM event_categories WHERE event_id = $1 AND category = $2")
                .bind(event.id)
                .bind(&category)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }

        for (position, rate) in event.categories.iter().enumerate() {
            let (price_minor, price_label) = price_columns(&rate.price);
            sqlx::query(
                r#"
                INSERT INTO event_categories (event_id, category, position, price_minor, price_label)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (event_id, category)
                DO UPDATE SET position = EXCLUDED.position,
                              price_minor = EXCLUDED.price_minor,
                              price_label = EXCLUDED.price_label
                "#,
            )
            .bind(event.id)
            .bind(rate.category.as_str())
            .bind(position as i32)
            .bind(price_minor)
            .bind(price_label)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        tracing::info!(event_id = %event.id, title = %event.title, "Event saved");
        Ok(())
    }
}
