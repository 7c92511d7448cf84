use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gather_catalog::RateCategory;
use gather_core::{Booking, BookingId, BookingStatus, BookingStore, ContactDetails, IdempotencyKey, StoreError};
use gather_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::catalog_repo::{price_columns, price_from_columns};
use crate::database::store_error;

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: String,
    event_id: Uuid,
    event_title: String,
    category: String,
    amount_minor: Option<i64>,
    amount_label: Option<String>,
    currency: String,
    order_handle: String,
    payment_handle: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    customer_age: i16,
    dietary_notes: Option<String>,
    prior_experience: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

const BOOKING_COLUMNS: &str = "id, event_id, event_title, category, amount_minor, amount_label, currency, \
     order_handle, payment_handle, customer_name, customer_email, customer_phone, customer_age, \
     dietary_notes, prior_experience, status, created_at";

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "CONFIRMED" => BookingStatus::Confirmed,
            other => return Err(StoreError::Invalid(format!("unknown booking status {}", other))),
        };
        let age = u8::try_from(row.customer_age)
            .map_err(|_| StoreError::Invalid(format!("customer age {} out of range", row.customer_age)))?;

        Ok(Booking {
            id: BookingId::from_raw(row.id),
            event_id: row.event_id,
            event_title: row.event_title,
            category: RateCategory::new(&row.category),
            amount: price_from_columns(row.amount_minor, row.amount_label)?,
            currency: row.currency,
            order_handle: row.order_handle,
            payment_handle: row.payment_handle,
            customer: ContactDetails {
                name: row.customer_name,
                email: Masked(row.customer_email),
                phone: Masked(row.customer_phone),
                age,
            },
            dietary_notes: row.dietary_notes,
            prior_experience: row.prior_experience,
            status,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_booking(&self, booking: &Booking) -> Result<BookingId, StoreError> {
        let (amount_minor, amount_label) = price_columns(&booking.amount);

        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (id, event_id, event_title, category, amount_minor, amount_label, currency,
                                  order_handle, payment_handle, customer_name, customer_email, customer_phone,
                                  customer_age, dietary_notes, prior_experience, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (order_handle, payment_handle) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(booking.id.as_str())
        .bind(booking.event_id)
        .bind(&booking.event_title)
        .bind(booking.category.as_str())
        .bind(amount_minor)
        .bind(amount_label)
        .bind(&booking.currency)
        .bind(&booking.order_handle)
        .bind(&booking.payment_handle)
        .bind(&booking.customer.name)
        .bind(booking.customer.email.expose())
        .bind(booking.customer.phone.expose())
        .bind(i16::from(booking.customer.age))
        .bind(&booking.dietary_notes)
        .bind(&booking.prior_experience)
        .bind(booking.status.to_string())
        .bind(booking.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        if let Some(id) = inserted {
            tracing::debug!(booking_id = %id, order_id = %booking.order_handle, "Booking row inserted");
            return Ok(BookingId::from_raw(id));
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM bookings WHERE order_handle = $1 AND payment_handle = $2")
                .bind(&booking.order_handle)
                .bind(&booking.payment_handle)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        match existing {
            Some(id) => Err(StoreError::Duplicate { existing: BookingId::from_raw(id) }),
            None => Err(StoreError::Unavailable(format!(
                "insert for {} conflicted but no row is visible",
                booking.idempotency_key()
            ))),
        }
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE order_handle = $1 AND payment_handle = $2",
            BOOKING_COLUMNS
        ))
        .bind(&key.order_handle)
        .bind(&key.payment_handle)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, event_id: Option<Uuid>) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = match event_id {
            Some(event_id) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bookings WHERE event_id = $1 ORDER BY created_at, id",
                    BOOKING_COLUMNS
                ))
                .bind(event_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!("SELECT {} FROM bookings ORDER BY created_at, id", BOOKING_COLUMNS))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(store_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
