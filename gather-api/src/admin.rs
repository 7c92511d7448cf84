use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use gather_catalog::{CategoryRate, Event, Price, RateCategory, Schedule, Venue};
use gather_core::{signature::constant_time_eq, Booking};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::EventView;
use crate::middleware::{admin_auth_middleware, issue_admin_token};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct BookingFilter {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub category: String,
    /// Either a plain amount ("500", "499.50") or a label such as "Pay at venue"
    pub price: String,
}

/// Event as edited in the back office. Participant counters are not editable.
#[derive(Debug, Deserialize)]
pub struct EventInput {
    pub title: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    #[serde(default)]
    pub duration: String,
    pub venue_name: String,
    #[serde(default)]
    pub venue_address: String,
    pub max_capacity: u32,
    pub categories: Vec<CategoryInput>,
}

impl EventInput {
    fn into_event(self, id: Uuid) -> Result<Event, AppError> {
        let categories = self
            .categories
            .into_iter()
            .map(|c| -> Result<CategoryRate, AppError> {
                let price = Price::parse(&c.price).map_err(|e| AppError::ValidationError(e.to_string()))?;
                Ok(CategoryRate {
                    category: RateCategory::new(&c.category),
                    price,
                    participants: 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let event = Event {
            id,
            title: self.title.trim().to_string(),
            schedule: Schedule {
                date: self.date,
                start_time: self.start_time,
                duration: self.duration,
            },
            venue: Venue {
                name: self.venue_name,
                address: self.venue_address,
            },
            max_capacity: self.max_capacity,
            categories,
        };
        event.validate().map_err(|e| AppError::ValidationError(e.to_string()))?;
        Ok(event)
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/admin/bookings", get(list_bookings))
        .route("/v1/admin/events/{id}", put(upsert_event))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new()
        .route("/v1/admin/session", post(create_session))
        .merge(protected)
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if !constant_time_eq(&req.password, state.auth.admin_password.expose()) {
        tracing::warn!("Admin login rejected");
        return Err(AppError::AuthenticationError("Invalid credentials".to_string()));
    }

    let (token, _) = issue_admin_token(&state.auth)?;
    tracing::info!("Admin session issued");
    Ok(Json(SessionResponse {
        token,
        expires_in: state.auth.expiration,
    }))
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state
        .bookings
        .list_bookings(filter.event_id)
        .await
        .map_err(AppError::store)?;
    Ok(Json(bookings))
}

async fn upsert_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<EventInput>,
) -> Result<Json<EventView>, AppError> {
    let event = input.into_event(id)?;
    state.catalog.upsert_event(&event).await.map_err(AppError::store)?;

    let stored = state
        .catalog
        .get_event(id)
        .await
        .map_err(AppError::store)?
        .ok_or_else(|| AppError::NotFoundError(format!("Event {} not found", id)))?;
    Ok(Json(EventView::new(&stored, state.orchestrator.order_service().default_currency())))
}
