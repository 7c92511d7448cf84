use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use gather_catalog::{Event, Venue};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub category: String,
    pub price: String,
    pub amount_minor: Option<i64>,
    pub requires_payment: bool,
    pub participants: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration: String,
    pub schedule: String,
    pub venue: Venue,
    pub max_capacity: u32,
    pub remaining_seats: u32,
    pub categories: Vec<CategoryView>,
}

impl EventView {
    pub fn new(event: &Event, currency: &str) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            date: event.schedule.date,
            start_time: event.schedule.start_time,
            duration: event.schedule.duration.clone(),
            schedule: event.schedule.to_string(),
            venue: event.venue.clone(),
            max_capacity: event.max_capacity,
            remaining_seats: event.remaining_seats(),
            categories: event
                .categories
                .iter()
                .map(|r| CategoryView {
                    category: r.category.to_string(),
                    price: r.price.display(currency),
                    amount_minor: r.price.amount_minor(),
                    requires_payment: r.price.requires_payment(),
                    participants: r.participants,
                })
                .collect(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events", get(list_events))
        .route("/v1/events/{id}", get(get_event))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<EventView>>, AppError> {
    let currency = state.orchestrator.order_service().default_currency();
    let events = state.catalog.list_events().await.map_err(AppError::store)?;
    Ok(Json(events.iter().map(|e| EventView::new(e, currency)).collect()))
}

async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<EventView>, AppError> {
    let event = state
        .catalog
        .get_event(id)
        .await
        .map_err(AppError::store)?
        .ok_or_else(|| AppError::NotFoundError(format!("Event {} not found", id)))?;
    Ok(Json(EventView::new(&event, state.orchestrator.order_service().default_currency())))
}
