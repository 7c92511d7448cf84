use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gather_core::StoreError;
use gather_order::{BookingError, BookingFailure};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    BadRequest(String),
    ValidationError(String),
    NotFoundError(String),
    ServiceUnavailable(String),
    InternalServerError(String),
    /// A booking attempt that ended short of confirmation.
    Booking(BookingFailure),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn store(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFoundError(what),
            StoreError::Invalid(msg) => AppError::ValidationError(msg),
            StoreError::Duplicate { existing } => {
                AppError::ValidationError(format!("already exists: {}", existing))
            }
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}

fn booking_status(error: &BookingError) -> StatusCode {
    match error {
        BookingError::Validation(_) | BookingError::UnknownCategory(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::EventNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
        BookingError::NotAuthentic { .. } | BookingError::OrderMismatch { .. } => StatusCode::BAD_REQUEST,
        BookingError::EventFull { .. } => StatusCode::CONFLICT,
        BookingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::ReconciliationRequired { .. } | BookingError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn booking_response(failure: BookingFailure) -> Response {
    let status = booking_status(&failure.error);
    if status.is_server_error() {
        tracing::error!(stage = %failure.stage, "Booking failed: {}", failure.error);
    } else {
        tracing::info!(stage = %failure.stage, kind = failure.error.kind(), "Booking refused: {}", failure.error);
    }

    let mut body = json!({
        "error": failure.error.user_message(),
        "kind": failure.error.kind(),
        "stage": failure.stage,
    });
    match &failure.error {
        BookingError::Validation(fields) => body["fields"] = json!(fields),
        BookingError::EventFull { reference: Some(reference), .. }
        | BookingError::ReconciliationRequired { reference, .. } => body["reference"] = json!(reference),
        _ => {}
    }

    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Booking(failure) => return booking_response(failure),
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
