use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use common_http_errors::{ApiError, ApiResult};

use crate::app::AppState;
use crate::bookings::{BookingError, BookingStatus};
use crate::guards::GroomerSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Cash => "cash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_minor: i64,
    pub method: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct NewTransactionRequest {
    pub booking_id: Uuid,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

/// Append a payment record against one of the groomer's bookings. Payments
/// are accepted during or after the visit, never for a booking that has not
/// started, and recording one never changes the booking status.
pub async fn record_payment(
    State(state): State<AppState>,
    session: GroomerSession,
    Json(body): Json<NewTransactionRequest>,
) -> ApiResult<Json<PaymentTransaction>> {
    if body.amount_minor <= 0 {
        return Err(ApiError::bad_request(
            "invalid_amount",
            "amount_minor must be positive",
        ));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::internal)?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM bookings WHERE id = $1 AND groomer_id = $2 FOR UPDATE",
    )
    .bind(body.booking_id)
    .bind(session.claims.subject)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::internal)?;
    let Some(status) = status else {
        return Err(ApiError::from(BookingError::NotFound));
    };

    let current = BookingStatus::from_str(&status)
        .ok_or_else(|| ApiError::internal(format!("unknown booking status '{status}'")))?;
    if !matches!(current, BookingStatus::InProgress | BookingStatus::Completed) {
        return Err(ApiError::from(BookingError::InvalidState {
            current,
            action: "record payment",
        }));
    }

    let payment_status = body.status.unwrap_or(PaymentStatus::Completed);
    let transaction = sqlx::query_as::<_, PaymentTransaction>(
        "INSERT INTO payment_transactions (id, booking_id, amount_minor, method, status, notes) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, booking_id, amount_minor, method, status, notes, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(body.booking_id)
    .bind(body.amount_minor)
    .bind(body.method.as_str())
    .bind(payment_status.as_str())
    .bind(body.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    tx.commit().await.map_err(ApiError::internal)?;

    info!(
        booking_id = %body.booking_id,
        transaction_id = %transaction.id,
        amount_minor = body.amount_minor,
        "payment recorded"
    );
    Ok(Json(transaction))
}
