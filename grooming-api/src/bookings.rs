use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use common_http_errors::ApiError;

use crate::pagination::{Page, PageMeta, Timeframe};

/// Failed one-time code attempts tolerated per booking before the booking
/// locks. A 4-digit code cannot survive unbounded guessing.
pub const MAX_OTP_ATTEMPTS: i16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<BookingStatus> {
        match s {
            "scheduled" => Some(BookingStatus::Scheduled),
            "in_progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valid transitions:
/// scheduled -> in_progress   (start, gated by start_otp)
/// in_progress -> completed   (complete, gated by end_otp)
/// scheduled -> cancelled
/// Everything else is rejected; completed and cancelled are terminal.
pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
    matches!(
        (from, to),
        (BookingStatus::Scheduled, BookingStatus::InProgress)
            | (BookingStatus::InProgress, BookingStatus::Completed)
            | (BookingStatus::Scheduled, BookingStatus::Cancelled)
    )
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("booking not found")]
    NotFound,
    #[error("booking is {current}, cannot {action}")]
    InvalidState {
        current: BookingStatus,
        action: &'static str,
    },
    #[error("wrong {stage} code")]
    OtpMismatch { stage: &'static str },
    #[error("too many failed code attempts")]
    OtpLocked,
    #[error("booking row has unknown status '{0}'")]
    UnknownStatus(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<BookingError> for ApiError {
    fn from(value: BookingError) -> Self {
        match value {
            BookingError::NotFound => ApiError::NotFound { what: "booking" },
            BookingError::InvalidState { current, action } => ApiError::InvalidState {
                current: current.as_str().to_string(),
                action,
            },
            BookingError::OtpMismatch { stage } => ApiError::OtpMismatch { stage },
            BookingError::OtpLocked => ApiError::OtpLocked,
            BookingError::UnknownStatus(status) => {
                ApiError::internal(format!("unknown booking status '{status}'"))
            }
            BookingError::Db(err) => ApiError::internal(err),
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub groomer_id: Uuid,
    pub pet_name: String,
    pub service_name: String,
    pub amount_minor: i64,
    pub scheduled_slot: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BOOKING_COLUMNS: &str = "id, customer_id, groomer_id, pet_name, service_name, amount_minor, \
     scheduled_slot, status, notes, started_at, completed_at, cancelled_at, created_at, updated_at";

#[derive(Debug)]
pub struct NewBooking {
    pub groomer_id: Uuid,
    pub pet_name: String,
    pub service_name: String,
    pub amount_minor: i64,
    pub scheduled_slot: DateTime<Utc>,
    pub notes: Option<String>,
}

pub async fn create_booking(
    pool: &PgPool,
    customer_id: Uuid,
    new: NewBooking,
    start_otp: &str,
    end_otp: &str,
) -> Result<Booking, BookingError> {
    let sql = format!(
        "INSERT INTO bookings (id, customer_id, groomer_id, pet_name, service_name, amount_minor, \
         scheduled_slot, status, start_otp, end_otp, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'scheduled', $8, $9, $10) \
         RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&sql)
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(new.groomer_id)
        .bind(new.pet_name)
        .bind(new.service_name)
        .bind(new.amount_minor)
        .bind(new.scheduled_slot)
        .bind(start_otp)
        .bind(end_otp)
        .bind(new.notes)
        .fetch_one(pool)
        .await?;
    info!(booking_id = %booking.id, customer_id = %customer_id, "booking created");
    Ok(booking)
}

#[derive(Debug, Clone, Copy)]
enum OtpStage {
    Start,
    End,
}

impl OtpStage {
    fn label(self) -> &'static str {
        match self {
            OtpStage::Start => "start",
            OtpStage::End => "end",
        }
    }

    fn action(self) -> &'static str {
        match self {
            OtpStage::Start => "start",
            OtpStage::End => "complete",
        }
    }

    fn expected_state(self) -> BookingStatus {
        match self {
            OtpStage::Start => BookingStatus::Scheduled,
            OtpStage::End => BookingStatus::InProgress,
        }
    }

    fn lock_sql(self) -> &'static str {
        match self {
            OtpStage::Start => {
                "SELECT status, start_otp AS otp, otp_attempts FROM bookings \
                 WHERE id = $1 AND groomer_id = $2 FOR UPDATE"
            }
            OtpStage::End => {
                "SELECT status, end_otp AS otp, otp_attempts FROM bookings \
                 WHERE id = $1 AND groomer_id = $2 FOR UPDATE"
            }
        }
    }

    fn apply_sql(self) -> String {
        match self {
            OtpStage::Start => format!(
                "UPDATE bookings SET status = 'in_progress', started_at = now(), \
                 otp_attempts = 0, updated_at = now() WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
            ),
            OtpStage::End => format!(
                "UPDATE bookings SET status = 'completed', completed_at = now(), \
                 otp_attempts = 0, updated_at = now() WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
            ),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OtpGateRow {
    status: String,
    otp: String,
    otp_attempts: i16,
}

/// The state-check-then-update runs under a row lock so two concurrent calls
/// against the same booking serialize: the loser re-reads the new status and
/// fails with a state error instead of double-applying the transition.
async fn otp_transition(
    pool: &PgPool,
    booking_id: Uuid,
    groomer_id: Uuid,
    presented: &str,
    stage: OtpStage,
) -> Result<Booking, BookingError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OtpGateRow>(stage.lock_sql())
        .bind(booking_id)
        .bind(groomer_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Err(BookingError::NotFound);
    };

    let current = BookingStatus::from_str(&row.status)
        .ok_or_else(|| BookingError::UnknownStatus(row.status.clone()))?;
    if current != stage.expected_state() {
        return Err(BookingError::InvalidState {
            current,
            action: stage.action(),
        });
    }

    if row.otp_attempts >= MAX_OTP_ATTEMPTS {
        return Err(BookingError::OtpLocked);
    }

    if row.otp != presented {
        sqlx::query("UPDATE bookings SET otp_attempts = otp_attempts + 1, updated_at = now() WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(if row.otp_attempts + 1 >= MAX_OTP_ATTEMPTS {
            BookingError::OtpLocked
        } else {
            BookingError::OtpMismatch {
                stage: stage.label(),
            }
        });
    }

    let apply_sql = stage.apply_sql();
    let booking = sqlx::query_as::<_, Booking>(&apply_sql)
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(booking_id = %booking_id, status = %booking.status, "booking transition applied");
    Ok(booking)
}

pub async fn start_booking(
    pool: &PgPool,
    booking_id: Uuid,
    groomer_id: Uuid,
    start_otp: &str,
) -> Result<Booking, BookingError> {
    otp_transition(pool, booking_id, groomer_id, start_otp, OtpStage::Start).await
}

pub async fn complete_booking(
    pool: &PgPool,
    booking_id: Uuid,
    groomer_id: Uuid,
    end_otp: &str,
) -> Result<Booking, BookingError> {
    otp_transition(pool, booking_id, groomer_id, end_otp, OtpStage::End).await
}

pub async fn reschedule_booking(
    pool: &PgPool,
    booking_id: Uuid,
    customer_id: Uuid,
    new_slot: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    let mut tx = pool.begin().await?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM bookings WHERE id = $1 AND customer_id = $2 FOR UPDATE",
    )
    .bind(booking_id)
    .bind(customer_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(status) = status else {
        return Err(BookingError::NotFound);
    };

    let current =
        BookingStatus::from_str(&status).ok_or_else(|| BookingError::UnknownStatus(status.clone()))?;
    if current != BookingStatus::Scheduled {
        return Err(BookingError::InvalidState {
            current,
            action: "reschedule",
        });
    }

    let sql = format!(
        "UPDATE bookings SET scheduled_slot = $2, updated_at = now() WHERE id = $1 \
         RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&sql)
        .bind(booking_id)
        .bind(new_slot)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(booking_id = %booking_id, slot = %new_slot, "booking rescheduled");
    Ok(booking)
}

pub async fn cancel_booking(
    pool: &PgPool,
    booking_id: Uuid,
    customer_id: Uuid,
) -> Result<Booking, BookingError> {
    let mut tx = pool.begin().await?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM bookings WHERE id = $1 AND customer_id = $2 FOR UPDATE",
    )
    .bind(booking_id)
    .bind(customer_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(status) = status else {
        return Err(BookingError::NotFound);
    };

    let current =
        BookingStatus::from_str(&status).ok_or_else(|| BookingError::UnknownStatus(status.clone()))?;
    if !is_valid_transition(current, BookingStatus::Cancelled) {
        return Err(BookingError::InvalidState {
            current,
            action: "cancel",
        });
    }

    let sql = format!(
        "UPDATE bookings SET status = 'cancelled', cancelled_at = now(), updated_at = now() \
         WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&sql)
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(booking_id = %booking_id, "booking cancelled");
    Ok(booking)
}

/// Whose bookings a history query may see. Customers and groomers are scoped
/// to their own rows; admin tooling queries cross-actor.
#[derive(Debug, Clone, Copy)]
pub enum ActorScope {
    Customer(Uuid),
    Groomer(Uuid),
}

#[derive(Debug)]
pub struct BookingFilter {
    pub timeframe: Timeframe,
    pub status: Option<BookingStatus>,
    pub search: Option<String>,
}

pub async fn list_bookings(
    pool: &PgPool,
    scope: ActorScope,
    filter: &BookingFilter,
    page: Page,
) -> Result<(Vec<Booking>, PageMeta), BookingError> {
    let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM bookings WHERE ");
    push_filters(&mut count, scope, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE "));
    push_filters(&mut query, scope, filter);
    // Upcoming reads soonest-first; past and the mixed view read most recent
    // first. Booking id breaks slot ties so pages stay stable.
    match filter.timeframe {
        Timeframe::Upcoming => {
            query.push(" ORDER BY scheduled_slot ASC, id ASC");
        }
        Timeframe::Past | Timeframe::All => {
            query.push(" ORDER BY scheduled_slot DESC, id ASC");
        }
    }
    query.push(" LIMIT ");
    query.push_bind(page.limit);
    query.push(" OFFSET ");
    query.push_bind(page.offset());

    let records = query.build_query_as::<Booking>().fetch_all(pool).await?;
    Ok((records, PageMeta::new(total, page)))
}

fn push_filters(builder: &mut QueryBuilder<Postgres>, scope: ActorScope, filter: &BookingFilter) {
    match scope {
        ActorScope::Customer(id) => {
            builder.push("customer_id = ");
            builder.push_bind(id);
        }
        ActorScope::Groomer(id) => {
            builder.push("groomer_id = ");
            builder.push_bind(id);
        }
    }
    match filter.timeframe {
        Timeframe::Upcoming => {
            builder.push(" AND scheduled_slot >= now()");
        }
        Timeframe::Past => {
            builder.push(" AND scheduled_slot < now()");
        }
        Timeframe::All => {}
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(term) = &filter.search {
        let pattern = format!("%{}%", term.trim());
        builder.push(" AND (pet_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR service_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR notes ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BookingStatus; 4] = [
        BookingStatus::Scheduled,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    #[test]
    fn transition_table_is_exhaustive() {
        let allowed = [
            (BookingStatus::Scheduled, BookingStatus::InProgress),
            (BookingStatus::InProgress, BookingStatus::Completed),
            (BookingStatus::Scheduled, BookingStatus::Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    is_valid_transition(from, to),
                    allowed.contains(&(from, to)),
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn cancelled_is_not_reachable_from_in_progress() {
        assert!(!is_valid_transition(
            BookingStatus::InProgress,
            BookingStatus::Cancelled
        ));
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in ALL {
            assert_eq!(BookingStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::from_str("pending"), None);
        assert_eq!(BookingStatus::from_str(""), None);
    }
}
