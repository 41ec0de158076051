use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common_http_errors::{ApiError, ApiResult};

use crate::app::AppState;
use crate::bookings::{self, ActorScope, Booking, BookingFilter, BookingStatus, NewBooking};
use crate::guards::{CustomerSession, GroomerSession};
use crate::pagination::{Page, PageMeta, Timeframe};

#[derive(Debug, Serialize)]
pub struct BookingPage {
    pub records: Vec<Booking>,
    pub pagination: PageMeta,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "upcomingPast")]
    pub upcoming_past: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
}

/// Customer booking history: own rows only, filterable and paginated.
pub async fn list_bookings(
    State(state): State<AppState>,
    session: CustomerSession,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<BookingPage>> {
    let page = Page::new(query.page, query.limit);
    let timeframe = Timeframe::parse(query.upcoming_past.as_deref()).ok_or_else(|| {
        ApiError::bad_request("invalid_timeframe", "upcomingPast must be upcoming, past or all")
    })?;
    let status = parse_status_filter(query.status.as_deref())?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string);

    let filter = BookingFilter {
        timeframe,
        status,
        search,
    };
    let (records, pagination) = bookings::list_bookings(
        &state.db,
        ActorScope::Customer(session.claims.subject),
        &filter,
        page,
    )
    .await?;

    Ok(Json(BookingPage {
        records,
        pagination,
    }))
}

#[derive(Deserialize)]
pub struct MyBookingsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

/// Groomer work queue: own assignments, most recent slots first.
pub async fn my_bookings(
    State(state): State<AppState>,
    session: GroomerSession,
    Query(query): Query<MyBookingsQuery>,
) -> ApiResult<Json<BookingPage>> {
    let page = Page::new(query.page, query.limit);
    let status = parse_status_filter(query.status.as_deref())?;

    let filter = BookingFilter {
        timeframe: Timeframe::All,
        status,
        search: None,
    };
    let (records, pagination) = bookings::list_bookings(
        &state.db,
        ActorScope::Groomer(session.claims.subject),
        &filter,
        page,
    )
    .await?;

    Ok(Json(BookingPage {
        records,
        pagination,
    }))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub groomer_id: Uuid,
    pub pet_name: String,
    pub service_name: String,
    pub amount_minor: i64,
    pub scheduled_slot: DateTime<Utc>,
    pub notes: Option<String>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    session: CustomerSession,
    Json(body): Json<CreateBookingRequest>,
) -> ApiResult<Json<Booking>> {
    if body.pet_name.trim().is_empty() || body.service_name.trim().is_empty() {
        return Err(ApiError::bad_request(
            "missing_fields",
            "pet_name and service_name must not be empty",
        ));
    }
    if body.amount_minor <= 0 {
        return Err(ApiError::bad_request(
            "invalid_amount",
            "amount_minor must be positive",
        ));
    }
    if body.scheduled_slot <= Utc::now() {
        return Err(ApiError::bad_request(
            "slot_in_past",
            "scheduled_slot must be in the future",
        ));
    }

    let new = NewBooking {
        groomer_id: body.groomer_id,
        pet_name: body.pet_name,
        service_name: body.service_name,
        amount_minor: body.amount_minor,
        scheduled_slot: body.scheduled_slot,
        notes: body.notes,
    };
    let booking = bookings::create_booking(
        &state.db,
        session.claims.subject,
        new,
        &generate_otp(),
        &generate_otp(),
    )
    .await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct StartBookingRequest {
    pub start_otp: String,
}

pub async fn start_booking(
    State(state): State<AppState>,
    session: GroomerSession,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<StartBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = bookings::start_booking(
        &state.db,
        booking_id,
        session.claims.subject,
        body.start_otp.trim(),
    )
    .await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct CompleteBookingRequest {
    pub end_otp: String,
}

pub async fn complete_booking(
    State(state): State<AppState>,
    session: GroomerSession,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<CompleteBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = bookings::complete_booking(
        &state.db,
        booking_id,
        session.claims.subject,
        body.end_otp.trim(),
    )
    .await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_slot: DateTime<Utc>,
}

pub async fn reschedule_booking(
    State(state): State<AppState>,
    session: CustomerSession,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<RescheduleRequest>,
) -> ApiResult<Json<Booking>> {
    if body.scheduled_slot <= Utc::now() {
        return Err(ApiError::bad_request(
            "slot_in_past",
            "scheduled_slot must be in the future",
        ));
    }
    let booking = bookings::reschedule_booking(
        &state.db,
        booking_id,
        session.claims.subject,
        body.scheduled_slot,
    )
    .await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    session: CustomerSession,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let booking = bookings::cancel_booking(&state.db, booking_id, session.claims.subject).await?;
    Ok(Json(booking))
}

fn parse_status_filter(value: Option<&str>) -> ApiResult<Option<BookingStatus>> {
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(raw) => BookingStatus::from_str(raw).map(Some).ok_or_else(|| {
            ApiError::bad_request(
                "invalid_status",
                format!("unknown booking status '{raw}'"),
            )
        }),
    }
}

/// 4-digit codes exchanged out-of-band at the start and end of a visit.
fn generate_otp() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    format!("{:04}", u32::from_le_bytes(bytes) % 10_000)
}
