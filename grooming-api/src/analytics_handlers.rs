use axum::extract::State;
use axum::Json;
use serde::Serialize;

use common_http_errors::{ApiError, ApiResult};

use crate::app::AppState;
use crate::guards::{AdminSession, GroomerSession};

#[derive(Serialize)]
pub struct DashboardCounters {
    pub customers: i64,
    pub groomers: i64,
    pub bookings_total: i64,
    pub scheduled: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub revenue_minor: i64,
}

/// Marketplace-wide summary counts for the admin dashboard.
pub async fn dashboard_counters(
    State(state): State<AppState>,
    _session: AdminSession,
) -> ApiResult<Json<DashboardCounters>> {
    let (customers, groomers) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*) FILTER (WHERE role = 'customer'), \
                COUNT(*) FILTER (WHERE role = 'groomer') FROM users",
    )
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::internal)?;

    let (bookings_total, scheduled, in_progress, completed, cancelled) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE status = 'scheduled'), \
                    COUNT(*) FILTER (WHERE status = 'in_progress'), \
                    COUNT(*) FILTER (WHERE status = 'completed'), \
                    COUNT(*) FILTER (WHERE status = 'cancelled') FROM bookings",
        )
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::internal)?;

    let revenue_minor = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount_minor), 0)::bigint FROM payment_transactions \
         WHERE status = 'completed'",
    )
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::internal)?;

    Ok(Json(DashboardCounters {
        customers,
        groomers,
        bookings_total,
        scheduled,
        in_progress,
        completed,
        cancelled,
        revenue_minor,
    }))
}

#[derive(Serialize)]
pub struct GroomerDashboardCounters {
    pub today: i64,
    pub upcoming: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub earnings_minor: i64,
}

/// Per-groomer summary counts, scoped to the calling groomer's own bookings.
pub async fn dashboard_counters_groomer(
    State(state): State<AppState>,
    session: GroomerSession,
) -> ApiResult<Json<GroomerDashboardCounters>> {
    let (today, upcoming, in_progress, completed) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        "SELECT COUNT(*) FILTER (WHERE scheduled_slot::date = CURRENT_DATE), \
                COUNT(*) FILTER (WHERE status = 'scheduled' AND scheduled_slot >= now()), \
                COUNT(*) FILTER (WHERE status = 'in_progress'), \
                COUNT(*) FILTER (WHERE status = 'completed') \
         FROM bookings WHERE groomer_id = $1",
    )
    .bind(session.claims.subject)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::internal)?;

    let earnings_minor = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(t.amount_minor), 0)::bigint FROM payment_transactions t \
         JOIN bookings b ON b.id = t.booking_id \
         WHERE b.groomer_id = $1 AND t.status = 'completed'",
    )
    .bind(session.claims.subject)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::internal)?;

    Ok(Json(GroomerDashboardCounters {
        today,
        upcoming,
        in_progress,
        completed,
        earnings_minor,
    }))
}
