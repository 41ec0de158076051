use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method, StatusCode,
};
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use common_auth::{TokenIssuer, TokenVerifier};

use crate::analytics_handlers::{dashboard_counters, dashboard_counters_groomer};
use crate::api_key::{require_api_key, ApiKeys};
use crate::auth_handlers::{bump_admin_epoch, change_password, login, logout_all};
use crate::booking_handlers::{
    cancel_booking, complete_booking, create_booking, list_bookings, my_bookings,
    reschedule_booking, start_booking,
};
use crate::transaction_handlers::record_payment;

pub static API_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new(
            "http_errors_total",
            "Count of HTTP error responses emitted (status >= 400)",
        ),
        &["service", "code", "status"],
    )
    .unwrap();
    API_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub async fn http_error_metrics(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        HTTP_ERRORS_TOTAL
            .with_label_values(&["grooming-api", code, status.as_str()])
            .inc();
    }
    resp
}

pub async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = API_REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<TokenVerifier>,
    pub api_keys: ApiKeys,
}

impl axum::extract::FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.issuer.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-api-key"),
        ]);

    // Everything behind the API-key perimeter; only health and metrics stay
    // outside it.
    let protected = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/changePassword", post(change_password))
        .route("/auth/logoutAll", post(logout_all))
        .route("/admin/security/bumpEpoch", post(bump_admin_epoch))
        .route("/analytics/dashboardCounters", get(dashboard_counters))
        .route(
            "/analytics/dashboardCountersGroomer",
            get(dashboard_counters_groomer),
        )
        .route("/bookings/myBookings", get(my_bookings))
        .route("/bookings/startBooking/:booking_id", put(start_booking))
        .route("/bookings/completeBooking/:booking_id", put(complete_booking))
        .route("/bookings/new", post(create_booking))
        .route("/bookings/list", get(list_bookings))
        .route("/bookings/delete/:booking_id", delete(cancel_booking))
        .route("/bookings/update/:booking_id", put(reschedule_booking))
        .route("/transactions/new", post(record_payment))
        .layer(middleware::from_fn_with_state(
            state.api_keys.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(http_error_metrics))
}
