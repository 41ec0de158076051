use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use http::{Request, StatusCode};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use common_auth::{Role, TokenConfig, TokenIssuer, TokenSubject, TokenVerifier};
use grooming_api::bookings::{self, BookingError};
use grooming_api::{build_router, epoch, ApiKeys, AppState};

const API_KEY: &str = "test-suite";

static MIGRATIONS: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn run_migrations(pool: &PgPool) {
    use sqlx::Executor;
    // Simple query protocol so the whole schema can ship as one batch.
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS users (
          id uuid PRIMARY KEY,
          name text NOT NULL,
          email text NOT NULL UNIQUE,
          phone text NULL,
          role text NOT NULL,
          password_hash text NOT NULL DEFAULT '',
          token_version int NOT NULL DEFAULT 1,
          is_active boolean NOT NULL DEFAULT true,
          failed_attempts smallint NOT NULL DEFAULT 0,
          locked_until timestamptz NULL,
          created_at timestamptz NOT NULL DEFAULT now(),
          updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS admin_token_epoch (
          id smallint PRIMARY KEY,
          epoch int NOT NULL DEFAULT 1,
          updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS bookings (
          id uuid PRIMARY KEY,
          customer_id uuid NOT NULL,
          groomer_id uuid NOT NULL,
          pet_name text NOT NULL,
          service_name text NOT NULL,
          amount_minor bigint NOT NULL,
          scheduled_slot timestamptz NOT NULL,
          status text NOT NULL DEFAULT 'scheduled',
          start_otp text NOT NULL,
          end_otp text NOT NULL,
          otp_attempts smallint NOT NULL DEFAULT 0,
          notes text NULL,
          started_at timestamptz NULL,
          completed_at timestamptz NULL,
          cancelled_at timestamptz NULL,
          created_at timestamptz NOT NULL DEFAULT now(),
          updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS payment_transactions (
          id uuid PRIMARY KEY,
          booking_id uuid NOT NULL,
          amount_minor bigint NOT NULL,
          method text NOT NULL,
          status text NOT NULL DEFAULT 'completed',
          notes text NULL,
          created_at timestamptz NOT NULL DEFAULT now()
        );
        INSERT INTO admin_token_epoch (id, epoch) VALUES (1, 1) ON CONFLICT (id) DO NOTHING;
    "#,
    )
    .await
    .expect("create test schema");
}

async fn start_test_db() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP booking_flow: TEST_DATABASE_URL not set");
            return None;
        }
    };
    let pool = match PgPool::connect(&url).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("SKIP booking_flow: cannot connect: {err}");
            return None;
        }
    };
    MIGRATIONS
        .get_or_init(|| async {
            run_migrations(&pool).await;
        })
        .await;
    Some(pool)
}

fn token_config() -> TokenConfig {
    TokenConfig::new(
        "test-issuer",
        "test-audience",
        "grooming-test-secret-0123456789abcdef",
    )
}

fn build_test_app(pool: PgPool) -> Router {
    let state = AppState {
        db: pool,
        issuer: Arc::new(TokenIssuer::new(token_config())),
        verifier: Arc::new(TokenVerifier::new(token_config())),
        api_keys: ApiKeys::from_csv(API_KEY),
    };
    build_router(state)
}

fn issue_token(role: Role, user_id: Uuid, token_version: i32) -> String {
    TokenIssuer::new(token_config())
        .issue(TokenSubject {
            user_id,
            role,
            token_version,
        })
        .expect("issue token")
        .token
}

async fn seed_user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind("Test User")
        .bind(format!("{id}@example.test"))
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    id
}

#[allow(clippy::too_many_arguments)]
async fn seed_booking(
    pool: &PgPool,
    customer_id: Uuid,
    groomer_id: Uuid,
    pet_name: &str,
    status: &str,
    slot: DateTime<Utc>,
    start_otp: &str,
    end_otp: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO bookings (id, customer_id, groomer_id, pet_name, service_name, amount_minor, \
         scheduled_slot, status, start_otp, end_otp) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(id)
    .bind(customer_id)
    .bind(groomer_id)
    .bind(pet_name)
    .bind("Full Groom")
    .bind(4500i64)
    .bind(slot)
    .bind(status)
    .bind(start_otp)
    .bind(end_otp)
    .execute(pool)
    .await
    .unwrap();
    id
}

fn api_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn customer_token_revoked_after_version_bump() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let token = issue_token(Role::Customer, customer, 1);

    let (status, _) = send(&app, api_request("GET", "/bookings/list", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    sqlx::query("UPDATE users SET token_version = 2 WHERE id = $1")
        .bind(customer)
        .execute(&pool)
        .await
        .unwrap();

    let (status, body) = send(&app, api_request("GET", "/bookings/list", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_revoked");

    // A token minted against the new version works again.
    let fresh = issue_token(Role::Customer, customer, 2);
    let (status, _) = send(&app, api_request("GET", "/bookings/list", Some(&fresh), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_epoch_bump_invalidates_admin_tokens() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let admin = seed_user(&pool, "admin").await;
    let current = epoch::current_epoch(&pool).await.unwrap();
    let token = issue_token(Role::Admin, admin, current);

    let (status, _) = send(
        &app,
        api_request("GET", "/analytics/dashboardCounters", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        api_request("POST", "/admin/security/bumpEpoch", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_epoch = body["epoch"].as_i64().unwrap();
    assert_eq!(new_epoch, i64::from(current) + 1);

    // The very token that performed the bump is dead now.
    let (status, body) = send(
        &app,
        api_request("GET", "/analytics/dashboardCounters", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_revoked");

    let fresh = issue_token(Role::Admin, admin, new_epoch as i32);
    let (status, _) = send(
        &app,
        api_request("GET", "/analytics/dashboardCounters", Some(&fresh), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn non_admin_cannot_reach_admin_routes() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let groomer = seed_user(&pool, "groomer").await;
    let token = issue_token(Role::Groomer, groomer, 1);

    let (status, body) = send(
        &app,
        api_request("GET", "/analytics/dashboardCounters", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "missing_role");
}

#[tokio::test]
async fn start_and_complete_flow_with_otps() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let slot = Utc::now() + Duration::hours(2);
    let booking = seed_booking(
        &pool, customer, groomer, "Biscuit", "scheduled", slot, "4821", "9911",
    )
    .await;
    let token = issue_token(Role::Groomer, groomer, 1);

    // Wrong code: distinct error, still scheduled.
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/startBooking/{booking}"),
            Some(&token),
            Some(serde_json::json!({"start_otp": "0000"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "otp_mismatch");

    // Correct code transitions to in_progress.
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/startBooking/{booking}"),
            Some(&token),
            Some(serde_json::json!({"start_otp": "4821"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert!(!body["started_at"].is_null());

    // Retrying the start with the same correct code is a clear state error.
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/startBooking/{booking}"),
            Some(&token),
            Some(serde_json::json!({"start_otp": "4821"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");

    // Groomer queue shows the in-progress visit.
    let (status, body) = send(
        &app,
        api_request(
            "GET",
            "/bookings/myBookings?status=in_progress",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&booking.to_string().as_str()));

    // Completion is gated by the end code.
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/completeBooking/{booking}"),
            Some(&token),
            Some(serde_json::json!({"end_otp": "1234"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "otp_mismatch");

    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/completeBooking/{booking}"),
            Some(&token),
            Some(serde_json::json!({"end_otp": "9911"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(!body["completed_at"].is_null());

    // Payment is recordable once the visit has happened.
    let (status, body) = send(
        &app,
        api_request(
            "POST",
            "/transactions/new",
            Some(&token),
            Some(serde_json::json!({
                "booking_id": booking,
                "amount_minor": 4500,
                "method": "upi"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["method"], "upi");
}

#[tokio::test]
async fn payment_rejected_before_visit_starts() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let slot = Utc::now() + Duration::hours(4);
    let booking = seed_booking(
        &pool, customer, groomer, "Mochi", "scheduled", slot, "1111", "2222",
    )
    .await;
    let token = issue_token(Role::Groomer, groomer, 1);

    let (status, body) = send(
        &app,
        api_request(
            "POST",
            "/transactions/new",
            Some(&token),
            Some(serde_json::json!({
                "booking_id": booking,
                "amount_minor": 4500,
                "method": "cash"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");
}

#[tokio::test]
async fn otp_lockout_after_repeated_mismatches() {
    let Some(pool) = start_test_db().await else { return };

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let slot = Utc::now() + Duration::hours(1);
    let booking = seed_booking(
        &pool, customer, groomer, "Truffle", "scheduled", slot, "7777", "8888",
    )
    .await;

    for attempt in 1..=4 {
        let err = bookings::start_booking(&pool, booking, groomer, "0000")
            .await
            .expect_err("wrong code must fail");
        assert!(
            matches!(err, BookingError::OtpMismatch { stage: "start" }),
            "attempt {attempt} should be a mismatch, got {err:?}"
        );
    }

    // Fifth failure trips the lock.
    let err = bookings::start_booking(&pool, booking, groomer, "0000")
        .await
        .expect_err("fifth wrong code must lock");
    assert!(matches!(err, BookingError::OtpLocked));

    // Even the correct code is refused once locked.
    let err = bookings::start_booking(&pool, booking, groomer, "7777")
        .await
        .expect_err("locked booking refuses correct code");
    assert!(matches!(err, BookingError::OtpLocked));
}

#[tokio::test]
async fn concurrent_starts_have_exactly_one_winner() {
    let Some(pool) = start_test_db().await else { return };

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let slot = Utc::now() + Duration::hours(1);
    let booking = seed_booking(
        &pool, customer, groomer, "Waffles", "scheduled", slot, "4242", "2424",
    )
    .await;

    let (first, second) = tokio::join!(
        bookings::start_booking(&pool, booking, groomer, "4242"),
        bookings::start_booking(&pool, booking, groomer, "4242"),
    );

    let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent start may succeed");
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser.expect_err("loser must fail"),
        BookingError::InvalidState { .. }
    ));
}

#[tokio::test]
async fn pagination_over_upcoming_bookings() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let base = Utc::now() + Duration::days(1);

    let mut seeded = Vec::new();
    for i in 0..25 {
        let slot = base + Duration::hours(i);
        let id = seed_booking(
            &pool, customer, groomer, "Biscuit", "scheduled", slot, "1111", "2222",
        )
        .await;
        seeded.push(id);
    }

    let token = issue_token(Role::Customer, customer, 1);
    let (status, body) = send(
        &app,
        api_request(
            "GET",
            "/bookings/list?page=2&limit=10&upcomingPast=upcoming",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["pagination"]["total"], 25);
    assert_eq!(body["pagination"]["total_pages"], 3);
    assert_eq!(body["pagination"]["page"], 2);

    let returned: Vec<String> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = seeded[10..20].iter().map(|id| id.to_string()).collect();
    assert_eq!(returned, expected, "page 2 must hold records 11-20 in slot order");
}

#[tokio::test]
async fn search_filters_by_pet_name() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let base = Utc::now() + Duration::days(2);
    seed_booking(&pool, customer, groomer, "Clementine", "scheduled", base, "1111", "2222").await;
    seed_booking(
        &pool,
        customer,
        groomer,
        "Sir Barksalot",
        "scheduled",
        base + Duration::hours(1),
        "1111",
        "2222",
    )
    .await;

    let token = issue_token(Role::Customer, customer, 1);
    let (status, body) = send(
        &app,
        api_request("GET", "/bookings/list?search=barksalot", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["records"][0]["pet_name"], "Sir Barksalot");
}

#[tokio::test]
async fn reschedule_and_cancel_state_rules() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    let groomer = seed_user(&pool, "groomer").await;
    let token = issue_token(Role::Customer, customer, 1);

    // A completed visit cannot move.
    let done = seed_booking(
        &pool,
        customer,
        groomer,
        "Biscuit",
        "completed",
        Utc::now() - Duration::days(1),
        "1111",
        "2222",
    )
    .await;
    let new_slot = Utc::now() + Duration::days(3);
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/update/{done}"),
            Some(&token),
            Some(serde_json::json!({"scheduled_slot": new_slot.to_rfc3339()})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");

    // A scheduled one reschedules, then cancels, then refuses a second cancel.
    let open = seed_booking(
        &pool,
        customer,
        groomer,
        "Biscuit",
        "scheduled",
        Utc::now() + Duration::days(1),
        "1111",
        "2222",
    )
    .await;
    let (status, body) = send(
        &app,
        api_request(
            "PUT",
            &format!("/bookings/update/{open}"),
            Some(&token),
            Some(serde_json::json!({"scheduled_slot": new_slot.to_rfc3339()})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stored: DateTime<Utc> = body["scheduled_slot"]
        .as_str()
        .unwrap()
        .parse()
        .expect("slot parses");
    assert_eq!(stored.timestamp(), new_slot.timestamp());

    let (status, body) = send(
        &app,
        api_request("DELETE", &format!("/bookings/delete/{open}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(
        &app,
        api_request("DELETE", &format!("/bookings/delete/{open}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");
}

#[tokio::test]
async fn login_then_password_change_revokes_old_sessions() {
    let Some(pool) = start_test_db().await else { return };
    let app = build_test_app(pool.clone());

    let customer = seed_user(&pool, "customer").await;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(hash_password("squeaky-clean-pup"))
        .bind(customer)
        .execute(&pool)
        .await
        .unwrap();
    let email = format!("{customer}@example.test");

    let (status, body) = send(
        &app,
        api_request(
            "POST",
            "/auth/login",
            None,
            Some(serde_json::json!({"email": email, "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credential");

    let (status, body) = send(
        &app,
        api_request(
            "POST",
            "/auth/login",
            None,
            Some(serde_json::json!({"email": email, "password": "squeaky-clean-pup"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["role"], "customer");

    let (status, _) = send(&app, api_request("GET", "/bookings/list", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        api_request(
            "POST",
            "/auth/changePassword",
            Some(&token),
            Some(serde_json::json!({
                "current_password": "squeaky-clean-pup",
                "new_password": "extra-fluffy-towel"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The pre-rotation token is revoked everywhere.
    let (status, body) = send(&app, api_request("GET", "/bookings/list", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_revoked");

    let (status, _) = send(
        &app,
        api_request(
            "POST",
            "/auth/login",
            None,
            Some(serde_json::json!({"email": email, "password": "extra-fluffy-towel"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn hash_password(password: &str) -> String {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;
    use rand_core::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}
