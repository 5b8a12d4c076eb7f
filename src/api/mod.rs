mod accounts;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod rate_limit;
mod reservations;
mod slots;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, tighter rate limit)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Read-only lot state
    let public_routes = Router::new()
        .route("/slots", get(slots::list_slots))
        .route("/occupancy", get(slots::occupancy));

    // Protected API routes
    let protected_routes = Router::new()
        .route("/me", get(accounts::me))
        .route("/me/vehicle", put(accounts::set_vehicle))
        .route("/availability", get(slots::availability))
        .route(
            "/reservations",
            get(reservations::list_reservations).post(reservations::create_reservation),
        )
        .route(
            "/reservations/:id",
            get(reservations::get_reservation).delete(reservations::cancel_reservation),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api_routes = public_routes
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::Days;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db;
    use crate::ledger::SlotCatalogue;

    async fn test_app() -> (Router, Arc<AppState>) {
        let pool = db::init_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(Config::default(), pool, SlotCatalogue::standard()));
        (create_router(state.clone()), state)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register, log in and return the session token.
    async fn sign_up(app: &Router, username: &str) -> String {
        let credentials = json!({ "username": username, "password": "password-123" });
        let (status, _) = send(app, Method::POST, "/api/auth/register", None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(app, Method::POST, "/api/auth/login", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn add_vehicle(app: &Router, token: &str, vehicle: &str) {
        let (status, _) = send(
            app,
            Method::PUT,
            "/api/me/vehicle",
            Some(token),
            Some(json!({ "vehicle_number": vehicle })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    fn tomorrow(state: &AppState) -> String {
        state
            .now()
            .date()
            .checked_add_days(Days::new(1))
            .unwrap()
            .format("%Y-%m-%d")
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/reservations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = send(&app, Method::GET, "/api/me", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let (app, _) = test_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "x", "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["username"].is_array());
        assert!(body["error"]["details"]["password"].is_array());

        sign_up(&app, "frank").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "frank", "password": "password-456" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "Username already exists");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "frank", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_vehicle_is_set_once() {
        let (app, _) = test_app().await;
        let token = sign_up(&app, "grace").await;

        let (status, body) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "grace");
        assert!(body["vehicle_number"].is_null());

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/me/vehicle",
            Some(&token),
            Some(json!({ "vehicle_number": "??" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        add_vehicle(&app, &token, "ka01 ab 1234").await;
        let (_, body) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(body["vehicle_number"], "KA01 AB 1234");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/me/vehicle",
            Some(&token),
            Some(json!({ "vehicle_number": "KA02 CD 5678" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[tokio::test]
    async fn test_booking_flow() {
        let (app, state) = test_app().await;
        let date = tomorrow(&state);
        let alice = sign_up(&app, "alice").await;
        let bob = sign_up(&app, "bob").await;

        let booking = json!({ "slot": "a1", "date": date, "entry": "10:00", "exit": "12:00" });

        // No vehicle yet
        let (status, body) =
            send(&app, Method::POST, "/api/reservations", Some(&alice), Some(booking.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["vehicle_number"].is_array());

        add_vehicle(&app, &alice, "KA01 AB 1234").await;
        add_vehicle(&app, &bob, "KA02 CD 5678").await;

        let (status, created) =
            send(&app, Method::POST, "/api/reservations", Some(&alice), Some(booking.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["slot"], "A1");
        assert_eq!(created["start_at"], format!("{} 10:00", date));
        assert_eq!(created["status"], "upcoming");

        // Same slot, overlapping window
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&bob),
            Some(json!({ "slot": "A1", "date": date, "entry": "11:00", "exit": "13:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "Slot A1 is occupied during this time range");

        // Alice cannot hold a second overlapping booking
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&alice),
            Some(json!({ "slot": "A2", "date": date, "entry": "11:00", "exit": "13:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["error"]["message"],
            "You already have a booking that overlaps this time range"
        );

        // Back-to-back on the same slot is fine
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&bob),
            Some(json!({ "slot": "A1", "date": date, "entry": "12:00", "exit": "14:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/availability?date={}&entry=10:30&exit=11:30", date);
        let (status, body) = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocked"], json!(["A1"]));
        assert_eq!(body["available"].as_array().unwrap().len(), 19);
        assert_eq!(body["has_conflict"], false);

        let (status, list) = send(&app, Method::GET, "/api/reservations", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let id = created["id"].as_str().unwrap();
        let uri = format!("/api/reservations/{}", id);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_booking_rejects_past_date_and_unknown_slot() {
        let (app, state) = test_app().await;
        let token = sign_up(&app, "heidi").await;
        add_vehicle(&app, &token, "KA01 AB 1234").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&token),
            Some(json!({ "slot": "A1", "date": "2000-01-01", "entry": "10:00", "exit": "12:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Date cannot be in the past");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&token),
            Some(json!({ "slot": "Z9", "date": tomorrow(&state), "entry": "10:00", "exit": "12:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["slot"].is_array());
    }

    #[tokio::test]
    async fn test_booking_past_year_9999_is_a_validation_error() {
        let (app, _) = test_app().await;
        let token = sign_up(&app, "ivan").await;
        add_vehicle(&app, &token, "KA01 AB 5678").await;

        for booking in [
            json!({ "slot": "A1", "date": "9999-12-31", "entry": "22:00", "exit": "06:00" }),
            json!({ "slot": "A1", "date": "10000-01-01", "entry": "10:00", "exit": "12:00" }),
        ] {
            let (status, body) =
                send(&app, Method::POST, "/api/reservations", Some(&token), Some(booking)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["code"], "validation_error");
            assert!(body["error"]["details"]["date"].is_array());
        }

        let (_, list) = send(&app, Method::GET, "/api/reservations", Some(&token), None).await;
        assert_eq!(list.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_login_failures_look_alike() {
        let (app, _) = test_app().await;
        sign_up(&app, "judy").await;

        let (status, wrong_password) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "judy", "password": "not-the-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown_user) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "nobody", "password": "not-the-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_user);
    }

    #[tokio::test]
    async fn test_occupancy_grid() {
        let (app, state) = test_app().await;
        let token = sign_up(&app, "ivan").await;
        add_vehicle(&app, &token, "KA01 AB 1234").await;

        let date = tomorrow(&state);
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/reservations",
            Some(&token),
            Some(json!({ "slot": "B3", "date": date, "entry": "22:00", "exit": "06:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/occupancy?at={}T23:30", date);
        let (status, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["occupied_count"], 1);
        assert_eq!(body["total"], 20);
        let occupied: Vec<&str> = body["slots"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|s| s["occupied"] == true)
            .map(|s| s["slot"].as_str().unwrap())
            .collect();
        assert_eq!(occupied, vec!["B3"]);

        let (status, body) = send(&app, Method::GET, "/api/occupancy?at=garbage", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_logout_revokes_session() {
        let (app, _) = test_app().await;
        let token = sign_up(&app, "judy").await;

        let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
