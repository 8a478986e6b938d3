//! Project RED REST API
//!
//! HTTP API layer, built with Axum. Paths keep their trailing slashes
//! because the web and mobile front-ends call them that way.
//!
//! # Endpoints
//!
//! ## Accounts
//! - `/api/auth/{register,login,logout,request_password_reset,reset_password}/`
//! - `/api/password-reset/{request,confirm}/` - Aliases
//! - `/api/token/`, `/api/token/refresh/`
//! - `/api/hospital-auth/{register,login,logout,request_password_reset,reset_password}/`
//! - `/api/hospital-password-reset/{request,confirm}/` - Aliases
//!
//! ## Resources
//! - `/api/users/`, `/api/hospitals/`, `/api/hospital-coordinates/`
//! - `/api/blood-requests/`, `/api/available-blood-requests/`
//! - `/api/donations/`, `/api/complete-donation/:id/`
//! - `/api/blood-tests/`, `/api/chat-rooms/`, `/api/notifications/`
//! - `/api/assignments/`
//!
//! ## Hospital dashboard
//! - `/api/hospital-dashboard/donors/`
//! - `/api/hospital-dashboard/assignments/:id/{submit_blood_test,update_blood_test}/`
//! - `/api/hospital-dashboard/assignments/:id/{generate_prediction,mark_as_completed}/`
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws?token=` - Notification and chat subscriptions
//! - `GET /ws/chat/:room_id?token=` - A single chat room
//!
//! # Example
//!
//! ```rust,ignore
//! use project_red::api::{serve, AppState};
//! use project_red::config::Config;
//! use project_red::storage::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default();
//!     let db = Arc::new(Database::open(&config.database.path)?);
//!     serve(AppState::from_config(config, db)?).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, Services};

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::websocket::{chat_socket_handler, websocket_handler};

use routes::{
    assignments, auth, blood_requests, blood_tests, chat, dashboard, donations, health,
    hospital_auth, hospitals, notifications, users,
};

fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register/", post(auth::register))
        .route("/auth/login/", post(auth::login))
        .route("/auth/logout/", post(auth::logout))
        .route(
            "/auth/request_password_reset/",
            post(auth::request_password_reset),
        )
        .route("/auth/reset_password/", post(auth::reset_password))
        .route("/password-reset/request/", post(auth::request_password_reset))
        .route("/password-reset/confirm/", post(auth::reset_password))
        .route("/token/", post(auth::obtain_token))
        .route("/token/refresh/", post(auth::refresh_token))
        .route("/hospital-auth/register/", post(hospital_auth::register))
        .route("/hospital-auth/login/", post(hospital_auth::login))
        .route("/hospital-auth/logout/", post(hospital_auth::logout))
        .route(
            "/hospital-auth/request_password_reset/",
            post(hospital_auth::request_password_reset),
        )
        .route(
            "/hospital-auth/reset_password/",
            post(hospital_auth::reset_password),
        )
        .route(
            "/hospital-password-reset/request/",
            post(hospital_auth::request_password_reset),
        )
        .route(
            "/hospital-password-reset/confirm/",
            post(hospital_auth::reset_password),
        )
}

fn resource_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Users
        .route("/users/", get(users::list_users))
        .route("/users/profile/", get(users::profile))
        .route("/users/nearby_donors/", get(users::nearby_donors))
        .route(
            "/users/:id/",
            get(users::get_user)
                .put(users::update_user)
                .patch(users::update_user),
        )
        .route(
            "/users/:id/update_profile/",
            put(users::update_user).patch(users::update_user),
        )
        .route("/users/:id/change_password/", post(users::change_password))
        // Hospitals
        .route(
            "/hospitals/",
            get(hospitals::list_hospitals).post(hospitals::create_hospital),
        )
        .route(
            "/hospitals/nearby_hospitals/",
            get(hospitals::nearby_hospitals),
        )
        .route(
            "/hospitals/:id/",
            get(hospitals::get_hospital)
                .put(hospitals::update_hospital)
                .patch(hospitals::update_hospital)
                .delete(hospitals::delete_hospital),
        )
        .route(
            "/hospital-coordinates/",
            get(hospitals::hospital_coordinates),
        )
        // Blood requests
        .route(
            "/blood-requests/",
            get(blood_requests::list_requests).post(blood_requests::create_request),
        )
        .route("/blood-requests/:id/", get(blood_requests::get_request))
        .route(
            "/blood-requests/:id/cancel/",
            post(blood_requests::cancel_request),
        )
        .route(
            "/blood-requests/:id/find_best_donors/",
            get(blood_requests::find_best_donors),
        )
        .route(
            "/available-blood-requests/",
            get(blood_requests::available_requests),
        )
        // Donations
        .route(
            "/donations/",
            get(donations::list_donations).post(donations::create_donation),
        )
        .route(
            "/donations/:id/",
            get(donations::get_donation).patch(donations::update_donation),
        )
        .route("/donations/:id/accept/", post(donations::accept_donation))
        .route(
            "/donations/:id/chat_room/",
            get(donations::donation_chat_room),
        )
        .route(
            "/complete-donation/:id/",
            post(donations::complete_donation),
        )
        // Blood tests
        .route(
            "/blood-tests/",
            get(blood_tests::list_tests).post(blood_tests::create_test),
        )
        .route("/blood-tests/:id/", get(blood_tests::get_test))
        // Chat
        .route("/chat-rooms/", get(chat::list_rooms))
        .route("/chat-rooms/:id/", get(chat::get_room))
        .route("/chat-rooms/:id/messages/", get(chat::list_messages))
        .route("/chat-rooms/:id/send_message/", post(chat::send_message))
        // Notifications
        .route("/notifications/", get(notifications::list_notifications))
        .route(
            "/notifications/mark_all_read/",
            post(notifications::mark_all_read),
        )
        .route(
            "/notifications/unread_count/",
            get(notifications::unread_count),
        )
        .route(
            "/notifications/:id/",
            get(notifications::get_notification),
        )
        .route(
            "/notifications/:id/mark_read/",
            post(notifications::mark_read),
        )
        // Assignments
        .route("/assignments/", get(assignments::list_assignments))
}

fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donors/", get(dashboard::list_donors))
        .route(
            "/assignments/:id/submit_blood_test/",
            post(dashboard::submit_blood_test),
        )
        .route(
            "/assignments/:id/update_blood_test/",
            put(dashboard::update_blood_test).patch(dashboard::update_blood_test),
        )
        .route(
            "/assignments/:id/generate_prediction/",
            post(dashboard::generate_prediction),
        )
        .route(
            "/assignments/:id/mark_as_completed/",
            post(dashboard::mark_as_completed),
        )
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/", get(health::full_health));

    let cors = cors_layer(&state.config.api);
    let shared_state = Arc::new(state);

    Router::new()
        .nest(
            "/api",
            auth_routes()
                .merge(resource_routes())
                .nest("/hospital-dashboard", dashboard_routes()),
        )
        .route("/ws", get(websocket_handler))
        .route("/ws/chat/:room_id", get(chat_socket_handler))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.api.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Project RED API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Project RED API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::{Mailer, MemoryMailer};
    use crate::config::Config;
    use crate::storage::Database;

    /// In-memory state with a recording mailer and no external services
    pub fn test_state() -> (Arc<AppState>, Arc<MemoryMailer>) {
        let (state, mailer) = app_state();
        (Arc::new(state), mailer)
    }

    pub fn app_state() -> (AppState, Arc<MemoryMailer>) {
        let mut config = Config::default();
        config.auth.password_iterations = 1_000;
        config.auth.jwt_secret = "test-secret".to_string();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let mailer = Arc::new(MemoryMailer::default());
        let state = AppState::new(
            config,
            db,
            Services {
                mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
                completion: None,
                geocoder: None,
            },
        );
        (state, mailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        mailer: Arc<crate::auth::MemoryMailer>,
        hub: Arc<crate::websocket::ConnectionHub>,
    }

    fn create_test_app() -> TestApp {
        create_test_app_with(|_| {})
    }

    fn create_test_app_with(configure: impl FnOnce(&mut AppState)) -> TestApp {
        let (mut state, mailer) = test_support::app_state();
        configure(&mut state);
        TestApp {
            hub: Arc::clone(&state.ws_hub),
            router: build_router(state),
            mailer,
        }
    }

    fn registration(username: &str) -> Value {
        json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "donate-blood-1",
            "first_name": username,
            "last_name": "Test",
            "blood_group": "A+",
            "age": 30,
            "gender": "F",
            "address": "Kathmandu",
            "phone_number": "9800000000",
        })
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.call(Method::GET, uri, token, None).await
        }

        async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, token, Some(body)).await
        }

        async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.call(Method::PATCH, uri, token, Some(body)).await
        }

        /// Register from a raw body and return the access token and id
        async fn register_raw(&self, body: Value) -> (String, String) {
            let (status, body) = self.post("/api/auth/register/", None, body).await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            (
                body["access"].as_str().unwrap().to_string(),
                body["user"]["id"].as_str().unwrap().to_string(),
            )
        }

        /// Register a user and return the access token and id
        async fn register(&self, username: &str, lat: f64, lng: f64) -> (String, String) {
            let mut body = registration(username);
            body["location_lat"] = json!(lat);
            body["location_long"] = json!(lng);
            self.register_raw(body).await
        }

        /// Open an A+ request at central Kathmandu and return its id
        async fn open_request(&self, patient: &str, units: u32) -> String {
            let (status, request) = self
                .post(
                    "/api/blood-requests/",
                    Some(patient),
                    json!({
                        "blood_group": "A+",
                        "units_required": units,
                        "urgency": "high",
                        "reason": "surgery",
                        "location_lat": 27.7172,
                        "location_long": 85.3240,
                    }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{request}");
            request["id"].as_str().unwrap().to_string()
        }

        /// Offer a donation for a request and return its id
        async fn offer(&self, donor: &str, request_id: &str) -> String {
            let (status, donation) = self
                .post(
                    "/api/donations/",
                    Some(donor),
                    json!({"blood_request": request_id}),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{donation}");
            donation["id"].as_str().unwrap().to_string()
        }

        /// Accept a donation from near the patient; returns the response
        async fn accept(&self, donor: &str, donation_id: &str) -> (StatusCode, Value) {
            self.post(
                &format!("/api/donations/{donation_id}/accept/"),
                Some(donor),
                json!({"donor_lat": 27.7000, "donor_lng": 85.3000}),
            )
            .await
        }

        async fn request_status(&self, token: &str, request_id: &str) -> String {
            let (status, request) = self
                .get(&format!("/api/blood-requests/{request_id}/"), Some(token))
                .await;
            assert_eq!(status, StatusCode::OK, "{request}");
            request["status"].as_str().unwrap().to_string()
        }

        async fn notification_types(&self, token: &str) -> Vec<String> {
            let (_, notifications) = self.get("/api/notifications/", Some(token)).await;
            notifications
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|n| n["notification_type"].as_str().map(str::to_string))
                .collect()
        }

        /// Register a hospital with a staff account and log it in
        async fn hospital_token(&self) -> String {
            let (status, body) = self
                .post(
                    "/api/hospital-auth/register/",
                    None,
                    json!({
                        "username": "bir",
                        "email": "desk@bir.example.com",
                        "password": "hospital-pass-1",
                        "name": "Bir Hospital",
                        "address": "Mahaboudha",
                        "phone_number": "01-4221119",
                        "location_lat": 27.7050,
                        "location_long": 85.3140,
                    }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");

            let (status, body) = self
                .post(
                    "/api/hospital-auth/login/",
                    None,
                    json!({"username": "bir", "password": "hospital-pass-1"}),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["access"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app();
        let (status, _) = app.get("/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_test_app();
        let (status, _) = app.get("/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app();
        let (status, body) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["prediction_model"], false);
    }

    #[tokio::test]
    async fn test_register_login_profile() {
        let app = create_test_app();
        let (access, id) = app.register("sita", 27.7172, 85.3240).await;

        let (status, body) = app.get("/api/users/profile/", Some(&access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        assert!(body.get("password_hash").is_none());

        let (status, body) = app
            .post(
                "/api/auth/login/",
                None,
                json!({"username": "sita", "password": "donate-blood-1"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["refresh"].is_string());

        let (status, _) = app
            .post(
                "/api/auth/login/",
                None,
                json!({"username": "sita", "password": "wrong-password"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let app = create_test_app();
        app.register("sita", 27.7, 85.3).await;

        let (status, body) = app
            .post(
                "/api/auth/register/",
                None,
                json!({
                    "username": "sita",
                    "email": "other@example.com",
                    "password": "donate-blood-1",
                    "blood_group": "O+",
                    "age": 25,
                    "gender": "M",
                    "address": "Patan",
                    "phone_number": "9811111111",
                    "location_lat": 27.67,
                    "location_long": 85.32,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = create_test_app();
        let (status, _) = app.get("/api/users/profile/", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_hospital_token_rejected_on_user_endpoint() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;

        let (status, _) = app.get("/api/users/profile/", Some(&hospital)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .get("/api/hospital-dashboard/donors/", Some(&hospital))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_nearby_donors_requires_coordinates() {
        let app = create_test_app();
        let (access, _) = app.register("sita", 27.7172, 85.3240).await;

        let (status, body) = app
            .get("/api/users/nearby_donors/", Some(&access))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.to_string().contains("Latitude and longitude"));

        let (status, _) = app
            .get("/api/users/nearby_donors/?lat=abc&lng=85.3", Some(&access))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nearby_donors_excludes_caller() {
        let app = create_test_app();
        let (access, _) = app.register("sita", 27.7172, 85.3240).await;
        let (_, ram) = app.register("ram", 27.7000, 85.3000).await;
        app.register("far", 28.2096, 83.9856).await;

        let (status, body) = app
            .get(
                "/api/users/nearby_donors/?lat=27.7172&lng=85.3240&blood_group=A%2B",
                Some(&access),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let donors = body.as_array().unwrap();
        assert_eq!(donors.len(), 1);
        assert_eq!(donors[0]["id"], ram.as_str());
        assert!(donors[0]["distance"].as_f64().unwrap() < 5.0);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let app = create_test_app();
        app.register("sita", 27.7, 85.3).await;

        let (status, _) = app
            .post(
                "/api/password-reset/request/",
                None,
                json!({"email": "nobody@example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/api/auth/request_password_reset/",
                None,
                json!({"email": "sita@example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let body = app.mailer.sent.lock().unwrap()[0].body.clone();
        let marker = "/reset-password/";
        let start = body.find(marker).unwrap() + marker.len();
        let token = body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .trim_end_matches('/')
            .to_string();

        let (status, body) = app
            .post(
                "/api/password-reset/confirm/",
                None,
                json!({"token": token, "new_password": "brand-new-pass"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        // The token is bound to the old password hash
        let (status, _) = app
            .post(
                "/api/auth/reset_password/",
                None,
                json!({"token": token, "new_password": "another-pass-2"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/api/auth/login/",
                None,
                json!({"username": "sita", "password": "brand-new-pass"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_donation_lifecycle() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (donor, donor_id) = app.register("donor", 27.7000, 85.3000).await;

        // The donor is nearby with a matching group
        let (status, request) = app
            .post(
                "/api/blood-requests/",
                Some(&patient),
                json!({
                    "blood_group": "A+",
                    "units_required": 1,
                    "urgency": "high",
                    "reason": "surgery",
                    "location_lat": 27.7172,
                    "location_long": 85.3240,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{request}");
        let request_id = request["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .get("/api/notifications/unread_count/", Some(&donor))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unread_count"], 1);

        let (status, _) = app
            .post(
                "/api/donations/",
                Some(&patient),
                json!({"blood_request": request_id}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, donation) = app
            .post(
                "/api/donations/",
                Some(&donor),
                json!({"blood_request": request_id}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{donation}");
        assert_eq!(donation["status"], "pending");
        let donation_id = donation["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .post(
                "/api/donations/",
                Some(&donor),
                json!({"blood_request": request_id}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let accept_uri = format!("/api/donations/{donation_id}/accept/");
        let (status, _) = app.post(&accept_uri, Some(&donor), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, accepted) = app
            .post(
                &accept_uri,
                Some(&donor),
                json!({"donor_lat": 27.7000, "donor_lng": 85.3000}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{accepted}");
        assert_eq!(accepted["hospital"]["name"], "Bir Hospital");
        assert_eq!(accepted["ai_recommended"], false);
        let room_id = accepted["chat_room_id"].as_str().unwrap().to_string();
        let assignment_id = accepted["assignment_id"].as_str().unwrap().to_string();

        let send_uri = format!("/api/chat-rooms/{room_id}/send_message/");
        let (status, _) = app
            .post(&send_uri, Some(&patient), json!({"content": "  "}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, message) = app
            .post(&send_uri, Some(&patient), json!({"content": "Thank you!"}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{message}");
        assert_eq!(message["sender_name"], "patient Test");

        let (status, messages) = app
            .get(&format!("/api/chat-rooms/{room_id}/messages/"), Some(&donor))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages.as_array().unwrap().len(), 1);

        let (status, donors) = app
            .get("/api/hospital-dashboard/donors/", Some(&hospital))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(donors[0]["id"], donor_id.as_str());

        let dashboard = format!("/api/hospital-dashboard/assignments/{assignment_id}");
        let (status, test) = app
            .post(
                &format!("{dashboard}/submit_blood_test/"),
                Some(&hospital),
                json!({
                    "sugar_level": 90.0,
                    "uric_acid_level": 5.0,
                    "wbc_count": 7000.0,
                    "rbc_count": 5.0,
                    "hemoglobin": 14.0,
                    "platelet_count": 250000.0,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{test}");
        assert!(test["health_risk_prediction"].is_string());

        // Submitting the test closes the chat
        let (status, _) = app
            .post(&send_uri, Some(&donor), json!({"content": "See you"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, completed) = app
            .post(&format!("{dashboard}/mark_as_completed/"), Some(&hospital), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{completed}");
        assert_eq!(completed["status"], "completed");

        let (_, request) = app
            .get(&format!("/api/blood-requests/{request_id}/"), Some(&patient))
            .await;
        assert_eq!(request["status"], "completed");

        let (_, notifications) = app.get("/api/notifications/", Some(&donor)).await;
        let types: Vec<&str> = notifications
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["notification_type"].as_str())
            .collect();
        assert_eq!(types[0], "life_saved");
        assert!(types.contains(&"hospital_assigned"));
        assert!(types.contains(&"health_alert"));
    }

    #[tokio::test]
    async fn test_dashboard_hides_other_hospitals_assignments() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;

        let (status, _) = app
            .post(
                &format!(
                    "/api/hospital-dashboard/assignments/{}/generate_prediction/",
                    uuid::Uuid::new_v4()
                ),
                Some(&hospital),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn panel() -> Value {
        json!({
            "sugar_level": 90.0,
            "uric_acid_level": 5.0,
            "wbc_count": 7000.0,
            "rbc_count": 5.0,
            "hemoglobin": 14.0,
            "platelet_count": 250000.0,
        })
    }

    #[tokio::test]
    async fn test_cancelled_donation_releases_assignment_chat_and_request() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (donor, _) = app.register("donor", 27.7000, 85.3000).await;
        let (other_donor, _) = app.register("other", 27.7100, 85.3100).await;

        let request_id = app.open_request(&patient, 1).await;
        let donation_id = app.offer(&donor, &request_id).await;
        assert_eq!(app.request_status(&patient, &request_id).await, "donating");

        let (status, accepted) = app.accept(&donor, &donation_id).await;
        assert_eq!(status, StatusCode::OK, "{accepted}");
        let room_id = accepted["chat_room_id"].as_str().unwrap().to_string();
        let assignment_id = accepted["assignment_id"].as_str().unwrap().to_string();

        let donation_uri = format!("/api/donations/{donation_id}/");
        let (status, cancelled) = app
            .patch(&donation_uri, Some(&donor), json!({"status": "cancelled"}))
            .await;
        assert_eq!(status, StatusCode::OK, "{cancelled}");
        assert_eq!(cancelled["status"], "cancelled");

        // The request is open to other donors again
        assert_eq!(app.request_status(&patient, &request_id).await, "pending");
        let (status, available) = app
            .get("/api/available-blood-requests/", Some(&other_donor))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(available[0]["id"], request_id.as_str());

        let (status, _) = app
            .post(
                &format!("/api/chat-rooms/{room_id}/send_message/"),
                Some(&patient),
                json!({"content": "Are you coming?"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // The hospital can no longer act on the assignment
        let dashboard = format!("/api/hospital-dashboard/assignments/{assignment_id}");
        let (status, body) = app
            .post(&format!("{dashboard}/mark_as_completed/"), Some(&hospital), json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        let (status, _) = app
            .post(&format!("{dashboard}/submit_blood_test/"), Some(&hospital), panel())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, donors) = app
            .get("/api/hospital-dashboard/donors/", Some(&hospital))
            .await;
        assert_eq!(donors[0]["assignment_status"], "cancelled");
        assert_eq!(donors[0]["donation_status"], "cancelled");

        // Cancelled is final
        for next in ["scheduled", "completed", "pending"] {
            let (status, _) = app
                .patch(&donation_uri, Some(&donor), json!({"status": next}))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "cancelled -> {next}");
        }
        let (status, _) = app.accept(&donor, &donation_id).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // A fresh offer from the same donor is allowed again
        app.offer(&donor, &request_id).await;
        assert_eq!(app.request_status(&patient, &request_id).await, "donating");
    }

    #[tokio::test]
    async fn test_donation_accepted_only_once() {
        let app = create_test_app();
        app.hospital_token().await;
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (donor, _) = app.register("donor", 27.7000, 85.3000).await;

        let request_id = app.open_request(&patient, 1).await;
        let donation_id = app.offer(&donor, &request_id).await;

        let (status, first) = app.accept(&donor, &donation_id).await;
        assert_eq!(status, StatusCode::OK, "{first}");
        let (status, second) = app.accept(&donor, &donation_id).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{second}");

        let (_, assignments) = app.get("/api/assignments/", Some(&donor)).await;
        assert_eq!(assignments.as_array().unwrap().len(), 1);
        let hospital_assigned = app
            .notification_types(&donor)
            .await
            .into_iter()
            .filter(|t| t == "hospital_assigned")
            .count();
        assert_eq!(hospital_assigned, 1);
    }

    #[tokio::test]
    async fn test_request_needs_all_units_before_completing() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (first, _) = app.register("first", 27.7000, 85.3000).await;
        let (second, _) = app.register("second", 27.7050, 85.3100).await;

        let request_id = app.open_request(&patient, 2).await;
        let first_donation = app.offer(&first, &request_id).await;
        let second_donation = app.offer(&second, &request_id).await;
        let (_, accepted) = app.accept(&first, &first_donation).await;
        let first_assignment = accepted["assignment_id"].as_str().unwrap().to_string();
        let (_, accepted) = app.accept(&second, &second_donation).await;
        let second_assignment = accepted["assignment_id"].as_str().unwrap().to_string();

        let complete = |assignment: String| {
            format!("/api/hospital-dashboard/assignments/{assignment}/mark_as_completed/")
        };

        let (status, body) = app
            .post(&complete(first_assignment.clone()), Some(&hospital), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(app.request_status(&patient, &request_id).await, "donating");
        assert!(!app
            .notification_types(&first)
            .await
            .contains(&"life_saved".to_string()));

        // Completing again changes nothing
        let (status, _) = app
            .post(&complete(first_assignment), Some(&hospital), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.request_status(&patient, &request_id).await, "donating");

        let (status, _) = app
            .post(&complete(second_assignment), Some(&hospital), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.request_status(&patient, &request_id).await, "completed");
        assert_eq!(app.notification_types(&second).await[0], "life_saved");
        assert!(!app
            .notification_types(&first)
            .await
            .contains(&"life_saved".to_string()));

        // Completed is final
        let (status, _) = app
            .patch(
                &format!("/api/donations/{first_donation}/"),
                Some(&first),
                json!({"status": "cancelled"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_donation_patch_rules() {
        let app = create_test_app();
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (donor, _) = app.register("donor", 27.7000, 85.3000).await;
        let (stranger, _) = app.register("stranger", 27.7000, 85.3000).await;

        let request_id = app.open_request(&patient, 1).await;
        let donation_id = app.offer(&donor, &request_id).await;
        let uri = format!("/api/donations/{donation_id}/");

        let (status, _) = app
            .patch(&uri, Some(&stranger), json!({"status": "scheduled"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Only hospital staff complete donations
        let (status, _) = app
            .patch(&uri, Some(&donor), json!({"status": "completed"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .patch(&uri, Some(&patient), json!({"status": "scheduled"}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "scheduled");

        let (_, notifications) = app.get("/api/notifications/", Some(&patient)).await;
        assert_eq!(notifications[0]["notification_type"], "donation_accepted");
        assert!(notifications[0]["message"]
            .as_str()
            .unwrap()
            .contains("donor Test"));

        // Unchanged status is a no-op
        let (status, _) = app
            .patch(&uri, Some(&donor), json!({"status": "scheduled"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.notification_types(&patient).await.len(), 1);

        let (status, _) = app
            .patch(&uri, Some(&donor), json!({"status": "pending"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .patch(&uri, Some(&donor), json!({"status": "archived"}))
            .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_available_requests_for_donors_nearby() {
        let app = create_test_app();
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (near, _) = app.register("near", 27.7000, 85.3000).await;
        let (far, _) = app.register("far", 28.2096, 83.9856).await;

        let mut body = registration("recipient");
        body["is_donor"] = json!(false);
        body["location_lat"] = json!(27.7172);
        body["location_long"] = json!(85.3240);
        let (recipient, _) = app.register_raw(body).await;

        let (unlocated, _) = app.register_raw(registration("unlocated")).await;

        let request_id = app.open_request(&patient, 1).await;

        let (status, body) = app
            .get("/api/available-blood-requests/", Some(&near))
            .await;
        assert_eq!(status, StatusCode::OK);
        let requests = body.as_array().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["id"], request_id.as_str());
        assert!(requests[0]["distance"].as_f64().unwrap() < 20.0);

        // Pokhara is well beyond 20 km
        let (status, body) = app.get("/api/available-blood-requests/", Some(&far)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        // The patient does not see their own request
        let (_, body) = app
            .get("/api/available-blood-requests/", Some(&patient))
            .await;
        assert_eq!(body, json!([]));

        let (status, _) = app
            .get("/api/available-blood-requests/", Some(&recipient))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .get("/api/available-blood-requests/", Some(&unlocated))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registration_geocodes_address() {
        use crate::geocoding::{Geocoder, StaticGeocoder};
        use std::collections::HashMap;

        let app = create_test_app_with(|state| {
            let known = HashMap::from([(
                "Thamel, Kathmandu".to_string(),
                crate::geo::Coordinates::new(27.7154, 85.3123),
            )]);
            state.geocoder = Some(Arc::new(StaticGeocoder(known)) as Arc<dyn Geocoder>);
        });

        let mut body = registration("sita");
        body["address"] = json!("Thamel, Kathmandu");
        let (access, _) = app.register_raw(body).await;
        let (_, profile) = app.get("/api/users/profile/", Some(&access)).await;
        assert_eq!(profile["location_lat"], 27.7154);
        assert_eq!(profile["location_long"], 85.3123);

        // Explicit coordinates win over the address
        let mut body = registration("ram");
        body["address"] = json!("Thamel, Kathmandu");
        body["location_lat"] = json!(27.6710);
        body["location_long"] = json!(85.4298);
        let (access, _) = app.register_raw(body).await;
        let (_, profile) = app.get("/api/users/profile/", Some(&access)).await;
        assert_eq!(profile["location_lat"], 27.6710);

        // An unknown address still registers, without a location
        let mut body = registration("hari");
        body["address"] = json!("Nowhere");
        let (access, _) = app.register_raw(body).await;
        let (_, profile) = app.get("/api/users/profile/", Some(&access)).await;
        assert!(profile["location_lat"].is_null());
    }

    #[tokio::test]
    async fn test_update_blood_test_life_saved_notifies_once() {
        let app = create_test_app();
        let hospital = app.hospital_token().await;
        let (patient, _) = app.register("patient", 27.7172, 85.3240).await;
        let (donor, _) = app.register("donor", 27.7000, 85.3000).await;

        let request_id = app.open_request(&patient, 1).await;
        let donation_id = app.offer(&donor, &request_id).await;
        let (_, accepted) = app.accept(&donor, &donation_id).await;
        let assignment_id = accepted["assignment_id"].as_str().unwrap();
        let dashboard = format!("/api/hospital-dashboard/assignments/{assignment_id}");

        let update = format!("{dashboard}/update_blood_test/");
        let (status, _) = app
            .patch(&update, Some(&hospital), json!({"life_saved": true}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, test) = app
            .post(&format!("{dashboard}/submit_blood_test/"), Some(&hospital), panel())
            .await;
        assert_eq!(status, StatusCode::OK, "{test}");
        assert_eq!(test["life_saved"], false);

        let (status, test) = app
            .patch(&update, Some(&hospital), json!({"life_saved": true}))
            .await;
        assert_eq!(status, StatusCode::OK, "{test}");
        assert_eq!(test["life_saved"], true);

        let (_, notifications) = app.get("/api/notifications/", Some(&donor)).await;
        assert_eq!(notifications[0]["notification_type"], "life_saved");
        assert_eq!(notifications[0]["title"], "You Saved a Life!");

        // Already saved, so no second notification
        let (status, _) = app
            .patch(&update, Some(&hospital), json!({"life_saved": true}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let saved = app
            .notification_types(&donor)
            .await
            .into_iter()
            .filter(|t| t == "life_saved")
            .count();
        assert_eq!(saved, 1);
    }

    #[tokio::test]
    async fn test_logout_closes_websocket_sessions() {
        let app = create_test_app();
        let (access, id) = app.register("sita", 27.7, 85.3).await;
        let user_id: uuid::Uuid = id.parse().unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        app.hub.register(user_id, tx).await.unwrap();
        assert_eq!(app.hub.connection_count().await, 1);

        let (status, _) = app.post("/api/auth/logout/", Some(&access), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.hub.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
