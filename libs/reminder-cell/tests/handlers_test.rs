use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reminder_cell::router::reminder_routes;
use reminder_cell::services::{EmailNotificationService, ReminderScheduler};
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn test_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config.email_function_url = format!("{}/functions/v1/send-email", mock_server.uri());
    config
}

fn test_app(config: &AppConfig) -> Router {
    let notifier = Arc::new(EmailNotificationService::new(config));
    let scheduler = Arc::new(ReminderScheduler::new(config, notifier));
    reminder_routes(Arc::new(config.clone()), scheduler)
}

fn bearer(user: &TestUser, config: &AppConfig) -> String {
    format!(
        "Bearer {}",
        JwtTestUtils::create_test_token(user, &config.supabase_jwt_secret, None)
    )
}

async fn mock_empty_appointments(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn stats_requires_admin() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let client = TestUser::client("client@example.com");

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header("Authorization", bearer(&client, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_reads_scheduler_stats() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let admin = TestUser::admin("admin@example.com");
    mock_empty_appointments(&mock_server).await;

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header("Authorization", bearer(&admin, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["todays_active_appointments"], 0);
    assert_eq!(body["stats"]["sweep_active"], false);
}

#[tokio::test]
async fn manual_dispatch_for_unknown_appointment_is_404() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let admin = TestUser::admin("admin@example.com");
    mock_empty_appointments(&mock_server).await;

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/appointments/{}/dispatch", Uuid::new_v4()))
                .header("Authorization", bearer(&admin, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sweep_endpoints_report_summaries() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let admin = TestUser::admin("admin@example.com");
    mock_empty_appointments(&mock_server).await;

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sweeps/dispatch")
                .header("Authorization", bearer(&admin, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["summary"]["dispatched"], 0);

    let response = test_app(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sweeps/cleanup")
                .header("Authorization", bearer(&admin, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["summary"]["no_shows_marked"], 0);
}
