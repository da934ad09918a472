//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use spendly_core::models::{ExpenseSource, NewExpense};
use spendly_core::test_utils::TestChannels;
use tower::ServiceExt;

const PHONE: &str = "+919800000001";

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    channels: TestChannels,
}

impl TestApp {
    fn token(&self, phone: &str) -> String {
        self.state
            .links
            .as_ref()
            .unwrap()
            .issue_token(phone, Utc::now())
            .unwrap()
    }

    fn user(&self, phone: &str) -> User {
        self.state.db.get_or_create_user(phone, Utc::now()).unwrap().0
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn setup_with(server: ServerConfig, channels: TestChannels) -> TestApp {
    let db = Database::in_memory().unwrap();
    let mut config = Config::default();
    config.dashboard.jwt_secret = Some("test-secret".to_string());

    let state = Arc::new(AppState::new(
        db,
        AIClient::mock(),
        channels.channels(),
        &config,
        server,
    ));
    TestApp {
        app: create_router(state.clone()),
        state,
        channels,
    }
}

fn setup_test_app() -> TestApp {
    setup_with(
        ServerConfig {
            verify_token: Some("verify-me".to_string()),
            ..Default::default()
        },
        TestChannels::default(),
    )
}

fn setup_open_app() -> TestApp {
    setup_with(
        ServerConfig {
            require_auth: false,
            ..Default::default()
        },
        TestChannels::default(),
    )
}

async fn get_body_json(response: Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn record(app: &TestApp, user_id: i64, amount: f64, category: &str) {
    app.state
        .db
        .insert_expense(&NewExpense {
            user_id,
            amount,
            category: category.to_string(),
            description: Some(format!("{} test", category)),
            source: ExpenseSource::Whatsapp,
            raw_text: None,
            image_url: None,
            structured_data: None,
            created_at: Utc::now(),
        })
        .unwrap();
}

// ========== Webhook Tests ==========

#[tokio::test]
async fn test_webhook_records_expense_and_replies() {
    let app = setup_test_app();

    let response = app
        .send(form_post(
            "/webhook",
            "From=whatsapp%3A%2B919800000001&Body=50rs+coffee+at+ccd&NumMedia=0",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/xml");
    assert_eq!(get_body_text(response).await, "<Response></Response>");

    // Welcome and follow-up come before the confirmation
    let sent = app.channels.messenger.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|m| m.to == PHONE));
    assert!(sent[2].body.contains("₹50 spent at ccd"));

    let user = app.state.db.get_user_by_phone(PHONE).unwrap().unwrap();
    let expenses = app
        .state
        .db
        .list_expenses(&spendly_core::db::ExpenseFilter::new().user(user.id))
        .unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].category, "Food & Dining");
}

#[tokio::test]
async fn test_webhook_storage_failure_returns_empty_twiml() {
    let app = setup_test_app();
    app.state
        .db
        .conn()
        .unwrap()
        .execute_batch("DROP TABLE budgets; DROP TABLE expenses; DROP TABLE users;")
        .unwrap();

    let response = app
        .send(form_post(
            "/webhook",
            "From=whatsapp%3A%2B919800000001&Body=50rs+coffee+at+ccd&NumMedia=0",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["content-type"], "text/xml");
    assert_eq!(get_body_text(response).await, "<Response></Response>");
    assert!(app.channels.messenger.sent().is_empty());
}

#[tokio::test]
async fn test_webhook_unreadable_body_returns_empty_twiml() {
    let app = setup_test_app();

    let response = app
        .send(json_post(
            "/webhook",
            serde_json::json!({"From": "whatsapp:+919800000001", "Body": "hi"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/xml");
    assert_eq!(get_body_text(response).await, "<Response></Response>");
    assert!(app.state.db.get_user_by_phone(PHONE).unwrap().is_none());
}

#[tokio::test]
async fn test_webhook_ignores_delivery_callbacks() {
    let app = setup_test_app();

    let response = app
        .send(form_post(
            "/webhook",
            "From=whatsapp%3A%2B919800000001&MessageStatus=delivered&MessageSid=SM1",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.channels.messenger.sent().is_empty());
    assert!(app.state.db.get_user_by_phone(PHONE).unwrap().is_none());
}

#[tokio::test]
async fn test_status_callback_acknowledged() {
    let app = setup_test_app();

    let response = app
        .send(form_post(
            "/webhook/status",
            "MessageSid=SM1&MessageStatus=read&To=whatsapp%3A%2B1555",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_verification_handshake() {
    let app = setup_test_app();

    let ok = app
        .send(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(get_body_text(ok).await, "42");

    let wrong = app
        .send(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_generate_magic_link_creates_user() {
    let app = setup_test_app();

    let missing = app
        .send(json_post("/auth/generate-magic-link", serde_json::json!({})))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(get_body_json(missing).await["error"], "Phone number required");

    let response = app
        .send(json_post(
            "/auth/generate-magic-link",
            serde_json::json!({ "phone": PHONE }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let token = json["token"].as_str().unwrap();
    assert_eq!(
        json["link"],
        format!("http://localhost:3001/dashboard?token={}", token)
    );

    let user = app.state.db.get_user_by_phone(PHONE).unwrap().unwrap();
    assert_eq!(user.name.as_deref(), Some("User 0001"));
}

#[tokio::test]
async fn test_verify_token() {
    let app = setup_test_app();
    app.user(PHONE);

    let response = app
        .send(json_post(
            "/auth/verify-token",
            serde_json::json!({ "token": app.token(PHONE) }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["phone_number"], PHONE);

    let invalid = app
        .send(json_post(
            "/auth/verify-token",
            serde_json::json!({ "token": "garbage" }),
        ))
        .await;
    assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);

    let stranger = app
        .send(json_post(
            "/auth/verify-token",
            serde_json::json!({ "token": app.token("+15550000000") }),
        ))
        .await;
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

    let empty = app
        .send(json_post("/auth/verify-token", serde_json::json!({})))
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_magic_redirect() {
    let app = setup_test_app();
    let token = app.token(PHONE);

    let response = app
        .send(
            Request::builder()
                .uri(format!("/auth/magic?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()["location"],
        format!("http://localhost:3001/dashboard?token={}", token).as_str()
    );

    let missing = app
        .send(Request::builder().uri("/auth/magic").body(Body::empty()).unwrap())
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let invalid = app
        .send(
            Request::builder()
                .uri("/auth/magic?token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_whatsapp_login_sends_link() {
    let app = setup_test_app();

    let response = app
        .send(json_post(
            "/auth/whatsapp-login",
            serde_json::json!({ "phone": PHONE }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["success"], true);

    let sent = app.channels.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, PHONE);
    assert!(sent[0]
        .body
        .contains("http://localhost:3001/dashboard?token="));
}

#[tokio::test]
async fn test_whatsapp_login_reports_send_failure() {
    let channels = TestChannels {
        messenger: spendly_core::test_utils::RecordingMessenger::failing(),
        ..TestChannels::default()
    };
    let app = setup_with(ServerConfig::default(), channels);

    let response = app
        .send(json_post(
            "/auth/whatsapp-login",
            serde_json::json!({ "phone": PHONE }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ========== Dashboard API Tests ==========

#[tokio::test]
async fn test_api_requires_token() {
    let app = setup_test_app();
    app.user(PHONE);

    let response = app
        .send(
            Request::builder()
                .uri(format!("/api/expenses?phone={}", "%2B919800000001"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bad = app.send(authed_get("/api/expenses", "garbage")).await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_expenses_latest_first() {
    let app = setup_test_app();
    let user = app.user(PHONE);
    record(&app, user.id, 100.0, "Shopping");
    record(&app, user.id, 250.0, "Transportation");

    // Someone else's expense stays out of the list
    let other = app.user("+15550000000");
    record(&app, other.id, 999.0, "Shopping");

    let response = app
        .send(authed_get("/api/expenses", &app.token(PHONE)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let expenses = json.as_array().unwrap();
    assert_eq!(expenses.len(), 2);
    assert_eq!(expenses[0]["amount"], 250.0);
    assert_eq!(expenses[0]["source"], "whatsapp");

    let paged = app
        .send(authed_get("/api/expenses?limit=1&offset=1", &app.token(PHONE)))
        .await;
    let json = get_body_json(paged).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["amount"], 100.0);
}

#[tokio::test]
async fn test_open_mode_uses_phone_query() {
    let app = setup_open_app();
    let user = app.user(PHONE);
    record(&app, user.id, 40.0, "Groceries");

    let response = app
        .send(
            Request::builder()
                .uri("/api/expenses?phone=%2B919800000001")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);

    let unknown = app
        .send(
            Request::builder()
                .uri("/api/expenses?phone=%2B15550000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let missing = app
        .send(Request::builder().uri("/api/expenses").body(Body::empty()).unwrap())
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_for_current_month() {
    let app = setup_test_app();
    let user = app.user(PHONE);
    record(&app, user.id, 100.0, "Food & Dining");
    record(&app, user.id, 50.0, "Food & Dining");
    record(&app, user.id, 30.0, "Transportation");

    let response = app.send(authed_get("/api/stats", &app.token(PHONE))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["totalAmount"], 180.0);
    assert_eq!(json["totalExpenses"], 3);
    assert_eq!(json["categories"]["Food & Dining"], 150.0);
    assert_eq!(json["categories"]["Transportation"], 30.0);

    let daily = json["dailySpending"].as_array().unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0]["date"], Utc::now().format("%Y-%m-%d").to_string());
    assert_eq!(daily[0]["amount"], 180.0);
}

#[tokio::test]
async fn test_export_csv_and_json() {
    let app = setup_test_app();
    let user = app.user(PHONE);
    record(&app, user.id, 75.5, "Shopping");

    let csv = app
        .send(authed_get("/api/export", &app.token(PHONE)))
        .await;
    assert_eq!(csv.status(), StatusCode::OK);
    assert!(csv.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(csv.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("spendly_expenses_"));
    let body = get_body_text(csv).await;
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("id,date,amount,category,description,source,image_url")
    );
    assert!(lines.next().unwrap().contains(",75.50,Shopping,"));

    let json = app
        .send(authed_get("/api/export?format=json", &app.token(PHONE)))
        .await;
    assert_eq!(json.status(), StatusCode::OK);
    let parsed: serde_json::Value =
        serde_json::from_str(&get_body_text(json).await).unwrap();
    assert_eq!(parsed[0]["category"], "Shopping");

    let unsupported = app
        .send(authed_get("/api/export?format=xml", &app.token(PHONE)))
        .await;
    assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);
}

// ========== Upload Tests ==========

const BOUNDARY: &str = "spendly-test-boundary";

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"bill.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("authorization", format!("Bearer {}", token))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_manual_expense() {
    let app = setup_test_app();
    app.user(PHONE);

    let body = multipart_body(
        &[("amount", "320"), ("description", "groceries at dmart")],
        Some(b"\xff\xd8\xff\xe0 bill"),
    );
    let response = app.send(upload_request(&app.token(PHONE), body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["expense"]["amount"], 320.0);
    assert_eq!(json["expense"]["source"], "manual");
    assert_eq!(json["expense"]["image_url"], "memory://images/1");
    assert_eq!(json["expense"]["category"], "Groceries");
    assert_eq!(app.channels.images.uploads().len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_missing_image_and_bad_amount() {
    let app = setup_test_app();
    app.user(PHONE);

    let no_file = app
        .send(upload_request(
            &app.token(PHONE),
            multipart_body(&[("amount", "10")], None),
        ))
        .await;
    assert_eq!(no_file.status(), StatusCode::BAD_REQUEST);
    assert_eq!(get_body_json(no_file).await["error"], "No file uploaded");

    let bad_amount = app
        .send(upload_request(
            &app.token(PHONE),
            multipart_body(&[("amount", "-5")], Some(b"img")),
        ))
        .await;
    assert_eq!(bad_amount.status(), StatusCode::BAD_REQUEST);
    assert!(app.channels.images.uploads().is_empty());
}

// ========== Health Tests ==========

#[tokio::test]
async fn test_health() {
    let app = setup_test_app();

    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["ai"], "mock");
}
