use actix_web::{test, web, App};
use serde_json::json;
use tokengate_server::{auth::handlers, health_check, AppState, Settings};

fn test_state() -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    AppState::in_memory(config).expect("Failed to build app state")
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .route("/health", web::get().to(health_check))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_register_and_login() {
    let app = test_app!(test_state());

    let register_response = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "username": "alice", "password": "s3cret!" }))
        .send_request(&app)
        .await;

    assert_eq!(register_response.status(), 201);
    let register_body: serde_json::Value = test::read_body_json(register_response).await;
    assert!(register_body.get("token").is_some());
    assert!(register_body.get("expires_at").is_some());

    let login_response = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "alice", "password": "s3cret!" }))
        .send_request(&app)
        .await;

    assert_eq!(login_response.status(), 200);
    let login_body: serde_json::Value = test::read_body_json(login_response).await;
    assert!(login_body.get("token").is_some());
}

#[actix_web::test]
async fn test_invalid_login() {
    let app = test_app!(test_state());

    let response = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "nonexistent", "password": "wrongpassword" }))
        .send_request(&app)
        .await;

    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_invalid_registration() {
    let app = test_app!(test_state());

    let response = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "username": "alice", "password": "" }))
        .send_request(&app)
        .await;

    assert_eq!(response.status(), 400);
}

#[actix_web::test]
async fn test_duplicate_registration_conflicts() {
    let app = test_app!(test_state());
    let body = json!({ "username": "alice", "password": "s3cret!" });

    let first = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(&body)
        .send_request(&app)
        .await;
    assert_eq!(first.status(), 201);

    let second = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(&body)
        .send_request(&app)
        .await;
    assert_eq!(second.status(), 409);

    let error: serde_json::Value = test::read_body_json(second).await;
    assert_eq!(error["error"]["status"], 409);
}

#[actix_web::test]
async fn test_logout_revokes_token() {
    let app = test_app!(test_state());

    let register_response = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "username": "alice", "password": "s3cret!" }))
        .send_request(&app)
        .await;
    let register_body: serde_json::Value = test::read_body_json(register_response).await;
    let token = register_body["token"].as_str().unwrap().to_owned();

    let me_response = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(me_response.status(), 200);
    let me_body: serde_json::Value = test::read_body_json(me_response).await;
    assert_eq!(me_body["username"], "alice");
    assert!(me_body.get("password_hash").is_none());

    let logout_response = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(logout_response.status(), 200);

    // Logging out twice is not an error
    let logout_again = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(logout_again.status(), 200);

    let protected_response = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(protected_response.status(), 401);
}

#[actix_web::test]
async fn test_missing_bearer_token() {
    let app = test_app!(test_state());

    let response = test::TestRequest::get().uri("/auth/me").send_request(&app).await;
    assert_eq!(response.status(), 401);

    let response = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", "Bearer not-a-token"))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}
