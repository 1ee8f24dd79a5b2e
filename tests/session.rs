mod common;

use axum::http::{header, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use axum_imagegen::config::Config;
use common::{
    body_bytes, body_json, form_request, json_request, request, session_cookie, TestApp, EMAIL,
    PASSWORD, USER_ID,
};

fn location(response: &axum::response::Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn health_and_index() {
    let app = TestApp::new();

    let response = app.send(request("GET", "/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], b"OK");

    let response = app.send(request("GET", "/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/");
}

#[tokio::test]
async fn anonymous_requests_are_turned_away() {
    let app = TestApp::new();

    let response = app.send(request("GET", "/dashboard/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login");

    let response = app.send(request("GET", "/dashboard/jobs/", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(request("GET", "/images/a/b.jpeg", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(request("GET", "/admin/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn login_validates_input() {
    let app = TestApp::new();
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 1);

    let response = app
        .send(form_request("POST", "/auth/login", None, "email=a&password=b"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Request must be JSON");

    let response = app
        .send(json_request("POST", "/auth/login", None, json!({ "email": EMAIL })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": EMAIL, "password": "wrong" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({ "success": false, "message": "Invalid email or password" })
    );
}

#[tokio::test]
async fn logout_then_protected_page_redirects_to_login() {
    let app = TestApp::new();
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 2);
    let cookie = app.login(EMAIL, PASSWORD).await;

    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], EMAIL);

    let response = app.send(request("POST", "/auth/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn vanished_user_loses_the_session() {
    let app = TestApp::new();
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 2);
    let cookie = app.login(EMAIL, PASSWORD).await;

    app.identity.users.lock().remove(USER_ID);
    let response = app.send(request("GET", "/dashboard/jobs/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 2);
    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn register_creates_user_and_storage_folders() {
    let app = TestApp::new();

    let response = app
        .send(form_request(
            "POST",
            "/auth/register",
            None,
            "email=new%40example.com&password=secret1&fname=Grace&lname=Hopper",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app
        .identity
        .users
        .lock()
        .values()
        .find(|u| u.email.as_deref() == Some("new@example.com"))
        .cloned()
        .expect("user created");
    assert_eq!(user.user_metadata.full_name.as_deref(), Some("Grace Hopper"));
    assert!(user.user_metadata.is_disabled());
    assert!(app
        .storage
        .contains("storage/new@example.com/my_images/.placeholder"));
    assert!(app
        .storage
        .contains("storage/new@example.com/generated_images/.placeholder"));

    let response = app
        .send(form_request(
            "POST",
            "/auth/register",
            None,
            "email=new%40example.com&password=secret1",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "This email is already registered. Please log in."
    );
}

#[tokio::test]
async fn resend_only_reaches_unconfirmed_accounts() {
    let app = TestApp::new();
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 1);

    let response = app
        .send(json_request(
            "POST",
            "/auth/resend",
            None,
            json!({ "email": "nobody@example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No account found with that email." })
    );
    assert!(app.identity.resent.lock().is_empty());

    let response = app
        .send(form_request("POST", "/auth/resend", None, "email=ada%40example.com"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "A new confirmation email has been sent. Check your inbox."
    );
    assert_eq!(*app.identity.resent.lock(), vec![EMAIL.to_string()]);

    app.identity.confirm(USER_ID);
    let response = app
        .send(json_request("POST", "/auth/resend", None, json!({ "email": EMAIL })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Your email is already confirmed. Please log in." })
    );
    assert_eq!(app.identity.resent.lock().len(), 1);
}

#[tokio::test]
async fn profile_update_keeps_other_metadata() {
    let app = TestApp::new();
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 7);
    let cookie = app.login(EMAIL, PASSWORD).await;

    let response = app
        .send(json_request(
            "POST",
            "/dashboard/profile/",
            Some(&cookie),
            json!({ "full_name": "Ada Lovelace", "password": "analytical" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "message": "Profile updated successfully." })
    );

    let metadata = app.identity.metadata(USER_ID);
    assert_eq!(metadata.full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(metadata.credits, 7);
    assert_eq!(app.identity.passwords.lock()[EMAIL], "analytical");
}

#[tokio::test]
async fn maintenance_mode_blocks_dashboard_for_other_users() {
    let config = Config::from_toml("[maintenance]\nenabled = true\n").unwrap();
    let app = TestApp::with_config(config);
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 1);
    let cookie = app.login(EMAIL, PASSWORD).await;

    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.send(request("GET", "/health", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_can_impersonate_and_stop() {
    let mut config = Config::from_toml("").unwrap();
    config.admin.password_hash = bcrypt::hash("admin-pass", 4).unwrap();
    let admin_email = config.admin.email.clone();
    let app = TestApp::with_config(config);
    app.identity.add_user(USER_ID, EMAIL, PASSWORD, 3);

    let response = app
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": admin_email, "password": "admin-pass" }),
        ))
        .await;
    let cookie = session_cookie(&response).expect("admin session");
    assert_eq!(body_json(response).await["redirect"], "/admin/");

    let response = app.send(request("GET", "/admin/", Some(&cookie))).await;
    assert_eq!(body_json(response).await, json!({ "page": "admin" }));

    let response = app
        .send(form_request("POST", "/admin/impersonate", Some(&cookie), "user_id=nobody"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/admin/?error="));

    let body = format!("user_id={}", USER_ID);
    let response = app
        .send(form_request("POST", "/admin/impersonate", Some(&cookie), &body))
        .await;
    assert_eq!(location(&response), "/dashboard/");

    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["credits"], 3);

    let response = app
        .send(request("POST", "/admin/stop_impersonation", Some(&cookie)))
        .await;
    assert_eq!(location(&response), "/admin/");
    // Flushing issues a fresh session id
    let cookie = session_cookie(&response).unwrap_or(cookie);

    let response = app.send(request("GET", "/dashboard/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let response = app.send(request("GET", "/admin/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}
