#![cfg(all(feature = "web", feature = "sqlite"))]
//! Auth flow integration tests.
//!
//! Tests cover:
//! - Login with correct credentials succeeds (redirect to /)
//! - Login with wrong credentials fails (re-renders with error)
//! - Accessing protected route without session redirects to /login
//! - Logout destroys session (subsequent access redirects)
//! - Sign-up creates an account, signs in and starts onboarding

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sentinel::adapters::sqlite_adapter::SqliteAdapter;
use sentinel::adapters::web::{build_router, hash_password, AppState};
use sentinel::domain::account::Account;
use sentinel::ports::trade_store::TradeStore;
use std::sync::{Arc, LazyLock};
use tower::ServiceExt;

use common::*;

const TEST_PASSWORD: &str = "testpass123";
const TEST_EMAIL: &str = "trader@example.com";

static TEST_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password(TEST_PASSWORD).unwrap());

fn create_auth_app() -> (Router, Arc<SqliteAdapter>) {
    let store = Arc::new(memory_store());
    let account = Account::new(TEST_EMAIL, "Test Trader", TEST_PASSWORD_HASH.clone()).unwrap();
    store.create_account(&account).unwrap();

    let state = AppState {
        store: store.clone(),
        market_data: Arc::new(StubMarketData::default()),
        config: Arc::new(MockConfigPort::new().with("rules", "default_timezone", "Europe/London")),
    };
    (build_router(state).unwrap(), store)
}

fn extract_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

fn build_cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .map(|sc| sc.split(';').next().unwrap_or("").to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn form_request(uri: &str, form_data: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_data))
        .unwrap()
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    form_request("/login", format!("email={email}&password={password}"))
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::http::Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

async fn body_text(response: axum::http::Response<Body>) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&body).into_owned()
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn unauthenticated_access_redirects_to_login() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // login_required! returns 307 Temporary Redirect with ?next= query param
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = location(&response);
        assert!(
            location.starts_with("/login"),
            "should redirect to /login, got: {location}"
        );
    }

    #[tokio::test]
    async fn protected_post_routes_require_login() {
        let (app, store) = create_auth_app();

        let response = app
            .oneshot(form_request("/lock", "reason=".to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let account = store.find_account_by_email(TEST_EMAIL).unwrap().unwrap();
        assert!(store
            .recent_locks(&account.id, date(2000, 1, 1))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn login_page_accessible_without_auth() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Login"));
        assert!(!html.contains("Log out"), "nav is hidden when signed out");
    }

    #[tokio::test]
    async fn login_with_correct_credentials_redirects_to_dashboard() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let cookies = extract_cookies(&response);
        assert!(!cookies.is_empty(), "login should set a session cookie");
    }

    #[tokio::test]
    async fn login_email_is_case_insensitive() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(login_request("Trader%40Example.COM", TEST_PASSWORD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn login_with_wrong_password_shows_error() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(login_request(TEST_EMAIL, "wrongpassword"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(
            html.contains("Invalid email or password."),
            "should show error message"
        );
    }

    #[tokio::test]
    async fn login_with_unknown_email_shows_error() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(login_request("nobody@example.com", TEST_PASSWORD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Invalid email or password."));
    }

    #[tokio::test]
    async fn authenticated_user_can_access_protected_route() {
        let (app, _) = create_auth_app();

        let login_resp = app
            .clone()
            .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
            .await
            .unwrap();
        assert_eq!(login_resp.status(), StatusCode::SEE_OTHER);
        let cookie_header = build_cookie_header(&extract_cookies(&login_resp));

        let response = app.oneshot(get("/", &cookie_header)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Dashboard"));
        assert!(html.contains("Test Trader"));
    }

    #[tokio::test]
    async fn logout_redirects_to_login() {
        let (app, _) = create_auth_app();

        let login_resp = app
            .clone()
            .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
            .await
            .unwrap();
        let cookie_header = build_cookie_header(&extract_cookies(&login_resp));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(header::COOKIE, &cookie_header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn full_flow_login_access_logout_denied() {
        let (app, _) = create_auth_app();

        // 1. Login with correct credentials
        let login_resp = app
            .clone()
            .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
            .await
            .unwrap();
        assert_eq!(login_resp.status(), StatusCode::SEE_OTHER);
        let cookie_header = build_cookie_header(&extract_cookies(&login_resp));
        assert!(!cookie_header.is_empty());

        // 2. Access protected route succeeds
        let dash_resp = app.clone().oneshot(get("/", &cookie_header)).await.unwrap();
        assert_eq!(dash_resp.status(), StatusCode::OK);

        // 3. Logout
        let logout_resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(header::COOKIE, &cookie_header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logout_resp.status(), StatusCode::SEE_OTHER);

        // 4. Access protected route denied after logout (307 from login_required!)
        let denied_resp = app.oneshot(get("/", &cookie_header)).await.unwrap();
        assert_eq!(denied_resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = location(&denied_resp);
        assert!(
            location.starts_with("/login"),
            "should redirect to /login, got: {location}"
        );
    }
}

mod signup_tests {
    use super::*;

    fn signup_request(email: &str, name: &str, password: &str) -> Request<Body> {
        form_request(
            "/signup",
            format!("email={email}&name={name}&password={password}"),
        )
    }

    #[tokio::test]
    async fn signup_page_renders() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(Request::builder().uri("/signup").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Create account"));
    }

    #[tokio::test]
    async fn signup_signs_in_and_starts_onboarding() {
        let (app, store) = create_auth_app();

        let response = app
            .clone()
            .oneshot(signup_request("new%40example.com", "New", "longenough1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/settings");
        let cookie_header = build_cookie_header(&extract_cookies(&response));

        let account = store
            .find_account_by_email("new@example.com")
            .unwrap()
            .expect("account stored");
        let rules = store.rules(&account.id).unwrap().expect("default rules stored");
        assert!(!rules.setup_complete);
        assert_eq!(rules.timezone, chrono_tz::Europe::London);

        // Dashboard is gated until the rules are confirmed.
        let dash = app.clone().oneshot(get("/", &cookie_header)).await.unwrap();
        assert_eq!(dash.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&dash), "/settings");

        let settings = app.clone().oneshot(get("/settings", &cookie_header)).await.unwrap();
        assert_eq!(settings.status(), StatusCode::OK);
        let html = body_text(settings).await;
        assert!(html.contains("Set your risk rules before your first trade."));
        assert!(html.contains("Europe/London"));

        let mut save = form_request(
            "/settings",
            "max_risk_per_trade_percent=1&max_daily_loss=300&max_trades_per_day=3\
             &trading_window_start=&trading_window_end=&timezone=Europe%2FLondon"
                .to_string(),
        );
        save.headers_mut()
            .insert(header::COOKIE, cookie_header.parse().unwrap());
        let saved = app.clone().oneshot(save).await.unwrap();
        assert_eq!(saved.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&saved), "/");

        let dash = app.oneshot(get("/", &cookie_header)).await.unwrap();
        assert_eq!(dash.status(), StatusCode::OK);
        let html = body_text(dash).await;
        assert!(html.contains("0 / 3"));
        assert!(html.contains("300.00"));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (app, _) = create_auth_app();

        let response = app
            .oneshot(signup_request("TRADER%40example.com", "Dup", "longenough1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("is already registered"));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let (app, store) = create_auth_app();

        let response = app
            .oneshot(signup_request("short%40example.com", "Short", "abc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("invalid password"));
        assert!(store
            .find_account_by_email("short@example.com")
            .unwrap()
            .is_none());
    }
}
