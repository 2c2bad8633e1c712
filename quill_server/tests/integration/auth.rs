use crate::helpers::{ADMIN_EMAIL, ADMIN_PASSWORD, TestApi, location};
use reqwest::StatusCode;

#[tokio::test]
async fn the_index_redirects_based_on_the_session() {
    let api = TestApi::spawn().await;

    let response = api.get("/").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    api.login_as_admin().await;
    let response = api.get("/").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn signing_up_then_logging_in_works() {
    let api = TestApi::spawn().await;

    let response = api.sign_up("ursula@example.com", "earthsea").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let html = api.get_html("/login").await;
    assert!(html.contains("Account created successfully!"));

    let response = api.login("ursula@example.com", "earthsea").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let response = api.get("/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let html = response.text().await.unwrap();
    assert!(html.contains("Logged in successfully!"));
    // Flashes are shown once.
    assert!(!api.get_html("/dashboard").await.contains("Logged in successfully!"));
}

#[tokio::test]
async fn the_seeded_admin_can_log_in() {
    let api = TestApi::spawn().await;

    let response = api.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn duplicate_emails_are_rejected() {
    let api = TestApi::spawn().await;

    let response = api.sign_up("ursula@example.com", "earthsea").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = api.sign_up("ursula@example.com", "another-one").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let html = response.text().await.unwrap();
    assert!(html.contains("A user with this email already exists."));

    // The seeded admin counts too.
    let response = api.sign_up(ADMIN_EMAIL, "not-the-admin").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_credentials_are_rejected_with_a_generic_message() {
    let api = TestApi::spawn().await;
    api.sign_up("ursula@example.com", "earthsea").await;

    for (email, password) in [
        ("ursula@example.com", "wrong-password"),
        ("nobody@example.com", "earthsea"),
    ] {
        let response = api.login(email, password).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let html = response.text().await.unwrap();
        assert!(html.contains("Invalid email or password."));
    }

    // Still logged out.
    let response = api.get("/dashboard").await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn invalid_sign_up_forms_are_rendered_with_field_errors() {
    let api = TestApi::spawn().await;

    let response = api.sign_up("not-an-email", "").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = response.text().await.unwrap();
    assert!(html.contains("Invalid email address."));
    assert!(html.contains("This field is required."));
    // The submitted email is kept.
    assert!(html.contains(r#"value="not-an-email""#));
}

#[tokio::test]
async fn forms_without_a_csrf_token_are_rejected() {
    let api = TestApi::spawn().await;

    let response = api
        .post_form(
            "/sign-up",
            &[("email", "ursula@example.com"), ("password", "earthsea")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = response.text().await.unwrap();
    assert!(html.contains("The CSRF token is missing or invalid."));

    // Nothing was stored.
    let response = api.login("ursula@example.com", "earthsea").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_form_bodies_are_rejected() {
    let api = TestApi::spawn().await;

    let response = api
        .api_client
        .post(format!("{}/login", &api.api_address))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(r#"{"email":"admin@example.com","password":"admin"}"#)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn logging_out_clears_the_session_user() {
    let api = TestApi::spawn().await;
    api.login_as_admin().await;

    let response = api.get("/logout").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let html = api.get_html("/login").await;
    assert!(html.contains("You have been logged out."));

    let response = api.get("/dashboard").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn logging_out_without_a_session_is_harmless() {
    let api = TestApi::spawn().await;

    let response = api.get("/logout").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}
