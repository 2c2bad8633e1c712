use crate::helpers::{ADMIN_EMAIL, TestApi, location};
use reqwest::StatusCode;

#[tokio::test]
async fn anonymous_visitors_are_sent_to_the_login_page() {
    let api = TestApi::spawn().await;

    let response = api.get("/admin").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn regular_users_are_sent_back_to_the_dashboard() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("reader@example.com").await;

    let response = api.get("/admin").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let html = api.get_html("/dashboard").await;
    assert!(html.contains("You do not have access to this page."));
}

#[tokio::test]
async fn admins_see_every_user_and_post() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;
    api.create_post("A post by a writer", "Content").await;
    api.get("/logout").await;

    api.login_as_admin().await;
    let response = api.get("/admin").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();
    assert!(html.contains(ADMIN_EMAIL));
    assert!(html.contains("writer@example.com"));
    assert!(html.contains("A post by a writer"));
}

#[tokio::test]
async fn sessions_of_deleted_users_are_logged_out() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("gone@example.com").await;
    sqlx::query("DELETE FROM user WHERE email = ?")
        .bind("gone@example.com")
        .execute(&api.db_pool)
        .await
        .unwrap();

    let response = api.get("/admin").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    // The stale user id was dropped from the session.
    let response = api.get("/dashboard").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}
