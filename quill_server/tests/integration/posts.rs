use crate::helpers::{TestApi, location};
use reqwest::StatusCode;

#[tokio::test]
async fn anonymous_visitors_cannot_write() {
    let api = TestApi::spawn().await;

    let response = api
        .post_form("/create", &[("title", "Hello"), ("content", "World")])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = api.post_form("/delete/1", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn created_posts_are_listed_on_the_dashboard() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;

    let response = api.create_post("First post", "Hello there").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
    api.create_post("Second post", "General Kenobi").await;

    let html = api.get_html("/dashboard").await;
    assert!(html.contains("Post created successfully!"));
    let first = html.find("First post").expect("Missing first post");
    let second = html.find("Second post").expect("Missing second post");
    assert!(first < second);
}

#[tokio::test]
async fn user_provided_values_are_escaped() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;

    api.create_post("<script>alert(1)</script>", "<b>bold</b>")
        .await;

    let html = api.get_html("/dashboard").await;
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
}

#[tokio::test]
async fn invalid_posts_are_rejected() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;

    let too_long = "a".repeat(101);
    let response = api.create_post(&too_long, "Hello there").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = response.text().await.unwrap();
    assert!(html.contains("Field cannot be longer than 100 characters."));
    // The form is filled with the submitted values.
    assert!(html.contains("Hello there"));

    let response = api.create_post("A title", "").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.text().await.unwrap().contains("This field is required."));

    assert!(api.get_html("/dashboard").await.contains("There are no posts yet."));
}

#[tokio::test]
async fn posts_can_be_edited() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;
    api.create_post("Draft", "To be rewritten").await;

    let html = api.get_html("/edit/1").await;
    assert!(html.contains(r#"value="Draft""#));
    assert!(html.contains("To be rewritten"));

    let response = api.edit_post(1, "Final", "Rewritten").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let html = api.get_html("/dashboard").await;
    assert!(html.contains("Post updated!"));
    assert!(html.contains("Final"));
    assert!(!html.contains("Draft"));
}

#[tokio::test]
async fn posts_can_be_deleted() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;
    api.create_post("Short-lived", "Soon gone").await;

    let response = api.delete_post(1).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let html = api.get_html("/dashboard").await;
    assert!(html.contains("Post deleted!"));
    assert!(!html.contains("Short-lived"));
}

#[tokio::test]
async fn missing_posts_are_not_found() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;

    let response = api.get("/edit/42").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().contains("Not found"));

    let response = api.edit_post(42, "Title", "Content").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api.delete_post(42).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_missing_post_is_not_found_even_without_a_token() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;

    let response = api.post_form("/delete/999", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_without_a_csrf_token_is_rejected() {
    let api = TestApi::spawn().await;
    api.login_as_new_user("writer@example.com").await;
    api.create_post("Keep me", "Please").await;

    let response = api.post_form("/delete/1", &[]).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = response.text().await.unwrap();
    assert!(html.contains("The CSRF token is missing or invalid."));
    assert!(html.contains("Keep me"));
}
