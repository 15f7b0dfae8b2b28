mod common;

use axum::http::StatusCode;
use common::spawn_app;

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_index_on_empty_database() {
    let app = spawn_app();
    let response = app.get("/", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Crunchy, creamy, cookie, candy, cupcake!"));
    assert!(response.body.contains("There are no categories present."));
    assert!(response.body.contains("There are no pages present."));
}

#[tokio::test]
async fn test_index_ranks_top_five() {
    let app = spawn_app();
    let mut categories = Vec::new();
    for (i, name) in ["Aa", "Bb", "Cc", "Dd", "Ee", "Ff"].iter().enumerate() {
        categories.push(app.seed_category(name, 0, i as i32).await);
    }
    for views in 0..6 {
        app.seed_page(&categories[0], &format!("Page {views}"), "http://example.com", views)
            .await;
    }

    let body = app.get("/", None).await.body;

    // Most liked first; the least liked falls off.
    let ff = body.find(">Ff<").unwrap();
    let bb = body.find(">Bb<").unwrap();
    assert!(ff < bb);
    assert!(!body.contains(">Aa<"));

    // Most viewed first; the least viewed falls off.
    assert!(body.find("Page 5").unwrap() < body.find("Page 1").unwrap());
    assert!(!body.contains("Page 0"));
}

#[tokio::test]
async fn test_about_page() {
    let app = spawn_app();
    let response = app.get("/about/", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Crunchy, creamy, cookie, candy, cupcake!"));
}

#[tokio::test]
async fn test_unknown_category_renders_not_found_message() {
    let app = spawn_app();
    let response = app.get("/category/no-such-thing/", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("The specified category does not exist!"));
}

#[tokio::test]
async fn test_category_lists_only_its_pages() {
    let app = spawn_app();
    let python = app.seed_category("Python", 0, 0).await;
    let django = app.seed_category("Other Frameworks", 0, 0).await;
    app.seed_page(&python, "Official Python Tutorial", "http://docs.python.org/3/tutorial/", 0)
        .await;
    app.seed_page(&django, "Bottle", "http://bottlepy.org/docs/dev/", 0)
        .await;

    let response = app.get("/category/python/", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Official Python Tutorial"));
    assert!(!response.body.contains("Bottle"));

    let empty = app.seed_category("Empty One", 0, 0).await;
    let response = app.get(&format!("/category/{}/", empty.slug), None).await;
    assert!(response.body.contains("No pages currently in category."));
}

#[tokio::test]
async fn test_add_page_to_existing_category() {
    let app = spawn_app();
    let python = app.seed_category("Python", 0, 0).await;

    let response = app
        .post_form(
            "/category/python/page/add/",
            &[("title", "Learn Python"), ("url", "www.learnpython.org")],
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Learn Python"));

    let pages = app.repo.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].category_id, python.id);
    assert_eq!(pages[0].url, "http://www.learnpython.org");
    assert_eq!(pages[0].views, 0);
}

#[tokio::test]
async fn test_add_page_to_missing_category_stores_nothing() {
    let app = spawn_app();

    let response = app
        .post_form(
            "/category/ghost/page/add/",
            &[("title", "Boo"), ("url", "http://ghost.example.com")],
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(app.repo.pages().is_empty());
}

#[tokio::test]
async fn test_add_page_with_blank_title_shows_form_again() {
    let app = spawn_app();
    app.seed_category("Python", 0, 0).await;

    let response = app
        .post_form(
            "/category/python/page/add/",
            &[("title", ""), ("url", "http://python.org")],
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("id=\"page_form\""));
    assert!(response.body.contains("class=\"error\""));
    assert!(app.repo.pages().is_empty());
}

#[tokio::test]
async fn test_add_page_form_is_public() {
    let app = spawn_app();
    app.seed_category("Python", 0, 0).await;
    let response = app.get("/category/python/page/add/", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Add a Page to Python"));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_app();
    let response = app.get("/api-docs/openapi.json", None).await;
    assert_eq!(response.status, StatusCode::OK);

    let doc: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/category/{slug}/"));
    assert!(paths.contains_key("/admin/rango/category/"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = spawn_app();
    let response = app.get("/health", None).await;
    assert!(response.headers.contains_key("x-request-id"));
}
