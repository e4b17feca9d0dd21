//! Listing: pagination, filtering, sorting, aliases, and query-shape errors.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{create_user, send, test_app};

#[tokio::test]
async fn list_defaults_to_newest_first() {
    let app = test_app();
    create_user(&app, "First", "first@example.com", 20).await;
    create_user(&app, "Second", "second@example.com", 30).await;
    create_user(&app, "Third", "third@example.com", 40).await;

    let (status, body) = send(&app, Method::GET, "/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["route"], "users.list");

    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows[0]["name"], "Third");
    assert_eq!(rows[2]["name"], "First");
}

#[tokio::test]
async fn list_paginates_with_counts() {
    let app = test_app();
    for i in 0..12 {
        create_user(&app, &format!("User {i}"), &format!("u{i}@example.com"), 20 + i).await;
    }

    let (status, body) = send(&app, Method::GET, "/users?page=2&limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["total"], 12);
    assert_eq!(body["pagination"]["total_pages"], 3);
    assert_eq!(body["pagination"]["current_page"], 2);

    let (_, last) = send(&app, Method::GET, "/users?page=3&limit=5").await;
    assert_eq!(last["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn list_aliases_serve_the_same_rows() {
    let app = test_app();
    create_user(&app, "Ada", "ada@example.com", 36).await;

    for uri in ["/users", "/users/all", "/users/list"] {
        let (status, body) = send(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::OK, "alias {uri}");
        assert_eq!(body["data"].as_array().unwrap().len(), 1, "alias {uri}");
    }
}

#[tokio::test]
async fn list_filters_by_coerced_field_values() {
    let app = test_app();
    let id = create_user(&app, "Ada", "ada@example.com", 36).await;
    create_user(&app, "Grace", "grace@example.com", 45).await;

    let (status, body) = send(&app, Method::GET, "/users?age=36").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(id));

    let (status, body) = send(&app, Method::GET, "/users?active=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn list_sorts_by_field_and_order() {
    let app = test_app();
    create_user(&app, "Bob", "bob@example.com", 50).await;
    create_user(&app, "Ada", "ada@example.com", 36).await;
    create_user(&app, "Cleo", "cleo@example.com", 28).await;

    let (_, ascending) = send(&app, Method::GET, "/users?sort=name").await;
    let names: Vec<&str> = ascending["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ada", "Bob", "Cleo"]);

    let (_, descending) = send(&app, Method::GET, "/users?sort=age&order=desc").await;
    let ages: Vec<f64> = descending["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["age"].as_f64().unwrap())
        .collect();
    assert_eq!(ages, vec![50.0, 36.0, 28.0]);
}

#[tokio::test]
async fn empty_result_is_not_found_and_names_the_filter() {
    let app = test_app();
    create_user(&app, "Ada", "ada@example.com", 36).await;

    let (status, body) = send(&app, Method::GET, "/users?age=99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["status"]["message"].as_str().unwrap().contains("age"));
}

#[tokio::test]
async fn empty_collection_list_is_not_found() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/users").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_filter_field_is_a_bad_request() {
    let app = test_app();
    create_user(&app, "Ada", "ada@example.com", 36).await;

    let (status, body) = send(&app, Method::GET, "/users?nickname=ada").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["status"]["message"].as_str().unwrap().contains("nickname"));
}

#[tokio::test]
async fn reserved_prefix_filter_key_is_a_bad_request() {
    let app = test_app();
    create_user(&app, "Ada", "ada@example.com", 36).await;

    let (status, _) = send(&app, Method::GET, "/users?%24where=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_numeric_page_is_a_bad_request() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/users?page=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/users?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entities_are_isolated() {
    let app = test_app();
    create_user(&app, "Ada", "ada@example.com", 36).await;

    // No articles exist yet even though users do.
    let (status, _) = send(&app, Method::GET, "/articles").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
