//! API black-box tests
//!
//! Each test serves the router on an ephemeral port over an in-memory store
//! and drives it with a real HTTP client.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use lending_ledger::{
    api, config::AppConfig, repository::MemoryStore, services::Services, AppState,
};

async fn spawn_app() -> String {
    let engine = AppConfig::default().engine;
    let services = Services::new(Arc::new(MemoryStore::new()), engine);
    let state = AppState {
        services: Arc::new(services),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api/v1", addr)
}

async fn post(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn seed(client: &Client, base: &str) {
    let (status, body) = post(
        client,
        format!("{}/books", base),
        json!({"book_id": "B1", "title": "Dune", "author": "Herbert", "quantity": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "2 copies of 'Dune' added successfully.");

    let (status, body) = post(
        client,
        format!("{}/members", base),
        json!({"member_id": "M1", "name": "Alice"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Member Alice added successfully.");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let base = spawn_app().await;
    let client = Client::new();

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");

    let response = client.get(format!("{}/ready", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_issue_and_return_flow() {
    let base = spawn_app().await;
    let client = Client::new();
    seed(&client, &base).await;

    let loan = json!({"member_id": "M1", "book_id": "B1"});
    let (status, body) = post(&client, format!("{}/loans", base), loan.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Book 'Dune' issued to Alice.");
    assert_eq!(body["receipt"]["available"], 1);

    let (status, body) = post(&client, format!("{}/loans", base), loan.clone()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "AlreadyHeld");
    assert_eq!(body["kind"], "state_conflict");

    let inventory: Value = client
        .get(format!("{}/inventory", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        inventory["rendered"],
        "MEMBERS:\nM1: Alice - Borrowed: [B1]\n\nBOOKS:\nB1: Dune by Herbert - Available: 1/2\n"
    );

    let (status, body) = post(&client, format!("{}/loans/return", base), loan).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Book 'Dune' returned by Alice.");
    assert_eq!(body["receipt"]["available"], 2);
}

#[tokio::test]
async fn test_error_mapping() {
    let base = spawn_app().await;
    let client = Client::new();
    seed(&client, &base).await;

    let (status, body) = post(
        &client,
        format!("{}/loans/return", base),
        json!({"member_id": "M1", "book_id": "B1"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "NotIssuedToMember");

    let (status, body) = post(
        &client,
        format!("{}/loans", base),
        json!({"member_id": "M9", "book_id": "B1"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, _) = post(
        &client,
        format!("{}/members", base),
        json!({"member_id": "M1", "name": "Bob"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post(
        &client,
        format!("{}/books", base),
        json!({"book_id": "B2", "title": "Emma", "author": "Austen", "quantity": -1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let response = client
        .get(format!("{}/books/B9", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_retire_guards() {
    let base = spawn_app().await;
    let client = Client::new();
    seed(&client, &base).await;

    post(
        &client,
        format!("{}/loans", base),
        json!({"member_id": "M1", "book_id": "B1"}),
    )
    .await;

    let response = client
        .delete(format!("{}/members/M1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Member M1 still holds books: B1");

    let response = client
        .delete(format!("{}/books/B1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    post(
        &client,
        format!("{}/loans/return", base),
        json!({"member_id": "M1", "book_id": "B1"}),
    )
    .await;

    let response = client
        .delete(format!("{}/books/B1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Book B1 deleted successfully.");

    let report: Value = client
        .get(format!("{}/inventory/reconcile", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["discrepancies"], json!([]));
}
