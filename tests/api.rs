use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use recall::clock::FixedClock;
use recall::select::DuePolicy;
use recall::session::SessionManager;
use recall::store::MemoryStore;
use recall::web::{self, AppState};

fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
    ));
    let sessions = SessionManager::new(Arc::clone(&store), DuePolicy::FallbackToAll);
    let state = Arc::new(AppState::new(sessions, clock));
    (web::router(state), store)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_deck(app: &Router, name: &str) -> String {
    let (status, deck) = call(app, "POST", "/api/decks", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    deck["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn study_a_deck_over_http() {
    let (app, _) = app();
    let deck_id = create_deck(&app, "chemistry").await;

    let (status, card) = call(
        &app,
        "POST",
        &format!("/api/decks/{deck_id}/cards"),
        Some(json!({ "front": "H2O?", "back": "water", "difficulty": "easy" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(card["reviewCount"], 0);
    assert_eq!(card["difficulty"], "easy");

    let (status, cards) = call(
        &app,
        "POST",
        &format!("/api/decks/{deck_id}/cards/bulk"),
        Some(json!({ "cards": [
            { "front": "NaCl?", "back": "salt" },
            { "front": "Fe?", "back": "iron" }
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(cards.as_array().unwrap().len(), 2);

    let (_, deck) = call(&app, "GET", &format!("/api/decks/{deck_id}"), None).await;
    assert_eq!(deck["cardCount"], 3);
    assert_eq!(deck["due"], 3);

    let (status, session) = call(
        &app,
        "POST",
        "/api/sessions",
        Some(json!({ "deckId": deck_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["total"], 3);
    assert_eq!(session["status"], "in_progress");
    let sid = session["sessionId"].as_str().unwrap().to_string();
    let feedback_uri = format!("/api/sessions/{sid}/feedback");

    let (status, _) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 9 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, result) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["card"]["reviewCount"], 1);
    assert_eq!(result["intervalDays"], 2);
    assert_eq!(result["nextCard"]["front"], "NaCl?");

    call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 1 }))).await;
    let (_, result) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 0 }))).await;
    assert_eq!(result["status"], "completed");
    assert_eq!(
        result["tally"],
        json!({ "correct": 1, "hard": 1, "again": 1 })
    );

    let (status, _) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 2 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, state) = call(&app, "GET", &format!("/api/sessions/{sid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["status"], "completed");

    let (status, restarted) =
        call(&app, "POST", &format!("/api/sessions/{sid}/restart"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restarted["status"], "in_progress");
    assert_eq!(restarted["total"], 3);
}

#[tokio::test]
async fn error_statuses() {
    let (app, store) = app();
    let deck_id = create_deck(&app, "empty").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions",
        Some(json!({ "deckId": deck_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("no cards"));

    let (status, _) = call(&app, "GET", "/api/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/decks/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/decks/{deck_id}/cards"),
        Some(json!({ "front": "", "back": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/api/decks", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, card) = call(
        &app,
        "POST",
        &format!("/api/decks/{deck_id}/cards"),
        Some(json!({ "front": "q", "back": "a" })),
    )
    .await;
    let (_, session) = call(
        &app,
        "POST",
        "/api/sessions",
        Some(json!({ "deckId": deck_id })),
    )
    .await;
    let sid = session["sessionId"].as_str().unwrap();
    store.fail_next_writes(1);
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/sessions/{sid}/feedback"),
        Some(json!({ "feedback": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, state) = call(&app, "GET", &format!("/api/sessions/{sid}"), None).await;
    assert_eq!(state["currentIndex"], 0);
    assert_eq!(state["currentCard"]["id"], card["id"]);
}

#[tokio::test]
async fn card_edit_and_delete() {
    let (app, _) = app();
    let deck_id = create_deck(&app, "history").await;
    let (_, card) = call(
        &app,
        "POST",
        &format!("/api/decks/{deck_id}/cards"),
        Some(json!({ "front": "1066?", "back": "Hastings" })),
    )
    .await;
    let card_uri = format!("/api/cards/{}", card["id"].as_str().unwrap());

    let (status, edited) = call(
        &app,
        "PUT",
        &card_uri,
        Some(json!({ "back": "Battle of Hastings", "difficulty": "hard" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["back"], "Battle of Hastings");
    assert_eq!(edited["front"], "1066?");
    assert_eq!(edited["difficulty"], "hard");

    let (status, body) = call(&app, "DELETE", &card_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Card deleted successfully");

    let (_, deck) = call(&app, "GET", &format!("/api/decks/{deck_id}"), None).await;
    assert_eq!(deck["cardCount"], 0);

    let (status, _) = call(&app, "GET", &card_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "POST", &format!("/api/decks/{deck_id}/recount"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cardCount"], 0);

    let (_, decks) = call(&app, "GET", "/api/decks", None).await;
    assert_eq!(decks.as_array().unwrap().len(), 1);
    assert_eq!(decks[0]["name"], "history");
}

#[tokio::test]
async fn card_deleted_mid_session_is_gone() {
    let (app, _) = app();
    let deck_id = create_deck(&app, "geography").await;
    for (q, a) in [("Lima?", "Peru"), ("Quito?", "Ecuador")] {
        call(
            &app,
            "POST",
            &format!("/api/decks/{deck_id}/cards"),
            Some(json!({ "front": q, "back": a })),
        )
        .await;
    }
    let (_, session) = call(
        &app,
        "POST",
        "/api/sessions",
        Some(json!({ "deckId": deck_id })),
    )
    .await;
    let sid = session["sessionId"].as_str().unwrap();
    let first = session["currentCard"]["id"].as_str().unwrap();
    call(&app, "DELETE", &format!("/api/cards/{first}"), None).await;

    let feedback_uri = format!("/api/sessions/{sid}/feedback");
    let (status, _) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 2 }))).await;
    assert_eq!(status, StatusCode::GONE);

    let (status, result) = call(&app, "POST", &feedback_uri, Some(json!({ "feedback": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["card"]["front"], "Quito?");
    assert_eq!(result["status"], "completed");
}
