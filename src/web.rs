use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::card::{Card, CardEdit, Deck, NewCard};
use crate::clock::Clock;
use crate::deck;
use crate::error::{Error, StoreError};
use crate::schedule::Feedback;
use crate::select;
use crate::session::{FeedbackResult, SessionManager, SessionView};
use crate::store::{CardStore, DeckStore, Store};

// -- App state --

pub struct AppState<S> {
    pub sessions: SessionManager<S>,
    pub clock: Arc<dyn Clock>,
    /// Upper bound on the card write behind one feedback event.
    pub feedback_timeout: Option<Duration>,
}

type SharedState<S> = Arc<AppState<S>>;

impl<S: Store> AppState<S> {
    pub fn new(sessions: SessionManager<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            clock,
            feedback_timeout: None,
        }
    }

    fn store(&self) -> &S {
        self.sessions.store()
    }
}

// -- Errors --

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidFeedback(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Store(StoreError::NotFound { .. }) | Error::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::SessionAlreadyCompleted(_) | Error::FeedbackInFlight(_) => StatusCode::CONFLICT,
            Error::EmptyDeck(_) | Error::NothingDue(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::CardRemoved(_) => StatusCode::GONE,
            Error::ReviewOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {self}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, Error>;

// -- Request / response bodies --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckOverview {
    #[serde(flatten)]
    pub deck: Deck,
    pub due: usize,
}

#[derive(Debug, Deserialize)]
struct CreateDeckBody {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct BulkCardsBody {
    cards: Vec<NewCard>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionBody {
    deck_id: String,
}

#[derive(Debug, Deserialize)]
struct FeedbackBody {
    feedback: u8,
}

// -- Deck handlers --

async fn overview<S: Store>(state: &AppState<S>, deck: Deck) -> ApiResult<DeckOverview> {
    let cards = state.store().list_cards_by_deck(&deck.id).await?;
    let summary = select::summarize(&deck, &cards, state.clock.now());
    Ok(DeckOverview {
        deck,
        due: summary.due,
    })
}

async fn list_decks<S: Store>(
    State(state): State<SharedState<S>>,
) -> ApiResult<Json<Vec<DeckOverview>>> {
    let decks = state.store().list_decks().await?;
    let mut out = Vec::with_capacity(decks.len());
    for d in decks {
        out.push(overview(&state, d).await?);
    }
    Ok(Json(out))
}

async fn create_deck<S: Store>(
    State(state): State<SharedState<S>>,
    Json(body): Json<CreateDeckBody>,
) -> ApiResult<(StatusCode, Json<Deck>)> {
    let created =
        deck::create_deck(state.store(), &body.name, &body.description, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_deck<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeckOverview>> {
    let d = state.store().get_deck(&id).await?;
    Ok(Json(overview(&state, d).await?))
}

async fn list_cards<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Card>>> {
    Ok(Json(state.store().list_cards_by_deck(&id).await?))
}

async fn add_card<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    Json(body): Json<NewCard>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let card = deck::add_card(state.store(), &id, body, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn add_cards<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    Json(body): Json<BulkCardsBody>,
) -> ApiResult<(StatusCode, Json<Vec<Card>>)> {
    let cards = deck::add_cards(state.store(), &id, body.cards, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(cards)))
}

async fn recount<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = deck::recount(state.store(), &id).await?;
    Ok(Json(serde_json::json!({ "cardCount": count })))
}

// -- Card handlers --

async fn get_card<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Card>> {
    Ok(Json(state.store().get_card(&id).await?))
}

async fn edit_card<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    Json(body): Json<CardEdit>,
) -> ApiResult<Json<Card>> {
    Ok(Json(deck::edit_card(state.store(), &id, body).await?))
}

async fn delete_card<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    deck::remove_card(state.store(), &id).await?;
    Ok(Json(
        serde_json::json!({ "message": "Card deleted successfully" }),
    ))
}

// -- Session handlers --

async fn start_session<S: Store>(
    State(state): State<SharedState<S>>,
    Json(body): Json<StartSessionBody>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let view = state
        .sessions
        .start_session(&body.deck_id, state.clock.now())
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn session_state<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.sessions.session_state(&id)?))
}

async fn submit_feedback<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> ApiResult<Json<FeedbackResult>> {
    let feedback = Feedback::from_u8(body.feedback)?;
    let now = state.clock.now();
    let result = match state.feedback_timeout {
        Some(timeout) => {
            state
                .sessions
                .submit_feedback_within(&id, feedback, now, timeout)
                .await?
        }
        None => state.sessions.submit_feedback(&id, feedback, now).await?,
    };
    Ok(Json(result))
}

async fn restart_session<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let view = state
        .sessions
        .restart_session(&id, state.clock.now())
        .await?;
    Ok(Json(view))
}

async fn end_session<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.sessions.end_session(&id)?))
}

// -- Public entry points --

pub fn router<S: Store>(state: SharedState<S>) -> Router {
    Router::new()
        .route("/api/decks", get(list_decks::<S>).post(create_deck::<S>))
        .route("/api/decks/{id}", get(get_deck::<S>))
        .route(
            "/api/decks/{id}/cards",
            get(list_cards::<S>).post(add_card::<S>),
        )
        .route("/api/decks/{id}/cards/bulk", post(add_cards::<S>))
        .route("/api/decks/{id}/recount", post(recount::<S>))
        .route(
            "/api/cards/{id}",
            get(get_card::<S>)
                .put(edit_card::<S>)
                .delete(delete_card::<S>),
        )
        .route("/api/sessions", post(start_session::<S>))
        .route(
            "/api/sessions/{id}",
            get(session_state::<S>).delete(end_session::<S>),
        )
        .route("/api/sessions/{id}/feedback", post(submit_feedback::<S>))
        .route("/api/sessions/{id}/restart", post(restart_session::<S>))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

pub async fn serve<S: Store>(state: SharedState<S>, port: u16) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Serving at http://localhost:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
