//! Review sessions: one pass through a deck's due cards.
//!
//! A session moves `Idle -> InProgress -> Completed`. Each feedback event
//! schedules the current card, writes it through the card store and only
//! then advances the session, so a failed or cancelled write leaves the
//! session exactly where it was and the same feedback can be resubmitted.
//! At most one feedback event per session is in flight at a time. A card
//! deleted from the store while its session is open is dropped from the
//! session instead of being reviewed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::card::Card;
use crate::error::{Error, Result, StoreError};
use crate::schedule::{self, Feedback, ReviewOutcome};
use crate::select::{self, DuePolicy};
use crate::store::{CardStore, Store};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    InProgress,
    Completed,
}

/// Feedback counts. "correct" counts Good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub correct: u32,
    pub hard: u32,
    pub again: u32,
}

impl Tally {
    pub fn record(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::Again => self.again += 1,
            Feedback::Hard => self.hard += 1,
            Feedback::Good => self.correct += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.correct + self.hard + self.again
    }
}

#[derive(Debug, Clone)]
pub struct ReviewSession {
    id: SessionId,
    deck_id: String,
    cards: Vec<Card>,
    current_index: usize,
    tally: Tally,
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    in_flight: bool,
}

impl ReviewSession {
    pub fn new(deck_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deck_id: deck_id.to_string(),
            cards: Vec::new(),
            current_index: 0,
            tally: Tally::default(),
            status: SessionStatus::Idle,
            started_at: None,
            completed_at: None,
            in_flight: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Idle -> InProgress over `cards`. An empty sequence is refused and
    /// leaves the session untouched.
    pub fn begin(&mut self, cards: Vec<Card>, now: DateTime<Utc>) -> Result<()> {
        if cards.is_empty() {
            return Err(Error::EmptyDeck(self.deck_id.clone()));
        }
        self.cards = cards;
        self.current_index = 0;
        self.tally = Tally::default();
        self.status = SessionStatus::InProgress;
        self.started_at = Some(now);
        self.completed_at = None;
        Ok(())
    }

    pub fn current_card(&self) -> Option<&Card> {
        match self.status {
            SessionStatus::InProgress => self.cards.get(self.current_index),
            _ => None,
        }
    }

    /// Applies a persisted review of the current card and advances.
    pub fn record(&mut self, feedback: Feedback, reviewed: Card, now: DateTime<Utc>) {
        if let Some(slot) = self.cards.get_mut(self.current_index) {
            *slot = reviewed;
        }
        self.tally.record(feedback);
        if self.current_index + 1 < self.cards.len() {
            self.current_index += 1;
        } else {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
        }
    }

    /// Takes the current card out of the sequence without reviewing it. The
    /// next card moves into its place; dropping the last one completes.
    pub fn drop_current(&mut self, now: DateTime<Utc>) {
        if self.status != SessionStatus::InProgress || self.current_index >= self.cards.len() {
            return;
        }
        self.cards.remove(self.current_index);
        if self.current_index >= self.cards.len() {
            self.current_index = self.cards.len().saturating_sub(1);
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
        }
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.current_index, self.cards.len())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            deck_id: self.deck_id.clone(),
            status: self.status,
            current_index: self.current_index,
            total: self.cards.len(),
            current_card: self.current_card().cloned(),
            tally: self.tally,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub deck_id: String,
    pub status: SessionStatus,
    pub current_index: usize,
    pub total: usize,
    pub current_card: Option<Card>,
    pub tally: Tally,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResult {
    pub card: Card,
    pub interval_days: u64,
    pub status: SessionStatus,
    pub tally: Tally,
    pub next_card: Option<Card>,
}

type SessionTable = Mutex<HashMap<SessionId, ReviewSession>>;

fn lock(sessions: &SessionTable) -> MutexGuard<'_, HashMap<SessionId, ReviewSession>> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears a session's in-flight mark unless disarmed, including when the
/// feedback future is dropped mid-write.
struct InFlight<'a> {
    sessions: &'a SessionTable,
    id: &'a str,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Some(session) = lock(self.sessions).get_mut(self.id)
        {
            session.in_flight = false;
        }
    }
}

/// Addressable review sessions over a shared store.
pub struct SessionManager<S> {
    store: Arc<S>,
    sessions: SessionTable,
    policy: DuePolicy,
}

impl<S: Store> SessionManager<S> {
    pub fn new(store: Arc<S>, policy: DuePolicy) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> DuePolicy {
        self.policy
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    async fn due_sequence(&self, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<Card>> {
        let cards = self.store.list_cards_by_deck(deck_id).await?;
        if cards.is_empty() {
            return Err(Error::EmptyDeck(deck_id.to_string()));
        }
        let due = select::select_due(&cards, now, self.policy);
        if due.is_empty() {
            return Err(Error::NothingDue(deck_id.to_string()));
        }
        Ok(due)
    }

    pub async fn start_session(&self, deck_id: &str, now: DateTime<Utc>) -> Result<SessionView> {
        let cards = self.due_sequence(deck_id, now).await?;
        let mut session = ReviewSession::new(deck_id);
        session.begin(cards, now)?;
        let view = session.view();
        lock(&self.sessions).insert(session.id.clone(), session);
        info!(
            "Started session {} on deck {deck_id} with {} cards",
            view.session_id, view.total
        );
        Ok(view)
    }

    pub fn session_state(&self, session_id: &str) -> Result<SessionView> {
        lock(&self.sessions)
            .get(session_id)
            .map(ReviewSession::view)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Marks the session busy and returns the card feedback applies to.
    fn claim(&self, session_id: &str) -> Result<Card> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if session.status == SessionStatus::Completed {
            return Err(Error::SessionAlreadyCompleted(session_id.to_string()));
        }
        if session.in_flight {
            return Err(Error::FeedbackInFlight(session_id.to_string()));
        }
        let card = session
            .current_card()
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.in_flight = true;
        Ok(card)
    }

    /// The current card no longer exists in the store: drop it so the
    /// session can move on.
    fn skip_removed(&self, session_id: &str, card_id: &str, now: DateTime<Utc>) {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };
        session.in_flight = false;
        if session.current_card().is_some_and(|c| c.id == card_id) {
            session.drop_current(now);
        }
        warn!("Session {session_id}: card {card_id} no longer exists, skipping it");
    }

    fn finish(
        &self,
        session_id: &str,
        feedback: Feedback,
        outcome: ReviewOutcome,
        reviewed: Card,
        now: DateTime<Utc>,
    ) -> Result<FeedbackResult> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.in_flight = false;
        session.record(feedback, reviewed.clone(), now);
        if session.status == SessionStatus::Completed {
            info!(
                "Session {session_id} completed: {} good, {} hard, {} again",
                session.tally.correct, session.tally.hard, session.tally.again
            );
        }
        Ok(FeedbackResult {
            card: reviewed,
            interval_days: outcome.interval_days,
            status: session.status,
            tally: session.tally,
            next_card: session.current_card().cloned(),
        })
    }

    pub async fn submit_feedback(
        &self,
        session_id: &str,
        feedback: Feedback,
        now: DateTime<Utc>,
    ) -> Result<FeedbackResult> {
        let card = self.claim(session_id)?;
        let mut guard = InFlight {
            sessions: &self.sessions,
            id: session_id,
            armed: true,
        };

        let outcome = schedule::schedule(card.review_count, feedback, now)?;
        debug!(
            "Session {session_id}: card {} rated {}, next review in {} days",
            card.id,
            feedback.name(),
            outcome.interval_days
        );

        let reviewed = match self.store.update_card(&card.id, outcome.update()).await {
            Ok(c) => c,
            Err(StoreError::NotFound { .. }) => {
                guard.armed = false;
                self.skip_removed(session_id, &card.id, now);
                return Err(Error::CardRemoved(card.id));
            }
            Err(e) => {
                warn!("Session {session_id}: could not save card {}: {e}", card.id);
                return Err(e.into());
            }
        };

        guard.armed = false;
        self.finish(session_id, feedback, outcome, reviewed, now)
    }

    /// Like `submit_feedback`, but gives up after `timeout`. A timed-out
    /// submission leaves the session on the same card.
    pub async fn submit_feedback_within(
        &self,
        session_id: &str,
        feedback: Feedback,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<FeedbackResult> {
        match tokio::time::timeout(timeout, self.submit_feedback(session_id, feedback, now)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Session {session_id}: feedback timed out after {timeout:?}");
                Err(Error::TimedOut)
            }
        }
    }

    /// Starts the session over with a freshly selected due sequence.
    pub async fn restart_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<SessionView> {
        let deck_id = {
            let sessions = lock(&self.sessions);
            let session = sessions
                .get(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
            if session.in_flight {
                return Err(Error::FeedbackInFlight(session_id.to_string()));
            }
            session.deck_id.clone()
        };

        let cards = self.due_sequence(&deck_id, now).await?;

        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if session.in_flight {
            return Err(Error::FeedbackInFlight(session_id.to_string()));
        }
        session.begin(cards, now)?;
        info!(
            "Restarted session {session_id} with {} cards",
            session.cards.len()
        );
        Ok(session.view())
    }

    /// Discards a session and returns its final state.
    pub fn end_session(&self, session_id: &str) -> Result<SessionView> {
        let mut sessions = lock(&self.sessions);
        let busy = sessions
            .get(session_id)
            .map(|s| s.in_flight)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if busy {
            return Err(Error::FeedbackInFlight(session_id.to_string()));
        }
        let view = sessions
            .remove(session_id)
            .map(|s| s.view())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        info!("Ended session {session_id}");
        Ok(view)
    }
}
