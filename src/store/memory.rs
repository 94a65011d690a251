use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{CardStore, DeckStore, Recount, Tables};
use crate::card::{Card, CardEdit, Deck, NewCard, ReviewUpdate};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Faults {
    fail_writes: usize,
    fail_count_updates: usize,
    write_delay: Option<Duration>,
    writes: usize,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(decks: Vec<Deck>, cards: Vec<Card>) -> Self {
        Self {
            tables: Mutex::new(Tables { cards, decks }),
            faults: Mutex::default(),
        }
    }

    /// The next `n` write operations fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.faults().fail_writes = n;
    }

    /// The next `n` card-count updates fail, other writes are unaffected.
    pub fn fail_next_count_updates(&self, n: usize) {
        self.faults().fail_count_updates = n;
    }

    /// Every write sleeps this long before touching the tables.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.faults().write_delay = delay;
    }

    /// Successful write operations so far.
    pub fn write_count(&self) -> usize {
        self.faults().writes
    }

    /// Number of cards held across all decks.
    pub fn card_total(&self) -> usize {
        self.tables().cards.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn before_write(&self, count_update: bool) -> Result<(), StoreError> {
        let delay = self.faults().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut faults = self.faults();
        if faults.fail_writes > 0 {
            faults.fail_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        if count_update && faults.fail_count_updates > 0 {
            faults.fail_count_updates -= 1;
            return Err(StoreError::Unavailable("injected count failure".into()));
        }
        Ok(())
    }

    fn counted<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if result.is_ok() {
            self.faults().writes += 1;
        }
        result
    }
}

impl CardStore for MemoryStore {
    async fn get_card(&self, id: &str) -> Result<Card, StoreError> {
        self.tables().card(id)
    }

    async fn list_cards_by_deck(&self, deck_id: &str) -> Result<Vec<Card>, StoreError> {
        self.tables().cards_in_deck(deck_id)
    }

    async fn update_card(&self, id: &str, update: ReviewUpdate) -> Result<Card, StoreError> {
        self.before_write(false).await?;
        self.counted(self.tables().update_card(id, &update))
    }

    async fn edit_card(&self, id: &str, edit: CardEdit) -> Result<Card, StoreError> {
        self.before_write(false).await?;
        self.counted(self.tables().edit_card(id, &edit))
    }

    async fn create_card(
        &self,
        deck_id: &str,
        card: NewCard,
        now: DateTime<Utc>,
    ) -> Result<Card, StoreError> {
        self.before_write(false).await?;
        self.counted(self.tables().insert_card(deck_id, card, now))
    }

    async fn delete_card(&self, id: &str) -> Result<Card, StoreError> {
        self.before_write(false).await?;
        self.counted(self.tables().remove_card(id))
    }
}

impl DeckStore for MemoryStore {
    async fn create_deck(
        &self,
        name: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Deck, StoreError> {
        self.before_write(false).await?;
        self.counted(Ok(self.tables().insert_deck(name, description, now)))
    }

    async fn get_deck(&self, id: &str) -> Result<Deck, StoreError> {
        self.tables().deck(id)
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StoreError> {
        Ok(self.tables().decks_newest_first())
    }

    async fn increment_card_count(&self, deck_id: &str, delta: i64) -> Result<Deck, StoreError> {
        self.before_write(true).await?;
        self.counted(self.tables().add_to_count(deck_id, delta))
    }

    async fn set_card_count(&self, deck_id: &str, count: u64) -> Result<Deck, StoreError> {
        self.before_write(true).await?;
        self.counted(self.tables().set_count(deck_id, count))
    }

    async fn recount_cards(&self, deck_id: &str) -> Result<Recount, StoreError> {
        self.before_write(true).await?;
        self.counted(self.tables().recount(deck_id))
    }
}
