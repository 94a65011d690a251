//! Card and deck persistence.
//!
//! The scheduler talks to storage only through [`CardStore`] and
//! [`DeckStore`]. Every operation is atomic on its own and may fail with a
//! [`StoreError`]. Two backends are provided:
//!
//! - [`MemoryStore`]: process-local, with fault injection for tests.
//! - [`FileStore`]: `cards.csv` and `decks.csv` in a data directory, rewritten
//!   after each mutation.
//!
//! Both keep cards in creation order, which is the order the due-card
//! selector presents them in.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::card::{Card, CardEdit, Deck, NewCard, ReviewUpdate};
use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait CardStore: Send + Sync {
    fn get_card(&self, id: &str) -> impl Future<Output = Result<Card, StoreError>> + Send;

    /// Cards owned by a deck, oldest first.
    fn list_cards_by_deck(
        &self,
        deck_id: &str,
    ) -> impl Future<Output = Result<Vec<Card>, StoreError>> + Send;

    fn update_card(
        &self,
        id: &str,
        update: ReviewUpdate,
    ) -> impl Future<Output = Result<Card, StoreError>> + Send;

    fn edit_card(
        &self,
        id: &str,
        edit: CardEdit,
    ) -> impl Future<Output = Result<Card, StoreError>> + Send;

    fn create_card(
        &self,
        deck_id: &str,
        card: NewCard,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Card, StoreError>> + Send;

    /// Removes a card and returns what was removed.
    fn delete_card(&self, id: &str) -> impl Future<Output = Result<Card, StoreError>> + Send;
}

pub trait DeckStore: Send + Sync {
    fn create_deck(
        &self,
        name: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Deck, StoreError>> + Send;

    fn get_deck(&self, id: &str) -> impl Future<Output = Result<Deck, StoreError>> + Send;

    /// Newest first.
    fn list_decks(&self) -> impl Future<Output = Result<Vec<Deck>, StoreError>> + Send;

    /// Adds `delta` to the deck's card count, flooring at zero. Concurrent
    /// calls are serialized by the backend.
    fn increment_card_count(
        &self,
        deck_id: &str,
        delta: i64,
    ) -> impl Future<Output = Result<Deck, StoreError>> + Send;

    fn set_card_count(
        &self,
        deck_id: &str,
        count: u64,
    ) -> impl Future<Output = Result<Deck, StoreError>> + Send;

    /// Counts the deck's cards and stores the result as one atomic step.
    fn recount_cards(
        &self,
        deck_id: &str,
    ) -> impl Future<Output = Result<Recount, StoreError>> + Send;
}

/// Result of [`DeckStore::recount_cards`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recount {
    /// The count stored before the recount.
    pub previous: u64,
    pub deck: Deck,
}

/// Everything the review service needs from a backend.
pub trait Store: CardStore + DeckStore + 'static {}

impl<T: CardStore + DeckStore + 'static> Store for T {}

/// Table contents shared by the backends. Mutations validate first and only
/// then change anything, so a failed call leaves the tables untouched.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub cards: Vec<Card>,
    pub decks: Vec<Deck>,
}

impl Tables {
    pub fn card(&self, id: &str) -> Result<Card, StoreError> {
        self.cards
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::card_not_found(id))
    }

    fn card_mut(&mut self, id: &str) -> Result<&mut Card, StoreError> {
        self.cards
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::card_not_found(id))
    }

    pub fn cards_in_deck(&self, deck_id: &str) -> Result<Vec<Card>, StoreError> {
        self.deck(deck_id)?;
        Ok(self
            .cards
            .iter()
            .filter(|c| c.deck_id == deck_id)
            .cloned()
            .collect())
    }

    pub fn update_card(&mut self, id: &str, update: &ReviewUpdate) -> Result<Card, StoreError> {
        let card = self.card_mut(id)?;
        card.apply_review(update);
        Ok(card.clone())
    }

    pub fn edit_card(&mut self, id: &str, edit: &CardEdit) -> Result<Card, StoreError> {
        let card = self.card_mut(id)?;
        card.apply_edit(edit);
        Ok(card.clone())
    }

    pub fn insert_card(
        &mut self,
        deck_id: &str,
        new: NewCard,
        now: DateTime<Utc>,
    ) -> Result<Card, StoreError> {
        self.deck(deck_id)?;
        let card = Card::new(deck_id, new, now);
        self.cards.push(card.clone());
        Ok(card)
    }

    pub fn remove_card(&mut self, id: &str) -> Result<Card, StoreError> {
        let pos = self
            .cards
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::card_not_found(id))?;
        Ok(self.cards.remove(pos))
    }

    pub fn deck(&self, id: &str) -> Result<Deck, StoreError> {
        self.decks
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| StoreError::deck_not_found(id))
    }

    fn deck_mut(&mut self, id: &str) -> Result<&mut Deck, StoreError> {
        self.decks
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::deck_not_found(id))
    }

    pub fn decks_newest_first(&self) -> Vec<Deck> {
        let mut decks = self.decks.clone();
        // stable, so equal timestamps keep reverse insertion order
        decks.reverse();
        decks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        decks
    }

    pub fn insert_deck(&mut self, name: &str, description: &str, now: DateTime<Utc>) -> Deck {
        let deck = Deck::new(name, description, now);
        self.decks.push(deck.clone());
        deck
    }

    pub fn add_to_count(&mut self, deck_id: &str, delta: i64) -> Result<Deck, StoreError> {
        let deck = self.deck_mut(deck_id)?;
        deck.card_count = if delta >= 0 {
            deck.card_count.saturating_add(delta.unsigned_abs())
        } else {
            deck.card_count.saturating_sub(delta.unsigned_abs())
        };
        Ok(deck.clone())
    }

    pub fn set_count(&mut self, deck_id: &str, count: u64) -> Result<Deck, StoreError> {
        let deck = self.deck_mut(deck_id)?;
        deck.card_count = count;
        Ok(deck.clone())
    }

    pub fn recount(&mut self, deck_id: &str) -> Result<Recount, StoreError> {
        let actual = self.cards.iter().filter(|c| c.deck_id == deck_id).count() as u64;
        let deck = self.deck_mut(deck_id)?;
        let previous = deck.card_count;
        deck.card_count = actual;
        Ok(Recount {
            previous,
            deck: deck.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn count_floors_at_zero() {
        let mut t = Tables::default();
        let deck = t.insert_deck("d", "", now());
        t.add_to_count(&deck.id, 2).unwrap();
        let after = t.add_to_count(&deck.id, -5).unwrap();
        assert_eq!(after.card_count, 0);
    }

    #[test]
    fn insert_card_requires_deck() {
        let mut t = Tables::default();
        let err = t.insert_card("missing", NewCard::new("q", "a"), now());
        assert!(matches!(err, Err(StoreError::NotFound { kind: "deck", .. })));
        assert!(t.cards.is_empty());
    }

    #[test]
    fn recount_counts_only_the_decks_cards() {
        let mut t = Tables::default();
        let a = t.insert_deck("a", "", now());
        let b = t.insert_deck("b", "", now());
        t.insert_card(&a.id, NewCard::new("q1", "a1"), now()).unwrap();
        t.insert_card(&a.id, NewCard::new("q2", "a2"), now()).unwrap();
        t.insert_card(&b.id, NewCard::new("q3", "a3"), now()).unwrap();
        t.set_count(&a.id, 9).unwrap();

        let r = t.recount(&a.id).unwrap();
        assert_eq!(r.previous, 9);
        assert_eq!(r.deck.card_count, 2);
        assert_eq!(t.deck(&a.id).unwrap().card_count, 2);
        assert!(matches!(
            t.recount("missing"),
            Err(StoreError::NotFound { kind: "deck", .. })
        ));
    }

    #[test]
    fn decks_listed_newest_first() {
        let mut t = Tables::default();
        t.insert_deck("old", "", now());
        t.insert_deck("new", "", now() + chrono::Days::new(1));
        let names: Vec<String> = t.decks_newest_first().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["new", "old"]);
    }
}
