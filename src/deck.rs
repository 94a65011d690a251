//! Deck and card mutations that keep `Deck::card_count` in step with the
//! cards a deck owns.
//!
//! Count changes go through `DeckStore::increment_card_count`, which the
//! backend serializes, so concurrent adds and removes on one deck never lose
//! an update. A card create whose count update fails is undone; a delete
//! whose count update fails falls back to [`recount`].

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::card::{Card, CardEdit, Deck, NewCard};
use crate::error::{Error, Result};
use crate::store::{CardStore, DeckStore, Store};

fn validate_card(card: &NewCard) -> Result<()> {
    if card.front.trim().is_empty() || card.back.trim().is_empty() {
        return Err(Error::InvalidInput(
            "front and back content are required".into(),
        ));
    }
    Ok(())
}

pub async fn create_deck<S: DeckStore>(
    store: &S,
    name: &str,
    description: &str,
    now: DateTime<Utc>,
) -> Result<Deck> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("deck name is required".into()));
    }
    let deck = store.create_deck(name, description.trim(), now).await?;
    info!("Created deck {} ({})", deck.name, deck.id);
    Ok(deck)
}

pub async fn on_card_added<S: DeckStore>(store: &S, deck_id: &str) -> Result<Deck> {
    Ok(store.increment_card_count(deck_id, 1).await?)
}

pub async fn on_card_removed<S: DeckStore>(store: &S, deck_id: &str) -> Result<Deck> {
    Ok(store.increment_card_count(deck_id, -1).await?)
}

pub async fn add_card<S: Store>(
    store: &S,
    deck_id: &str,
    card: NewCard,
    now: DateTime<Utc>,
) -> Result<Card> {
    validate_card(&card)?;
    let created = store.create_card(deck_id, card, now).await?;
    if let Err(e) = on_card_added(store, deck_id).await {
        undo_creates(store, std::slice::from_ref(&created)).await;
        return Err(e);
    }
    info!("Added card {} to deck {deck_id}", created.id);
    Ok(created)
}

/// Adds a batch of cards in order with a single count update.
pub async fn add_cards<S: Store>(
    store: &S,
    deck_id: &str,
    cards: Vec<NewCard>,
    now: DateTime<Utc>,
) -> Result<Vec<Card>> {
    for card in &cards {
        validate_card(card)?;
    }
    store.get_deck(deck_id).await?;

    let mut created = Vec::with_capacity(cards.len());
    for card in cards {
        match store.create_card(deck_id, card, now).await {
            Ok(c) => created.push(c),
            Err(e) => {
                undo_creates(store, &created).await;
                return Err(e.into());
            }
        }
    }
    if created.is_empty() {
        return Ok(created);
    }

    let delta = i64::try_from(created.len()).unwrap_or(i64::MAX);
    if let Err(e) = store.increment_card_count(deck_id, delta).await {
        undo_creates(store, &created).await;
        return Err(e.into());
    }
    info!("Added {} cards to deck {deck_id}", created.len());
    Ok(created)
}

async fn undo_creates<S: CardStore>(store: &S, cards: &[Card]) {
    for card in cards {
        if let Err(e) = store.delete_card(&card.id).await {
            warn!(
                "Could not undo creation of card {} in deck {}: {e}",
                card.id, card.deck_id
            );
        }
    }
}

pub async fn remove_card<S: Store>(store: &S, card_id: &str) -> Result<Card> {
    let removed = store.delete_card(card_id).await?;
    if let Err(e) = on_card_removed(store, &removed.deck_id).await {
        warn!(
            "Count update for deck {} failed after deleting card {card_id}: {e}; recounting",
            removed.deck_id
        );
        recount(store, &removed.deck_id).await?;
    }
    info!("Removed card {card_id} from deck {}", removed.deck_id);
    Ok(removed)
}

pub async fn edit_card<S: CardStore>(store: &S, card_id: &str, edit: CardEdit) -> Result<Card> {
    let blank = |s: &Option<String>| s.as_deref().is_some_and(|s| s.trim().is_empty());
    if blank(&edit.front) || blank(&edit.back) {
        return Err(Error::InvalidInput(
            "front and back content cannot be empty".into(),
        ));
    }
    Ok(store.edit_card(card_id, edit).await?)
}

/// Recomputes a deck's count from the cards it owns and stores it. The
/// count and the store happen in one backend step, so a concurrent add or
/// remove is either fully before or fully after it.
pub async fn recount<S: DeckStore>(store: &S, deck_id: &str) -> Result<u64> {
    let r = store.recount_cards(deck_id).await?;
    let actual = r.deck.card_count;
    if r.previous != actual {
        warn!(
            "Deck {deck_id} count drifted: stored {}, actual {actual}",
            r.previous
        );
    }
    Ok(actual)
}
