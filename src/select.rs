use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{Card, Deck};

/// What to present when a deck has cards but none of them are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuePolicy {
    /// Present every card in storage order.
    #[default]
    FallbackToAll,
    /// Present nothing; the caller reports "nothing due".
    DueOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummary {
    pub id: String,
    pub name: String,
    pub total: usize,
    pub due: usize,
}

pub fn is_due(card: &Card, now: DateTime<Utc>) -> bool {
    match card.next_review_date {
        None => true, // never reviewed
        Some(next) => next <= now,
    }
}

pub fn filter_due(cards: &[Card], now: DateTime<Utc>) -> Vec<usize> {
    cards
        .iter()
        .enumerate()
        .filter(|(_, card)| is_due(card, now))
        .map(|(i, _)| i)
        .collect()
}

/// Cards to review, in storage order.
pub fn select_due(cards: &[Card], now: DateTime<Utc>, policy: DuePolicy) -> Vec<Card> {
    let due = filter_due(cards, now);
    if due.is_empty() {
        return match policy {
            DuePolicy::FallbackToAll => cards.to_vec(),
            DuePolicy::DueOnly => Vec::new(),
        };
    }
    due.into_iter().map(|i| cards[i].clone()).collect()
}

pub fn summarize(deck: &Deck, cards: &[Card], now: DateTime<Utc>) -> DeckSummary {
    DeckSummary {
        id: deck.id.clone(),
        name: deck.name.clone(),
        total: cards.len(),
        due: cards.iter().filter(|c| is_due(c, now)).count(),
    }
}

pub fn deck_summaries(decks: &[Deck], cards: &[Card], now: DateTime<Utc>) -> Vec<DeckSummary> {
    decks
        .iter()
        .map(|deck| {
            let owned: Vec<Card> = cards
                .iter()
                .filter(|c| c.deck_id == deck.id)
                .cloned()
                .collect();
            summarize(deck, &owned, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Difficulty;
    use chrono::TimeZone;

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn card(id: &str, next: Option<DateTime<Utc>>) -> Card {
        Card {
            id: id.into(),
            deck_id: "deck".into(),
            front: format!("q{id}"),
            back: format!("a{id}"),
            difficulty: Difficulty::Medium,
            review_count: if next.is_some() { 1 } else { 0 },
            last_review_date: None,
            next_review_date: next,
            created_at: today(),
        }
    }

    fn ids(cards: &[Card]) -> Vec<&str> {
        cards.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn due_and_never_reviewed_selected_in_storage_order() {
        let yesterday = today() - chrono::Days::new(1);
        let tomorrow = today() + chrono::Days::new(1);
        let cards = vec![
            card("A", None),
            card("B", Some(yesterday)),
            card("C", Some(tomorrow)),
        ];
        let selected = select_due(&cards, today(), DuePolicy::FallbackToAll);
        assert_eq!(ids(&selected), vec!["A", "B"]);
    }

    #[test]
    fn nothing_due_falls_back_to_all_unchanged() {
        let cards = vec![
            card("C", Some(today() + chrono::Days::new(3))),
            card("B", Some(today() + chrono::Days::new(1))),
            card("A", Some(today() + chrono::Days::new(2))),
        ];
        let selected = select_due(&cards, today(), DuePolicy::FallbackToAll);
        assert_eq!(ids(&selected), vec!["C", "B", "A"]);
    }

    #[test]
    fn nothing_due_under_due_only_is_empty() {
        let cards = vec![card("C", Some(today() + chrono::Days::new(3)))];
        assert!(select_due(&cards, today(), DuePolicy::DueOnly).is_empty());
    }

    #[test]
    fn due_exactly_now_is_due() {
        let cards = vec![card("A", Some(today()))];
        assert_eq!(filter_due(&cards, today()), vec![0]);
    }

    #[test]
    fn never_reviewed_always_present() {
        let future = today() + chrono::Days::new(30);
        let cards = vec![
            card("X", Some(future)),
            card("N1", None),
            card("Y", Some(today() - chrono::Days::new(2))),
            card("N2", None),
        ];
        for policy in [DuePolicy::FallbackToAll, DuePolicy::DueOnly] {
            let selected = select_due(&cards, today(), policy);
            assert!(selected.iter().any(|c| c.id == "N1"));
            assert!(selected.iter().any(|c| c.id == "N2"));
        }
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_due(&[], today(), DuePolicy::FallbackToAll).is_empty());
    }

    #[test]
    fn summaries_group_by_deck() {
        let math = Deck::new("math", "", today());
        let science = Deck::new("science", "", today());
        let mut a = card("1", None);
        a.deck_id = math.id.clone();
        let mut b = card("2", Some(today() + chrono::Days::new(20)));
        b.deck_id = math.id.clone();
        let mut c = card("3", None);
        c.deck_id = science.id.clone();

        let summaries = deck_summaries(&[math, science], &[a, b, c], today());
        assert_eq!(summaries.len(), 2);
        let m = summaries.iter().find(|s| s.name == "math").unwrap();
        assert_eq!((m.total, m.due), (2, 1));
        let s = summaries.iter().find(|s| s.name == "science").unwrap();
        assert_eq!((s.total, s.due), (1, 1));
    }
}
