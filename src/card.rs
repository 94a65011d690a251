use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CardId = String;
pub type DeckId = String;

/// Authoring label on a card. Not a scheduling input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_review_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// A fresh card, due immediately.
    pub fn new(deck_id: &str, new: NewCard, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deck_id: deck_id.to_string(),
            front: new.front,
            back: new.back,
            difficulty: new.difficulty.unwrap_or_default(),
            review_count: 0,
            last_review_date: None,
            next_review_date: Some(now),
            created_at: now,
        }
    }

    pub fn apply_review(&mut self, update: &ReviewUpdate) {
        self.review_count = update.review_count;
        self.last_review_date = Some(update.last_review_date);
        self.next_review_date = Some(update.next_review_date);
    }

    pub fn apply_edit(&mut self, edit: &CardEdit) {
        if let Some(front) = &edit.front {
            self.front = front.clone();
        }
        if let Some(back) = &edit.back {
            self.back = back.clone();
        }
        if let Some(difficulty) = edit.difficulty {
            self.difficulty = difficulty;
        }
    }
}

/// Content for a card about to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl NewCard {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            difficulty: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }
}

/// Content changes to an existing card. Scheduling fields are not editable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardEdit {
    #[serde(default)]
    pub front: Option<String>,
    #[serde(default)]
    pub back: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

/// The fields a review writes back through the card store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    pub review_count: u32,
    pub last_review_date: DateTime<Utc>,
    pub next_review_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub card_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: &str, description: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            card_count: 0,
            created_at: now,
        }
    }
}

pub fn expand_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_card_is_due_immediately() {
        let card = Card::new("deck-1", NewCard::new("Q", "A"), now());
        assert_eq!(card.review_count, 0);
        assert_eq!(card.next_review_date, Some(now()));
        assert!(card.last_review_date.is_none());
        assert_eq!(card.difficulty, Difficulty::Medium);
        assert!(!card.id.is_empty());
    }

    #[test]
    fn edit_leaves_scheduling_alone() {
        let mut card = Card::new("deck-1", NewCard::new("Q", "A"), now());
        card.review_count = 4;
        card.apply_edit(&CardEdit {
            front: Some("Q2".into()),
            back: None,
            difficulty: Some(Difficulty::Hard),
        });
        assert_eq!(card.front, "Q2");
        assert_eq!(card.back, "A");
        assert_eq!(card.difficulty, Difficulty::Hard);
        assert_eq!(card.review_count, 4);
    }

    #[test]
    fn card_json_uses_camel_case() {
        let card = Card::new("deck-1", NewCard::new("Q", "A"), now());
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["reviewCount"], 0);
        assert_eq!(json["deckId"], "deck-1");
        assert_eq!(json["difficulty"], "medium");
        assert!(json.get("nextReviewDate").is_some());
        assert!(json.get("lastReviewDate").is_none());
    }

    #[test]
    fn difficulty_parsing() {
        assert_eq!("Hard".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(" easy ".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert!("brutal".parse::<Difficulty>().is_err());
    }

    #[test]
    fn expand_newlines_works() {
        assert_eq!(expand_newlines("line1\\nline2"), "line1\nline2");
        assert_eq!(expand_newlines("no newlines"), "no newlines");
    }
}
