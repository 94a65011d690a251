use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{CardStore, DeckStore, Recount, Tables};
use crate::card::{Card, CardEdit, Deck, Difficulty, NewCard, ReviewUpdate};
use crate::error::StoreError;

const CARDS_FILE: &str = "cards.csv";
const DECKS_FILE: &str = "decks.csv";

const CARD_HEADER: [&str; 9] = [
    "id",
    "deck_id",
    "front",
    "back",
    "difficulty",
    "review_count",
    "last_review_date",
    "next_review_date",
    "created_at",
];

const DECK_HEADER: [&str; 5] = ["id", "name", "description", "card_count", "created_at"];

/// CSV-backed store. Tables are held in memory and both files are rewritten
/// after every successful mutation; a mutation whose write fails is discarded.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let cards_path = dir.join(CARDS_FILE);
        let decks_path = dir.join(DECKS_FILE);
        let cards = if cards_path.exists() {
            load_cards(&cards_path)?
        } else {
            Vec::new()
        };
        let decks = if decks_path.exists() {
            load_decks(&decks_path)?
        } else {
            Vec::new()
        };
        log::info!(
            "Loaded {} cards in {} decks from {}",
            cards.len(),
            decks.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            tables: Mutex::new(Tables { cards, decks }),
        })
    }

    /// Current decks and cards, for seeding another backend.
    pub fn snapshot(&self) -> (Vec<Deck>, Vec<Card>) {
        let tables = self.tables();
        (tables.decks.clone(), tables.cards.clone())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `f` to a copy of the tables, persists the copy, then swaps it in.
    fn commit<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.tables();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        save_cards(&self.dir.join(CARDS_FILE), &draft.cards)?;
        save_decks(&self.dir.join(DECKS_FILE), &draft.decks)?;
        *guard = draft;
        Ok(out)
    }
}

impl CardStore for FileStore {
    async fn get_card(&self, id: &str) -> Result<Card, StoreError> {
        self.tables().card(id)
    }

    async fn list_cards_by_deck(&self, deck_id: &str) -> Result<Vec<Card>, StoreError> {
        self.tables().cards_in_deck(deck_id)
    }

    async fn update_card(&self, id: &str, update: ReviewUpdate) -> Result<Card, StoreError> {
        self.commit(|t| t.update_card(id, &update))
    }

    async fn edit_card(&self, id: &str, edit: CardEdit) -> Result<Card, StoreError> {
        self.commit(|t| t.edit_card(id, &edit))
    }

    async fn create_card(
        &self,
        deck_id: &str,
        card: NewCard,
        now: DateTime<Utc>,
    ) -> Result<Card, StoreError> {
        self.commit(|t| t.insert_card(deck_id, card, now))
    }

    async fn delete_card(&self, id: &str) -> Result<Card, StoreError> {
        self.commit(|t| t.remove_card(id))
    }
}

impl DeckStore for FileStore {
    async fn create_deck(
        &self,
        name: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Deck, StoreError> {
        self.commit(|t| Ok(t.insert_deck(name, description, now)))
    }

    async fn get_deck(&self, id: &str) -> Result<Deck, StoreError> {
        self.tables().deck(id)
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StoreError> {
        Ok(self.tables().decks_newest_first())
    }

    async fn increment_card_count(&self, deck_id: &str, delta: i64) -> Result<Deck, StoreError> {
        self.commit(|t| t.add_to_count(deck_id, delta))
    }

    async fn set_card_count(&self, deck_id: &str, count: u64) -> Result<Deck, StoreError> {
        self.commit(|t| t.set_count(deck_id, count))
    }

    async fn recount_cards(&self, deck_id: &str) -> Result<Recount, StoreError> {
        self.commit(|t| t.recount(deck_id))
    }
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

fn malformed(path: &Path, message: String) -> StoreError {
    StoreError::Malformed {
        file: path.display().to_string(),
        message,
    }
}

fn parse_optional_instant(path: &Path, s: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|d| Some(d.with_timezone(&Utc)))
        .map_err(|e| malformed(path, format!("bad timestamp {s:?}: {e}")))
}

fn parse_instant(path: &Path, s: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_optional_instant(path, s)?.ok_or_else(|| malformed(path, "missing timestamp".into()))
}

fn format_optional_instant(d: Option<DateTime<Utc>>) -> String {
    d.map_or(String::new(), |d| d.to_rfc3339())
}

pub fn load_cards(path: &Path) -> Result<Vec<Card>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let mut cards = Vec::new();
    for result in reader.records() {
        let record = result?;
        let review_count = get_field(&record, 5);
        cards.push(Card {
            id: get_field(&record, 0),
            deck_id: get_field(&record, 1),
            front: get_field(&record, 2),
            back: get_field(&record, 3),
            difficulty: get_field(&record, 4)
                .parse()
                .map_err(|e: String| malformed(path, e))?,
            review_count: review_count
                .trim()
                .parse()
                .map_err(|_| malformed(path, format!("bad review_count {review_count:?}")))?,
            last_review_date: parse_optional_instant(path, &get_field(&record, 6))?,
            next_review_date: parse_optional_instant(path, &get_field(&record, 7))?,
            created_at: parse_instant(path, &get_field(&record, 8))?,
        });
    }
    Ok(cards)
}

pub fn load_decks(path: &Path) -> Result<Vec<Deck>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let mut decks = Vec::new();
    for result in reader.records() {
        let record = result?;
        let count = get_field(&record, 3);
        decks.push(Deck {
            id: get_field(&record, 0),
            name: get_field(&record, 1),
            description: get_field(&record, 2),
            card_count: count
                .trim()
                .parse()
                .map_err(|_| malformed(path, format!("bad card_count {count:?}")))?,
            created_at: parse_instant(path, &get_field(&record, 4))?,
        });
    }
    Ok(decks)
}

/// Writes next to `path` and renames over it, so readers never see a torn file.
fn replace_file(
    path: &Path,
    write: impl FnOnce(&mut csv::Writer<std::fs::File>) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        write(&mut writer)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn save_cards(path: &Path, cards: &[Card]) -> Result<(), StoreError> {
    replace_file(path, |writer| {
        writer.write_record(CARD_HEADER)?;
        for card in cards {
            let review_count = card.review_count.to_string();
            let last_review = format_optional_instant(card.last_review_date);
            let next_review = format_optional_instant(card.next_review_date);
            let created_at = card.created_at.to_rfc3339();
            let row: [&str; 9] = [
                card.id.as_str(),
                card.deck_id.as_str(),
                card.front.as_str(),
                card.back.as_str(),
                card.difficulty.as_str(),
                &review_count,
                &last_review,
                &next_review,
                &created_at,
            ];
            writer.write_record(row)?;
        }
        Ok(())
    })
}

pub fn save_decks(path: &Path, decks: &[Deck]) -> Result<(), StoreError> {
    replace_file(path, |writer| {
        writer.write_record(DECK_HEADER)?;
        for deck in decks {
            let count = deck.card_count.to_string();
            let created_at = deck.created_at.to_rfc3339();
            let row: [&str; 5] = [
                deck.id.as_str(),
                deck.name.as_str(),
                deck.description.as_str(),
                &count,
                &created_at,
            ];
            writer.write_record(row)?;
        }
        Ok(())
    })
}

/// Reads user-authored cards: `front,back[,difficulty]`. A leading
/// `front,back` header row is skipped, as are rows with an empty front.
pub fn import_csv(path: &Path) -> Result<Vec<NewCard>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut cards = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let front = get_field(&record, 0);
        let back = get_field(&record, 1);
        if i == 0 && front.trim().eq_ignore_ascii_case("front") {
            continue;
        }
        if front.trim().is_empty() {
            continue;
        }
        let difficulty = get_field(&record, 2);
        let difficulty = if difficulty.trim().is_empty() {
            None
        } else {
            Some(
                difficulty
                    .parse::<Difficulty>()
                    .map_err(|e| malformed(path, format!("row {}: {e}", i + 1)))?,
            )
        };
        cards.push(NewCard {
            front,
            back,
            difficulty,
        });
    }
    Ok(cards)
}
