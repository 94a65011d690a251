// Three-button review rule: Again resets, Hard and Good grow the interval
// linearly with the number of consecutive successful reviews.

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};

use crate::card::ReviewUpdate;
use crate::error::Error;

const HARD_FACTOR_NUM: u64 = 3;
const HARD_FACTOR_DEN: u64 = 2;
const GOOD_FACTOR: u64 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Feedback {
    Again,
    Hard,
    Good,
}

impl Feedback {
    pub fn from_u8(n: u8) -> Result<Feedback, Error> {
        match n {
            0 => Ok(Feedback::Again),
            1 => Ok(Feedback::Hard),
            2 => Ok(Feedback::Good),
            _ => Err(Error::InvalidFeedback(n)),
        }
    }

    /// Keys used by the terminal drill: 1 = again, 2 = hard, 3 = good.
    pub fn from_key(c: char) -> Option<Feedback> {
        match c {
            '1' => Some(Feedback::Again),
            '2' => Some(Feedback::Hard),
            '3' => Some(Feedback::Good),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Feedback::Again => "Again",
            Feedback::Hard => "Hard",
            Feedback::Good => "Good",
        }
    }
}

impl TryFrom<u8> for Feedback {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Feedback::from_u8(n)
    }
}

impl From<Feedback> for u8 {
    fn from(f: Feedback) -> u8 {
        match f {
            Feedback::Again => 0,
            Feedback::Hard => 1,
            Feedback::Good => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub review_count: u32,
    pub interval_days: u64,
    pub last_review_date: DateTime<Utc>,
    pub next_review_date: DateTime<Utc>,
}

impl ReviewOutcome {
    pub fn update(&self) -> ReviewUpdate {
        ReviewUpdate {
            review_count: self.review_count,
            last_review_date: self.last_review_date,
            next_review_date: self.next_review_date,
        }
    }
}

/// Days until the next review, computed from the count *before* this review.
pub fn interval_days(review_count: u32, feedback: Feedback) -> u64 {
    let next = u64::from(review_count) + 1;
    match feedback {
        Feedback::Again => 1,
        // floor(n * 1.5) without going through floats
        Feedback::Hard => u64::max(1, next * HARD_FACTOR_NUM / HARD_FACTOR_DEN),
        Feedback::Good => u64::max(1, next * GOOD_FACTOR),
    }
}

pub fn next_review_count(review_count: u32, feedback: Feedback) -> u32 {
    match feedback {
        Feedback::Again => 0,
        Feedback::Hard | Feedback::Good => review_count.saturating_add(1),
    }
}

/// Fails only when the next review date cannot be represented, which takes a
/// review count in the tens of millions.
pub fn schedule(
    review_count: u32,
    feedback: Feedback,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome, Error> {
    let interval = interval_days(review_count, feedback);
    let next_review_date = now
        .checked_add_days(Days::new(interval))
        .ok_or(Error::ReviewOutOfRange(review_count))?;
    Ok(ReviewOutcome {
        review_count: next_review_count(review_count, feedback),
        interval_days: interval,
        last_review_date: now,
        next_review_date,
    })
}
