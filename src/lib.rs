pub mod card;
pub mod clock;
pub mod config;
pub mod deck;
pub mod error;
pub mod schedule;
pub mod select;
pub mod session;
pub mod store;
pub mod web;

pub use error::{Error, Result, StoreError};
