//! StudyMatch - mutual-swipe matching and chat delivery for the StudyMatch app
//!
//! This library records swipe decisions, forms exactly one match per mutually
//! interested pair, serves the candidate feed and delivers chat messages over
//! a push subscription reconciled by polling. Unmatching tears the
//! relationship down so both users can meet again in each other's feed.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use core::{
    ConversationSession, CoreError, CoreResult, MatchOutcome, Matchmaker, MatchmakerConfig,
    SwipeOutcome,
};
pub use models::{Direction, Match, Message, PairKey, Profile};
pub use services::{MatchStore, MemoryStore, PostgresStore, RestStore};
