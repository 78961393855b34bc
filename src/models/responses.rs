use serde::{Deserialize, Serialize};

use crate::models::domain::{Match, Profile};

/// Response for the candidate feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub profiles: Vec<Profile>,
    /// `true` when the viewer has swiped on everyone
    pub exhausted: bool,
}

/// Response for a recorded swipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub recorded: bool,
    #[serde(rename = "match")]
    pub matched: Option<Match>,
}

/// Response for a completed unmatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchResponse {
    pub messages_deleted: u64,
    pub swipes_cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub unread: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
