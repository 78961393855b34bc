use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{Direction, UserId};

/// Profile fields editable by their owner
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProfileDraft {
    /// Length is checked after trimming when the profile is built
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub school: Option<String>,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub major: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[serde(default, alias = "photoUrl")]
    #[validate(url)]
    pub photo_url: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "select at least one subject"))]
    pub subjects: Vec<String>,
}

/// Request to record a swipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeRequest {
    #[serde(alias = "target_id", rename = "targetId")]
    pub target_id: UserId,
    pub direction: Direction,
}

/// Request to send a chat message
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
}

/// Query string for the candidate feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatesQuery {
    #[serde(default)]
    pub limit: Option<u16>,
}

/// Query string for the reconciliation poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
}
