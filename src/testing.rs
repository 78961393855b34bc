use chrono::Utc;
use uuid::Uuid;

use crate::models::{Profile, UserId};
use crate::services::{MatchStore, MemoryStore};

/// Insert a minimal profile and return its id
pub async fn seed_profile(store: &MemoryStore, name: &str) -> UserId {
    let profile = Profile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        school: None,
        major: None,
        bio: None,
        photo_url: None,
        subjects: vec!["Calculus".to_string()],
        created_at: Utc::now(),
    };

    store.insert_profile(&profile).await.unwrap().id
}
