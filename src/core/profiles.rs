use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::core::error::{CoreError, CoreResult};
use crate::models::{Profile, ProfileDraft, UserId};
use crate::services::{MatchStore, ProfileCache};

/// Longest accepted display name, in characters after trimming
pub const NAME_MAX_CHARS: usize = 80;

/// Trim, drop empties and de-duplicate, keeping first occurrences
pub fn normalize_subjects(subjects: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let subject = subject.trim();
        if !subject.is_empty() && !out.iter().any(|s| s == subject) {
            out.push(subject.to_string());
        }
    }
    out
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate a draft and build the profile record for `owner`
fn build_profile(owner: UserId, draft: &ProfileDraft) -> CoreResult<Profile> {
    draft
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let name = draft.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("name is empty".to_string()));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(CoreError::Validation(format!(
            "name is longer than {} characters",
            NAME_MAX_CHARS
        )));
    }
    let subjects = normalize_subjects(&draft.subjects);
    if subjects.is_empty() {
        return Err(CoreError::Validation("select at least one subject".to_string()));
    }

    Ok(Profile {
        id: owner,
        name: name.to_string(),
        school: non_blank(&draft.school),
        major: non_blank(&draft.major),
        bio: non_blank(&draft.bio),
        photo_url: non_blank(&draft.photo_url),
        subjects,
        created_at: Utc::now(),
    })
}

/// Profile setup and edits. Owners can only address their own record.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn MatchStore>,
    cache: ProfileCache,
}

impl ProfileService {
    pub fn new(store: Arc<dyn MatchStore>, cache: ProfileCache) -> Self {
        Self { store, cache }
    }

    pub async fn create_profile(&self, owner: UserId, draft: &ProfileDraft) -> CoreResult<Profile> {
        let profile = build_profile(owner, draft)?;
        let created = self.store.insert_profile(&profile).await?;
        tracing::info!("Profile created for {}", owner);
        Ok(created)
    }

    pub async fn update_profile(&self, owner: UserId, draft: &ProfileDraft) -> CoreResult<Profile> {
        let profile = build_profile(owner, draft)?;
        let updated = self.store.update_profile(&profile).await?;
        self.cache.invalidate(owner).await;
        tracing::debug!("Profile updated for {}", owner);
        Ok(updated)
    }

    pub async fn get_profile(&self, id: UserId) -> CoreResult<Option<Profile>> {
        Ok(self.cache.get(id).await?)
    }

    /// Fails with `ReferenceGone` until `user` has completed profile setup
    pub async fn require_profile(&self, user: UserId) -> CoreResult<Profile> {
        self.get_profile(user)
            .await?
            .ok_or_else(|| CoreError::ReferenceGone(format!("profile {}", user)))
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }
}
