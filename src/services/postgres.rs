use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{
    Direction, Match, MatchId, Message, NewMessage, NewSwipe, PairKey, Profile, Swipe, UserId,
};
use crate::services::store::{MatchStore, MessageStream, StoreError, StoreResult};

/// Channel the insert trigger on `messages` notifies
pub const NOTIFY_CHANNEL: &str = "new_message";

const PROFILE_COLUMNS: &str = "id, name, school, major, bio, photo_url, subjects, created_at";
const MESSAGE_COLUMNS: &str = "id, match_id, sender_id, text, created_at";

/// Map constraint violations onto the store's error taxonomy
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => return StoreError::Conflict(db.message().to_string()),
            Some("23503") => return StoreError::NotFound(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::SqlxError(err)
}

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    name: String,
    school: Option<String>,
    major: Option<String>,
    bio: Option<String>,
    photo_url: Option<String>,
    subjects: Option<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            name: self.name,
            school: self.school,
            major: self.major,
            bio: self.bio,
            photo_url: self.photo_url,
            subjects: self.subjects.unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SwipeRecord {
    id: Uuid,
    swiper_id: Uuid,
    swiped_id: Uuid,
    direction: String,
    created_at: DateTime<Utc>,
}

impl SwipeRecord {
    fn to_domain(self) -> StoreResult<Swipe> {
        Ok(Swipe {
            id: self.id,
            swiper_id: self.swiper_id,
            swiped_id: self.swiped_id,
            direction: self.direction.parse().map_err(StoreError::InvalidResponse)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct MatchRecord {
    id: Uuid,
    user1_id: Uuid,
    user2_id: Uuid,
    created_at: DateTime<Utc>,
}

impl MatchRecord {
    fn to_domain(self) -> Match {
        Match {
            id: self.id,
            user1_id: self.user1_id,
            user2_id: self.user2_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    match_id: Uuid,
    sender_id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
}

impl MessageRecord {
    fn to_domain(self) -> Message {
        Message {
            id: self.id,
            match_id: self.match_id,
            sender_id: self.sender_id,
            text: self.text,
            created_at: self.created_at,
        }
    }
}

/// PostgreSQL-backed store.
///
/// Constraints live in the schema (see `migrations/`): unique ordered swipe
/// pairs, unique canonical match pairs, and messages cascading with their
/// match. Inserted messages are announced with `pg_notify` and picked up
/// through `PgListener` for the push path.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
        )
        .await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MatchStore for PostgresStore {
    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>> {
        let query = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);

        let record = sqlx::query_as::<_, ProfileRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let query = format!(
            r#"
            INSERT INTO profiles (id, name, school, major, bio, photo_url, subjects)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let record = sqlx::query_as::<_, ProfileRecord>(&query)
            .bind(profile.id)
            .bind(&profile.name)
            .bind(&profile.school)
            .bind(&profile.major)
            .bind(&profile.bio)
            .bind(&profile.photo_url)
            .bind(&profile.subjects)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        Ok(record.to_domain())
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let query = format!(
            r#"
            UPDATE profiles
            SET name = $2, school = $3, major = $4, bio = $5, photo_url = $6,
                subjects = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let record = sqlx::query_as::<_, ProfileRecord>(&query)
            .bind(profile.id)
            .bind(&profile.name)
            .bind(&profile.school)
            .bind(&profile.major)
            .bind(&profile.bio)
            .bind(&profile.photo_url)
            .bind(&profile.subjects)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        record
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", profile.id)))
    }

    async fn list_profiles_excluding(
        &self,
        exclude: &[UserId],
        limit: usize,
    ) -> StoreResult<Vec<Profile>> {
        let query = format!(
            r#"
            SELECT {}
            FROM profiles
            WHERE id <> ALL($1)
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
            PROFILE_COLUMNS
        );

        let records = sqlx::query_as::<_, ProfileRecord>(&query)
            .bind(exclude.to_vec())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Listed {} candidate profiles", records.len());

        Ok(records.into_iter().map(ProfileRecord::to_domain).collect())
    }

    async fn insert_swipe(&self, swipe: &NewSwipe) -> StoreResult<Swipe> {
        let query = r#"
            INSERT INTO swipes (swiper_id, swiped_id, direction)
            VALUES ($1, $2, $3)
            RETURNING id, swiper_id, swiped_id, direction, created_at
        "#;

        let record = sqlx::query_as::<_, SwipeRecord>(query)
            .bind(swipe.swiper_id)
            .bind(swipe.swiped_id)
            .bind(swipe.direction.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        record.to_domain()
    }

    async fn swiped_ids(&self, swiper: UserId) -> StoreResult<Vec<UserId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT swiped_id FROM swipes WHERE swiper_id = $1")
            .bind(swiper)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("User {} has swiped on {} profiles", swiper, ids.len());

        Ok(ids)
    }

    async fn find_swipe(
        &self,
        swiper: UserId,
        swiped: UserId,
        direction: Option<Direction>,
    ) -> StoreResult<Option<Swipe>> {
        let query = r#"
            SELECT id, swiper_id, swiped_id, direction, created_at
            FROM swipes
            WHERE swiper_id = $1 AND swiped_id = $2
              AND ($3::text IS NULL OR direction = $3)
        "#;

        let record = sqlx::query_as::<_, SwipeRecord>(query)
            .bind(swiper)
            .bind(swiped)
            .bind(direction.map(|d| d.as_str()))
            .fetch_optional(&self.pool)
            .await?;

        record.map(SwipeRecord::to_domain).transpose()
    }

    async fn delete_swipe(&self, swiper: UserId, swiped: UserId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM swipes WHERE swiper_id = $1 AND swiped_id = $2")
            .bind(swiper)
            .bind(swiped)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        let record = sqlx::query_as::<_, MatchRecord>(
            "SELECT id, user1_id, user2_id, created_at FROM matches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(MatchRecord::to_domain))
    }

    async fn find_match(&self, pair: PairKey) -> StoreResult<Option<Match>> {
        let record = sqlx::query_as::<_, MatchRecord>(
            "SELECT id, user1_id, user2_id, created_at FROM matches WHERE user1_id = $1 AND user2_id = $2",
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(MatchRecord::to_domain))
    }

    /// Uses INSERT ... ON CONFLICT DO NOTHING so a concurrent insert of the
    /// same pair reports `Conflict` instead of a raw database error.
    async fn insert_match(&self, pair: PairKey) -> StoreResult<Match> {
        let query = r#"
            INSERT INTO matches (user1_id, user2_id)
            VALUES ($1, $2)
            ON CONFLICT (user1_id, user2_id) DO NOTHING
            RETURNING id, user1_id, user2_id, created_at
        "#;

        let record = sqlx::query_as::<_, MatchRecord>(query)
            .bind(pair.low())
            .bind(pair.high())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        record.map(MatchRecord::to_domain).ok_or_else(|| {
            StoreError::Conflict(format!("match {} / {} exists", pair.low(), pair.high()))
        })
    }

    async fn matches_for(&self, user: UserId) -> StoreResult<Vec<Match>> {
        let records = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT id, user1_id, user2_id, created_at
            FROM matches
            WHERE user1_id = $1 OR user2_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(MatchRecord::to_domain).collect())
    }

    async fn delete_match(&self, id: MatchId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM matches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let query = format!(
            "INSERT INTO messages (match_id, sender_id, text) VALUES ($1, $2, $3) RETURNING {}",
            MESSAGE_COLUMNS
        );

        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(message.match_id)
            .bind(message.sender_id)
            .bind(&message.text)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        Ok(record.to_domain())
    }

    async fn messages(
        &self,
        match_id: MatchId,
        after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        let query = format!(
            r#"
            SELECT {}
            FROM messages
            WHERE match_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2)
            ORDER BY created_at ASC, id ASC
            "#,
            MESSAGE_COLUMNS
        );

        let records = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(match_id)
            .bind(after)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(MessageRecord::to_domain).collect())
    }

    async fn latest_message(&self, match_id: MatchId) -> StoreResult<Option<Message>> {
        let query = format!(
            "SELECT {} FROM messages WHERE match_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
            MESSAGE_COLUMNS
        );

        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(MessageRecord::to_domain))
    }

    async fn delete_messages(&self, match_id: MatchId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE match_id = $1")
            .bind(match_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn subscribe_messages(&self, match_id: MatchId) -> StoreResult<MessageStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let stream = listener.into_stream().filter_map(move |notification| async move {
            let notification = match notification {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Message listener error: {}", e);
                    return None;
                }
            };
            match serde_json::from_str::<Message>(notification.payload()) {
                Ok(message) if message.match_id == match_id => Some(message),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Unreadable message notification: {}", e);
                    None
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
