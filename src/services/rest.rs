use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{
    Direction, Match, MatchId, Message, NewMessage, NewSwipe, PairKey, Profile, Swipe, UserId,
};
use crate::services::store::{MatchStore, StoreError, StoreResult};

const PROFILES: &str = "profiles";
const SWIPES: &str = "swipes";
const MATCHES: &str = "matches";
const MESSAGES: &str = "messages";

/// Client for a hosted PostgREST-style data API (`/rest/v1/<table>`).
///
/// Row filters use the `column=op.value` query syntax. The hosted API has no
/// push channel this client can consume, so conversations opened over it
/// run on the poll path alone.
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RestStore {
    /// Create a new REST store
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        let base = format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table);
        if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, query)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Map a non-success response onto the store's error taxonomy
    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // SQLSTATE wins over the HTTP status: foreign key violations also come back as 409
        Err(match (code, status) {
            ("23505", _) => StoreError::Conflict(message),
            ("23503", _) => StoreError::NotFound(message),
            (_, StatusCode::CONFLICT) => StoreError::Conflict(message),
            (_, StatusCode::NOT_FOUND) => StoreError::NotFound(message),
            (_, StatusCode::UNAUTHORIZED) | (_, StatusCode::FORBIDDEN) => {
                StoreError::ApiError(format!("unauthorized: {}", status))
            }
            _ => StoreError::ApiError(format!("{}: {}", status, message)),
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> StoreResult<T> {
        let json: Value = response.json().await?;
        serde_json::from_value(json)
            .map_err(|e| StoreError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> StoreResult<Vec<T>> {
        let url = self.table_url(table, query);
        tracing::debug!("Selecting from: {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check(response).await?;
        Self::parse(response, table).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> StoreResult<Option<T>> {
        let rows: Vec<T> = self.select(table, query).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row and return it as stored
    async fn insert<T: DeserializeOwned>(&self, table: &str, row: &Value) -> StoreResult<T> {
        let response = self
            .authorize(self.client.post(self.table_url(table, "")))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let response = Self::check(response).await?;

        let rows: Vec<T> = Self::parse(response, table).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidResponse(format!("Empty insert result for {}", table)))
    }

    /// Delete matching rows and report how many went
    async fn delete(&self, table: &str, query: &str) -> StoreResult<u64> {
        let response = self
            .authorize(self.client.delete(self.table_url(table, query)))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = Self::check(response).await?;

        let rows: Vec<Value> = Self::parse(response, table).await?;
        Ok(rows.len() as u64)
    }
}

fn eq(value: impl ToString) -> String {
    format!("eq.{}", urlencoding::encode(&value.to_string()))
}

/// Writable profile columns; `created_at` is left to the backend default
fn profile_row(profile: &Profile) -> Value {
    json!({
        "name": profile.name,
        "school": profile.school,
        "major": profile.major,
        "bio": profile.bio,
        "photo_url": profile.photo_url,
        "subjects": profile.subjects,
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

#[async_trait]
impl MatchStore for RestStore {
    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>> {
        self.select_one(PROFILES, &format!("id={}", eq(id))).await
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let mut row = profile_row(profile);
        row["id"] = json!(profile.id);
        self.insert(PROFILES, &row).await
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let changes = profile_row(profile);

        let response = self
            .authorize(
                self.client
                    .patch(self.table_url(PROFILES, &format!("id={}", eq(profile.id)))),
            )
            .header("Prefer", "return=representation")
            .json(&changes)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let rows: Vec<Profile> = Self::parse(response, PROFILES).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", profile.id)))
    }

    async fn list_profiles_excluding(
        &self,
        exclude: &[UserId],
        limit: usize,
    ) -> StoreResult<Vec<Profile>> {
        let mut query = format!("order=created_at.desc,id.asc&limit={}", limit);
        if !exclude.is_empty() {
            let ids = exclude
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            query.push_str(&format!("&id=not.in.({})", urlencoding::encode(&ids)));
        }

        self.select(PROFILES, &query).await
    }

    async fn insert_swipe(&self, swipe: &NewSwipe) -> StoreResult<Swipe> {
        let row = serde_json::to_value(swipe)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        self.insert(SWIPES, &row).await
    }

    async fn swiped_ids(&self, swiper: UserId) -> StoreResult<Vec<UserId>> {
        #[derive(serde::Deserialize)]
        struct Row {
            swiped_id: UserId,
        }

        let rows: Vec<Row> = self
            .select(
                SWIPES,
                &format!("select=swiped_id&swiper_id={}", eq(swiper)),
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.swiped_id).collect())
    }

    async fn find_swipe(
        &self,
        swiper: UserId,
        swiped: UserId,
        direction: Option<Direction>,
    ) -> StoreResult<Option<Swipe>> {
        let mut query = format!("swiper_id={}&swiped_id={}", eq(swiper), eq(swiped));
        if let Some(direction) = direction {
            query.push_str(&format!("&direction={}", eq(direction.as_str())));
        }
        self.select_one(SWIPES, &query).await
    }

    async fn delete_swipe(&self, swiper: UserId, swiped: UserId) -> StoreResult<u64> {
        self.delete(
            SWIPES,
            &format!("swiper_id={}&swiped_id={}", eq(swiper), eq(swiped)),
        )
        .await
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        self.select_one(MATCHES, &format!("id={}", eq(id))).await
    }

    async fn find_match(&self, pair: PairKey) -> StoreResult<Option<Match>> {
        self.select_one(
            MATCHES,
            &format!("user1_id={}&user2_id={}", eq(pair.low()), eq(pair.high())),
        )
        .await
    }

    async fn insert_match(&self, pair: PairKey) -> StoreResult<Match> {
        let row = json!({ "user1_id": pair.low(), "user2_id": pair.high() });
        self.insert(MATCHES, &row).await
    }

    async fn matches_for(&self, user: UserId) -> StoreResult<Vec<Match>> {
        let filter = urlencoding::encode(&format!("(user1_id.eq.{},user2_id.eq.{})", user, user))
            .into_owned();
        self.select(MATCHES, &format!("or={}&order=created_at.desc", filter))
            .await
    }

    async fn delete_match(&self, id: MatchId) -> StoreResult<bool> {
        Ok(self.delete(MATCHES, &format!("id={}", eq(id))).await? > 0)
    }

    async fn insert_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let row = serde_json::to_value(message)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        self.insert(MESSAGES, &row).await
    }

    async fn messages(
        &self,
        match_id: MatchId,
        after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        let mut query = format!("match_id={}&order=created_at.asc,id.asc", eq(match_id));
        if let Some(after) = after {
            query.push_str(&format!("&created_at=gt.{}", timestamp(after)));
        }
        self.select(MESSAGES, &query).await
    }

    async fn latest_message(&self, match_id: MatchId) -> StoreResult<Option<Message>> {
        self.select_one(
            MESSAGES,
            &format!(
                "match_id={}&order=created_at.desc,id.desc&limit=1",
                eq(match_id)
            ),
        )
        .await
    }

    async fn delete_messages(&self, match_id: MatchId) -> StoreResult<u64> {
        self.delete(MESSAGES, &format!("match_id={}", eq(match_id)))
            .await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let response = self
            .authorize(self.client.get(self.table_url(PROFILES, "select=id&limit=1")))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use uuid::Uuid;

    fn store(server: &Server) -> RestStore {
        RestStore::new(server.url(), "anon-key".to_string(), Duration::from_secs(5)).unwrap()
    }

    fn message_json(match_id: Uuid, text: &str, at: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "match_id": match_id,
            "sender_id": Uuid::new_v4(),
            "text": text,
            "created_at": at,
        })
    }

    #[tokio::test]
    async fn test_find_match_uses_canonical_filters() {
        let mut server = Server::new_async().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let pair = PairKey::new(a, b).unwrap();
        let match_id = Uuid::new_v4();

        let mock = server
            .mock("GET", "/rest/v1/matches")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user1_id".into(), format!("eq.{}", pair.low())),
                Matcher::UrlEncoded("user2_id".into(), format!("eq.{}", pair.high())),
            ]))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(
                json!([{
                    "id": match_id,
                    "user1_id": pair.low(),
                    "user2_id": pair.high(),
                    "created_at": "2024-03-01T10:00:00Z",
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let found = store(&server).find_match(pair).await.unwrap().unwrap();

        assert_eq!(found.id, match_id);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_insert_profile_leaves_created_at_to_backend() {
        let mut server = Server::new_async().await;
        let profile = Profile {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            school: Some("MIT".to_string()),
            major: None,
            bio: None,
            photo_url: None,
            subjects: vec!["Calculus".to_string()],
            created_at: "1999-01-01T00:00:00Z".parse().unwrap(),
        };

        let mock = server
            .mock("POST", "/rest/v1/profiles")
            .match_body(Matcher::Json(json!([{
                "id": profile.id,
                "name": "Ada",
                "school": "MIT",
                "major": null,
                "bio": null,
                "photo_url": null,
                "subjects": ["Calculus"],
            }])))
            .with_status(201)
            .with_body(
                json!([{
                    "id": profile.id,
                    "name": "Ada",
                    "school": "MIT",
                    "subjects": ["Calculus"],
                    "created_at": "2024-03-01T10:00:00Z",
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let stored = store(&server).insert_profile(&profile).await.unwrap();

        assert_eq!(stored.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_conflict() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/swipes")
            .with_status(409)
            .with_body(
                json!({ "code": "23505", "message": "duplicate key value" }).to_string(),
            )
            .create_async()
            .await;

        let err = store(&server)
            .insert_swipe(&NewSwipe {
                swiper_id: Uuid::new_v4(),
                swiped_id: Uuid::new_v4(),
                direction: Direction::Like,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_parent_maps_to_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/messages")
            .with_status(409)
            .with_body(
                json!({ "code": "23503", "message": "violates foreign key constraint" })
                    .to_string(),
            )
            .create_async()
            .await;

        let err = store(&server)
            .insert_message(&NewMessage {
                match_id: Uuid::new_v4(),
                sender_id: Uuid::new_v4(),
                text: "hello".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_messages_after_filters_by_time() {
        let mut server = Server::new_async().await;
        let match_id = Uuid::new_v4();
        let after = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mock = server
            .mock("GET", "/rest/v1/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("match_id".into(), format!("eq.{}", match_id)),
                Matcher::UrlEncoded("created_at".into(), "gt.2024-03-01T10:00:00.000000Z".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([
                    message_json(match_id, "one", "2024-03-01T10:00:01Z"),
                    message_json(match_id, "two", "2024-03-01T10:00:02Z"),
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let messages = store(&server).messages(match_id, Some(after)).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "two");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_counts_returned_rows() {
        let mut server = Server::new_async().await;
        let match_id = Uuid::new_v4();
        server
            .mock("DELETE", "/rest/v1/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([
                    message_json(match_id, "a", "2024-03-01T10:00:01Z"),
                    message_json(match_id, "b", "2024-03-01T10:00:02Z"),
                    message_json(match_id, "c", "2024-03-01T10:00:03Z"),
                ])
                .to_string(),
            )
            .create_async()
            .await;

        assert_eq!(store(&server).delete_messages(match_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = store(&server).get_profile(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_subscriptions_unsupported() {
        let server = Server::new_async().await;

        let result = store(&server).subscribe_messages(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::Unsupported(_))));
    }
}
