use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, stable identifier issued by the auth service
pub type UserId = Uuid;
pub type MatchId = Uuid;
pub type MessageId = Uuid;

/// Study-partner profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub school: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subjects: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Swipe decision. Persisted as `right` (like) / `left` (pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "right", alias = "like")]
    Like,
    #[serde(rename = "left", alias = "pass")]
    Pass,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Like => "right",
            Direction::Pass => "left",
        }
    }

    pub fn is_like(&self) -> bool {
        matches!(self, Direction::Like)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "right" | "like" => Ok(Direction::Like),
            "left" | "pass" => Ok(Direction::Pass),
            other => Err(format!("unknown swipe direction: {}", other)),
        }
    }
}

/// Directional decision of `swiper_id` about `swiped_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swipe {
    pub id: Uuid,
    pub swiper_id: UserId,
    pub swiped_id: UserId,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

/// Unordered pair of two distinct users, stored smaller id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    /// Canonical key for `a` and `b`, `None` when they are the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }
}

/// Mutual match. `user1_id < user2_id` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn pair(&self) -> PairKey {
        PairKey {
            low: self.user1_id,
            high: self.user2_id,
        }
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.user1_id == user || self.user2_id == user
    }

    /// The participant that is not `user`
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        if self.user1_id == user {
            Some(self.user2_id)
        } else if self.user2_id == user {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// Chat message within a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Total order used by conversation logs: creation time, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

/// Insert payloads; the store assigns ids and timestamps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSwipe {
    pub swiper_id: UserId,
    pub swiped_id: UserId,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub text: String,
}

/// Match enriched for the matches screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    #[serde(rename = "match")]
    pub matched: Match,
    #[serde(rename = "otherProfile")]
    pub other_profile: Option<Profile>,
    #[serde(rename = "lastMessage")]
    pub last_message: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ab = PairKey::new(a, b).unwrap();
        let ba = PairKey::new(b, a).unwrap();

        assert_eq!(ab, ba);
        assert!(ab.low() < ab.high());
        assert!(ab.contains(a) && ab.contains(b));
    }

    #[test]
    fn test_pair_key_rejects_self() {
        let a = Uuid::new_v4();
        assert!(PairKey::new(a, a).is_none());
    }

    #[test]
    fn test_direction_wire_format() {
        assert_eq!(serde_json::to_string(&Direction::Like).unwrap(), "\"right\"");
        assert_eq!(serde_json::to_string(&Direction::Pass).unwrap(), "\"left\"");
        assert_eq!("like".parse::<Direction>().unwrap(), Direction::Like);
        assert_eq!("LEFT".parse::<Direction>().unwrap(), Direction::Pass);
        assert!("up".parse::<Direction>().is_err());
    }

    #[test]
    fn test_profile_accepts_null_subjects() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": "Ada",
            "school": null,
            "subjects": null,
            "created_at": "2024-03-01T10:00:00+00:00"
        });

        let profile: Profile = serde_json::from_value(json).unwrap();
        assert!(profile.subjects.is_empty());
        assert!(profile.school.is_none());
    }

    #[test]
    fn test_other_participant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pair = PairKey::new(a, b).unwrap();
        let m = Match {
            id: Uuid::new_v4(),
            user1_id: pair.low(),
            user2_id: pair.high(),
            created_at: Utc::now(),
        };

        assert_eq!(m.other_participant(a), Some(b));
        assert_eq!(m.other_participant(b), Some(a));
        assert_eq!(m.other_participant(Uuid::new_v4()), None);
    }
}
