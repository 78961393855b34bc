// Core matching and chat components
pub mod conversation;
pub mod error;
pub mod feed;
pub mod matcher;
pub mod matchmaker;
pub mod profiles;
pub mod swipes;
pub mod unmatch;
pub mod unread;

pub use conversation::{ConversationLog, ConversationSession, ConversationStore, Delivery, NewMessageEvent, SessionConfig};
pub use error::{CoreError, CoreResult};
pub use feed::{filter_candidates, CandidateFeed, DEFAULT_PAGE_SIZE};
pub use matcher::{MatchDetector, MatchOutcome, SettlePolicy};
pub use matchmaker::{Matchmaker, MatchmakerConfig, SwipeOutcome};
pub use profiles::{normalize_subjects, ProfileService};
pub use swipes::SwipeRecorder;
pub use unmatch::{UnmatchCoordinator, UnmatchReport};
pub use unread::{unread_count, UnreadPoller};
