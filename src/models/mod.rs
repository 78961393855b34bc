// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Direction, Match, MatchId, MatchSummary, Message, MessageId, NewMessage, NewSwipe, PairKey,
    Profile, Swipe, UserId,
};
pub use requests::{CandidatesQuery, MessagesQuery, ProfileDraft, SendMessageRequest, SwipeRequest};
pub use responses::{
    CandidatesResponse, ErrorResponse, HealthResponse, SwipeResponse, UnmatchResponse,
    UnreadResponse,
};
