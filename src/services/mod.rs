// Service exports
pub mod auth;
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod rest;
pub mod store;

pub use auth::{AuthError, Claims, TokenVerifier};
pub use cache::ProfileCache;
pub use memory::{MemoryStore, StoreOp};
pub use postgres::PostgresStore;
pub use rest::RestStore;
pub use store::{MatchStore, MessageStream, StoreError, StoreResult};
