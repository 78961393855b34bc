// Route exports
pub mod matches;
pub mod messages;
pub mod profiles;

use actix_web::{
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse,
};

use crate::core::{CoreError, Matchmaker};
use crate::models::{ErrorResponse, UserId};
use crate::services::TokenVerifier;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matchmaker: Matchmaker,
    pub verifier: TokenVerifier,
    pub feed_default_limit: usize,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(profiles::configure)
            .configure(matches::configure)
            .configure(messages::configure),
    );
}

/// Resolve the caller from the bearer token
pub(crate) fn authenticate(state: &AppState, req: &HttpRequest) -> Result<UserId, HttpResponse> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    state.verifier.verify_header(header).map_err(|e| {
        tracing::info!("Rejected request to {}: {}", req.path(), e);
        error_response(&CoreError::Unauthorized(e.to_string()))
    })
}

/// Map a core error onto its HTTP status and JSON body
pub(crate) fn error_response(err: &CoreError) -> HttpResponse {
    let (status, error) = match err {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        CoreError::ReferenceGone(_) => (StatusCode::GONE, "reference_gone"),
        CoreError::SendFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "send_failed"),
        CoreError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }

    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::MatchmakerConfig;
    use crate::services::{MatchStore, MemoryStore};
    use std::sync::Arc;

    pub const SECRET: &str = "test-secret";

    pub fn state(store: Arc<MemoryStore>) -> AppState {
        let store: Arc<dyn MatchStore> = store;
        AppState {
            matchmaker: Matchmaker::new(store, MatchmakerConfig::default()),
            verifier: TokenVerifier::new(SECRET),
            feed_default_limit: 20,
        }
    }

    pub fn bearer(user: UserId) -> (header::HeaderName, String) {
        (
            header::AUTHORIZATION,
            format!("Bearer {}", crate::services::auth::issue_token(SECRET, user)),
        )
    }
}
