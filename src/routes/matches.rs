use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{authenticate, error_response, AppState};
use crate::models::{
    CandidatesQuery, CandidatesResponse, HealthResponse, MatchId, SwipeRequest, SwipeResponse,
    UnmatchResponse, UnreadResponse,
};

/// Configure feed, swipe and match routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/candidates", web::get().to(get_candidates))
        .route("/swipes", web::post().to(record_swipe))
        .route("/matches", web::get().to(list_matches))
        .route("/matches/{match_id}", web::delete().to(unmatch))
        .route("/unread", web::get().to(unread));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state
        .matchmaker
        .store()
        .health_check()
        .await
        .unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// GET /api/v1/candidates?limit=20
async fn get_candidates(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<CandidatesQuery>,
) -> impl Responder {
    let viewer = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let limit = query
        .limit
        .map(usize::from)
        .unwrap_or(state.feed_default_limit);

    match state.matchmaker.next_candidates(viewer, Some(limit)).await {
        Ok(profiles) => {
            tracing::debug!("Serving {} candidates to {}", profiles.len(), viewer);
            HttpResponse::Ok().json(CandidatesResponse {
                exhausted: profiles.is_empty() && limit > 0,
                profiles,
            })
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/swipes
///
/// Request body:
/// ```json
/// {
///   "targetId": "uuid",
///   "direction": "right"
/// }
/// ```
async fn record_swipe(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SwipeRequest>,
) -> impl Responder {
    let actor = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    tracing::info!("Swipe {} -> {} ({})", actor, body.target_id, body.direction);

    match state
        .matchmaker
        .swipe(actor, body.target_id, body.direction)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(SwipeResponse {
            recorded: outcome.recorded,
            matched: outcome.matched,
        }),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/matches
async fn list_matches(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let viewer = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.list_matches(viewer).await {
        Ok(summaries) => HttpResponse::Ok().json(summaries),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/v1/matches/{match_id}
async fn unmatch(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<MatchId>,
) -> impl Responder {
    let requester = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.unmatch(path.into_inner(), requester).await {
        Ok(report) => HttpResponse::Ok().json(UnmatchResponse {
            messages_deleted: report.messages_deleted,
            swipes_cleared: report.swipes_cleared,
        }),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/unread
async fn unread(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let viewer = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.unread_count(viewer).await {
        Ok(unread) => HttpResponse::Ok().json(UnreadResponse { unread }),
        Err(e) => error_response(&e),
    }
}
