use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{authenticate, error_response, AppState};
use crate::models::{ErrorResponse, ProfileDraft};

/// Configure profile routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/profile", web::get().to(get_profile))
        .route("/profile", web::post().to(create_profile))
        .route("/profile", web::put().to(update_profile));
}

/// GET /api/v1/profile
async fn get_profile(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.profiles().get_profile(user).await {
        Ok(Some(profile)) => HttpResponse::Ok().json(profile),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: "profile_not_found".to_string(),
            message: "Profile setup has not been completed".to_string(),
            status_code: 404,
        }),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/profile
///
/// Request body:
/// ```json
/// {
///   "name": "string",
///   "school": "string",
///   "major": "string",
///   "bio": "string",
///   "photoUrl": "https://...",
///   "subjects": ["string"]
/// }
/// ```
async fn create_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ProfileDraft>,
) -> impl Responder {
    let user = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.profiles().create_profile(user, &body).await {
        Ok(profile) => HttpResponse::Created().json(profile),
        Err(e) => error_response(&e),
    }
}

/// PUT /api/v1/profile
async fn update_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ProfileDraft>,
) -> impl Responder {
    let user = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.matchmaker.profiles().update_profile(user, &body).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(e) => error_response(&e),
    }
}
