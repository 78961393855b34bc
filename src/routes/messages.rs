use actix_web::{web, HttpRequest, HttpResponse, Responder};
use validator::Validate;

use super::{authenticate, error_response, AppState};
use crate::core::CoreError;
use crate::models::{MatchId, MessagesQuery, SendMessageRequest};

/// Configure chat routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/matches/{match_id}/messages", web::get().to(list_messages))
        .route("/matches/{match_id}/messages", web::post().to(send_message));
}

/// GET /api/v1/matches/{match_id}/messages?after=<rfc3339>
///
/// Without `after` returns the full history; with it, the reconciliation
/// poll of messages strictly newer than the timestamp.
async fn list_messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<MatchId>,
    query: web::Query<MessagesQuery>,
) -> impl Responder {
    let viewer = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state
        .matchmaker
        .messages(path.into_inner(), viewer, query.after)
        .await
    {
        Ok(messages) => HttpResponse::Ok().json(messages),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/matches/{match_id}/messages
async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<MatchId>,
    body: web::Json<SendMessageRequest>,
) -> impl Responder {
    let sender = match authenticate(&state, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    if let Err(errors) = body.validate() {
        tracing::info!("Validation failed for send_message: {:?}", errors);
        return error_response(&CoreError::Validation(errors.to_string()));
    }

    match state
        .matchmaker
        .send_message(path.into_inner(), sender, &body.text)
        .await
    {
        Ok(message) => HttpResponse::Created().json(message),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, PairKey};
    use crate::routes::test_support::{bearer, state};
    use crate::services::{MatchStore, MemoryStore};
    use crate::testing::seed_profile;
    use actix_web::{test, App};
    use serde_json::json;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_send_and_poll_after() {
        let store = Arc::new(MemoryStore::new());
        let a = seed_profile(&store, "Ada").await;
        let b = seed_profile(&store, "Bo").await;
        let m = store.insert_match(PairKey::new(a, b).unwrap()).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store)))
                .configure(crate::routes::configure_routes),
        )
        .await;
        let uri = format!("/api/v1/matches/{}/messages", m.id);

        let req = test::TestRequest::post()
            .uri(&uri)
            .insert_header(bearer(a))
            .set_json(json!({ "text": "  first  " }))
            .to_request();
        let first: Message = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first.text, "first");

        let req = test::TestRequest::post()
            .uri(&uri)
            .insert_header(bearer(b))
            .set_json(json!({ "text": "second" }))
            .to_request();
        test::call_service(&app, req).await;

        let after = urlencoding::encode(&first.created_at.to_rfc3339()).into_owned();
        let req = test::TestRequest::get()
            .uri(&format!("{}?after={}", uri, after))
            .insert_header(bearer(a))
            .to_request();
        let newer: Vec<Message> = test::call_and_read_body_json(&app, req).await;

        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].text, "second");
    }

    #[actix_web::test]
    async fn test_blank_message_rejected() {
        let store = Arc::new(MemoryStore::new());
        let a = seed_profile(&store, "Ada").await;
        let b = seed_profile(&store, "Bo").await;
        let m = store.insert_match(PairKey::new(a, b).unwrap()).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/matches/{}/messages", m.id))
            .insert_header(bearer(a))
            .set_json(json!({ "text": "   " }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_send_to_deleted_match_is_gone() {
        let store = Arc::new(MemoryStore::new());
        let a = seed_profile(&store, "Ada").await;
        let b = seed_profile(&store, "Bo").await;
        let m = store.insert_match(PairKey::new(a, b).unwrap()).await.unwrap();
        store.delete_match(m.id).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(store)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/matches/{}/messages", m.id))
            .insert_header(bearer(a))
            .set_json(json!({ "text": "hello?" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 410);
    }
}
