use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::StoryError;
use crate::service::StoryService;

/// Header carrying the caller's identity, set by the fronting auth proxy.
pub const USER_HEADER: &str = "x-storytime-user";
/// Header marking the caller as an administrator.
pub const ADMIN_HEADER: &str = "x-storytime-admin";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: StoryService,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    /// Comma or newline separated address list.
    pub authors: String,
    pub target_words: u32,
}

#[derive(Serialize)]
pub struct CreatedStory {
    pub id: String,
    pub authors: Vec<String>,
    pub next_author: String,
    pub target_words: u32,
}

#[derive(Deserialize)]
pub struct AppendRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct AppendResponse {
    pub story_id: String,
    pub part_id: String,
    pub completed: bool,
    pub next_author: Option<String>,
    pub words: usize,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    /// The client's copy of the story is stale and must be re-fetched.
    Conflict { story_id: String, message: String },
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": msg})),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, serde_json::json!({"error": msg})),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::Conflict { story_id, message } => (
                StatusCode::CONFLICT,
                serde_json::json!({"error": message, "story_id": story_id}),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "Internal server error"}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoryError> for ApiError {
    fn from(e: StoryError) -> Self {
        match e {
            StoryError::Validation(msg) => ApiError::BadRequest(msg),
            StoryError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoryError::ConcurrencyConflict { ref story_id, .. } => ApiError::Conflict {
                story_id: story_id.clone(),
                message: e.to_string(),
            },
            other => {
                error!(error = %other, "request failed");
                ApiError::Internal
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/stories", post(create_story))
        .route("/api/stories/completed", get(completed_stories))
        .route("/api/stories/current", get(current_story))
        .route("/api/stories/pending", get(pending_stories))
        .route("/api/stories/{id}", get(view_story))
        .route("/api/stories/{id}/parts/{part_id}", post(append_part))
        .route("/api/admin/clear", post(admin_clear))
        .route("/api/admin/rebuild-index", post(admin_rebuild_index))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_identity(headers: &HeaderMap) -> Result<String, ApiError> {
    identity(headers).ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
}

fn require_admin(headers: &HeaderMap) -> Result<(), ApiError> {
    let admin = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Administrator access required".to_string()))
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_story(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let creator = require_identity(&headers)?;
    let story = state
        .service
        .create_story(&creator, &req.authors, req.target_words)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedStory {
            id: story.id,
            authors: story.authors,
            next_author: story.next_author,
            target_words: story.target_words,
        }),
    ))
}

async fn completed_stories(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.completed_stories().await?))
}

async fn current_story(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let me = require_identity(&headers)?;
    Ok(Json(state.service.current_story(&me).await?))
}

async fn pending_stories(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let me = require_identity(&headers)?;
    Ok(Json(state.service.pending_for(&me).await?))
}

async fn view_story(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = identity(&headers);
    Ok(Json(state.service.view_story(&id, viewer.as_deref()).await?))
}

async fn append_part(
    State(state): State<SharedState>,
    Path((id, part_id)): Path<(String, String)>,
    Json(req): Json<AppendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let out = state.service.append_contribution(&id, &part_id, &req.text).await?;
    Ok(Json(AppendResponse {
        story_id: out.story.id.clone(),
        part_id: out.part.id,
        completed: out.completed,
        next_author: (!out.completed).then(|| out.story.next_author.clone()),
        words: out.story.word_count(),
    }))
}

async fn admin_clear(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers)?;
    Ok(Json(state.service.clear_all().await?))
}

async fn admin_rebuild_index(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers)?;
    let entries = state.service.rebuild_index().await?;
    Ok(Json(serde_json::json!({"entries": entries})))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorytimeConfig;
    use crate::store::StoryDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";

    fn test_app() -> Router {
        let service = StoryService::new(StoryDb::new_in_memory().unwrap(), StorytimeConfig::default());
        api_router().with_state(Arc::new(AppState { service }))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn create(app: &Router, target: u32) -> serde_json::Value {
        let req = post_json(
            "/api/stories",
            Some("carol@example.com"),
            serde_json::json!({"authors": format!("{}, {}", ALICE, BOB), "target_words": target}),
        );
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    async fn your_turn_token(app: &Router, id: &str, user: &str) -> String {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/stories/{}", id), Some(user)))
            .await
            .unwrap();
        let view: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(view["status"], "your_turn");
        view["part_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_app().oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_and_view_story() {
        let app = test_app();
        let created = create(&app, 10).await;
        let id = created["id"].as_str().unwrap();
        assert_eq!(created["next_author"], ALICE);

        your_turn_token(&app, id, ALICE).await;

        let response = app
            .clone()
            .oneshot(get(&format!("/api/stories/{}", id), Some(BOB)))
            .await
            .unwrap();
        let view: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(view["status"], "waiting");
        assert_eq!(view["next_author"], ALICE);

        let response = app
            .oneshot(get(&format!("/api/stories/{}", id), Some("mallory@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_requires_identity_and_valid_input() {
        let app = test_app();
        let req = post_json("/api/stories", None, serde_json::json!({"authors": ALICE, "target_words": 5}));
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let req = post_json(
            "/api/stories",
            Some(ALICE),
            serde_json::json!({"authors": "nobody", "target_words": 5}),
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn test_append_then_stale_token_conflicts() {
        let app = test_app();
        let created = create(&app, 100).await;
        let id = created["id"].as_str().unwrap();
        let token = your_turn_token(&app, id, ALICE).await;
        let uri = format!("/api/stories/{}/parts/{}", id, token);

        let response = app
            .clone()
            .oneshot(post_json(&uri, Some(ALICE), serde_json::json!({"text": "Once upon a time"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let out: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(out["next_author"], BOB);
        assert_eq!(out["words"], 4);

        let response = app
            .oneshot(post_json(&uri, Some(ALICE), serde_json::json!({"text": "again"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["story_id"], id);
    }

    #[tokio::test]
    async fn test_pending_current_and_completed() {
        let app = test_app();
        let created = create(&app, 3).await;
        let id = created["id"].as_str().unwrap();

        let response = app.clone().oneshot(get("/api/stories/pending", Some(ALICE))).await.unwrap();
        let pending: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["story_id"], id);

        let response = app.clone().oneshot(get("/api/stories/current", Some(BOB))).await.unwrap();
        let current: serde_json::Value = body_json(response.into_body()).await;
        assert!(current.is_null());

        let token = your_turn_token(&app, id, ALICE).await;
        app.clone()
            .oneshot(post_json(
                &format!("/api/stories/{}/parts/{}", id, token),
                Some(ALICE),
                serde_json::json!({"text": "The very end"}),
            ))
            .await
            .unwrap();

        let response = app.oneshot(get("/api/stories/completed", None)).await.unwrap();
        let done: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0]["id"], id);
        assert_eq!(done[0]["complete"], true);
    }

    #[tokio::test]
    async fn test_admin_routes_require_flag() {
        let app = test_app();
        create(&app, 10).await;

        let req = post_json("/api/admin/clear", Some(ALICE), serde_json::json!({}));
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::FORBIDDEN);

        let req = Request::builder()
            .method("POST")
            .uri("/api/admin/clear")
            .header(ADMIN_HEADER, "true")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(summary["stories"], 1);

        let response = app.oneshot(get("/api/stories/pending", Some(ALICE))).await.unwrap();
        let pending: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(pending.is_empty());
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let err = ApiError::from(StoryError::storage("disk on fire"));
        assert!(matches!(err, ApiError::Internal));
        let err = ApiError::from(StoryError::Validation("bad".into()));
        assert!(matches!(err, ApiError::BadRequest(m) if m == "bad"));
    }
}
