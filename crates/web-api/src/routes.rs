use std::net::SocketAddr;

use axum::{
    extract::{
        rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, Query, Request, State,
        WebSocketUpgrade,
    },
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use application::{ApplicationError, SubmitNoteRequest, SNAPSHOT_LIMIT};
use config::ServerConfig;
use domain::Note;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/sticky-notes",
            get(list_notes)
                .post(submit_note)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    limit_submissions,
                )),
        )
        .route("/ws", get(websocket_upgrade))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let notes = state
        .hub
        .list(query.limit.unwrap_or(SNAPSHOT_LIMIT))
        .await?;
    Ok(Json(notes))
}

async fn submit_note(
    State(state): State<AppState>,
    payload: Result<Json<SubmitNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let Json(request) = payload?;
    let note = request.into_new_note().map_err(ApplicationError::from)?;
    let stored = state.hub.submit(note).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// 按来源 IP 限制提交频率；拿不到对端地址时不限流
async fn limit_submissions(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::POST {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(ip) = peer {
            if let Err(err) = state.rate_limiter.check(ip) {
                tracing::warn!(client = %ip, error = %err, "note submission throttled");
                return ApiError::from(err).into_response();
            }
        }
    }
    next.run(request).await
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        match state.hub.join().await {
            Ok(connection) => WebSocketConnection::new(socket, state, connection).run().await,
            Err(err) => {
                tracing::error!(error = %err, "failed to join realtime channel");
                WebSocketConnection::reject(socket).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use application::{
        BroadcastHub, BroadcastHubDependencies, ConnectionRegistry, HubSettings,
        SubmissionRateLimiter,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use config::AppConfig;
    use domain::{InsertOutcome, NewNote, NoteRepository, RepositoryError, RepositoryResult};
    use tower::ServiceExt;

    /// 始终失败的存储
    struct UnavailableRepository;

    #[async_trait]
    impl NoteRepository for UnavailableRepository {
        async fn insert_if_absent(&self, _note: NewNote) -> RepositoryResult<InsertOutcome> {
            Err(RepositoryError::storage("database is down"))
        }

        async fn list_recent(&self, _limit: u32) -> RepositoryResult<Vec<Note>> {
            Err(RepositoryError::storage("database is down"))
        }
    }

    fn app(cors_origins: Vec<String>) -> Router {
        let mut config = AppConfig::default();
        config.server.cors_origins = cors_origins;
        let hub = Arc::new(BroadcastHub::new(
            BroadcastHubDependencies {
                note_repository: Arc::new(UnavailableRepository),
                registry: Arc::new(ConnectionRegistry::new(4)),
            },
            HubSettings::default(),
        ));
        let limiter = Arc::new(SubmissionRateLimiter::new(10, std::time::Duration::from_secs(60)));
        router(AppState::new(hub, limiter), &config.server)
    }

    #[tokio::test]
    async fn test_storage_failure_returns_500() {
        let response = app(vec!["*".into()])
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::POST)
                    .uri("/api/sticky-notes")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"message":"hi","signature":"sig1","walletAddress":"0xabc"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app(vec!["*".into()])
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/sticky-notes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health_does_not_touch_storage() {
        let response = app(vec!["*".into()])
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_only() {
        let preflight = |origin: &'static str| {
            axum::http::Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/sticky-notes")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app(vec!["https://notes.example".into()])
            .oneshot(preflight("https://notes.example"))
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://notes.example"
        );

        let denied = app(vec!["https://notes.example".into()])
            .oneshot(preflight("https://evil.example"))
            .await
            .unwrap();
        assert!(!denied
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
