//! HTTP surface of the timeline engine.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use statusline_core::errors::StatusLineError;
use statusline_protocol::timeline::{
    DeletionOutcome, Interval, RecordStatusChange, StatusChange, TimelineAudit, TimelineQuery,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::TimelineEngine;

/// Header carrying the authenticated caller's user id.
pub const ACTOR_HEADER: &str = "x-statusline-actor";

#[derive(Clone)]
struct ApiState {
    engine: TimelineEngine,
}

/// Running HTTP service.
pub struct TimelineServerHandle {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TimelineServerHandle {
    /// Stops accepting connections and waits for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!(?err, "timeline http task ended abnormally");
        }
    }
}

pub struct TimelineApiBuilder {
    engine: TimelineEngine,
}

impl TimelineApiBuilder {
    pub fn new(engine: TimelineEngine) -> Self {
        Self { engine }
    }

    pub fn router(self) -> Router {
        let state = ApiState {
            engine: self.engine,
        };

        Router::new()
            .route("/health", get(health))
            .route("/v1/monitors/:monitor_id/statuses", post(record_status))
            .route("/v1/monitors/:monitor_id/timeline", get(list_timeline))
            .route("/v1/monitors/:monitor_id/audit", get(audit_timeline))
            .route(
                "/v1/intervals/:id",
                get(get_interval).delete(delete_interval),
            )
            .with_state(state)
    }

    pub async fn serve(self, bind_address: &str) -> anyhow::Result<TimelineServerHandle> {
        let addr: SocketAddr = bind_address
            .parse()
            .context("invalid timeline bind address")?;
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind timeline listener")?;
        let actual_addr = listener
            .local_addr()
            .context("failed to read socket address")?;
        let router = self.router();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!(%actual_addr, "starting statusline-timeline service");
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
            {
                warn!(?err, "timeline http server stopped with error");
            }
        });

        Ok(TimelineServerHandle {
            addr: actual_addr,
            shutdown: tx,
            task,
        })
    }
}

type AppResult<T> = Result<T, AppError>;

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
struct RecordStatusRequest {
    #[serde(default)]
    status_id: Option<Uuid>,
    #[serde(default)]
    starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    created_by_user_id: Option<Uuid>,
}

impl RecordStatusRequest {
    fn into_change(self, monitor_id: Uuid, actor: Option<Uuid>) -> RecordStatusChange {
        RecordStatusChange {
            monitor_id: Some(monitor_id),
            status_id: self.status_id,
            starts_at: self.starts_at,
            root_cause: self.root_cause,
            created_by_user_id: self.created_by_user_id,
            actor,
        }
    }
}

fn actor_from(headers: &HeaderMap) -> AppResult<Option<Uuid>> {
    match headers.get(ACTOR_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Some)
            .ok_or_else(|| AppError::bad_request(format!("invalid {ACTOR_HEADER} header"))),
    }
}

async fn record_status(
    State(state): State<ApiState>,
    Path(monitor_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RecordStatusRequest>,
) -> AppResult<(StatusCode, Json<StatusChange>)> {
    let actor = actor_from(&headers)?;
    let change = state
        .engine
        .record_status_change(payload.into_change(monitor_id, actor))
        .await?;
    Ok((StatusCode::CREATED, Json(change)))
}

async fn list_timeline(
    State(state): State<ApiState>,
    Path(monitor_id): Path<Uuid>,
    Query(query): Query<TimelineQuery>,
) -> AppResult<Json<Vec<Interval>>> {
    let intervals = state.engine.timeline(monitor_id).await?;
    Ok(Json(query.page(intervals)))
}

async fn audit_timeline(
    State(state): State<ApiState>,
    Path(monitor_id): Path<Uuid>,
) -> AppResult<Json<TimelineAudit>> {
    Ok(Json(state.engine.audit(monitor_id).await?))
}

async fn get_interval(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Interval>> {
    Ok(Json(state.engine.get(id).await?))
}

async fn delete_interval(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeletionOutcome>> {
    Ok(Json(state.engine.delete_interval(id).await?))
}

#[derive(Debug, Clone)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new<M: Into<String>>(status: StatusCode, message: M) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<StatusLineError> for AppError {
    fn from(err: StatusLineError) -> Self {
        let status = match &err {
            StatusLineError::Validation(_) => StatusCode::BAD_REQUEST,
            StatusLineError::NotFound(_) => StatusCode::NOT_FOUND,
            StatusLineError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "timeline request failed");
        }
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Actor, StaticDirectory};
    use crate::lock::MemoryLockProvider;
    use crate::pointer::MemoryStatusBoard;
    use crate::store::MemoryTimelineStore;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router_with(directory: StaticDirectory) -> Router {
        let engine = TimelineEngine::builder(
            Arc::new(MemoryTimelineStore::new()),
            Arc::new(MemoryLockProvider::new(Duration::from_secs(1))),
            Arc::new(MemoryStatusBoard::new()),
        )
        .directory(Arc::new(directory))
        .build();
        TimelineApiBuilder::new(engine).router()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn post_status(monitor: Uuid, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/v1/monitors/{monitor}/statuses"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    fn request(method: Method, uri: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = router_with(StaticDirectory::new());
        let (status, body) = send(&router, request(Method::GET, "/health".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn records_and_lists_timeline() {
        let router = router_with(StaticDirectory::new());
        let monitor = Uuid::new_v4();

        for _ in 0..3 {
            let (status, body) =
                send(&router, post_status(monitor, json!({ "status_id": Uuid::new_v4() }))).await;
            assert_eq!(status, StatusCode::CREATED);
            assert!(body["interval"]["ends_at"].is_null());
        }

        let (status, body) = send(
            &router,
            request(Method::GET, format!("/v1/monitors/{monitor}/timeline")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let intervals = body.as_array().expect("array");
        assert_eq!(intervals.len(), 3);
        assert!(intervals[2]["ends_at"].is_null());

        let (_, page) = send(
            &router,
            request(Method::GET, format!("/v1/monitors/{monitor}/timeline?limit=1&offset=2")),
        )
        .await;
        assert_eq!(page.as_array().map(Vec::len), Some(1));

        let (_, audit) = send(
            &router,
            request(Method::GET, format!("/v1/monitors/{monitor}/audit")),
        )
        .await;
        assert_eq!(audit["interval_count"], 3);
        assert_eq!(audit["violations"], json!([]));
    }

    #[tokio::test]
    async fn missing_status_is_bad_request() {
        let router = router_with(StaticDirectory::new());
        let (status, body) = send(&router, post_status(Uuid::new_v4(), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "monitorStatusId is null");
    }

    #[tokio::test]
    async fn actor_header_annotates_root_cause() {
        let actor = Uuid::new_v4();
        let router = router_with(
            StaticDirectory::new().with_actor(actor, Actor::new("Ada", "ada@example.com")),
        );
        let mut req = post_status(Uuid::new_v4(), json!({ "status_id": Uuid::new_v4() }));
        req.headers_mut()
            .insert(ACTOR_HEADER, actor.to_string().parse().expect("header value"));

        let (status, body) = send(&router, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            body["interval"]["root_cause"],
            "Monitor status created by Ada (ada@example.com)"
        );

        let mut bad = post_status(Uuid::new_v4(), json!({ "status_id": Uuid::new_v4() }));
        bad.headers_mut()
            .insert(ACTOR_HEADER, "not-a-uuid".parse().expect("header value"));
        let (status, _) = send(&router, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_maps_engine_errors() {
        let router = router_with(StaticDirectory::new());
        let monitor = Uuid::new_v4();
        let (_, created) =
            send(&router, post_status(monitor, json!({ "status_id": Uuid::new_v4() }))).await;
        let only = created["interval"]["id"].as_str().expect("id").to_string();

        let (status, body) =
            send(&router, request(Method::DELETE, format!("/v1/intervals/{only}"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .is_some_and(|message| message.starts_with("Cannot delete the only status timeline")));

        let (status, _) = send(
            &router,
            request(Method::DELETE, format!("/v1/intervals/{}", Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&router, post_status(monitor, json!({ "status_id": Uuid::new_v4() }))).await;
        let (status, outcome) =
            send(&router, request(Method::DELETE, format!("/v1/intervals/{only}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["deleted"]["id"], only.as_str());

        let (status, _) =
            send(&router, request(Method::GET, format!("/v1/intervals/{only}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn lock_timeout_is_service_unavailable() {
        let err = AppError::from(StatusLineError::LockTimeout {
            key: "m".into(),
            waited_ms: 10,
        });
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
