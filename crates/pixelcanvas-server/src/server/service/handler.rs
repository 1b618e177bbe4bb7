//! HTTP entry points of the canvas pipeline.
//!
//! Each route decodes nothing beyond the raw body and hands it to the
//! matching [`Canvas`] handler, so that delivery-shape and schema errors are
//! reported by the pipeline itself.

use super::error::ApiError;
use crate::server::telemetry::{
    increment_chunk_events_published, increment_draws_accepted, increment_draws_rejected,
    increment_pixels_applied, increment_publish_failures, increment_resets,
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use pixelcanvas::envelope::{PushMessage, decode_direct};
use pixelcanvas::{
    Canvas, ClearReport, DrawReport, Error, ErrorClass, MemoryBroker, MessageId, ResetReport,
    rfc3339,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Upper bound on messages returned by one pull.
const MAX_PULL: usize = 1000;
const DEFAULT_PULL: usize = 100;

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    canvas: Canvas,
    broker: Arc<MemoryBroker>,
}

impl AppState {
    pub fn new(canvas: Canvas, broker: Arc<MemoryBroker>) -> Self {
        Self { canvas, broker }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Published {
    message_id: MessageId,
}

#[derive(Debug, Serialize)]
struct Subscribed {
    subscription: String,
    topic: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    #[serde(default)]
    max_messages: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Pulled {
    messages: Vec<PushMessage>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pixels/submit", post(submit_draw))
        .route("/pixels/draw", post(apply_draw_push))
        .route("/pixels/direct", post(apply_draw_direct))
        .route("/users/touch", post(touch_user))
        .route("/chunks/changed", post(chunk_changed))
        .route("/admin/reset", post(reset))
        .route("/admin/clear", post(clear_session))
        .route("/subscriptions/{name}", post(subscribe))
        .route("/subscriptions/{name}/pull", post(pull))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn submit_draw(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    match state.canvas.submit_draw(&body).await {
        Ok(message_id) => {
            increment_draws_accepted();
            Ok(Json(Published { message_id }).into_response())
        }
        Err(e) => {
            match e.class() {
                ErrorClass::RateLimited => increment_draws_rejected(),
                ErrorClass::Dependency => increment_publish_failures(),
                ErrorClass::Config | ErrorClass::Malformed => {}
            }
            Err(e.into())
        }
    }
}

async fn apply_draw_push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DrawReport>, ApiError> {
    let report = state
        .canvas
        .apply_draw_push(&body)
        .await
        .inspect_err(count_dependency_failure)?;
    increment_pixels_applied(report.pixels as u64);
    Ok(Json(report))
}

async fn apply_draw_direct(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DrawReport>, ApiError> {
    let report = state
        .canvas
        .apply_draw_direct(&body)
        .await
        .inspect_err(count_dependency_failure)?;
    increment_pixels_applied(report.pixels as u64);
    Ok(Json(report))
}

async fn touch_user(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    state
        .canvas
        .touch_user_push(&body)
        .await
        .inspect_err(count_dependency_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn chunk_changed(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(pixelcanvas::Error::from)?;
    match state
        .canvas
        .on_chunk_changed(&payload)
        .await
        .inspect_err(count_dependency_failure)?
    {
        Some(message_id) => {
            increment_chunk_events_published();
            Ok(Json(Published { message_id }).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn reset(State(state): State<AppState>) -> Result<Json<ResetReport>, ApiError> {
    let report = state.canvas.reset().await?;
    increment_resets();
    Ok(Json(report))
}

async fn clear_session(State(state): State<AppState>) -> Result<Json<ClearReport>, ApiError> {
    Ok(Json(state.canvas.clear_session().await?))
}

/// Binds a consumer subscription to the update topic. Idempotent for a
/// subscription already bound there.
async fn subscribe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let topic = state.canvas.config().update_topic.clone();
    match state.broker.topic_of(&name) {
        Some(bound) if bound == topic => {
            Ok(Json(Subscribed { subscription: name, topic }).into_response())
        }
        Some(bound) => Err(Error::Malformed {
            reason: format!("subscription {name} is bound to topic {bound}"),
        }
        .into()),
        None => {
            state.broker.subscribe(&topic, &name)?;
            tracing::info!(subscription = %name, topic = %topic, "Created consumer subscription");
            let created = Subscribed {
                subscription: name,
                topic,
            };
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
    }
}

/// Pulls and acknowledges update events. The body is optional:
/// `{"maxMessages": n}`.
async fn pull(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PullRequest = if body.is_empty() {
        PullRequest::default()
    } else {
        decode_direct(&body)?
    };
    let topic = &state.canvas.config().update_topic;
    match state.broker.topic_of(&name) {
        Some(bound) if &bound == topic => {}
        Some(_) => {
            return Err(Error::Malformed {
                reason: format!("subscription {name} does not consume {topic}"),
            }
            .into());
        }
        None => {
            let body = json!({ "error": format!("subscription {name} does not exist") });
            return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
        }
    }

    let max = request
        .max_messages
        .unwrap_or(DEFAULT_PULL)
        .clamp(1, MAX_PULL);
    let messages = state
        .broker
        .pull(&name, max)?
        .into_iter()
        .map(|message| PushMessage {
            publish_time: Some(rfc3339(&message.publish_time)),
            ..PushMessage::new(&message.data, &message.id)
        })
        .collect();
    Ok(Json(Pulled { messages }).into_response())
}

async fn healthz() -> &'static str {
    "ok"
}

fn count_dependency_failure(err: &pixelcanvas::Error) {
    if err.class() == ErrorClass::Dependency {
        increment_publish_failures();
    }
}
