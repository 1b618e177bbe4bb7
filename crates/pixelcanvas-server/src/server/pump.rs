//! Local delivery pumps.
//!
//! In a hosted deployment the broker pushes messages to the HTTP routes and
//! the store calls `/chunks/changed` on every chunk write. When running
//! against the in-memory backends, these pumps play both roles inside the
//! process:
//!
//! - draw topic -> [`Canvas::apply_draw_push`], each message wrapped in a push
//!   envelope the way the broker would deliver it,
//! - user topic -> [`Canvas::touch_user_push`], same wrapping,
//! - store change feed of the chunk collection -> [`Canvas::on_chunk_changed`].
//!
//! Failed deliveries are logged and dropped; nothing is redelivered.

use crate::server::telemetry::{
    increment_chunk_events_published, increment_pixels_applied, increment_publish_failures,
};
use anyhow::Context;
use core::future::Future;
use pixelcanvas::envelope::encode_push;
use pixelcanvas::{Canvas, CanvasConfig, ChangeEvent, ErrorClass, MemoryBroker, MemoryStore};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tokio_util::sync::CancellationToken;

/// Name of the subscription a pump pulls `topic` from.
pub fn push_subscription(topic: &str) -> String {
    format!("{topic}.push")
}

/// Creates every topic the canvas publishes to.
pub fn provision_topics(broker: &MemoryBroker, config: &CanvasConfig) {
    broker.create_topic(&config.update_topic);
    broker.create_topic(&config.draw_topic);
    if let Some(topic) = &config.user_topic {
        broker.create_topic(topic);
    }
}

/// Subscribes and spawns one pump per delivery path. Every pump stops when
/// `shutdown` is cancelled.
pub fn spawn_pumps(
    canvas: &Canvas,
    store: &MemoryStore,
    broker: &Arc<MemoryBroker>,
    shutdown: &CancellationToken,
) -> anyhow::Result<JoinSet<()>> {
    let config = canvas.config();
    let mut pumps = JoinSet::new();

    let draws = push_subscription(&config.draw_topic);
    broker
        .subscribe(&config.draw_topic, &draws)
        .context("failed to subscribe draw pump")?;
    let draw_canvas = canvas.clone();
    pumps.spawn(push_pump(
        Arc::clone(broker),
        draws,
        shutdown.clone(),
        move |body| {
            let canvas = draw_canvas.clone();
            async move {
                let report = canvas.apply_draw_push(&body).await?;
                increment_pixels_applied(report.pixels as u64);
                Ok(())
            }
        },
    ));

    if let Some(topic) = &config.user_topic {
        let users = push_subscription(topic);
        broker
            .subscribe(topic, &users)
            .context("failed to subscribe user pump")?;
        let user_canvas = canvas.clone();
        pumps.spawn(push_pump(
            Arc::clone(broker),
            users,
            shutdown.clone(),
            move |body| {
                let canvas = user_canvas.clone();
                async move { canvas.touch_user_push(&body).await }
            },
        ));
    }

    pumps.spawn(change_pump(
        canvas.clone(),
        BroadcastStream::new(store.subscribe_changes()),
        config.chunk_collection.clone(),
        shutdown.clone(),
    ));

    tracing::info!(count = pumps.len(), "Started delivery pumps");
    Ok(pumps)
}

/// Pulls `subscription` one message at a time and hands each message, wrapped
/// in a push envelope, to `deliver`.
async fn push_pump<F, Fut>(
    broker: Arc<MemoryBroker>,
    subscription: String,
    shutdown: CancellationToken,
    deliver: F,
) where
    F: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = pixelcanvas::Result<()>>,
{
    tracing::debug!(subscription = %subscription, "Push pump started");
    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => break,
            received = broker.receive(&subscription) => received,
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(subscription = %subscription, "Push pump stopped: {e}");
                break;
            }
        };

        let body = match encode_push(&message.data, &message.id, &subscription) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    subscription = %subscription,
                    message_id = %message.id,
                    "Dropping message: {e}"
                );
                continue;
            }
        };
        if let Err(e) = deliver(body).await {
            log_dropped(&subscription, &message.id, &e);
        }
    }
    tracing::debug!(subscription = %subscription, "Push pump stopped");
}

/// Forwards chunk document changes to [`Canvas::on_chunk_changed`].
async fn change_pump(
    canvas: Canvas,
    mut changes: BroadcastStream<ChangeEvent>,
    collection: String,
    shutdown: CancellationToken,
) {
    tracing::debug!(collection = %collection, "Change pump started");
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = changes.next() => next,
        };
        let event = match next {
            None => break,
            Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                tracing::warn!(missed, "Change pump lagged, chunk updates were skipped");
                continue;
            }
            Some(Ok(event)) => event,
        };
        if event.collection != collection {
            continue;
        }
        match canvas.on_chunk_changed(&event.payload).await {
            Ok(Some(_)) => increment_chunk_events_published(),
            Ok(None) => {}
            Err(e) => log_dropped(&collection, &event.id, &e),
        }
    }
    tracing::debug!(collection = %collection, "Change pump stopped");
}

fn log_dropped(source: &str, id: &str, err: &pixelcanvas::Error) {
    match err.class() {
        ErrorClass::RateLimited => tracing::info!(source, id, "Dropped delivery: {err}"),
        ErrorClass::Malformed => tracing::warn!(source, id, "Dropped delivery: {err}"),
        ErrorClass::Config | ErrorClass::Dependency => {
            increment_publish_failures();
            tracing::error!(source, id, "Dropped delivery: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::DateTime;
    use core::time::Duration;
    use pixelcanvas::{DocumentStore, ManualClock, MessageBroker};

    struct Running {
        canvas: Canvas,
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        shutdown: CancellationToken,
        pumps: JoinSet<()>,
    }

    fn start(config: CanvasConfig) -> Running {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new("local", "(default)", clock.clone()));
        let broker = Arc::new(MemoryBroker::new(clock.clone()));
        provision_topics(&broker, &config);
        broker.subscribe(&config.update_topic, "viewer").unwrap();

        let canvas = Canvas::new(config, store.clone(), broker.clone(), clock).unwrap();
        let shutdown = CancellationToken::new();
        let pumps = spawn_pumps(&canvas, &store, &broker, &shutdown).unwrap();
        Running {
            canvas,
            store,
            broker,
            shutdown,
            pumps,
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn submitted_draw_flows_to_update_topic() {
        let running = start(CanvasConfig {
            user_topic: Some("user.add".to_string()),
            ..CanvasConfig::default()
        });
        let draw = br#"{"x":150,"y":12,"color":3,"user":"42","timestamp":""}"#;
        running.canvas.submit_draw(draw).await.unwrap();

        let broker = Arc::clone(&running.broker);
        wait_for(move || broker.backlog_len("viewer").unwrap() > 0).await;
        let update = running.broker.pull("viewer", 1).unwrap();
        let event: serde_json::Value = serde_json::from_slice(&update[0].data).unwrap();
        assert_eq!(event["chunkX"], 1);
        assert_eq!(event["pixels"]["50_12"]["user"], 42);

        // The user pump stamps the record from the notice.
        for _ in 0..200 {
            if running.store.get("users", "42").await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(running.store.get("users", "42").await.unwrap().is_some());

        let err = running.canvas.submit_draw(draw).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::RateLimited);
    }

    #[tokio::test]
    async fn malformed_message_does_not_stop_the_pump() {
        let running = start(CanvasConfig::default());
        running
            .broker
            .publish("pixel.draw", Bytes::from_static(b"garbage"))
            .await
            .unwrap();
        running
            .broker
            .publish(
                "pixel.draw",
                Bytes::from_static(br#"{"x":1,"y":1,"color":1,"user":"7","timestamp":""}"#),
            )
            .await
            .unwrap();

        let broker = Arc::clone(&running.broker);
        wait_for(move || broker.backlog_len("viewer").unwrap() > 0).await;
    }

    #[tokio::test]
    async fn http_consumer_receives_pumped_updates() {
        use crate::server::service::handler::{AppState, router};
        use axum::body::{Body, to_bytes};
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let running = start(CanvasConfig::default());
        let app = router(AppState::new(running.canvas.clone(), running.broker.clone()));
        let subscribe = Request::post("/subscriptions/dashboard")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(subscribe).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let draw = br#"{"x":3,"y":4,"color":5,"user":"9","timestamp":""}"#;
        running.canvas.apply_draw_direct(draw).await.unwrap();
        let broker = Arc::clone(&running.broker);
        wait_for(move || broker.backlog_len("dashboard").unwrap() > 0).await;

        let pull = Request::post("/subscriptions/dashboard/pull")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(pull).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let pulled: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(pulled["messages"].as_array().map(Vec::len), Some(1));

        let report = running.canvas.reset().await.unwrap();
        assert!(report.subscriptions.contains(&"dashboard".to_string()));
    }

    #[tokio::test]
    async fn pumps_stop_on_shutdown() {
        let mut running = start(CanvasConfig::default());
        running.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(joined) = running.pumps.join_next().await {
                joined.unwrap();
            }
        })
        .await
        .unwrap();
    }
}
