//! # Canvas handlers
//!
//! [`Canvas`] wires the pipeline components to the store and the broker. Each
//! method is one stateless, at-least-once handler; every piece of shared
//! state lives behind the collaborators.

use crate::envelope::{UserNotice, decode_direct, decode_push};
use crate::{
    CanvasConfig, ChangePublisher, DocumentStore, Error, FieldValue, Fields, LAST_UPDATED_FIELD,
    MessageBroker, MessageId, PixelWrite, RateGate, ResetCoordinator, ResetReport, Result,
    TimeSource, Write, coalesce, decode_change,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Field of the reset marker document.
pub const LAST_TRIGGERED_FIELD: &str = "lastTriggered";

/// Outcome of a committed draw batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrawReport {
    /// Chunk documents patched.
    pub chunks: usize,
    /// Pixel writes processed.
    pub pixels: usize,
}

/// Documents removed by [`Canvas::clear_session`], per collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub chunks: usize,
    pub markers: usize,
    pub users: usize,
}

/// The pipeline handlers over shared collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Canvas {
    config: Arc<CanvasConfig>,
    store: Arc<dyn DocumentStore>,
    broker: Arc<dyn MessageBroker>,
    clock: Arc<dyn TimeSource>,
    gate: RateGate,
    publisher: ChangePublisher,
    resetter: ResetCoordinator,
}

impl Canvas {
    /// Validates `config` and builds the handler set.
    ///
    /// # Errors
    ///
    /// Any error of [`CanvasConfig::validate`].
    pub fn new(
        config: CanvasConfig,
        store: Arc<dyn DocumentStore>,
        broker: Arc<dyn MessageBroker>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: RateGate::new(config.cooldown),
            publisher: ChangePublisher::new(Arc::clone(&broker), config.update_topic.clone()),
            resetter: ResetCoordinator::new(Arc::clone(&broker), Arc::clone(&clock)),
            config: Arc::new(config),
            store,
            broker,
            clock,
        })
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Validates a raw draw request, checks the user's cooldown and forwards
    /// the request unchanged to the draw topic.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`] if the body is not a pixel write.
    /// - [`Error::InvalidUserId`] if the user id is not a decimal `i64`.
    /// - [`Error::RateLimited`] if the user is still cooling down.
    /// - Store and broker failures.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn submit_draw(&self, body: &[u8]) -> Result<MessageId> {
        let write: PixelWrite = decode_direct(body)?;
        // The cooldown is keyed on the stored id, not the client's spelling.
        let user = write.user_key()?;
        self.gate
            .admit(
                self.store.as_ref(),
                &self.config.user_collection,
                &user,
                self.clock.as_ref(),
            )
            .await?
            .into_result()?;

        let id = self
            .broker
            .publish(&self.config.draw_topic, Bytes::copy_from_slice(body))
            .await?;
        tracing::info!(
            user = %user,
            x = write.x,
            y = write.y,
            message_id = %id,
            "Accepted draw request"
        );
        Ok(id)
    }

    /// Applies a draw request delivered through a push envelope.
    pub async fn apply_draw_push(&self, body: &[u8]) -> Result<DrawReport> {
        let write: PixelWrite = decode_push(body)?;
        self.apply_draws(core::slice::from_ref(&write)).await
    }

    /// Applies a draw request delivered as raw JSON.
    pub async fn apply_draw_direct(&self, body: &[u8]) -> Result<DrawReport> {
        let write: PixelWrite = decode_direct(body)?;
        self.apply_draws(core::slice::from_ref(&write)).await
    }

    /// Coalesces `writes` and commits them in one batch together with the
    /// reset marker.
    ///
    /// When a user topic is configured, one [`UserNotice`] per write is
    /// published first; those publishes are best effort. Otherwise each
    /// user's record is stamped inside the batch.
    pub async fn apply_draws(&self, writes: &[PixelWrite]) -> Result<DrawReport> {
        let batch = coalesce(writes, self.config.chunk_size, self.config.policy)?;

        if let Some(topic) = &self.config.user_topic {
            for user in &batch.users {
                self.notify_user(topic, user).await;
            }
        }

        let mut queued: Vec<Write> = batch
            .patches
            .iter()
            .map(|(chunk, patch)| {
                Write::merge(
                    self.config.chunk_collection.as_str(),
                    chunk.to_string(),
                    patch.to_fields(),
                )
            })
            .collect();
        queued.push(Write::set(
            self.config.trigger_reset_name.as_str(),
            self.config.trigger_reset_name.as_str(),
            server_timestamp(LAST_TRIGGERED_FIELD),
        ));
        if self.config.user_topic.is_none() {
            queued.extend(batch.users.iter().map(|user| {
                Write::merge(
                    self.config.user_collection.as_str(),
                    user.as_str(),
                    server_timestamp(LAST_UPDATED_FIELD),
                )
            }));
        }

        self.store.batch_write(queued).await?;
        let report = DrawReport {
            chunks: batch.patches.len(),
            pixels: batch.users.len(),
        };
        tracing::info!(chunks = report.chunks, pixels = report.pixels, "Committed draw batch");
        Ok(report)
    }

    async fn notify_user(&self, topic: &str, user: &str) {
        let notice = UserNotice {
            user_id: user.to_string(),
        };
        let data = match serde_json::to_vec(&notice) {
            Ok(data) => Bytes::from(data),
            Err(_e) => {
                tracing::warn!(user, "Failed to encode user notice: {_e}");
                return;
            }
        };
        if let Err(_e) = self.broker.publish(topic, data).await {
            tracing::warn!(user, topic, "Failed to publish user notice: {_e}");
        }
    }

    /// Stamps `users/{user}.lastUpdated` with the store's commit time.
    pub async fn touch_user(&self, user: &str) -> Result<()> {
        self.store
            .merge_write(
                &self.config.user_collection,
                user,
                server_timestamp(LAST_UPDATED_FIELD),
            )
            .await?;
        tracing::debug!(user, "Touched user record");
        Ok(())
    }

    /// [`Canvas::touch_user`] for a [`UserNotice`] in a push envelope.
    pub async fn touch_user_push(&self, body: &[u8]) -> Result<()> {
        let notice: UserNotice = decode_push(body)?;
        if notice.user_id.is_empty() || notice.user_id.contains('/') {
            return Err(Error::InvalidUserId {
                user: notice.user_id,
            });
        }
        self.touch_user(&notice.user_id).await
    }

    /// Decodes a chunk change notification and publishes the resulting
    /// update. Returns `None` when the change carries no new document.
    pub async fn on_chunk_changed(&self, payload: &Value) -> Result<Option<MessageId>> {
        let Some(event) = decode_change(payload)? else {
            tracing::debug!("Change without a new value, nothing to publish");
            return Ok(None);
        };
        self.publisher.publish(&event).await.map(Some)
    }

    /// Seeks every subscription of the update topic to now.
    pub async fn reset(&self) -> Result<ResetReport> {
        self.resetter.reset(&self.config.update_topic).await
    }

    /// Starts a new session: deletes every chunk document, the reset marker
    /// and every user record, which also lifts every cooldown.
    ///
    /// Collections are cleared in that order. A failure stops the clear and
    /// leaves the remaining collections untouched.
    pub async fn clear_session(&self) -> Result<ClearReport> {
        let chunks = self
            .store
            .delete_collection(&self.config.chunk_collection)
            .await?;
        let markers = self
            .store
            .delete_collection(&self.config.trigger_reset_name)
            .await?;
        let users = self
            .store
            .delete_collection(&self.config.user_collection)
            .await?;
        tracing::info!(chunks, markers, users, "Cleared canvas session");
        Ok(ClearReport {
            chunks,
            markers,
            users,
        })
    }
}

fn server_timestamp(field: &str) -> Fields {
    Fields::from([(field.to_string(), FieldValue::ServerTimestamp)])
}
