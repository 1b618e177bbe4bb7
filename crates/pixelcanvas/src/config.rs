use crate::{CoalescePolicy, Error, Result};
use core::time::Duration;

pub const DEFAULT_CHUNK_SIZE: i32 = 100;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Settings shared by every handler of a [`Canvas`](crate::Canvas).
///
/// Built once at startup and passed by value; handlers never read the
/// environment themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanvasConfig {
    pub chunk_size: i32,
    /// Minimum time between two accepted draws of one user.
    pub cooldown: Duration,
    /// Topic receiving [`ChunkUpdateEvent`](crate::ChunkUpdateEvent)s.
    pub update_topic: String,
    /// Topic receiving accepted draw requests.
    pub draw_topic: String,
    /// Topic receiving [`UserNotice`](crate::envelope::UserNotice)s. When
    /// unset, user records are stamped inside the draw batch instead.
    pub user_topic: Option<String>,
    pub chunk_collection: String,
    pub user_collection: String,
    /// Collection and id of the reset marker document.
    pub trigger_reset_name: String,
    pub policy: CoalescePolicy,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cooldown: DEFAULT_COOLDOWN,
            update_topic: "pixel.update".to_string(),
            draw_topic: "pixel.draw".to_string(),
            user_topic: None,
            chunk_collection: "canvas_chunks".to_string(),
            user_collection: "users".to_string(),
            trigger_reset_name: "trigger_reset".to_string(),
            policy: CoalescePolicy::default(),
        }
    }
}

impl CanvasConfig {
    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidChunkSize`] if `chunk_size <= 0`.
    /// - [`Error::Config`] if a topic or collection name is empty, or contains
    ///   a `/`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size <= 0 {
            return Err(Error::InvalidChunkSize {
                size: i64::from(self.chunk_size),
            });
        }
        let names = [
            ("update topic", Some(self.update_topic.as_str())),
            ("draw topic", Some(self.draw_topic.as_str())),
            ("user topic", self.user_topic.as_deref()),
            ("chunk collection", Some(self.chunk_collection.as_str())),
            ("user collection", Some(self.user_collection.as_str())),
            ("reset marker", Some(self.trigger_reset_name.as_str())),
        ];
        for (what, name) in names {
            let Some(name) = name else { continue };
            if name.is_empty() || name.contains('/') {
                return Err(Error::Config {
                    reason: format!("{what} name {name:?} is empty or contains '/'"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CanvasConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_unusable_settings() {
        let config = CanvasConfig {
            chunk_size: 0,
            ..CanvasConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            Error::InvalidChunkSize { size: 0 }
        );

        let config = CanvasConfig {
            user_topic: Some(String::new()),
            ..CanvasConfig::default()
        };
        assert!(matches!(config.validate().unwrap_err(), Error::Config { .. }));

        let config = CanvasConfig {
            user_collection: "a/b".to_string(),
            ..CanvasConfig::default()
        };
        assert!(matches!(config.validate().unwrap_err(), Error::Config { .. }));
    }
}
