use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use pixelcanvas::{CanvasConfig, CoalescePolicy, DEFAULT_CHUNK_SIZE};

/// Runtime configuration for the `pixelcanvas-server` binary.
///
/// Every value can be given as a CLI flag or through the environment
/// (including a `.env` file in the working directory). Defaults match a
/// local single-process deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pixelcanvas-server",
    version,
    about = "HTTP handlers for a shared, chunked pixel canvas"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8081"))]
    pub server_addr: String,

    /// Side length of a square chunk, in pixels.
    ///
    /// Changing it on a populated canvas re-partitions pixels into different
    /// chunk documents; existing documents are not migrated.
    ///
    /// Environment variable: `CHUNK_SIZE`
    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: i32,

    /// Minimum time between two accepted draws of one user, e.g. `5m`, `90s`.
    ///
    /// Environment variable: `RATE_LIMIT`
    #[arg(long, env = "RATE_LIMIT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub rate_limit: Duration,

    /// Topic receiving chunk update events.
    ///
    /// Environment variable: `PIXEL_UPDATE_TOPIC`
    #[arg(long, env = "PIXEL_UPDATE_TOPIC", default_value_t = String::from("pixel.update"))]
    pub pixel_update_topic: String,

    /// Topic receiving accepted draw requests.
    ///
    /// Environment variable: `DRAW_PIXEL_TOPIC`
    #[arg(long, env = "DRAW_PIXEL_TOPIC", default_value_t = String::from("pixel.draw"))]
    pub draw_pixel_topic: String,

    /// Topic receiving per-pixel user notices. When unset (or empty), user
    /// records are stamped in the draw batch itself.
    ///
    /// Environment variable: `ADD_USER_TOPIC`
    #[arg(long, env = "ADD_USER_TOPIC")]
    pub add_user_topic: Option<String>,

    /// Collection holding chunk documents.
    ///
    /// Environment variable: `CHUNK_COLLECTION`
    #[arg(long, env = "CHUNK_COLLECTION", default_value_t = String::from("canvas_chunks"))]
    pub chunk_collection: String,

    /// Collection holding user records.
    ///
    /// Environment variable: `USER_COLLECTION`
    #[arg(long, env = "USER_COLLECTION", default_value_t = String::from("users"))]
    pub user_collection: String,

    /// Collection and id of the reset marker document.
    ///
    /// Environment variable: `TRIGGER_RESET_NAME`
    #[arg(long, env = "TRIGGER_RESET_NAME", default_value_t = String::from("trigger_reset"))]
    pub trigger_reset_name: String,

    /// What to do when several writes of one batch land in the same chunk:
    /// `first-write-wins`, `last-write-wins` or `merge-pixels`.
    ///
    /// Environment variable: `COALESCE_POLICY`
    #[arg(long, env = "COALESCE_POLICY", default_value_t = String::from("first-write-wins"))]
    pub coalesce_policy: String,

    /// Project used in document resource names.
    ///
    /// Environment variable: `PROJECT_ID`
    #[arg(long, env = "PROJECT_ID", default_value_t = String::from("local"))]
    pub project_id: String,

    /// Database used in document resource names.
    ///
    /// Environment variable: `FIRESTORE_DATABASE`
    #[arg(
        long = "database",
        env = "FIRESTORE_DATABASE",
        default_value_t = String::from("(default)")
    )]
    pub database: String,

    /// Do not run the local delivery pumps. Draws then only reach the store
    /// through `/pixels/draw` and `/pixels/direct`.
    #[arg(long, default_value_t = false)]
    pub no_pumps: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub canvas: CanvasConfig,
    pub project_id: String,
    pub database: String,
    pub pumps: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.project_id.is_empty() || args.database.is_empty() {
            bail!("PROJECT_ID and FIRESTORE_DATABASE must not be empty");
        }

        let policy: CoalescePolicy = args
            .coalesce_policy
            .parse()
            .context("invalid COALESCE_POLICY")?;

        let canvas = CanvasConfig {
            chunk_size: args.chunk_size,
            cooldown: args.rate_limit,
            update_topic: args.pixel_update_topic,
            draw_topic: args.draw_pixel_topic,
            user_topic: args.add_user_topic.filter(|topic| !topic.is_empty()),
            chunk_collection: args.chunk_collection,
            user_collection: args.user_collection,
            trigger_reset_name: args.trigger_reset_name,
            policy,
        };
        canvas.validate().context("invalid canvas configuration")?;

        Ok(Self {
            server_addr: args.server_addr,
            canvas,
            project_id: args.project_id,
            database: args.database,
            pumps: !args.no_pumps,
        })
    }
}
