//! page-builder-agent: follows one page's collaboration session.
//!
//! Fetches the page from the pages API, joins its real-time session and logs
//! every notification until interrupted. Trees received from peers are kept
//! in the local draft store.
//!
//! Usage: `page-builder-agent <page-id>` with `AUTH_TOKEN` set.

use anyhow::{bail, Context};
use tracing::{error, info, warn};

use page_builder::api::PagesApi;
use page_builder::document::{Page, UserSummary};
use page_builder::storage::DraftStore;
use page_builder::sync::CollaborationSession;
use page_builder::{BuilderSession, ClientConfig, Notification};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "page_builder=info".into()),
        )
        .init();

    let page_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => bail!("usage: page-builder-agent <page-id>"),
    };
    let token = std::env::var("AUTH_TOKEN").context("AUTH_TOKEN is not set")?;
    let local_user = UserSummary::new(
        std::env::var("USER_ID").unwrap_or_else(|_| "page-builder-agent".to_string()),
        std::env::var("USER_NAME").unwrap_or_else(|_| "Page builder agent".to_string()),
    );

    let config = ClientConfig::from_env()?;
    info!("page-builder-agent v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   API: {}", config.api_url);
    info!("   Socket: {}", config.socket_url);

    let drafts = match config.storage_config() {
        Some(storage) => {
            info!("   Drafts: {}", storage.path);
            Some(DraftStore::open(storage).context("Failed to open draft store")?)
        }
        None => None,
    };

    let api = PagesApi::new(config.api_url.clone(), config.request_timeout)?.with_token(&token);
    let (page, offline) = match api.get_page(&page_id).await {
        Ok(page) => (page, false),
        Err(e) if drafts.is_some() => {
            warn!("Could not fetch page {}: {}; starting from local draft", page_id, e);
            (Page::new(page_id.clone(), ""), true)
        }
        Err(e) => return Err(e).context("Failed to fetch page"),
    };
    info!("Loaded \"{}\" ({} blocks)", page.title, page.blocks.len());

    let session = CollaborationSession::websocket(config.sync_config(local_user));
    let mut builder = BuilderSession::new(page, session, drafts, config.history_config())?;
    if offline && !builder.restore_draft()? {
        bail!("No local draft for page {}", page_id);
    }

    builder.connect(&token);

    loop {
        tokio::select! {
            notification = builder.next_notification() => {
                let Some(notification) = notification else {
                    break;
                };
                match notification {
                    Notification::Connected => {
                        info!("Connected, joining page {}", page_id);
                        builder.join()?;
                    }
                    Notification::Disconnected { reason } => {
                        error!("Disconnected: {}", reason.unwrap_or_else(|| "no reason".into()));
                        break;
                    }
                    Notification::RemoteBlocksApplied { user, change_type, block_count, version } => {
                        info!(
                            "{} applied {:?}: {} blocks (version {})",
                            user.name, change_type, block_count, version
                        );
                    }
                    Notification::RemoteBlocksRejected { user, reason } => {
                        warn!("Rejected tree from {}: {}", user.name, reason);
                    }
                    Notification::ChannelError(message) => warn!("Channel error: {}", message),
                    other => info!("{:?}", other),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving page {}", page_id);
                break;
            }
        }
    }

    builder.leave().ok();
    builder.disconnect();
    Ok(())
}
