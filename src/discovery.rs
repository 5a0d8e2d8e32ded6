//! Attach/detach reconciliation.
//!
//! A fixed-interval loop converging the session registry to the set of
//! currently attached decks. A single device's failure never stops the
//! loop or touches other devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::driver::DeckDriver;
use crate::registry::DeckRegistry;
use crate::render::LabelRenderer;
use crate::session::DeckSession;

/// How often the device list is reconciled.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a new session needs besides its deck.
pub struct SessionContext {
    pub config_dir: PathBuf,
    pub dispatcher: Arc<Dispatcher>,
    pub renderer: Option<Arc<LabelRenderer>>,
    pub brightness: u8,
}

/// Run the discovery loop forever.
pub async fn run(
    driver: Arc<dyn DeckDriver>,
    registry: Arc<DeckRegistry>,
    ctx: Arc<SessionContext>,
) {
    loop {
        tick(&*driver, &registry, &ctx).await;
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One reconciliation cycle: drop sessions whose device stopped answering,
/// then open sessions for newly attached decks. Separated out for the
/// test-suite.
pub async fn tick(driver: &dyn DeckDriver, registry: &DeckRegistry, ctx: &SessionContext) {
    for session in registry.snapshot() {
        if !session.connected() {
            warn!(
                "Deck {} ({}) was disconnected",
                session.deck_id(),
                session.serial()
            );
            session.shutdown();
            registry.remove(session.deck_id());
        }
    }

    let handles = match driver.enumerate() {
        Ok(handles) => handles,
        Err(e) => {
            warn!("Device enumeration failed: {e}");
            return;
        }
    };
    for handle in handles {
        if registry.contains(&handle.id) {
            continue;
        }
        info!("Deck {} was detected", handle.id);
        let deck = match driver.open(&handle) {
            Ok(deck) => deck,
            Err(e) => {
                warn!("Deck {}: open failed: {e}", handle.id);
                continue;
            }
        };
        match DeckSession::open(
            deck,
            &ctx.config_dir,
            Arc::clone(&ctx.dispatcher),
            ctx.renderer.clone(),
            ctx.brightness,
        )
        .await
        {
            Ok(session) => registry.insert(session),
            Err(e) => warn!("Deck {}: session setup failed: {e:#}", handle.id),
        }
    }
}
