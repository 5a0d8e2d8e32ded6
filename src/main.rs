//! deckd - button deck daemon.
//!
//! No CLI surface: plug in a supported deck, drop a `<serial>.toml` binding
//! file under the config directory, and press buttons. SIGINT exits
//! immediately.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use deckd::discovery::{self, SessionContext};
use deckd::dispatch::Dispatcher;
use deckd::driver::elgato::ElgatoDriver;
use deckd::paths;
use deckd::registry::DeckRegistry;
use deckd::render::LabelRenderer;
use deckd::settings::DaemonSettings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // The one sanctioned way to stop without waiting for background tasks
    ctrlc::set_handler(|| std::process::exit(0)).context("installing interrupt handler")?;

    let config_dir = paths::config_dir();
    let state_dir = paths::state_dir();
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating {}", config_dir.display()))?;
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating {}", state_dir.display()))?;

    let settings = DaemonSettings::load(&paths::settings_file(&config_dir))
        .context("loading daemon.toml")?;

    let renderer = match LabelRenderer::new(settings.font.as_deref()) {
        Ok(renderer) => Some(Arc::new(renderer)),
        Err(e) => {
            warn!("Key labels disabled: {e:#}");
            None
        }
    };

    let driver = Arc::new(ElgatoDriver::new().context("initializing HID context")?);
    let registry = Arc::new(DeckRegistry::new());
    let ctx = Arc::new(SessionContext {
        config_dir,
        dispatcher: Arc::new(Dispatcher::new(settings.allow_eval)),
        renderer,
        brightness: settings.brightness,
    });

    info!(
        "deckd starting (config: {}, state: {})",
        ctx.config_dir.display(),
        state_dir.display()
    );

    discovery::run(driver, registry, ctx).await;
    Ok(())
}
