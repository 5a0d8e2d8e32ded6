//! One deck's end-to-end lifecycle.
//!
//! A session owns the opened device, its binding table, a config watcher
//! task, and a key-event reader task. The table and the last-loaded
//! timestamp live behind one mutex: reload holds it across clear+load, so
//! a concurrent dispatch sees exactly the old or the new table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{self, ConfigError, KeyBinding, KeyBindingTable};
use crate::dispatch::Dispatcher;
use crate::driver::{Deck, DeckId, Geometry, KeyEvent, KeyImageFormat};
use crate::paths;
use crate::render::LabelRenderer;

/// How often each session polls its binding file for changes.
const WATCH_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on one blocking key-event read; keeps cancellation prompt.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

struct SessionState {
    table: KeyBindingTable,
    /// Modification time of the file the table was last built from.
    loaded_at: Option<SystemTime>,
}

pub struct DeckSession {
    deck: Arc<dyn Deck>,
    serial: String,
    geometry: Geometry,
    image_format: KeyImageFormat,
    config_path: PathBuf,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    dispatcher: Arc<Dispatcher>,
    renderer: Option<Arc<LabelRenderer>>,
    brightness: u8,
}

impl DeckSession {
    /// Open `deck` and bring it to its configured state: read identity and
    /// geometry, clear the hardware, load the binding file and render its
    /// labels, then start the watcher and reader tasks.
    pub async fn open(
        deck: Arc<dyn Deck>,
        config_dir: &Path,
        dispatcher: Arc<Dispatcher>,
        renderer: Option<Arc<LabelRenderer>>,
        brightness: u8,
    ) -> Result<Arc<Self>> {
        let serial = deck.serial_number().context("reading serial number")?;
        let geometry = deck.geometry();
        let image_format = deck.key_image_format();
        let config_path = paths::binding_file(config_dir, &serial);
        info!(
            "Deck {} is a {}, serial number {} ({} keys, {} columns)",
            deck.id(),
            deck.deck_type(),
            serial,
            geometry.key_count,
            geometry.columns
        );

        let session = Arc::new(Self {
            deck,
            serial,
            geometry,
            image_format,
            config_path,
            state: Mutex::new(SessionState {
                table: KeyBindingTable::default(),
                loaded_at: None,
            }),
            cancel: CancellationToken::new(),
            dispatcher,
            renderer,
            brightness,
        });

        {
            let mut state = session.state.lock().await;
            session.clear(&mut state);
            session.load(&mut state);
        }
        session.spawn_watcher();
        session.spawn_reader();
        Ok(session)
    }

    pub fn deck_id(&self) -> &DeckId {
        self.deck.id()
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn connected(&self) -> bool {
        self.deck.connected()
    }

    /// Stop the watcher and reader tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binding currently mapped to `key`, if any.
    pub async fn binding(&self, key: u8) -> Option<KeyBinding> {
        self.state.lock().await.table.get(key).cloned()
    }

    /// Indices that currently have a binding, in ascending order.
    pub async fn bound_keys(&self) -> Vec<u8> {
        self.state.lock().await.table.iter().map(|(k, _)| k).collect()
    }

    /// Clear then load as one unit, serialized against dispatch.
    pub async fn reload(&self) {
        let mut state = self.state.lock().await;
        self.clear(&mut state);
        self.load(&mut state);
    }

    /// Reset the hardware, blank every key, restore brightness, and empty
    /// the table.
    fn clear(&self, state: &mut SessionState) {
        if let Err(e) = self.deck.reset() {
            warn!("Deck {}: reset failed: {e}", self.serial);
        }
        for key in 0..self.geometry.key_count {
            if let Err(e) = self.deck.clear_key_image(key) {
                debug!("Deck {}: clearing key {key} failed: {e}", self.serial);
            }
        }
        if let Err(e) = self.deck.set_brightness(self.brightness) {
            warn!("Deck {}: setting brightness failed: {e}", self.serial);
        }
        state.table.clear();
    }

    fn load(&self, state: &mut SessionState) {
        match config::load(&self.config_path, self.geometry) {
            Ok(loaded) => {
                state.loaded_at = Some(loaded.modified);
                self.render_labels(&loaded.table);
                state.table = loaded.table;
            }
            Err(ConfigError::NotFound) => {
                state.loaded_at = None;
                warn!(
                    "Deck {} has no configuration file ({})",
                    self.serial,
                    self.config_path.display()
                );
            }
            Err(e) => {
                // Remember the mtime so a broken file is not re-parsed
                // every watcher tick until it actually changes
                state.loaded_at = std::fs::metadata(&self.config_path)
                    .and_then(|m| m.modified())
                    .ok();
                error!(
                    "Deck {}: loading {} failed: {e}",
                    self.serial,
                    self.config_path.display()
                );
            }
        }
    }

    fn render_labels(&self, table: &KeyBindingTable) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        for (key, binding) in table.iter() {
            let image = renderer.render(&binding.label, self.image_format);
            if let Err(e) = self.deck.set_key_image(key, image) {
                warn!(
                    "Deck {}: setting image for key {key} failed: {e}",
                    self.serial
                );
            }
        }
    }

    fn spawn_watcher(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    _ = tokio::time::sleep(WATCH_INTERVAL) => {}
                }

                let modified = std::fs::metadata(&session.config_path)
                    .and_then(|m| m.modified())
                    .ok();
                let loaded_at = session.state.lock().await.loaded_at;
                let changed = match (modified, loaded_at) {
                    (Some(modified), Some(loaded_at)) => modified > loaded_at,
                    // File appeared after a load that found nothing
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if changed {
                    info!(
                        "Configuration file for deck {} changed, reloading it",
                        session.serial
                    );
                    session.reload().await;
                }
            }
            debug!("Deck {}: config watcher stopped", session.serial);
        });
    }

    fn spawn_reader(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if session.cancel.is_cancelled() {
                    break;
                }
                let deck = Arc::clone(&session.deck);
                let events =
                    match tokio::task::spawn_blocking(move || deck.read_key_events(READ_TIMEOUT))
                        .await
                    {
                        Ok(Ok(events)) => events,
                        Ok(Err(e)) => {
                            // Likely an unplug; the discovery loop tears the
                            // session down once connected() goes false
                            debug!("Deck {}: event read failed: {e}", session.serial);
                            tokio::time::sleep(READ_TIMEOUT).await;
                            continue;
                        }
                        Err(e) => {
                            error!("Deck {}: event reader died: {e}", session.serial);
                            break;
                        }
                    };
                for event in events {
                    session.handle_key_event(event).await;
                }
            }
            debug!("Deck {}: key event reader stopped", session.serial);
        });
    }

    /// Dispatch one key transition. Only the press edge fires actions;
    /// releases are just logged.
    async fn handle_key_event(&self, event: KeyEvent) {
        debug!(
            "Deck {} key {} is now {}",
            self.serial,
            event.key,
            if event.pressed { "pressed" } else { "released" }
        );
        if !event.pressed {
            return;
        }
        // The binding is cloned out of the table; actions run without the
        // state lock held
        if let Some(binding) = self.binding(event.key).await {
            self.dispatcher
                .dispatch(&self.serial, event.key, &binding)
                .await;
        }
    }
}
