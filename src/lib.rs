// deckd - Stream Deck style button-grid daemon
// Device lifecycle, per-deck binding configuration, and action dispatch

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod driver;
pub mod paths;
pub mod registry;
pub mod render;
pub mod session;
pub mod settings;

pub use config::{BindingSpec, ConfigError, KeyBinding, KeyBindingTable};
pub use driver::{
    Deck, DeckDriver, DeckHandle, DeckId, DriverError, Geometry, KeyEvent, KeyImageFormat,
};
pub use registry::DeckRegistry;
pub use session::DeckSession;
pub use settings::DaemonSettings;
