//! Driver boundary for button-grid devices.
//!
//! The daemon core only sees the [`Deck`] and [`DeckDriver`] traits; the
//! actual wire protocol lives behind them. [`elgato`] adapts the
//! `elgato-streamdeck` crate, [`mock`] is an in-memory backend for the
//! test-suite.

pub mod elgato;
pub mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;

/// Transient device identity assigned at enumeration time.
///
/// Reassigned by the driver layer across reconnects; the durable identity
/// is the serial number read from the opened device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeckId(String);

impl DeckId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key grid reported by an opened deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub key_count: u8,
    /// Keys per row.
    pub columns: u8,
}

/// Pixel dimensions of one key's image raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyImageFormat {
    pub width: u32,
    pub height: u32,
}

/// One key transition reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: u8,
    pub pressed: bool,
}

/// Errors surfaced across the driver boundary.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("HID error: {0}")]
    Hid(String),
}

/// An enumerated, not yet opened deck.
#[derive(Debug, Clone)]
pub struct DeckHandle {
    pub id: DeckId,
    /// Human-readable model name.
    pub deck_type: String,
}

/// An opened deck.
///
/// Methods are short blocking HID calls, except
/// [`read_key_events`](Deck::read_key_events) which blocks up to the given
/// timeout and belongs on a blocking task.
pub trait Deck: Send + Sync {
    fn id(&self) -> &DeckId;

    /// Human-readable model name.
    fn deck_type(&self) -> &str;

    fn serial_number(&self) -> Result<String, DriverError>;

    fn geometry(&self) -> Geometry;

    fn key_image_format(&self) -> KeyImageFormat;

    /// False once the physical device stopped answering.
    fn connected(&self) -> bool;

    fn reset(&self) -> Result<(), DriverError>;

    fn set_brightness(&self, percent: u8) -> Result<(), DriverError>;

    /// Convert `image` to the device-native key encoding and push it.
    fn set_key_image(&self, key: u8, image: DynamicImage) -> Result<(), DriverError>;

    fn clear_key_image(&self, key: u8) -> Result<(), DriverError>;

    /// Wait up to `timeout` for key transitions. An empty vec means the
    /// timeout elapsed without input.
    fn read_key_events(&self, timeout: Duration) -> Result<Vec<KeyEvent>, DriverError>;
}

/// Enumerates attached decks and opens them.
pub trait DeckDriver: Send + Sync {
    /// List currently attached decks. An id stays valid for as long as the
    /// device remains attached.
    fn enumerate(&self) -> Result<Vec<DeckHandle>, DriverError>;

    /// Acquire exclusive use of the device behind `handle`.
    fn open(&self, handle: &DeckHandle) -> Result<Arc<dyn Deck>, DriverError>;
}
