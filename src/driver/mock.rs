//! In-memory driver backend used by the test-suite.
//!
//! Lets tests attach and detach decks and inject key transitions without
//! hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::DynamicImage;

use super::{Deck, DeckDriver, DeckHandle, DeckId, DriverError, Geometry, KeyEvent, KeyImageFormat};

/// Driver whose device list is controlled by the test.
#[derive(Default)]
pub struct MockDriver {
    decks: Mutex<Vec<Arc<MockDeck>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, deck: Arc<MockDeck>) {
        self.decks.lock().unwrap().push(deck);
    }

    /// Remove the deck from enumeration and mark it disconnected.
    pub fn detach(&self, id: &DeckId) {
        let mut decks = self.decks.lock().unwrap();
        if let Some(pos) = decks.iter().position(|d| d.id() == id) {
            let deck = decks.remove(pos);
            deck.set_connected(false);
        }
    }
}

impl DeckDriver for MockDriver {
    fn enumerate(&self) -> Result<Vec<DeckHandle>, DriverError> {
        Ok(self
            .decks
            .lock()
            .unwrap()
            .iter()
            .map(|d| DeckHandle {
                id: d.id().clone(),
                deck_type: d.deck_type().to_string(),
            })
            .collect())
    }

    fn open(&self, handle: &DeckHandle) -> Result<Arc<dyn Deck>, DriverError> {
        self.decks
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id() == &handle.id)
            .cloned()
            .map(|d| d as Arc<dyn Deck>)
            .ok_or_else(|| DriverError::DeviceNotFound(handle.id.to_string()))
    }
}

/// A fake deck recording everything the daemon does to it.
pub struct MockDeck {
    id: DeckId,
    serial: String,
    geometry: Geometry,
    format: KeyImageFormat,
    connected: AtomicBool,
    events: Mutex<VecDeque<KeyEvent>>,
    resets: AtomicUsize,
    images: AtomicUsize,
    brightness: Mutex<Option<u8>>,
}

impl MockDeck {
    pub fn new(serial: &str, key_count: u8, columns: u8) -> Arc<Self> {
        Arc::new(Self {
            id: DeckId::new(format!("mock:{serial}")),
            serial: serial.to_string(),
            geometry: Geometry { key_count, columns },
            format: KeyImageFormat {
                width: 72,
                height: 72,
            },
            connected: AtomicBool::new(true),
            events: Mutex::new(VecDeque::new()),
            resets: AtomicUsize::new(0),
            images: AtomicUsize::new(0),
            brightness: Mutex::new(None),
        })
    }

    pub fn press(&self, key: u8) {
        self.events
            .lock()
            .unwrap()
            .push_back(KeyEvent { key, pressed: true });
    }

    pub fn release(&self, key: u8) {
        self.events.lock().unwrap().push_back(KeyEvent {
            key,
            pressed: false,
        });
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of [`Deck::reset`] calls seen so far.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Number of [`Deck::set_key_image`] calls seen so far.
    pub fn image_count(&self) -> usize {
        self.images.load(Ordering::SeqCst)
    }

    pub fn brightness(&self) -> Option<u8> {
        *self.brightness.lock().unwrap()
    }
}

impl Deck for MockDeck {
    fn id(&self) -> &DeckId {
        &self.id
    }

    fn deck_type(&self) -> &str {
        "Mock"
    }

    fn serial_number(&self) -> Result<String, DriverError> {
        Ok(self.serial.clone())
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn key_image_format(&self) -> KeyImageFormat {
        self.format
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reset(&self) -> Result<(), DriverError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_brightness(&self, percent: u8) -> Result<(), DriverError> {
        *self.brightness.lock().unwrap() = Some(percent);
        Ok(())
    }

    fn set_key_image(&self, _key: u8, _image: DynamicImage) -> Result<(), DriverError> {
        self.images.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_key_image(&self, _key: u8) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_key_events(&self, timeout: Duration) -> Result<Vec<KeyEvent>, DriverError> {
        if !self.connected() {
            return Err(DriverError::Disconnected);
        }
        let drained: Vec<KeyEvent> = self.events.lock().unwrap().drain(..).collect();
        if drained.is_empty() {
            // Runs on a blocking task, mirror the real read timeout
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
        }
        Ok(drained)
    }
}
