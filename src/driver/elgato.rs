//! `elgato-streamdeck` backend for the driver boundary.
//!
//! The crate speaks the USB wire protocol and converts rasters to the
//! device-native key encoding; this adapter only translates between its
//! surface and the daemon's [`Deck`]/[`DeckDriver`] traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use elgato_streamdeck::info::Kind;
use elgato_streamdeck::{list_devices, new_hidapi, StreamDeck, StreamDeckInput};
use hidapi::HidApi;
use image::DynamicImage;
use tracing::debug;

use super::{Deck, DeckDriver, DeckHandle, DeckId, DriverError, Geometry, KeyEvent, KeyImageFormat};

/// Driver over a shared HID context.
pub struct ElgatoDriver {
    hidapi: Mutex<HidApi>,
    /// Enumeration details needed to open a handle later.
    seen: Mutex<HashMap<DeckId, (Kind, String)>>,
}

impl ElgatoDriver {
    pub fn new() -> Result<Self, DriverError> {
        let hidapi = new_hidapi().map_err(|e| DriverError::Hid(e.to_string()))?;
        Ok(Self {
            hidapi: Mutex::new(hidapi),
            seen: Mutex::new(HashMap::new()),
        })
    }
}

impl DeckDriver for ElgatoDriver {
    fn enumerate(&self) -> Result<Vec<DeckHandle>, DriverError> {
        let mut api = self.hidapi.lock().unwrap();
        api.refresh_devices()
            .map_err(|e| DriverError::Hid(e.to_string()))?;

        let mut seen = self.seen.lock().unwrap();
        let mut handles = Vec::new();
        for (kind, serial) in list_devices(&api) {
            let id = DeckId::new(format!("{kind:?}:{serial}"));
            seen.insert(id.clone(), (kind, serial));
            handles.push(DeckHandle {
                id,
                deck_type: format!("{kind:?}"),
            });
        }
        Ok(handles)
    }

    fn open(&self, handle: &DeckHandle) -> Result<Arc<dyn Deck>, DriverError> {
        let (kind, serial) = self
            .seen
            .lock()
            .unwrap()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| DriverError::DeviceNotFound(handle.id.to_string()))?;

        let api = self.hidapi.lock().unwrap();
        let device = StreamDeck::connect(&api, kind, &serial)
            .map_err(|e| DriverError::Hid(e.to_string()))?;
        debug!("Opened {:?} {}", kind, serial);

        Ok(Arc::new(ElgatoDeck {
            id: handle.id.clone(),
            deck_type: handle.deck_type.clone(),
            kind,
            device: Mutex::new(device),
            buttons: Mutex::new(vec![false; kind.key_count() as usize]),
            alive: AtomicBool::new(true),
        }))
    }
}

struct ElgatoDeck {
    id: DeckId,
    deck_type: String,
    kind: Kind,
    device: Mutex<StreamDeck>,
    /// Last reported button state, diffed into per-key transitions.
    buttons: Mutex<Vec<bool>>,
    alive: AtomicBool,
}

impl Deck for ElgatoDeck {
    fn id(&self) -> &DeckId {
        &self.id
    }

    fn deck_type(&self) -> &str {
        &self.deck_type
    }

    fn serial_number(&self) -> Result<String, DriverError> {
        self.device
            .lock()
            .unwrap()
            .serial_number()
            .map_err(|e| DriverError::Hid(e.to_string()))
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            key_count: self.kind.key_count(),
            columns: self.kind.column_count(),
        }
    }

    fn key_image_format(&self) -> KeyImageFormat {
        let (width, height) = self.kind.key_image_format().size;
        KeyImageFormat {
            width: width as u32,
            height: height as u32,
        }
    }

    fn connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn reset(&self) -> Result<(), DriverError> {
        self.device
            .lock()
            .unwrap()
            .reset()
            .map_err(|e| DriverError::Hid(e.to_string()))
    }

    fn set_brightness(&self, percent: u8) -> Result<(), DriverError> {
        self.device
            .lock()
            .unwrap()
            .set_brightness(percent)
            .map_err(|e| DriverError::Hid(e.to_string()))
    }

    fn set_key_image(&self, key: u8, image: DynamicImage) -> Result<(), DriverError> {
        self.device
            .lock()
            .unwrap()
            .set_button_image(key, image)
            .map_err(|e| DriverError::Hid(e.to_string()))
    }

    fn clear_key_image(&self, key: u8) -> Result<(), DriverError> {
        self.device
            .lock()
            .unwrap()
            .clear_button_image(key)
            .map_err(|e| DriverError::Hid(e.to_string()))
    }

    fn read_key_events(&self, timeout: Duration) -> Result<Vec<KeyEvent>, DriverError> {
        let input = self.device.lock().unwrap().read_input(Some(timeout));
        let input = match input {
            Ok(input) => input,
            Err(e) => {
                // An unplugged device surfaces as a read error
                self.alive.store(false, Ordering::SeqCst);
                return Err(DriverError::Hid(e.to_string()));
            }
        };

        let mut events = Vec::new();
        if let StreamDeckInput::ButtonStateChange(states) = input {
            let mut prev = self.buttons.lock().unwrap();
            for (key, &pressed) in states.iter().enumerate() {
                if prev.get(key).copied() != Some(pressed) {
                    events.push(KeyEvent {
                        key: key as u8,
                        pressed,
                    });
                }
            }
            *prev = states;
        }
        Ok(events)
    }
}
