//! keypiano - Terminal virtual piano
//!
//! Play synthesized notes from your computer keyboard or by clicking the keys
//! drawn in the terminal. Features include:
//!
//! - Digit keys and letter rows bound to a ten-key piano starting at middle C
//! - QWERTY and QWERTZ layouts (they differ in the key that plays G#)
//! - Simple (white keys) and advanced (white and black keys) modes
//! - Sine, square, sawtooth and triangle tones with a one second decay
//! - OS-level key detection for reliable auto-repeat suppression
//! - Configurable via TOML file
//!
//! # Usage as a Library
//!
//! ```no_run
//! use keypiano::{InputEvent, InputRouter, ToneSynthesizer, VirtualKeyboard};
//! use std::time::Instant;
//!
//! let keyboard = keypiano::Config::load_or_default().to_virtual_keyboard();
//! let mut router = InputRouter::new(keyboard, ToneSynthesizer::with_device(None));
//!
//! // Lowercase 'a' and uppercase 'A' both play middle C
//! let event = InputEvent::KeyDown { key: 'A', repeat: false };
//! if let Ok(Some(note)) = router.handle(event, Instant::now()) {
//!     println!("Played {} at {:.2} Hz", note, note.frequency());
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod highlight;
pub mod keyboard;
pub mod notes;
pub mod os_keyboard;
pub mod router;
pub mod synth;
pub mod ui;

// Re-export main types
pub use audio::{list_output_devices, AudioOutput, CpalOutput, NullOutput, OutputDeviceInfo};
pub use config::{Config, Theme};
pub use error::{Error, Result};
pub use highlight::{ActiveNotes, HIGHLIGHT_DURATION};
pub use keyboard::{KeyMap, KeyMapping, KeyboardLayout, PlayMode, VirtualKeyboard};
pub use notes::{frequency_of, Note, PitchClass, PIANO_KEYS};
pub use os_keyboard::{
    is_available as os_keyboard_available, FocusTracker, OsKeyPress, OsKeyboardListener,
};
pub use router::{InputEvent, InputRouter};
pub use synth::{Envelope, ToneSynthesizer, Waveform, NOTE_DURATION};
pub use ui::{key_at, render_piano, PianoLayout, Status};
