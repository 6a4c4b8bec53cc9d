//! Routes key presses and pointer clicks to the synthesizer
//!
//! Every input source (terminal events, the OS listener, mouse clicks, the
//! `play` command) funnels through [`InputRouter::handle`], so repeat
//! suppression, key resolution and highlighting behave the same everywhere.

use crate::error::Result;
use crate::keyboard::VirtualKeyboard;
use crate::notes::Note;
use crate::synth::ToneSynthesizer;
use std::time::Instant;

/// A note request from one of the input sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A computer key went down; `repeat` is set for auto-repeat
    KeyDown { key: char, repeat: bool },
    /// A key on the visual keyboard was clicked
    Pointer(Note),
}

/// Connects the keyboard state to the synthesizer
pub struct InputRouter {
    keyboard: VirtualKeyboard,
    synth: ToneSynthesizer,
    last_error: Option<String>,
}

impl InputRouter {
    pub fn new(keyboard: VirtualKeyboard, synth: ToneSynthesizer) -> Self {
        Self {
            keyboard,
            synth,
            last_error: None,
        }
    }

    pub fn keyboard(&self) -> &VirtualKeyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut VirtualKeyboard {
        &mut self.keyboard
    }

    pub fn synth(&self) -> &ToneSynthesizer {
        &self.synth
    }

    /// The message of the most recent failed trigger, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Handle one input event at `now`
    ///
    /// Returns the note that was played, or None if the event was ignored.
    /// Auto-repeat, unmapped keys and clicks on keys hidden in the current
    /// mode are ignored. A note is only highlighted once the synthesizer
    /// accepted it.
    pub fn handle(&mut self, event: InputEvent, now: Instant) -> Result<Option<Note>> {
        let note = match event {
            InputEvent::KeyDown { repeat: true, .. } => return Ok(None),
            InputEvent::KeyDown { key, .. } => {
                let key = key.to_ascii_lowercase();
                match self.keyboard.resolve_key(key) {
                    Some(note) => note,
                    None => {
                        log::trace!("Ignoring unmapped key {:?}", key);
                        return Ok(None);
                    }
                }
            }
            InputEvent::Pointer(note) => {
                if !self.keyboard.is_playable(note) {
                    return Ok(None);
                }
                note
            }
        };

        if let Err(e) = self.synth.trigger(note, self.keyboard.waveform()) {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        self.last_error = None;
        self.keyboard.activate(note, now);
        Ok(Some(note))
    }

    /// Expire highlights at `now`; returns the notes that went dark
    pub fn tick(&mut self, now: Instant) -> Vec<Note> {
        self.keyboard.get_expired_notes(now)
    }

    /// Release every highlight and close the audio output
    pub fn shutdown(&mut self) {
        self.keyboard.release_all();
        self.synth.close();
    }
}
