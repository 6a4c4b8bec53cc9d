//! Virtual piano keyboard
//!
//! Maps computer keys to notes and keeps the session selectors (layout, play
//! mode, waveform) together with the highlight state of recently played notes.
//!
//! Two bindings are active at the same time:
//!
//! ```text
//!  Digits (any layout):
//!    1   2   3   4   5   6   7   8   9   0
//!    C   D   E   F   G   A   B   C2  D2  E2
//!
//!  Letters (QWERTY; QWERTZ binds G# to Z instead of Y):
//!      W   E       T   Y   U       O   P
//!      C#  D#      F#  G#  A#      C#2 D#2
//!    A   S   D   F   G   H   J   K   L   ;
//!    C   D   E   F   G   A   B   C2  D2  E2
//! ```

use crate::error::{Error, Result};
use crate::highlight::ActiveNotes;
use crate::notes::{Note, PitchClass, PIANO_KEYS};
use crate::synth::Waveform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Digit keys in keyboard order, bound to the white keys left to right
const DIGIT_KEYS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];

/// Home-row keys bound to the white keys left to right
const WHITE_LETTER_KEYS: [char; 10] = ['a', 's', 'd', 'f', 'g', 'h', 'j', 'k', 'l', ';'];

/// Upper-row keys for black notes shared by both layouts
const BLACK_LETTER_KEYS: [(char, Note); 6] = [
    ('w', Note::new(PitchClass::CSharp, 0)),
    ('e', Note::new(PitchClass::DSharp, 0)),
    ('t', Note::new(PitchClass::FSharp, 0)),
    ('u', Note::new(PitchClass::ASharp, 0)),
    ('o', Note::new(PitchClass::CSharp, 1)),
    ('p', Note::new(PitchClass::DSharp, 1)),
];

/// The one black note whose key depends on the layout
const G_SHARP: Note = Note::new(PitchClass::GSharp, 0);

/// Physical keyboard convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardLayout {
    /// US/UK style, Y on the upper row
    #[default]
    Qwerty,
    /// German style, Z on the upper row
    Qwertz,
}

impl KeyboardLayout {
    /// The other layout
    pub fn toggled(self) -> Self {
        match self {
            KeyboardLayout::Qwerty => KeyboardLayout::Qwertz,
            KeyboardLayout::Qwertz => KeyboardLayout::Qwerty,
        }
    }

    /// Key bound to G# in this layout
    pub fn g_sharp_key(self) -> char {
        match self {
            KeyboardLayout::Qwerty => 'y',
            KeyboardLayout::Qwertz => 'z',
        }
    }
}

impl fmt::Display for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardLayout::Qwerty => f.write_str("qwerty"),
            KeyboardLayout::Qwertz => f.write_str("qwertz"),
        }
    }
}

impl FromStr for KeyboardLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qwerty" | "us" => Ok(KeyboardLayout::Qwerty),
            "qwertz" | "german" | "de" => Ok(KeyboardLayout::Qwertz),
            other => Err(Error::Config(format!("unknown keyboard layout {:?}", other))),
        }
    }
}

/// Which keys are offered on the visual keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// White keys only
    #[default]
    Simple,
    /// White and black keys
    Advanced,
}

impl PlayMode {
    pub fn toggled(self) -> Self {
        match self {
            PlayMode::Simple => PlayMode::Advanced,
            PlayMode::Advanced => PlayMode::Simple,
        }
    }

    /// Whether a note may be shown and clicked in this mode
    pub fn allows(self, note: Note) -> bool {
        match self {
            PlayMode::Simple => !note.is_black(),
            PlayMode::Advanced => true,
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayMode::Simple => f.write_str("simple"),
            PlayMode::Advanced => f.write_str("advanced"),
        }
    }
}

impl FromStr for PlayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(PlayMode::Simple),
            "advanced" => Ok(PlayMode::Advanced),
            other => Err(Error::Config(format!("unknown play mode {:?}", other))),
        }
    }
}

/// A key mapping entry: computer key character -> note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    /// The character representing this key (lowercase)
    pub key_char: char,
    /// The note this key plays
    pub note: Note,
}

impl KeyMapping {
    fn new(key_char: char, note: Note) -> Self {
        Self { key_char, note }
    }
}

/// Digit and letter bindings for one layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    layout: KeyboardLayout,
    /// Digit bindings, identical for every layout
    pub digits: Vec<KeyMapping>,
    /// Letter bindings: white keys on the home row, black keys above
    pub letters: Vec<KeyMapping>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::for_layout(KeyboardLayout::default())
    }
}

impl KeyMap {
    /// Build the bindings for a layout
    pub fn for_layout(layout: KeyboardLayout) -> Self {
        let whites: Vec<Note> = PIANO_KEYS.iter().map(|k| k.white).collect();

        let digits = DIGIT_KEYS
            .iter()
            .zip(&whites)
            .map(|(&c, &note)| KeyMapping::new(c, note))
            .collect();

        let mut letters: Vec<KeyMapping> = WHITE_LETTER_KEYS
            .iter()
            .zip(&whites)
            .map(|(&c, &note)| KeyMapping::new(c, note))
            .collect();
        letters.extend(BLACK_LETTER_KEYS.iter().map(|&(c, note)| KeyMapping::new(c, note)));
        letters.push(KeyMapping::new(layout.g_sharp_key(), G_SHARP));

        Self {
            layout,
            digits,
            letters,
        }
    }

    /// The layout these bindings were built for
    pub fn layout(&self) -> KeyboardLayout {
        self.layout
    }

    /// Look up a key in the digit bindings
    pub fn digit_note(&self, c: char) -> Option<Note> {
        let c = c.to_ascii_lowercase();
        self.digits.iter().find(|m| m.key_char == c).map(|m| m.note)
    }

    /// Look up a key in the letter bindings
    pub fn letter_note(&self, c: char) -> Option<Note> {
        let c = c.to_ascii_lowercase();
        self.letters.iter().find(|m| m.key_char == c).map(|m| m.note)
    }

    /// Resolve a key: digits first, then letters
    pub fn resolve(&self, c: char) -> Option<Note> {
        self.digit_note(c).or_else(|| self.letter_note(c))
    }

    /// Letter key bound to a note
    pub fn letter_for(&self, note: Note) -> Option<char> {
        self.letters.iter().find(|m| m.note == note).map(|m| m.key_char)
    }

    /// Digit key bound to a note
    pub fn digit_for(&self, note: Note) -> Option<char> {
        self.digits.iter().find(|m| m.note == note).map(|m| m.key_char)
    }
}

/// Virtual keyboard state
#[derive(Debug, Clone)]
pub struct VirtualKeyboard {
    /// Bindings for the current layout
    keymap: KeyMap,
    /// Play mode
    mode: PlayMode,
    /// Oscillator shape used for new notes
    waveform: Waveform,
    /// Recently triggered notes
    active: ActiveNotes,
}

impl Default for VirtualKeyboard {
    fn default() -> Self {
        Self::new(KeyboardLayout::default(), PlayMode::default(), Waveform::default())
    }
}

impl VirtualKeyboard {
    /// Create a new virtual keyboard
    pub fn new(layout: KeyboardLayout, mode: PlayMode, waveform: Waveform) -> Self {
        Self {
            keymap: KeyMap::for_layout(layout),
            mode,
            waveform,
            active: ActiveNotes::default(),
        }
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn layout(&self) -> KeyboardLayout {
        self.keymap.layout()
    }

    /// Switch layout, rebuilding the bindings only if it changed
    ///
    /// Returns true if the bindings were rebuilt.
    pub fn set_layout(&mut self, layout: KeyboardLayout) -> bool {
        if self.keymap.layout() == layout {
            return false;
        }
        log::debug!("Keyboard layout changed to {}", layout);
        self.keymap = KeyMap::for_layout(layout);
        true
    }

    /// Flip between QWERTY and QWERTZ
    pub fn toggle_layout(&mut self) -> KeyboardLayout {
        let layout = self.layout().toggled();
        self.set_layout(layout);
        layout
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> PlayMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Advance to the next waveform
    pub fn cycle_waveform(&mut self) -> Waveform {
        self.waveform = self.waveform.next();
        self.waveform
    }

    /// Resolve a key character to a note
    pub fn resolve_key(&self, c: char) -> Option<Note> {
        self.keymap.resolve(c)
    }

    /// Whether a note is offered on the visual keyboard in the current mode
    pub fn is_playable(&self, note: Note) -> bool {
        self.mode.allows(note)
    }

    /// Notes currently shown on the keyboard, left to right
    pub fn visible_notes(&self) -> Vec<Note> {
        PIANO_KEYS
            .iter()
            .flat_map(|k| std::iter::once(k.white).chain(k.black))
            .filter(|n| self.mode.allows(*n))
            .collect()
    }

    /// Highlight a note as of `now`
    pub fn activate(&mut self, note: Note, now: Instant) {
        self.active.activate(note, now);
    }

    /// Check if a note is currently highlighted
    pub fn is_note_active(&self, note: Note) -> bool {
        self.active.contains(note)
    }

    /// Highlighted notes in pitch order
    pub fn active_notes(&self) -> Vec<Note> {
        self.active.notes()
    }

    /// Drop highlights whose window has passed
    pub fn get_expired_notes(&mut self, now: Instant) -> Vec<Note> {
        self.active.expire(now)
    }

    /// Clear every highlight
    pub fn release_all(&mut self) -> Vec<Note> {
        self.active.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{black_notes, white_notes};
    use std::time::Duration;

    fn note(token: &str) -> Note {
        token.parse().unwrap()
    }

    #[test]
    fn test_digit_map_is_layout_independent() {
        let qwerty = KeyMap::for_layout(KeyboardLayout::Qwerty);
        let qwertz = KeyMap::for_layout(KeyboardLayout::Qwertz);

        assert_eq!(qwerty.digits, qwertz.digits);
        assert_eq!(qwerty.digits.len(), 10);
        for c in DIGIT_KEYS {
            assert_eq!(qwerty.digit_note(c), qwertz.digit_note(c));
        }

        let targets: Vec<String> = DIGIT_KEYS
            .iter()
            .map(|&c| qwerty.digit_note(c).unwrap().token())
            .collect();
        assert_eq!(targets, ["C", "D", "E", "F", "G", "A", "B", "C2", "D2", "E2"]);
    }

    #[test]
    fn test_letter_maps_differ_only_in_g_sharp() {
        let qwerty = KeyMap::for_layout(KeyboardLayout::Qwerty);
        let qwertz = KeyMap::for_layout(KeyboardLayout::Qwertz);

        assert_eq!(qwerty.letters.len(), 17);
        assert_eq!(qwertz.letters.len(), 17);

        assert_eq!(qwerty.letter_for(G_SHARP), Some('y'));
        assert_eq!(qwertz.letter_for(G_SHARP), Some('z'));
        assert_eq!(qwerty.letter_note('z'), None);
        assert_eq!(qwertz.letter_note('y'), None);

        let shared: Vec<_> = qwerty.letters.iter().filter(|m| m.note != G_SHARP).collect();
        assert_eq!(shared.len(), 16);
        for mapping in shared {
            assert_eq!(qwertz.letter_note(mapping.key_char), Some(mapping.note));
        }
    }

    #[test]
    fn test_white_letters_match_digits() {
        let keymap = KeyMap::default();
        for (digit, letter) in DIGIT_KEYS.iter().zip(WHITE_LETTER_KEYS) {
            assert_eq!(keymap.digit_note(*digit), keymap.letter_note(letter));
        }
        assert_eq!(keymap.letter_note(';'), Some(note("E2")));
    }

    #[test]
    fn test_black_bindings_cover_range() {
        let keymap = KeyMap::default();
        for n in black_notes() {
            assert!(keymap.letter_for(n).is_some(), "{} has no letter", n);
        }
        for n in white_notes() {
            assert!(keymap.digit_for(n).is_some(), "{} has no digit", n);
        }
        assert_eq!(keymap.letter_note('o'), Some(note("C#2")));
        assert_eq!(keymap.letters.iter().filter(|m| m.note.is_black()).count(), 7);
        assert_eq!(keymap.letters.iter().filter(|m| !m.note.is_black()).count(), 10);
    }

    #[test]
    fn test_case_insensitive() {
        let keymap = KeyMap::default();
        assert_eq!(keymap.resolve('A'), keymap.resolve('a'));
        assert_eq!(keymap.resolve('Y'), Some(G_SHARP));
        assert_eq!(keymap.resolve('W'), Some(note("C#")));
    }

    #[test]
    fn test_resolution_order_and_unknown_keys() {
        let keymap = KeyMap::default();
        assert_eq!(keymap.resolve('1'), Some(note("C")));
        assert_eq!(keymap.resolve('k'), Some(note("C2")));
        assert_eq!(keymap.resolve('x'), None);
        assert_eq!(keymap.resolve(' '), None);
        assert_eq!(keymap.resolve('q'), None);
    }

    #[test]
    fn test_layout_switch_rebuilds_once() {
        let mut keyboard = VirtualKeyboard::default();
        assert_eq!(keyboard.layout(), KeyboardLayout::Qwerty);
        assert!(!keyboard.set_layout(KeyboardLayout::Qwerty));

        assert_eq!(keyboard.toggle_layout(), KeyboardLayout::Qwertz);
        assert_eq!(keyboard.resolve_key('z'), Some(G_SHARP));
        assert_eq!(keyboard.resolve_key('y'), None);
        assert!(!keyboard.set_layout(KeyboardLayout::Qwertz));
    }

    #[test]
    fn test_mode_gating() {
        let mut keyboard = VirtualKeyboard::default();
        assert_eq!(keyboard.mode(), PlayMode::Simple);
        assert_eq!(keyboard.visible_notes().len(), 10);
        assert!(!keyboard.is_playable(G_SHARP));
        assert!(keyboard.is_playable(note("C")));

        // Letter bindings for black keys remain in the table
        assert_eq!(keyboard.resolve_key('y'), Some(G_SHARP));

        keyboard.toggle_mode();
        assert_eq!(keyboard.visible_notes().len(), 17);
        assert!(keyboard.is_playable(G_SHARP));
    }

    #[test]
    fn test_visible_notes_order() {
        let mut keyboard = VirtualKeyboard::default();
        keyboard.set_mode(PlayMode::Advanced);
        let tokens: Vec<String> = keyboard.visible_notes().iter().map(|n| n.token()).collect();
        assert_eq!(&tokens[..4], ["C", "C#", "D", "D#"]);
        assert_eq!(tokens.last().map(String::as_str), Some("E2"));
    }

    #[test]
    fn test_waveform_cycle() {
        let mut keyboard = VirtualKeyboard::default();
        assert_eq!(keyboard.waveform(), Waveform::Sine);
        assert_eq!(keyboard.cycle_waveform(), Waveform::Square);
        assert_eq!(keyboard.cycle_waveform(), Waveform::Sawtooth);
        assert_eq!(keyboard.cycle_waveform(), Waveform::Triangle);
        assert_eq!(keyboard.cycle_waveform(), Waveform::Sine);
    }

    #[test]
    fn test_highlight_lifecycle() {
        let mut keyboard = VirtualKeyboard::default();
        let start = Instant::now();
        keyboard.activate(note("C"), start);
        assert!(keyboard.is_note_active(note("C")));
        assert_eq!(keyboard.get_expired_notes(start + Duration::from_millis(300)), vec![note("C")]);
        assert!(keyboard.active_notes().is_empty());
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("QWERTZ".parse::<KeyboardLayout>().unwrap(), KeyboardLayout::Qwertz);
        assert_eq!("advanced".parse::<PlayMode>().unwrap(), PlayMode::Advanced);
        assert!("dvorak".parse::<KeyboardLayout>().is_err());
        assert_eq!(KeyboardLayout::Qwerty.to_string(), "qwerty");
    }
}
