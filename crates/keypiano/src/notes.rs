//! Note table and frequency resolution
//!
//! The piano covers one and a bit octaves starting at middle C. Notes are
//! written as tokens like `C`, `C#`, `C2` or `C#2/Db2`: a letter name with an
//! optional sharp, an optional `2` marking the octave above, and an optional
//! enharmonic alternative after a `/` that is only used for display.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Base frequencies in Hz for the lowest octave, anchored at middle C
const BASE_FREQUENCIES: [f32; 12] = [
    261.63, // C
    277.18, // C#
    293.66, // D
    311.13, // D#
    329.63, // E
    349.23, // F
    369.99, // F#
    392.00, // G
    415.30, // G#
    440.00, // A
    466.16, // A#
    493.88, // B
];

/// Separator between a token and its enharmonic alternative
pub const ENHARMONIC_SEPARATOR: char = '/';

/// Suffix digit marking a note one octave up
pub const OCTAVE_MARKER: char = '2';

/// Highest octave a token can name (the one carrying the marker)
pub const MAX_OCTAVE: u8 = 1;

/// One of the twelve pitch classes within an octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in ascending order
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitone index from C (0-11)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Frequency of this pitch class in the base octave
    pub fn base_frequency(self) -> f32 {
        BASE_FREQUENCIES[self.index()]
    }

    /// Sharp-based name, e.g. "C#"
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Flat spelling for black keys, e.g. "Db"
    pub fn flat_name(self) -> Option<&'static str> {
        match self {
            PitchClass::CSharp => Some("Db"),
            PitchClass::DSharp => Some("Eb"),
            PitchClass::FSharp => Some("Gb"),
            PitchClass::GSharp => Some("Ab"),
            PitchClass::ASharp => Some("Bb"),
            _ => None,
        }
    }

    /// Whether this pitch class sits on a black key
    pub fn is_black(self) -> bool {
        self.flat_name().is_some()
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

/// A playable note: pitch class plus octave above the base octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pitch: PitchClass,
    octave: u8,
}

impl Note {
    /// Build a note from crate constants; the octave must be 0 or 1
    pub(crate) const fn new(pitch: PitchClass, octave: u8) -> Self {
        assert!(octave <= MAX_OCTAVE, "octave out of range");
        Self { pitch, octave }
    }

    /// Build a note, rejecting octaves no token can name
    pub fn try_new(pitch: PitchClass, octave: u8) -> Result<Self> {
        if octave > MAX_OCTAVE {
            return Err(Error::UnknownNote(format!("{}{}", pitch.name(), u16::from(octave) + 1)));
        }
        Ok(Self { pitch, octave })
    }

    pub fn pitch(&self) -> PitchClass {
        self.pitch
    }

    /// Octave above the base octave (0 or 1)
    pub fn octave(&self) -> u8 {
        self.octave
    }

    /// Parse a note token, ignoring any enharmonic alternative
    pub fn parse(token: &str) -> Result<Self> {
        let primary = token
            .split(ENHARMONIC_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim();

        let mut octave = 0;
        let mut name = String::with_capacity(primary.len());
        for c in primary.chars() {
            match c {
                OCTAVE_MARKER if octave == 0 => octave = 1,
                c if c.is_ascii_digit() => return Err(Error::UnknownNote(token.to_string())),
                c => name.push(c),
            }
        }

        PitchClass::from_name(&name)
            .map(|pitch| Note::new(pitch, octave))
            .ok_or_else(|| Error::UnknownNote(token.to_string()))
    }

    /// Frequency in Hz: base frequency doubled once per octave
    pub fn frequency(&self) -> f32 {
        self.pitch.base_frequency() * (1u32 << self.octave) as f32
    }

    pub fn is_black(&self) -> bool {
        self.pitch.is_black()
    }

    /// Semitones above the base C, used for ordering
    pub fn semitone(&self) -> u16 {
        self.octave as u16 * 12 + self.pitch.index() as u16
    }

    /// Canonical playback token, e.g. "C#2"
    pub fn token(&self) -> String {
        format!("{}{}", self.pitch.name(), octave_suffix(self.octave))
    }

    /// Display label with the enharmonic alternative, e.g. "C#2/Db2"
    pub fn label(&self) -> String {
        match self.pitch.flat_name() {
            Some(flat) => {
                let suffix = octave_suffix(self.octave);
                format!("{}{}{}{}{}", self.pitch.name(), suffix, ENHARMONIC_SEPARATOR, flat, suffix)
            }
            None => self.token(),
        }
    }
}

fn octave_suffix(octave: u8) -> &'static str {
    if octave == 0 {
        ""
    } else {
        "2"
    }
}

impl FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Note::parse(s)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Resolve a note token to its frequency in Hz
///
/// Tokens outside the note universe are rejected with [`Error::UnknownNote`].
pub fn frequency_of(token: &str) -> Result<f32> {
    Ok(Note::parse(token)?.frequency())
}

/// One column of the piano: a white key and the black key to its right
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PianoKey {
    pub white: Note,
    pub black: Option<Note>,
}

const fn key(white: PitchClass, black: Option<PitchClass>, octave: u8) -> PianoKey {
    PianoKey {
        white: Note::new(white, octave),
        black: match black {
            Some(pitch) => Some(Note::new(pitch, octave)),
            None => None,
        },
    }
}

/// The visible piano range, left to right
pub const PIANO_KEYS: [PianoKey; 10] = [
    key(PitchClass::C, Some(PitchClass::CSharp), 0),
    key(PitchClass::D, Some(PitchClass::DSharp), 0),
    key(PitchClass::E, None, 0),
    key(PitchClass::F, Some(PitchClass::FSharp), 0),
    key(PitchClass::G, Some(PitchClass::GSharp), 0),
    key(PitchClass::A, Some(PitchClass::ASharp), 0),
    key(PitchClass::B, None, 0),
    key(PitchClass::C, Some(PitchClass::CSharp), 1),
    key(PitchClass::D, Some(PitchClass::DSharp), 1),
    key(PitchClass::E, None, 1),
];

/// White notes of the piano range in order
pub fn white_notes() -> impl Iterator<Item = Note> {
    PIANO_KEYS.iter().map(|k| k.white)
}

/// Black notes of the piano range in order
pub fn black_notes() -> impl Iterator<Item = Note> {
    PIANO_KEYS.iter().filter_map(|k| k.black)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_key_frequencies() {
        let expected = [
            ("C", 261.63),
            ("D", 293.66),
            ("E", 329.63),
            ("F", 349.23),
            ("G", 392.00),
            ("A", 440.00),
            ("B", 493.88),
        ];
        for (token, hz) in expected {
            assert_eq!(frequency_of(token).unwrap(), hz, "{}", token);
        }

        assert_eq!(frequency_of("C").unwrap(), 261.63);
        assert_eq!(frequency_of("C2").unwrap(), 523.26);
        assert_eq!(frequency_of("D2").unwrap(), frequency_of("D").unwrap() * 2.0);
        assert_eq!(frequency_of("E2").unwrap(), frequency_of("E").unwrap() * 2.0);
    }

    #[test]
    fn test_enharmonic_label_uses_prefix() {
        for note in black_notes() {
            let label = note.label();
            assert!(label.contains('/'), "{}", label);
            assert_eq!(frequency_of(&label).unwrap(), frequency_of(&note.token()).unwrap());
        }
        assert_eq!(frequency_of("C#/Db").unwrap(), frequency_of("C#").unwrap());
        assert_eq!(frequency_of("D#2/Eb2").unwrap(), 311.13 * 2.0);
    }

    #[test]
    fn test_octave_marker_positions() {
        assert_eq!(Note::parse("C#2").unwrap(), Note::new(PitchClass::CSharp, 1));
        assert_eq!(Note::parse("C2#").unwrap(), Note::new(PitchClass::CSharp, 1));
        assert_eq!(Note::parse("C").unwrap(), Note::new(PitchClass::C, 0));
    }

    #[test]
    fn test_unknown_tokens() {
        for token in ["", "H", "Cb", "E#", "C3", "C22", "c#x", "/Db"] {
            assert!(
                matches!(Note::parse(token), Err(Error::UnknownNote(_))),
                "{:?} should be rejected",
                token
            );
        }
    }

    #[test]
    fn test_octave_bounded_to_token_grammar() {
        let note = Note::try_new(PitchClass::D, 1).unwrap();
        assert_eq!(note.octave(), 1);
        assert_eq!(note.pitch(), PitchClass::D);
        assert_eq!(note.token().parse::<Note>().unwrap(), note);

        for octave in [2, 31, 32, u8::MAX] {
            assert!(
                matches!(Note::try_new(PitchClass::C, octave), Err(Error::UnknownNote(_))),
                "octave {} should be rejected",
                octave
            );
        }
    }

    #[test]
    fn test_token_and_label() {
        let note = Note::new(PitchClass::GSharp, 0);
        assert_eq!(note.token(), "G#");
        assert_eq!(note.label(), "G#/Ab");

        let note = Note::new(PitchClass::DSharp, 1);
        assert_eq!(note.token(), "D#2");
        assert_eq!(note.label(), "D#2/Eb2");

        assert_eq!(Note::new(PitchClass::E, 1).label(), "E2");
        assert_eq!(format!("{}", Note::new(PitchClass::C, 1)), "C2");
    }

    #[test]
    fn test_piano_range() {
        let whites: Vec<String> = white_notes().map(|n| n.token()).collect();
        assert_eq!(whites, ["C", "D", "E", "F", "G", "A", "B", "C2", "D2", "E2"]);

        let blacks: Vec<String> = black_notes().map(|n| n.token()).collect();
        assert_eq!(blacks, ["C#", "D#", "F#", "G#", "A#", "C#2", "D#2"]);

        assert!(white_notes().all(|n| !n.is_black()));
        assert!(black_notes().all(|n| n.is_black()));
    }

    #[test]
    fn test_token_parse_roundtrip_over_range() {
        for note in white_notes().chain(black_notes()) {
            assert_eq!(note.token().parse::<Note>().unwrap(), note);
            assert_eq!(note.label().parse::<Note>().unwrap(), note);
        }
    }
}
