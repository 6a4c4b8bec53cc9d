//! Tone synthesis
//!
//! Each trigger produces a [`Tone`]: the frequency, waveform and envelope of
//! one note, fixed at trigger time. The audio thread turns every tone into a
//! single-use [`Voice`] that decays exponentially and stops itself after
//! [`NOTE_DURATION`]. Voices overlap freely; the [`Mixer`] sums them.

use crate::audio::{AudioOutput, CpalOutput, NullOutput};
use crate::error::{Error, Result};
use crate::notes::Note;
use cpal::{FromSample, Sample};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Gain at the start of a note
pub const START_GAIN: f32 = 0.3;

/// Gain the decay ramps toward
pub const FLOOR_GAIN: f32 = 0.001;

/// How long a note sounds before it stops
pub const NOTE_DURATION: Duration = Duration::from_secs(1);

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    /// Human readable name
    pub fn display_name(self) -> &'static str {
        match self {
            Waveform::Sine => "Sine Wave",
            Waveform::Square => "Square Wave",
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Triangle => "Triangle",
        }
    }

    /// The waveform after this one, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|w| *w == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Sample the waveform at a phase in [0, 1)
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    -4.0 + 4.0 * phase
                }
            }
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waveform::Sine => f.write_str("sine"),
            Waveform::Square => f.write_str("square"),
            Waveform::Sawtooth => f.write_str("sawtooth"),
            Waveform::Triangle => f.write_str("triangle"),
        }
    }
}

impl FromStr for Waveform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            other => Err(Error::Config(format!("unknown waveform {:?}", other))),
        }
    }
}

/// Exponential decay from a start gain toward a floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub start: f32,
    pub floor: f32,
    pub duration: Duration,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            start: START_GAIN,
            floor: FLOOR_GAIN,
            duration: NOTE_DURATION,
        }
    }
}

impl Envelope {
    /// Gain `seconds` after the note started
    pub fn gain_at(&self, seconds: f32) -> f32 {
        let total = self.duration.as_secs_f32();
        if total <= 0.0 {
            return self.floor;
        }
        let progress = (seconds / total).clamp(0.0, 1.0);
        self.start * (self.floor / self.start).powf(progress)
    }
}

/// Parameters of one triggered note, latched at trigger time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub note: Note,
    pub frequency: f32,
    pub waveform: Waveform,
    pub envelope: Envelope,
}

impl Tone {
    pub fn new(note: Note, waveform: Waveform, envelope: Envelope) -> Self {
        Self {
            note,
            frequency: note.frequency(),
            waveform,
            envelope,
        }
    }
}

/// A sounding oscillator with its gain envelope
#[derive(Debug, Clone)]
pub struct Voice {
    tone: Tone,
    sample_rate: f32,
    phase: f32,
    position: u64,
    length: u64,
}

impl Voice {
    pub fn new(tone: Tone, sample_rate: f32) -> Self {
        let length = (tone.envelope.duration.as_secs_f64() * sample_rate as f64).round() as u64;
        Self {
            tone,
            sample_rate,
            phase: 0.0,
            position: 0,
            length,
        }
    }

    /// Whether the voice has reached its scheduled stop
    pub fn is_finished(&self) -> bool {
        self.position >= self.length
    }

    /// Produce the next sample, or None once stopped
    pub fn next_sample(&mut self) -> Option<f32> {
        if self.is_finished() {
            return None;
        }
        let seconds = self.position as f32 / self.sample_rate;
        let value = self.tone.waveform.sample(self.phase) * self.tone.envelope.gain_at(seconds);

        self.phase = (self.phase + self.tone.frequency / self.sample_rate) % 1.0;
        self.position += 1;
        Some(value)
    }
}

/// Sums all live voices; owned by the audio thread
pub struct Mixer {
    rx: Receiver<Tone>,
    voices: Vec<Voice>,
    sample_rate: f32,
}

impl Mixer {
    pub fn new(rx: Receiver<Tone>, sample_rate: f32) -> Self {
        Self {
            rx,
            voices: Vec::new(),
            sample_rate,
        }
    }

    /// Start a voice for every tone sent since the last call
    pub fn receive(&mut self) {
        while let Ok(tone) = self.rx.try_recv() {
            self.voices.push(Voice::new(tone, self.sample_rate));
        }
    }

    /// Number of voices still sounding
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Mix one sample from all voices, dropping the ones that stopped
    pub fn next_sample(&mut self) -> f32 {
        let mut sample = 0.0f32;
        for voice in &mut self.voices {
            sample += voice.next_sample().unwrap_or(0.0);
        }
        self.voices.retain(|v| !v.is_finished());
        sample.clamp(-1.0, 1.0)
    }

    /// Fill an interleaved buffer, writing the same sample to every channel
    pub fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        self.receive();
        for frame in data.chunks_mut(channels.max(1)) {
            let value = T::from_sample(self.next_sample());
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }
    }
}

/// Opens the audio output on first use
pub type OutputOpener = Box<dyn FnMut() -> Result<Box<dyn AudioOutput>>>;

/// Plays notes on a lazily opened audio output
pub struct ToneSynthesizer {
    output: Option<Box<dyn AudioOutput>>,
    open_output: OutputOpener,
    envelope: Envelope,
}

impl ToneSynthesizer {
    /// Create a synthesizer that opens its output with `open_output` on the first trigger
    pub fn new<F>(open_output: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn AudioOutput>> + 'static,
    {
        Self {
            output: None,
            open_output: Box::new(open_output),
            envelope: Envelope::default(),
        }
    }

    /// Synthesizer on a cpal output device (None = host default)
    pub fn with_device(device: Option<String>) -> Self {
        Self::new(move || {
            let output = CpalOutput::open(device.as_deref())?;
            Ok(Box::new(output) as Box<dyn AudioOutput>)
        })
    }

    /// Synthesizer that only logs the notes it would play
    pub fn muted() -> Self {
        Self::new(|| Ok(Box::new(NullOutput::default()) as Box<dyn AudioOutput>))
    }

    /// Whether the output has been opened
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    /// Name of the open output
    pub fn output_name(&self) -> Option<&str> {
        self.output.as_ref().map(|o| o.name())
    }

    fn output(&mut self) -> Result<&dyn AudioOutput> {
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let output = (self.open_output)()?;
                log::info!(
                    "Audio output opened: {} ({} Hz)",
                    output.name(),
                    output.sample_rate()
                );
                output
            }
        };
        Ok(&**self.output.insert(output))
    }

    /// Start a note with the given waveform
    ///
    /// Fails if the audio output cannot be opened; the next trigger tries again.
    pub fn trigger(&mut self, note: Note, waveform: Waveform) -> Result<()> {
        let tone = Tone::new(note, waveform, self.envelope);
        log::debug!("Trigger {} at {:.2} Hz ({})", note, tone.frequency, waveform);
        self.output()?.start(tone)
    }

    /// Tear the output down; a later trigger reopens it
    pub fn close(&mut self) {
        if let Some(output) = self.output.take() {
            log::info!("Audio output closed: {}", output.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::PitchClass;
    use crossbeam_channel::unbounded;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const A: Note = Note::new(PitchClass::A, 0);
    const C: Note = Note::new(PitchClass::C, 0);

    /// Output that records the tones it was asked to play
    struct RecordingOutput {
        tones: Rc<RefCell<Vec<Tone>>>,
    }

    impl AudioOutput for RecordingOutput {
        fn start(&self, tone: Tone) -> Result<()> {
            self.tones.borrow_mut().push(tone);
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn recording_synth() -> (ToneSynthesizer, Rc<RefCell<Vec<Tone>>>, Rc<Cell<usize>>) {
        let tones = Rc::new(RefCell::new(Vec::new()));
        let opens = Rc::new(Cell::new(0));
        let (t, o) = (tones.clone(), opens.clone());
        let synth = ToneSynthesizer::new(move || {
            o.set(o.get() + 1);
            Ok(Box::new(RecordingOutput { tones: t.clone() }) as Box<dyn AudioOutput>)
        });
        (synth, tones, opens)
    }

    #[test]
    fn test_waveform_shapes() {
        assert!(Waveform::Sine.sample(0.0).abs() < 1e-6);
        assert!((Waveform::Sine.sample(0.25) - 1.0).abs() < 1e-6);
        assert_eq!(Waveform::Square.sample(0.1), 1.0);
        assert_eq!(Waveform::Square.sample(0.6), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.5), 0.0);
        assert_eq!(Waveform::Triangle.sample(0.25), 1.0);
        assert_eq!(Waveform::Triangle.sample(0.75), -1.0);
    }

    #[test]
    fn test_envelope_decay() {
        let env = Envelope::default();
        assert!((env.gain_at(0.0) - START_GAIN).abs() < 1e-6);
        assert!((env.gain_at(1.0) - FLOOR_GAIN).abs() < 1e-6);
        assert!((env.gain_at(5.0) - FLOOR_GAIN).abs() < 1e-6);

        let mut last = env.gain_at(0.0);
        for step in 1..=10 {
            let gain = env.gain_at(step as f32 / 10.0);
            assert!(gain < last);
            last = gain;
        }
    }

    #[test]
    fn test_voice_stops_after_one_second() {
        let tone = Tone::new(A, Waveform::Sine, Envelope::default());
        let mut voice = Voice::new(tone, 1000.0);

        let samples: Vec<f32> = std::iter::from_fn(|| voice.next_sample()).collect();
        assert_eq!(samples.len(), 1000);
        assert!(voice.is_finished());
        assert!(samples.iter().all(|s| s.abs() <= START_GAIN));
    }

    #[test]
    fn test_mixer_overlapping_voices() {
        let (tx, rx) = unbounded();
        let mut mixer = Mixer::new(rx, 100.0);

        tx.send(Tone::new(C, Waveform::Square, Envelope::default())).unwrap();
        mixer.receive();
        for _ in 0..50 {
            mixer.next_sample();
        }

        // The second note starts while the first is still sounding
        tx.send(Tone::new(A, Waveform::Square, Envelope::default())).unwrap();
        mixer.receive();
        assert_eq!(mixer.active_voices(), 2);

        for _ in 0..50 {
            mixer.next_sample();
        }
        assert_eq!(mixer.active_voices(), 1);

        for _ in 0..50 {
            mixer.next_sample();
        }
        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(mixer.next_sample(), 0.0);
    }

    #[test]
    fn test_mixer_sums_and_clamps() {
        let (tx, rx) = unbounded();
        let mut mixer = Mixer::new(rx, 48_000.0);
        for _ in 0..5 {
            tx.send(Tone::new(C, Waveform::Square, Envelope::default())).unwrap();
        }

        let mut buffer = [0.0f32; 4];
        mixer.fill(&mut buffer, 2);
        // Five square voices at 0.3 sum past full scale
        assert_eq!(buffer, [1.0; 4]);
    }

    #[test]
    fn test_output_opened_once() {
        let (mut synth, tones, opens) = recording_synth();
        assert!(!synth.is_open());

        synth.trigger(C, Waveform::Sine).unwrap();
        synth.trigger(A, Waveform::Sine).unwrap();
        synth.trigger(A, Waveform::Sine).unwrap();

        assert_eq!(opens.get(), 1);
        assert_eq!(tones.borrow().len(), 3);
        assert_eq!(synth.output_name(), Some("recording"));

        synth.close();
        assert!(!synth.is_open());
        synth.trigger(C, Waveform::Sine).unwrap();
        assert_eq!(opens.get(), 2);
    }

    #[test]
    fn test_tone_parameters_latched() {
        let (mut synth, tones, _) = recording_synth();
        synth.trigger(C, Waveform::Sine).unwrap();
        synth.trigger(C, Waveform::Triangle).unwrap();

        let tones = tones.borrow();
        assert_eq!(tones[0].waveform, Waveform::Sine);
        assert_eq!(tones[1].waveform, Waveform::Triangle);
        assert_eq!(tones[0].frequency, 261.63);
        assert_eq!(tones[0].envelope, Envelope::default());
    }

    #[test]
    fn test_unsupported_output_is_reported() {
        let attempts = Rc::new(Cell::new(0));
        let a = attempts.clone();
        let mut synth = ToneSynthesizer::new(move || {
            a.set(a.get() + 1);
            Err(Error::AudioUnsupported("no output device".to_string()))
        });

        assert!(matches!(synth.trigger(C, Waveform::Sine), Err(Error::AudioUnsupported(_))));
        assert!(matches!(synth.trigger(C, Waveform::Sine), Err(Error::AudioUnsupported(_))));
        assert_eq!(attempts.get(), 2);
        assert!(!synth.is_open());
    }

    #[test]
    fn test_waveform_parsing() {
        assert_eq!("Sawtooth".parse::<Waveform>().unwrap(), Waveform::Sawtooth);
        assert_eq!("saw".parse::<Waveform>().unwrap(), Waveform::Sawtooth);
        assert!("noise".parse::<Waveform>().is_err());
        assert_eq!(Waveform::Triangle.to_string(), "triangle");
        assert_eq!(Waveform::Square.display_name(), "Square Wave");
    }
}
