//! Audio output backends
//!
//! Tones are handed to an [`AudioOutput`]. The cpal backend forwards them over
//! a channel to the stream callback, which owns the [`Mixer`] and therefore
//! every live voice.

use crate::error::{Error, Result};
use crate::synth::{Mixer, Tone};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::{unbounded, Sender};

/// Audio output trait
pub trait AudioOutput {
    /// Start sounding a tone immediately
    fn start(&self, tone: Tone) -> Result<()>;

    /// Get the device name
    fn name(&self) -> &str;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;
}

/// Output on a cpal device
pub struct CpalOutput {
    /// Sender for tones to the stream callback
    tx: Sender<Tone>,
    /// Device name
    name: String,
    sample_rate: u32,
    /// Keep the stream alive
    _stream: cpal::Stream,
}

impl CpalOutput {
    /// Open an output stream on the named device, or the host default
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        log::debug!("Using audio host: {}", host.id().name());

        let device = match device_name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| Error::AudioUnsupported(e.to_string()))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| {
                    Error::AudioUnsupported(format!("output device {:?} not found", wanted))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioUnsupported("no default output device".to_string()))?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioUnsupported(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let sample_rate = config.sample_rate;
        log::debug!("Audio stream configuration: {:?} ({:?})", config, sample_format);

        let (tx, rx) = unbounded();
        let mixer = Mixer::new(rx, sample_rate as f32);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
            other => {
                return Err(Error::AudioUnsupported(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            tx,
            name,
            sample_rate,
            _stream: stream,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn start(&self, tone: Tone) -> Result<()> {
        self.tx
            .send(tone)
            .map_err(|_| Error::Audio("audio stream stopped".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mixer.fill(data, channels);
            },
            |err| log::error!("An error occurred on the audio stream: {}", err),
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

/// Silent output that only logs (for --mute or when testing)
pub struct NullOutput {
    sample_rate: u32,
}

impl Default for NullOutput {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
        }
    }
}

impl AudioOutput for NullOutput {
    fn start(&self, tone: Tone) -> Result<()> {
        log::debug!("Muted tone: {} {:.2} Hz {}", tone.note, tone.frequency, tone.waveform);
        Ok(())
    }

    fn name(&self) -> &str {
        "muted"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Information about an output device
#[derive(Clone, Debug)]
pub struct OutputDeviceInfo {
    /// Device name (as reported by the system)
    pub name: String,
    /// Maximum supported output channels
    pub max_channels: u16,
    /// Default sample rate, if the device reports one
    pub default_sample_rate: Option<u32>,
    /// Whether this is the default output device
    pub is_default: bool,
}

/// List output devices, default first
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host
        .output_devices()
        .map_err(|e| Error::AudioUnsupported(e.to_string()))?
    {
        let name = match device.name() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let max_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        if max_channels == 0 {
            continue;
        }
        let default_sample_rate = device.default_output_config().ok().map(|c| c.sample_rate());
        let is_default = default_name.as_ref().is_some_and(|d| d == &name);

        devices.push(OutputDeviceInfo {
            name,
            max_channels,
            default_sample_rate,
            is_default,
        });
    }

    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{Note, PitchClass};
    use crate::synth::{Envelope, Waveform};

    #[test]
    fn test_null_output() {
        let output = NullOutput::default();
        let tone = Tone::new(Note::new(PitchClass::A, 0), Waveform::Sine, Envelope::default());
        assert!(output.start(tone).is_ok());
        assert_eq!(output.name(), "muted");
        assert_eq!(output.sample_rate(), 48_000);
    }
}
