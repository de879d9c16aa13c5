use crate::error::{GenError, Result};
use std::path::Path;

/// Decoded audio. Immutable once produced; shared read-only downstream.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    /// Load audio from a WAV file.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "wav" => Self::load_wav(path),
            ext => Err(GenError::Decode(format!(
                "unsupported audio format: {ext:?}"
            ))),
        }
    }

    fn load_wav(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| GenError::Decode(format!("failed to open WAV file: {e}")))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| GenError::Decode(format!("failed to read WAV sample: {e}")))?,
            hound::SampleFormat::Int => {
                // Normalize to -1.0..1.0 at the source bit depth
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| GenError::Decode(format!("failed to read WAV sample: {e}")))?
            }
        };

        if samples.is_empty() {
            return Err(GenError::Decode("empty audio stream".into()));
        }

        Ok(Waveform {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Convert multi-channel audio to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Audio duration in seconds.
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
        }
    }
}
