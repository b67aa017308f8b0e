use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use std::path::Path;
use tracing::info;

/// Sample format descriptor attached to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample (16 for i16 PCM)
    pub bits_per_sample: u16,
}

impl FrameFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }
}

/// Immutable audio payload handed to the session.
///
/// Frames are consumed once by `send_audio`; nothing retains them afterwards.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Format of the samples
    pub format: FrameFormat,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Supplier of captured audio frames.
///
/// Implementations own device capture, mixing, and resampling; the session
/// only pulls frames. Returning `Ok(None)` signals end of input.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// File-backed frame source used by the demo binary and tests.
///
/// Loads the whole WAV up front and serves it in fixed-duration frames;
/// pacing is left to the caller.
pub struct WavFileSource {
    samples: Vec<i16>,
    format: FrameFormat,
    frame_samples: usize,
    cursor: usize,
    elapsed_ms: u64,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, frame_duration_ms: u64) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        info!(
            "WAV source loaded: {} ({} Hz, {} channels, {} samples)",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let frame_samples =
            (spec.sample_rate as u64 * frame_duration_ms / 1000) as usize * spec.channels as usize;

        Ok(Self {
            samples,
            format: FrameFormat::new(spec.sample_rate, spec.channels),
            frame_samples: frame_samples.max(1),
            cursor: 0,
            elapsed_ms: 0,
        })
    }

    /// Duration of one served frame in milliseconds.
    fn frame_duration_ms(&self) -> u64 {
        let per_channel = self.frame_samples as u64 / self.format.channels as u64;
        per_channel * 1000 / self.format.sample_rate as u64
    }
}

#[async_trait]
impl FrameSource for WavFileSource {
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if self.cursor >= self.samples.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.frame_samples).min(self.samples.len());
        let frame = AudioFrame {
            samples: self.samples[self.cursor..end].to_vec(),
            format: self.format,
            timestamp_ms: self.elapsed_ms,
        };

        self.cursor = end;
        self.elapsed_ms += self.frame_duration_ms();

        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
