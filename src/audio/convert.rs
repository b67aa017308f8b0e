// Wire-format conversion for outgoing audio.
//
// The provider expects mono 16-bit PCM at 16 kHz. Sources are expected to
// deliver that already; when they do not, this module downmixes stereo and
// decimates integer-ratio sample rates. Formats it cannot reduce pass
// through unchanged (degraded, not an error).

use tracing::warn;

use super::frame::AudioFrame;

/// Sample rate the provider wire format expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Convert a frame to little-endian PCM bytes at the target format.
///
/// Returns the bytes together with their effective sample rate, which is
/// the source rate whenever the fallback passed the audio through.
pub fn to_wire_pcm(frame: &AudioFrame) -> (Vec<u8>, u32) {
    let mono = match frame.format.channels {
        1 => frame.samples.clone(),
        2 => stereo_to_mono(&frame.samples),
        n => {
            warn!("Unsupported channel count {}, passing audio through", n);
            frame.samples.clone()
        }
    };

    let (samples, rate) = downsample(&mono, frame.format.sample_rate, TARGET_SAMPLE_RATE);

    (samples.iter().flat_map(|s| s.to_le_bytes()).collect(), rate)
}

/// Sum left and right channels with clipping.
fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    let mut mono = Vec::with_capacity(samples.len() / 2);

    for chunk in samples.chunks_exact(2) {
        let sum = chunk[0] as i32 + chunk[1] as i32;
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    mono
}

/// Downsample by decimation. Non-integer ratios and upsampling pass through.
fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> (Vec<i16>, u32) {
    if source_rate == target_rate {
        return (samples.to_vec(), target_rate);
    }

    if source_rate < target_rate || source_rate % target_rate != 0 {
        warn!(
            "Cannot decimate {} Hz to {} Hz, passing audio through",
            source_rate, target_rate
        );
        return (samples.to_vec(), source_rate);
    }

    let ratio = (source_rate / target_rate) as usize;
    (
        samples.iter().step_by(ratio).copied().collect(),
        target_rate,
    )
}
