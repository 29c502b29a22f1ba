// Frame conversion from backend-native format to the session's audio profile

use base64::Engine;

use super::backend::AudioFrame;

/// Convert a frame to the target sample rate and channel count
pub fn process_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != target_channels {
        processed = match target_channels {
            1 => stereo_to_mono(processed),
            2 => mono_to_stereo(processed),
            _ => processed,
        };
    }

    if processed.sample_rate != target_sample_rate {
        processed = resample_nearest(processed, target_sample_rate);
    }

    processed
}

/// Nearest-sample rate conversion
///
/// Good enough for speech heading to a transcription service; no filtering.
pub fn resample_nearest(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || frame.sample_rate == 0 || target_rate == 0 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let source_frames = frame.samples.len() / channels;
    let target_frames =
        (source_frames as u64 * target_rate as u64 / frame.sample_rate as u64) as usize;

    let mut resampled = Vec::with_capacity(target_frames * channels);
    for i in 0..target_frames {
        let source_index = (i as u64 * frame.sample_rate as u64 / target_rate as u64) as usize;
        let start = source_index.min(source_frames.saturating_sub(1)) * channels;
        resampled.extend_from_slice(&frame.samples[start..start + channels]);
    }

    AudioFrame {
        samples: resampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by averaging channels
pub fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame;
    }

    let mono_samples = frame
        .samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

pub fn mono_to_stereo(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 1 {
        return frame;
    }

    let stereo_samples = frame.samples.iter().flat_map(|&s| [s, s]).collect();

    AudioFrame {
        samples: stereo_samples,
        sample_rate: frame.sample_rate,
        channels: 2,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Little-endian PCM bytes
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn encode_pcm(samples: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm_bytes(samples))
}

pub fn decode_pcm(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mono = stereo_to_mono(frame(vec![100, 300, -200, 200], 16000, 2));
        assert_eq!(mono.samples, vec![200, 0]);
        assert_eq!(mono.channels, 1);
    }

    #[test]
    fn test_stereo_to_mono_does_not_overflow() {
        let mono = stereo_to_mono(frame(vec![i16::MAX, i16::MAX], 16000, 2));
        assert_eq!(mono.samples, vec![i16::MAX]);
    }

    #[test]
    fn test_downsample_48k_to_16k_takes_every_third() {
        let samples: Vec<i16> = (0..12).collect();
        let down = resample_nearest(frame(samples, 48000, 1), 16000);
        assert_eq!(down.samples, vec![0, 3, 6, 9]);
        assert_eq!(down.sample_rate, 16000);
    }

    #[test]
    fn test_resample_keeps_channel_pairs_together() {
        let samples = vec![1, -1, 2, -2, 3, -3, 4, -4];
        let down = resample_nearest(frame(samples, 32000, 2), 16000);
        assert_eq!(down.samples, vec![1, -1, 3, -3]);
    }

    #[test]
    fn test_process_frame_to_medium_profile() {
        let samples: Vec<i16> = vec![10; 4800 * 2];
        let processed = process_frame(frame(samples, 48000, 2), 16000, 1);

        assert_eq!(processed.channels, 1);
        assert_eq!(processed.sample_rate, 16000);
        assert_eq!(processed.samples.len(), 1600);
    }

    #[test]
    fn test_mono_upmix_for_stereo_profile() {
        let processed = process_frame(frame(vec![5, 6], 44100, 1), 44100, 2);
        assert_eq!(processed.samples, vec![5, 5, 6, 6]);
    }

    #[test]
    fn test_pcm_encoding_is_little_endian() {
        let encoded = encode_pcm(&[1, -1]);
        assert_eq!(decode_pcm(&encoded).unwrap(), vec![0x01, 0x00, 0xff, 0xff]);
    }
}
