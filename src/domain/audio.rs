use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::error::IngestError;

/// Sample rate expected by the inference engine, in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Per-channel samples of a two-channel recording.
///
/// Only used for diarization; inference always runs on the mono mixdown.
#[derive(Debug, Clone, Zeroize)]
pub struct StereoChannels {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Decoded request audio, securely zeroed on drop.
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct AudioBuffers {
    /// Mono PCM samples in `[-1.0, 1.0]` at 16kHz. Never empty.
    mono: Vec<f32>,
    /// Separate channels, present only for stereo input.
    stereo: Option<StereoChannels>,
}

impl AudioBuffers {
    /// Create buffers from mono samples and optional stereo channels.
    ///
    /// Returns an error if `mono` is empty.
    pub fn new(mono: Vec<f32>, stereo: Option<StereoChannels>) -> Result<Self, IngestError> {
        if mono.is_empty() {
            return Err(IngestError::Empty);
        }
        Ok(Self { mono, stereo })
    }

    /// Get the mono samples.
    pub fn mono(&self) -> &[f32] {
        &self.mono
    }

    /// Get the per-channel samples, if the input was stereo.
    pub fn stereo(&self) -> Option<&StereoChannels> {
        self.stereo.as_ref()
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo.is_some()
    }

    /// Get the number of mono samples.
    pub fn len(&self) -> usize {
        self.mono.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mono.is_empty()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.mono.len() as f32 / SAMPLE_RATE as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mono_rejected() {
        assert!(matches!(
            AudioBuffers::new(Vec::new(), None),
            Err(IngestError::Empty)
        ));
    }

    #[test]
    fn test_audio_buffers_duration() {
        // 16000 samples = 1 second at 16kHz
        let buffers = AudioBuffers::new(vec![0.0; 16_000], None).unwrap();
        assert!((buffers.duration_secs() - 1.0).abs() < 0.001);
        assert!(!buffers.is_stereo());
    }

    #[test]
    fn test_stereo_channels_accessible() {
        let stereo = StereoChannels {
            left: vec![1.0, 1.0],
            right: vec![0.0, 0.0],
        };
        let buffers = AudioBuffers::new(vec![0.5, 0.5], Some(stereo)).unwrap();
        let channels = buffers.stereo().unwrap();
        assert_eq!(channels.left, vec![1.0, 1.0]);
        assert_eq!(buffers.len(), 2);
    }
}
