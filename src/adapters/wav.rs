//! Audio ingestion: base64 transport payload → WAV container → PCM buffers.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::domain::{AudioBuffers, IngestError, StereoChannels, SAMPLE_RATE};

/// Decode a base64-encoded WAV payload into audio buffers.
pub fn ingest(payload: &str) -> Result<AudioBuffers, IngestError> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| IngestError::Encoding(e.to_string()))?;

    decode_wav(&bytes)
}

/// Parse WAV bytes into a mono mixdown plus per-channel samples for stereo.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffers, IngestError> {
    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| IngestError::Container(e.to_string()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels != 1 && channels != 2 {
        return Err(IngestError::UnsupportedFormat(format!(
            "{} channels, expected mono or stereo",
            channels
        )));
    }

    if spec.sample_rate != SAMPLE_RATE {
        return Err(IngestError::UnsupportedSampleRate(spec.sample_rate));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(IngestError::UnsupportedFormat(format!(
                    "{}-bit float samples",
                    spec.bits_per_sample
                )));
            }
            reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| IngestError::Container(e.to_string()))?
        }
        SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| IngestError::Container(e.to_string()))?
        }
    };

    if interleaved.is_empty() {
        return Err(IngestError::Empty);
    }

    debug!(
        channels,
        samples = interleaved.len() / channels,
        bits = spec.bits_per_sample,
        "Decoded WAV payload"
    );

    if channels == 1 {
        return AudioBuffers::new(interleaved, None);
    }

    let frames = interleaved.len() / 2;
    let mut mono = Vec::with_capacity(frames);
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(2) {
        mono.push((frame[0] + frame[1]) / 2.0);
        left.push(frame[0]);
        right.push(frame[1]);
    }

    AudioBuffers::new(mono, Some(StereoChannels { left, right }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// Encode interleaved i16 samples as a base64 WAV payload.
    pub(crate) fn wav_payload(samples: &[i16], channels: u16, sample_rate: u32) -> String {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        BASE64.encode(bytes)
    }

    #[test]
    fn test_ingest_mono() {
        let payload = wav_payload(&[0, 16384, -16384, 32767], 1, SAMPLE_RATE);
        let audio = ingest(&payload).unwrap();

        assert_eq!(audio.len(), 4);
        assert!(!audio.is_stereo());
        assert!((audio.mono()[1] - 0.5).abs() < 0.001);
        assert!((audio.mono()[2] + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_ingest_stereo_splits_channels() {
        // Frames: (L=16384, R=0), (L=0, R=-16384)
        let payload = wav_payload(&[16384, 0, 0, -16384], 2, SAMPLE_RATE);
        let audio = ingest(&payload).unwrap();

        assert_eq!(audio.len(), 2);
        assert!((audio.mono()[0] - 0.25).abs() < 0.001);
        assert!((audio.mono()[1] + 0.25).abs() < 0.001);

        let stereo = audio.stereo().unwrap();
        assert!((stereo.left[0] - 0.5).abs() < 0.001);
        assert!((stereo.right[1] + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_ingest_tolerates_line_wrapped_base64() {
        let payload = wav_payload(&[1, 2, 3], 1, SAMPLE_RATE);
        let wrapped: String = payload
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        assert_eq!(ingest(&wrapped).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(ingest("not base64!!"), Err(IngestError::Encoding(_))));
    }

    #[test]
    fn test_invalid_container() {
        let payload = BASE64.encode(b"definitely not a wav file");
        assert!(matches!(ingest(&payload), Err(IngestError::Container(_))));
    }

    #[test]
    fn test_wrong_sample_rate() {
        let payload = wav_payload(&[0, 0], 1, 44_100);
        assert_eq!(
            ingest(&payload).unwrap_err(),
            IngestError::UnsupportedSampleRate(44_100)
        );
    }

    #[test]
    fn test_too_many_channels() {
        let payload = wav_payload(&[0, 0, 0], 3, SAMPLE_RATE);
        assert!(matches!(
            ingest(&payload),
            Err(IngestError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_zero_samples() {
        let payload = wav_payload(&[], 1, SAMPLE_RATE);
        assert_eq!(ingest(&payload).unwrap_err(), IngestError::Empty);
    }
}
