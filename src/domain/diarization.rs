use std::fmt;

use serde::Serialize;

use crate::domain::audio::SAMPLE_RATE;

/// Channel dominance threshold: one channel must carry this much more energy.
const DOMINANCE_RATIO: f64 = 1.1;

/// Which channel dominates a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeakerLabel {
    /// First (left) channel dominant.
    Channel0,
    /// Second (right) channel dominant.
    Channel1,
    /// Neither channel dominant: silence or overlapping speech.
    Unknown,
}

impl SpeakerLabel {
    /// Bare label: `"0"`, `"1"` or `"?"`.
    pub fn id(&self) -> &'static str {
        match self {
            SpeakerLabel::Channel0 => "0",
            SpeakerLabel::Channel1 => "1",
            SpeakerLabel::Unknown => "?",
        }
    }

    /// Render as a bare id or as a `(speaker N)` annotation.
    pub fn render(&self, id_only: bool) -> String {
        if id_only {
            self.id().to_string()
        } else {
            format!("(speaker {})", self.id())
        }
    }
}

impl fmt::Display for SpeakerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Map an engine timestamp (10ms ticks) to a sample index within `n_samples`.
pub fn timestamp_to_sample(t: i64, n_samples: usize, sample_rate: u32) -> usize {
    if n_samples == 0 {
        return 0;
    }
    let sample = t.saturating_mul(sample_rate as i64) / 100;
    sample.clamp(0, n_samples as i64 - 1) as usize
}

/// Decide the dominant channel from per-channel energies.
pub fn classify_energy(energy0: f64, energy1: f64) -> SpeakerLabel {
    if energy0 > DOMINANCE_RATIO * energy1 {
        SpeakerLabel::Channel0
    } else if energy1 > DOMINANCE_RATIO * energy0 {
        SpeakerLabel::Channel1
    } else {
        SpeakerLabel::Unknown
    }
}

/// Estimate which channel dominates the window `[t0, t1)`.
///
/// Energy is the sum of absolute sample magnitudes. Each call is independent.
pub fn estimate_speaker(left: &[f32], right: &[f32], t0: i64, t1: i64) -> SpeakerLabel {
    let n_samples = left.len().min(right.len());
    if n_samples == 0 {
        return SpeakerLabel::Unknown;
    }

    let is0 = timestamp_to_sample(t0, n_samples, SAMPLE_RATE);
    let is1 = timestamp_to_sample(t1, n_samples, SAMPLE_RATE);

    let (mut energy0, mut energy1) = (0.0f64, 0.0f64);
    for j in is0..is1 {
        energy0 += left[j].abs() as f64;
        energy1 += right[j].abs() as f64;
    }

    classify_energy(energy0, energy1)
}
