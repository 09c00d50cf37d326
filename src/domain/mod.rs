pub mod audio;
pub mod config;
pub mod decoding;
pub mod diarization;
pub mod error;
pub mod grammar;
pub mod transcription;

pub use audio::{AudioBuffers, StereoChannels, SAMPLE_RATE};
pub use config::{AppConfig, DecodingDefaults};
pub use decoding::{check_c_text, DecodingConfiguration, DecodingOverrides, SamplingStrategy};
pub use diarization::SpeakerLabel;
pub use error::{DomainError, ErrorClass, IngestError, LoadError, TranscribeError};
pub use grammar::{GrammarError, GrammarRuleSet};
pub use transcription::{Transcript, TranscriptSegment};
