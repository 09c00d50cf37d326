pub mod config;
pub mod engine;
pub mod transcriber;

pub use config::ConfigStore;
pub use engine::{AlignmentPreset, DeviceOptions, EngineError, InferenceEngine, ModelHandle};
pub use transcriber::{ModelSpec, ModelStatus, TranscribeRequest, Transcriber};
