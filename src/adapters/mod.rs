pub mod config_store;
#[cfg(test)]
pub(crate) mod scripted_engine;
pub mod wav;
#[cfg(feature = "whisper-cpp")]
pub mod whisper_cpp;

pub use config_store::TomlConfigStore;
#[cfg(feature = "whisper-cpp")]
pub use whisper_cpp::WhisperCppEngine;
