mod controller;
mod registry;
mod service;

pub use controller::AppController;
pub use registry::{ActiveModel, ModelLease, ModelRegistry};
pub use service::TranscriptionService;
