mod logging;

pub use logging::{filter_directive, init_logging};
