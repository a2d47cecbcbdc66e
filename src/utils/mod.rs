pub mod logging;

pub use logging::{init, init_log_file, truncate_text};
