//! Logger setup over the `log` facade (`env_logger` backend).
//!
//! GL errors are reported through the error register, not the log; the log
//! carries diagnostics such as ignored commands and resource churn.

mod init;

pub use init::{init_logging, LoggingConfig};
