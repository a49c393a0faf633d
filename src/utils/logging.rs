//! Logging setup plus log macros that can be silenced per module.
//!
//! Chatty modules (the sampling path, mostly) declare their own switch and
//! route through these macros instead of calling `log` directly:
//! ```rust
//! const ENABLE_LOGS: bool = true;
//!
//! use stridelog::{log_info, log_warn};
//!
//! log_info!("emitted only while ENABLE_LOGS is true");
//! ```

/// Initializes env_logger once for the process (reads RUST_LOG env var).
/// Safe to call from multiple entry points; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Info line, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn line, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error line, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
