//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `mbus-client` crate.
//!
//! It holds the monotonic clock helpers, the crate's error types and the
//! logging bootstrap shared by the library tests and the `mbus` binary.

pub mod clock;
pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn test_logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }
}
