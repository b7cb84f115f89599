//! Utilities for working with panic payloads.
//!
//! Session workers catch panics raised by packet handlers so one faulty
//! session cannot take its worker down. These helpers render the payload for
//! the log line written when that happens.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use sessionframe::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(
///     format_panic(Box::new(String::from("boom"))).to_string(),
///     "boom"
/// );
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Log a panic caught while running a session on `worker` for `peer` and
/// return the rendered payload.
///
/// The event goes to both `log` and `tracing` so either subscriber sees it.
pub(crate) fn log_session_panic(
    panic: Box<dyn Any + Send>,
    worker: usize,
    peer: impl fmt::Display,
) -> String {
    let panic = format_panic(panic).to_string();
    crate::metrics::inc_session_panics();
    log::error!("session task panicked: panic={panic}, worker={worker}, peer={peer}");
    tracing::error!(panic = %panic, worker, peer = %peer, "session task panicked");
    panic
}

#[cfg(test)]
mod tests {
    use std::panic::catch_unwind;

    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn formats_caught_payload() {
        let payload = catch_unwind(|| panic!("handler exploded on {}", 7)).expect_err("panics");
        assert_eq!(format_panic(payload).to_string(), "handler exploded on 7");
    }

    #[test]
    #[traced_test]
    fn session_panic_is_traced_with_fields() {
        let payload = catch_unwind(|| panic!("boom")).expect_err("panics");
        assert_eq!(log_session_panic(payload, 3, "127.0.0.1:9"), "boom");
        logs_assert(|lines: &[&str]| {
            lines
                .iter()
                .find(|line| {
                    line.contains("session task panicked")
                        && line.contains("panic=boom")
                        && line.contains("worker=3")
                })
                .map(|_| ())
                .ok_or_else(|| "panic log not found".to_string())
        });
    }
}
