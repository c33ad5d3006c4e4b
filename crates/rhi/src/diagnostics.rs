//! Driver and validation diagnostics routing.
//!
//! The Vulkan debug messenger hands its messages to a [`DiagnosticSink`]
//! passed in at instance creation instead of a global callback target.

use tracing::{debug, error, info, warn};

/// Severity of a reported diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Receiver for driver and validation messages.
///
/// Called from whichever thread the driver reports on.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str);
}

/// Forwards diagnostics to `tracing` under the `vulkan` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => error!(target: "vulkan", "{message}"),
            Severity::Warning => warn!(target: "vulkan", "{message}"),
            Severity::Info => info!(target: "vulkan", "{message}"),
            Severity::Verbose => debug!(target: "vulkan", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collecting(Mutex<Vec<(Severity, String)>>);

    impl DiagnosticSink for Collecting {
        fn report(&self, severity: Severity, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Verbose);
    }

    #[test]
    fn test_sink_as_trait_object() {
        let sink = Collecting::default();
        let dyn_sink: &dyn DiagnosticSink = &sink;
        dyn_sink.report(Severity::Warning, "layout mismatch");

        let messages = sink.0.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Severity::Warning);
        assert_eq!(messages[0].1, "layout mismatch");
    }

    #[test]
    fn test_tracing_sink_accepts_all_severities() {
        let sink = TracingSink;
        for severity in [
            Severity::Verbose,
            Severity::Info,
            Severity::Warning,
            Severity::Error,
        ] {
            sink.report(severity, "message");
        }
    }
}
