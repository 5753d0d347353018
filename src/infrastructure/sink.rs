//! Error sink adapter backed by `tracing`.

use crate::application::ports::{ErrorSink, Severity};

/// Forwards internal failures to the `tracing` subscriber.
///
/// Suitable as the default sink when no external error-reporting service
/// is wired in; hosting applications usually replace it with an adapter
/// for their own sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl TracingErrorSink {
    /// Create a new sink.
    pub fn new() -> Self {
        Self
    }
}

impl ErrorSink for TracingErrorSink {
    fn report(
        &self,
        error: &(dyn std::error::Error + 'static),
        category: &str,
        severity: Severity,
        source: &str,
    ) {
        match severity {
            Severity::Warning => {
                tracing::warn!(error = %error, category, source, "rate limiter internal failure");
            }
            Severity::Error => {
                tracing::error!(error = %error, category, source, "rate limiter internal failure");
            }
        }
    }
}
