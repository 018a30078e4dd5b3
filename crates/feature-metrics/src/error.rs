//! Error types for the feature metrics layer.

use thiserror::Error;

use crate::sink::InstrumentKind;

/// Errors surfaced by instrument registration and updates.
///
/// None of these are caught or suppressed inside this crate. Instrumentation
/// failures are operational signals in their own right; they surface directly
/// to the instrumented feature's calling code, which decides whether to
/// degrade gracefully.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A caller-supplied value is unusable (blank identifier, blank stage,
    /// negative or non-finite increment, malformed timer configuration)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A metric name was re-registered under an incompatible instrument kind
    #[error("Metric `{name}` is already registered as a {existing}, cannot register a {requested}")]
    DuplicateRegistration {
        /// Metric name the registrations collided on
        name: String,
        /// Kind the name is already registered under
        existing: InstrumentKind,
        /// Kind the failing registration asked for
        requested: InstrumentKind,
    },

    /// The backing sink cannot register or report instruments
    #[error("Metric sink unavailable: {0}")]
    SinkUnavailable(String),
}

/// Result type alias using `MetricsError`
pub type Result<T> = std::result::Result<T, MetricsError>;
