use thiserror::Error;

/// Errors surfaced across the daemon's startup, fatal, and registry paths.
///
/// Per-line parse errors and sink I/O errors never construct one of these:
/// they are isolated locally and expressed as self-metric counters instead
/// (see the wire and sink modules). [`Self::KindConflict`] is recoverable
/// the same way — the processor catches it, bumps `messages_bad`, and moves
/// on (spec.md §7) — but every other variant is fatal: configuration errors
/// and [`Self::Invariant`] violations are meant to reach `main` and
/// terminate the process (spec.md §7, SPEC_FULL.md §9).
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A custom error with a free-form message.
    #[error("Custom error: {0}")]
    Custom(String),

    /// An I/O error from the standard library (socket bind, file read).
    #[error("Std Io error: {0}")]
    StdIo(#[from] std::io::Error),

    /// A malformed or out-of-range configuration value. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An update for an already-registered name arrived tagged with a
    /// different metric kind than the name was first registered under
    /// (spec.md §3/§7). Recoverable: the caller discards the update and
    /// counts it as a bad message, same as a parse failure.
    #[error("kind conflict: {0}")]
    KindConflict(String),

    /// An internal invariant was violated (e.g. a non-finite or non-positive
    /// reservoir priority). Indicates a code defect; fail fast rather than
    /// limp along with corrupted aggregate state. Never constructed from a
    /// recoverable path — callers must propagate this variant, not absorb it.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl MetricsError {
    /// Whether this error is recoverable at the per-update ingest boundary
    /// (spec.md §7) — currently only a kind conflict. Every other variant,
    /// in particular [`Self::Invariant`], must propagate to a fatal exit.
    #[must_use]
    pub const fn is_recoverable_ingest_error(&self) -> bool {
        matches!(self, Self::KindConflict(_))
    }
}

impl From<String> for MetricsError {
    fn from(value: String) -> Self {
        Self::Custom(value)
    }
}

impl From<&str> for MetricsError {
    fn from(value: &str) -> Self {
        Self::Custom(value.to_string())
    }
}

/// Result type used throughout the crate's fatal/startup paths.
pub type MetricResult<T> = Result<T, MetricsError>;
