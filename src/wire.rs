//! StatsD line protocol decoding.
//!
//! Grounded on spec.md §4.1 directly; `original_source/txstatsd/service.py`'s
//! `createService` confirms the shape one level up — `StatsDServerProtocol`
//! hands each received datagram to a single `MessageProcessor` — but decoding
//! itself has no line-by-line equivalent in the retrieved source, so each
//! line here decodes independently and one bad line never discards its
//! siblings purely per spec.md's own requirement.

use crate::metric::{MetricKindTag, UpdateValue};

/// One successfully decoded line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    /// Metric name, exactly as received (no prefixing/sanitizing here).
    pub name: String,
    /// The decoded value, already classified absolute vs. delta.
    pub value: UpdateValue,
    /// Which aggregate kind this line targets.
    pub kind: MetricKindTag,
    /// Sample rate, if an `@rate` suffix was present.
    pub sample_rate: Option<f64>,
}

/// Why a single line failed to decode. Carried only for logging; the caller
/// treats every variant identically (count it, drop the line, move on).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// The line had no `:` separator, or the name half was empty.
    #[error("malformed line: {0:?}")]
    Malformed(String),
    /// The `|`-delimited kind token isn't one of `c`, `g`, `ms`, `m`, `h`.
    #[error("unknown kind token: {0:?}")]
    UnknownKind(String),
    /// The value half didn't parse as a finite `f64`.
    #[error("unparseable value: {0:?}")]
    BadValue(String),
    /// The `@rate` suffix didn't parse as a number in `(0, 1]`.
    #[error("unparseable sample rate: {0:?}")]
    BadSampleRate(String),
    /// A signed value (`+n`/`-n`) was given for a kind other than gauge or
    /// counter, where sign carries no meaning (spec.md §4.1).
    #[error("signed value not meaningful for this kind: {0:?}")]
    SignNotMeaningful(String),
}

/// Decodes every line of a received datagram, isolating failures per line.
///
/// Returns the successfully decoded updates and a count of lines that
/// failed to decode (their [`LineError`]s, in order) — never fails the
/// whole batch for one bad line.
#[must_use]
pub fn parse_datagram(datagram: &str) -> (Vec<ParsedUpdate>, Vec<LineError>) {
    let mut updates = Vec::new();
    let mut errors = Vec::new();

    for line in datagram.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(update) => updates.push(update),
            Err(e) => errors.push(e),
        }
    }

    (updates, errors)
}

fn parse_line(line: &str) -> Result<ParsedUpdate, LineError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| LineError::Malformed(line.to_string()))?;

    if name.is_empty() {
        return Err(LineError::Malformed(line.to_string()));
    }

    let mut parts = rest.split('|');
    let value_token = parts.next().ok_or_else(|| LineError::Malformed(line.to_string()))?;

    // Absence of a `|kind` token defaults to counter (spec.md §4.1).
    let kind = match parts.next() {
        None | Some("c") => MetricKindTag::Counter,
        Some("g") => MetricKindTag::Gauge,
        Some("ms") => MetricKindTag::Timer,
        Some("m") => MetricKindTag::Meter,
        Some("h") => MetricKindTag::Histogram,
        Some(other) => return Err(LineError::UnknownKind(other.to_string())),
    };

    let mut sample_rate = None;
    for modifier in parts {
        if let Some(rate_token) = modifier.strip_prefix('@') {
            let rate: f64 = rate_token
                .parse()
                .map_err(|_| LineError::BadSampleRate(rate_token.to_string()))?;
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(LineError::BadSampleRate(rate_token.to_string()));
            }
            sample_rate = Some(rate);
        }
    }

    let is_signed = value_token.starts_with('+') || value_token.starts_with('-');
    let magnitude: f64 = value_token
        .parse()
        .map_err(|_| LineError::BadValue(value_token.to_string()))?;
    if !magnitude.is_finite() {
        return Err(LineError::BadValue(value_token.to_string()));
    }

    let value = match kind {
        MetricKindTag::Gauge if is_signed => UpdateValue::Delta(magnitude),
        MetricKindTag::Gauge | MetricKindTag::Counter => UpdateValue::Absolute(magnitude),
        MetricKindTag::Timer | MetricKindTag::Meter | MetricKindTag::Histogram if is_signed => {
            return Err(LineError::SignNotMeaningful(value_token.to_string()));
        }
        MetricKindTag::Timer | MetricKindTag::Meter | MetricKindTag::Histogram => {
            UpdateValue::Absolute(magnitude)
        }
    };

    if sample_rate.is_some() && kind != MetricKindTag::Counter && kind != MetricKindTag::Timer {
        // Sample rates only make sense where the aggregate divides by them
        // (counter total, timer implied event count); silently accept but
        // ignore elsewhere rather than rejecting the whole line.
    }

    Ok(ParsedUpdate {
        name: name.to_string(),
        value,
        kind,
        sample_rate,
    })
}
