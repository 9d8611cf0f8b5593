use super::{format_value, FlushContext, FlushLine, UpdateValue};

/// Last absolute value written. Never resets on flush; a gauge with no
/// updates since the prior flush simply repeats its last value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: Option<f64>,
}

impl Gauge {
    /// Creates a gauge with no value yet recorded.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: None }
    }

    /// Applies an absolute write or a signed delta. A delta against a gauge
    /// with no prior value treats the missing prior as zero (spec.md §4.1).
    pub fn update(&mut self, update: UpdateValue) {
        self.value = Some(match update {
            UpdateValue::Absolute(v) => v,
            UpdateValue::Delta(v) => self.value.unwrap_or(0.0) + v,
        });
    }

    /// Emits `<name> <value> <ts>` for the last recorded value, or nothing
    /// if the gauge has never been updated.
    pub fn flush(&self, name: &str, ctx: &FlushContext) -> Vec<FlushLine> {
        match self.value {
            Some(v) => vec![FlushLine::new(
                name.to_string(),
                format_value(v),
                ctx.timestamp,
            )],
            None => Vec::new(),
        }
    }
}
