//! Daemon configuration: built-in defaults, an optional `key = value` file,
//! and CLI flag overrides, in increasing order of precedence.
//!
//! Grounded on `original_source/txstatsd/service.py`'s `StatsdOptions` /
//! `OptionsGlue`: the same option names and defaults (`carbon-cache-host`,
//! `carbon-cache-port`, `listen-port`, `flush-interval`), and the same
//! three-tier precedence (CLI over config file over built-in default). We
//! replace `ConfigParser`'s single `[main]` section with a flatter
//! `key = value` file (`#` comments, blank lines ignored) since there is
//! only ever one section's worth of settings.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{MetricResult, MetricsError};

/// Daemon-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host where the Carbon cache listener lives.
    pub carbon_cache_host: String,
    /// Port where the Carbon cache listener lives.
    pub carbon_cache_port: u16,
    /// UDP port this daemon listens for StatsD lines on.
    pub listen_port: u16,
    /// How often the registry is flushed to the sink.
    pub flush_interval: Duration,
    /// Prefix prepended to self-reported metric names, when non-empty.
    pub instance_name: String,
    /// Percentiles emitted by timers and histograms.
    pub percentiles: Vec<u8>,
    /// Maximum number of samples retained per histogram reservoir.
    pub reservoir_size: usize,
    /// Decay factor for the histogram reservoir.
    pub reservoir_alpha: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            carbon_cache_host: "localhost".to_string(),
            carbon_cache_port: 2003,
            listen_port: 8125,
            flush_interval: Duration::from_secs(10),
            instance_name: String::new(),
            percentiles: vec![90],
            reservoir_size: 1028,
            reservoir_alpha: 0.015,
        }
    }
}

impl Config {
    /// Applies a `--key=value` / `-k value` argument list on top of this
    /// config, returning the merged result. Recognized long names match the
    /// struct field names with `_` replaced by `-`; `-h`/`-p`/`-l`/`-i`
    /// match the original's short flags for host/port/listen-port/interval.
    ///
    /// # Errors
    /// Returns [`MetricsError::Config`] for an unrecognized flag or a value
    /// that fails to parse into its field's type.
    pub fn apply_args(mut self, args: &[String]) -> MetricResult<Self> {
        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            let (key, inline_value) = split_flag(arg)?;
            let value = match inline_value {
                Some(v) => v.to_string(),
                None => iter
                    .next()
                    .cloned()
                    .ok_or_else(|| MetricsError::Config(format!("flag {key} is missing a value")))?,
            };
            self.set(&normalize_key(&key), &value)?;
        }
        Ok(self)
    }

    /// Loads a `key = value` file (one setting per line, `#` starts a
    /// comment, blank lines ignored) and applies it on top of this config.
    ///
    /// # Errors
    /// Returns [`MetricsError::StdIo`] if the file can't be read, or
    /// [`MetricsError::Config`] for an unrecognized key or unparseable value.
    pub fn apply_file(mut self, path: impl AsRef<Path>) -> MetricResult<Self> {
        let contents = fs::read_to_string(path)?;
        for raw_line in contents.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MetricsError::Config(format!("malformed config line: {raw_line:?}")))?;
            self.set(key.trim(), value.trim())?;
        }
        Ok(self)
    }

    fn set(&mut self, key: &str, value: &str) -> MetricResult<()> {
        match key {
            "carbon-cache-host" => self.carbon_cache_host = value.to_string(),
            "carbon-cache-port" => self.carbon_cache_port = parse_field(key, value)?,
            "listen-port" => self.listen_port = parse_field(key, value)?,
            "flush-interval" => {
                // spec.md §6: milliseconds, default 10000 (10s) — not seconds.
                let millis: u64 = parse_field(key, value)?;
                self.flush_interval = Duration::from_millis(millis);
            }
            "instance-name" => self.instance_name = value.to_string(),
            "percentiles" => {
                self.percentiles = value
                    .split(',')
                    .map(str::trim)
                    .map(|p| p.parse::<u8>().map_err(|_| MetricsError::Config(format!("bad percentile: {p:?}"))))
                    .collect::<MetricResult<Vec<u8>>>()?;
            }
            "reservoir-size" => self.reservoir_size = parse_field(key, value)?,
            "reservoir-alpha" => self.reservoir_alpha = parse_field(key, value)?,
            other => return Err(MetricsError::Config(format!("unrecognized setting: {other:?}"))),
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> MetricResult<T> {
    value
        .parse()
        .map_err(|_| MetricsError::Config(format!("invalid value for {key}: {value:?}")))
}

fn normalize_key(key: &str) -> String {
    match key {
        "h" => "carbon-cache-host".to_string(),
        "p" => "carbon-cache-port".to_string(),
        "l" => "listen-port".to_string(),
        "i" => "flush-interval".to_string(),
        "c" | "config" => "config".to_string(),
        other => other.to_string(),
    }
}

/// Splits `--key=value`, `--key`, or `-k` into its key and optional inline
/// value.
fn split_flag(arg: &str) -> MetricResult<(String, Option<&str>)> {
    let stripped = arg
        .strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .ok_or_else(|| MetricsError::Config(format!("expected a flag, got {arg:?}")))?;

    Ok(match stripped.split_once('=') {
        Some((key, value)) => (key.to_string(), Some(value)),
        None => (stripped.to_string(), None),
    })
}
