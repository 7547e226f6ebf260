//! Prometheus text exposition for store snapshots.
//!
//! Rendering is fail-closed: [`render`] validates every metric before any
//! text is produced, and a single bad name, tag, or value rejects the whole
//! document.

use std::fmt;

use regex::Regex;
use tracing::debug;

use crate::error::MetricError;
use crate::models::Reading;
use crate::store::Snapshot;

// ---

const GAUGE: &str = "gauge";

/// A single metric point.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    // ---
    pub name: String,
    pub kind: String,
    /// Rendered in insertion order.
    pub tags: Vec<(String, String)>,
    pub value: String,
}

/// An ordered batch of metrics forming one exposition document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricFile {
    pub metrics: Vec<Metric>,
}

impl Metric {
    // ---
    pub fn gauge(name: &str, tags: Vec<(String, String)>, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            kind: GAUGE.to_string(),
            tags,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        writeln!(f, "# TYPE {} {}", self.name, self.kind)?;
        f.write_str(&self.name)?;
        if !self.tags.is_empty() {
            f.write_str("{")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{key}=\"{value}\"")?;
            }
            f.write_str("}")?;
        }
        writeln!(f, " {}", self.value)?;
        writeln!(f)
    }
}

impl fmt::Display for MetricFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.metrics.iter().try_for_each(|m| write!(f, "{m}"))
    }
}

/// Compiled validation patterns. Built once at startup and shared.
#[derive(Debug, Clone)]
pub struct Validator {
    text: Regex,
    value: Regex,
}

impl Validator {
    // ---
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            text: Regex::new(r"^[A-Za-z0-9_/-]+$")?,
            value: Regex::new(r"^-?[0-9]+(\.[0-9]+)?$")?,
        })
    }

    /// Whether `s` is usable as a metric name, type, or tag key/value.
    pub fn is_valid_text(&self, s: &str) -> bool {
        self.text.is_match(s)
    }

    pub fn validate_metric(&self, m: &Metric) -> Result<(), MetricError> {
        // ---
        if !self.text.is_match(&m.name) {
            return Err(MetricError::InvalidName(m.name.clone()));
        }
        if !self.text.is_match(&m.kind) {
            return Err(MetricError::InvalidType {
                metric: m.name.clone(),
                kind: m.kind.clone(),
            });
        }
        if !self.value.is_match(&m.value) {
            return Err(MetricError::InvalidValue {
                metric: m.name.clone(),
                value: m.value.clone(),
            });
        }
        for (key, value) in &m.tags {
            if !self.text.is_match(key) {
                return Err(MetricError::InvalidTagKey {
                    metric: m.name.clone(),
                    key: key.clone(),
                });
            }
            if !self.text.is_match(value) {
                return Err(MetricError::InvalidTagValue {
                    metric: m.name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn validate(&self, file: &MetricFile) -> Result<(), MetricError> {
        // ---
        file.metrics.iter().try_for_each(|m| {
            self.validate_metric(m).inspect_err(|err| {
                debug!(error = %err, "metric failed validation");
            })
        })
    }
}

fn reading_tags(reading: &Reading) -> Vec<(String, String)> {
    // ---
    let mut tags = vec![
        ("name".to_string(), reading.name.clone()),
        ("id".to_string(), reading.sensor_id.to_string()),
    ];
    if let Some(channel) = &reading.channel {
        tags.push(("channel".to_string(), channel.clone()));
    }
    tags
}

/// Metrics for one fresh reading. Humidity `0` is a real value and still
/// emits the full set.
pub fn reading_metrics(reading: &Reading) -> Vec<Metric> {
    // ---
    let tags = reading_tags(reading);
    vec![
        Metric::gauge(
            "wh31e_last_updated",
            tags.clone(),
            reading.timestamp.timestamp(),
        ),
        Metric::gauge("wh31e_humidity", tags.clone(), reading.humidity),
        Metric::gauge("wh31e_battery", tags.clone(), u8::from(reading.battery_ok)),
        Metric::gauge("wh31e_temperature_c", tags.clone(), reading.temperature_c),
        Metric::gauge("wh31e_temperature_f", tags, reading.temperature_f),
    ]
}

/// Build the metric batch for a snapshot, without validating it.
pub fn metric_file(snapshot: &Snapshot) -> MetricFile {
    // ---
    let mut metrics: Vec<Metric> = snapshot.latest.values().flat_map(reading_metrics).collect();
    metrics.extend(snapshot.counts.iter().map(|(name, count)| {
        Metric::gauge(
            "wh31e_events_last_hour",
            vec![("name".to_string(), name.clone())],
            count,
        )
    }));
    MetricFile { metrics }
}

/// Render a snapshot as an exposition document, or reject it entirely.
pub fn render(snapshot: &Snapshot, validator: &Validator) -> Result<String, MetricError> {
    // ---
    let file = metric_file(snapshot);
    validator.validate(&file)?;
    Ok(file.to_string())
}
