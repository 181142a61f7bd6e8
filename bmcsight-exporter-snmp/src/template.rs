//! Sensor name templates.
//!
//! A template recognises a family of sensors by name (every `CPUn Temp`, every
//! `FANx`) and turns each into a metric labeled with the part of the name that
//! tells the sensors apart.

use regex::Regex;

use crate::error::ProfileError;
use crate::metric::MetricLine;
use crate::sensor::Sensor;

/// Capture group holding the label value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Index(usize),
    Named(String),
}

impl std::fmt::Display for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capture::Index(i) => write!(f, "{}", i),
            Capture::Named(name) => write!(f, "'{}'", name),
        }
    }
}

/// Classifies sensor names into one metric.
#[derive(Debug, Clone)]
pub struct MetricTemplate {
    pattern: Regex,
    label_name: String,
    capture: Capture,
    metric_name: String,
    sample: Option<String>,
}

impl MetricTemplate {
    /// Compile a template.
    ///
    /// Fails if the pattern is invalid or has no such capture group.
    pub fn new(
        pattern: &str,
        label_name: impl Into<String>,
        capture: Capture,
        metric_name: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        let metric_name = metric_name.into();
        let regex = Regex::new(pattern).map_err(|source| ProfileError::InvalidPattern {
            metric: metric_name.clone(),
            pattern: pattern.to_string(),
            source,
        })?;

        let has_group = match &capture {
            Capture::Index(i) => *i < regex.captures_len(),
            Capture::Named(name) => regex.capture_names().flatten().any(|n| n == name),
        };
        if !has_group {
            return Err(ProfileError::MissingCaptureGroup {
                metric: metric_name,
                pattern: pattern.to_string(),
                capture: capture.to_string(),
            });
        }

        Ok(Self {
            pattern: regex,
            label_name: label_name.into(),
            capture,
            metric_name,
            sample: None,
        })
    }

    /// Attach a sensor name the template must accept.
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    /// Check the template against its sample, if it has one.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let Some(sample) = &self.sample else {
            return Ok(());
        };

        match self.extract(sample) {
            Some(Extraction::Label(_)) => Ok(()),
            _ => Err(ProfileError::ExtractionMismatch {
                metric: self.metric_name.clone(),
                label: self.label_name.clone(),
                sample: sample.clone(),
            }),
        }
    }

    /// Match a sensor name and pull out the label value.
    pub fn extract(&self, name: &str) -> Option<Extraction> {
        let caps = self.pattern.captures(name)?;
        let group = match &self.capture {
            Capture::Index(i) => caps.get(*i),
            Capture::Named(n) => caps.name(n),
        };
        Some(match group {
            Some(m) => Extraction::Label(m.as_str().to_string()),
            None => Extraction::Mismatch,
        })
    }
}

/// Outcome of a template matching a sensor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The label value captured from the name.
    Label(String),
    /// The pattern matched but the capture group did not take part.
    Mismatch,
}

/// Produce one metric line per template matching the sensor, in template order.
pub fn classify(sensor: &Sensor, templates: &[MetricTemplate]) -> Vec<MetricLine> {
    let mut lines = Vec::new();

    for template in templates {
        match template.extract(&sensor.name) {
            Some(Extraction::Label(label_value)) => {
                lines.push(
                    MetricLine::new(&template.metric_name, &sensor.value)
                        .with_label(&template.label_name, label_value),
                );
            }
            Some(Extraction::Mismatch) => {
                tracing::warn!(
                    sensor = %sensor.name,
                    metric = %template.metric_name,
                    capture = %template.capture,
                    "Template matched without capturing a label"
                );
            }
            None => {}
        }
    }

    lines
}
