//! Metric lines and their text exposition.
//!
//! A line renders as `name {label="value", ...} value`. The value is passed
//! through exactly as the device reported it.

use std::collections::BTreeMap;
use std::fmt;

/// A single labeled sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLine {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: String,
}

impl MetricLine {
    /// Create an unlabeled line.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value: value.into(),
        }
    }

    /// Add a label to the line.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Prepend `prefix` to the metric name.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.name.insert_str(0, prefix);
        }
        self
    }

    /// Parse a rendered line back into its parts.
    ///
    /// Returns `None` when the line lacks the ` {` / `} ` separators or a
    /// label is malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let (name, rest) = line.split_once(" {")?;
        let (labels_str, value) = rest.rsplit_once("} ")?;

        let mut labels = BTreeMap::new();
        let mut remaining = labels_str.trim();
        while !remaining.is_empty() {
            let (label, after) = remaining.split_once("=\"")?;
            let (raw_value, after) = split_quoted(after)?;
            labels.insert(label.trim().to_string(), unescape_label_value(raw_value));
            remaining = after.trim_start().trim_start_matches(',').trim_start();
        }

        Some(Self {
            name: name.to_string(),
            labels,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, (label, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"{}\"", label, escape_label_value(value))?;
        }
        write!(f, "}} {}", self.value)
    }
}

/// Render lines as a text exposition body, one line each.
pub fn render(lines: &[MetricLine]) -> String {
    let mut output = String::new();
    for line in lines {
        output.push_str(&line.to_string());
        output.push('\n');
    }
    output
}

/// Turn a raw sensor name into a metric name: every character outside
/// `[A-Za-z0-9_:]` becomes an underscore, one for one.
pub fn sanitize_sensor_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Escape a label value per the exposition format.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_label_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => unescaped.push('\n'),
                Some(other) => unescaped.push(other),
                None => unescaped.push('\\'),
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

/// Split at the closing quote of an escaped label value.
fn split_quoted(s: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some((&s[..i], &s[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}
