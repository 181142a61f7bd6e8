//! Joining sensor names with sensor readings.
//!
//! BMC sensor tables expose names and readings as two parallel columns: the
//! same OID suffix identifies one sensor in both.

use std::collections::HashMap;

use crate::walker::OidPair;

/// A named sensor reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub name: String,
    pub value: String,
}

impl Sensor {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Normalize a sensor name as reported in the index column.
pub fn normalize_name(raw: &str, replace_spaces: bool) -> String {
    let trimmed = raw.trim();
    if replace_spaces {
        trimmed.replace(' ', "_")
    } else {
        trimmed.to_string()
    }
}

/// Pair each index entry with the reading sharing its suffix.
///
/// Sensors come out in index order. An index entry without a reading is
/// skipped. Duplicate reading suffixes keep the last value.
pub fn join(index_pairs: &[OidPair], reading_pairs: &[OidPair], replace_spaces: bool) -> Vec<Sensor> {
    let readings: HashMap<&str, &str> = reading_pairs
        .iter()
        .map(|p| (p.suffix.as_str(), p.value.as_str()))
        .collect();

    let mut sensors = Vec::with_capacity(index_pairs.len());
    let mut misses = 0usize;

    for entry in index_pairs {
        match readings.get(entry.suffix.as_str()) {
            Some(value) => {
                sensors.push(Sensor::new(normalize_name(&entry.value, replace_spaces), *value));
            }
            None => {
                misses += 1;
                tracing::debug!(
                    suffix = %entry.suffix,
                    sensor = %entry.value.trim(),
                    "No reading for sensor"
                );
            }
        }
    }

    if misses > 0 {
        tracing::warn!(
            joined = sensors.len(),
            missing = misses,
            "Skipped sensors without readings"
        );
    }

    sensors
}

/// Sensors accumulated over several subtree pairs.
///
/// A name seen again keeps its first position and takes the newer value.
#[derive(Debug, Default)]
pub struct SensorSet {
    sensors: Vec<Sensor>,
    positions: HashMap<String, usize>,
}

impl SensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge sensors into the set.
    pub fn extend(&mut self, sensors: impl IntoIterator<Item = Sensor>) {
        for sensor in sensors {
            match self.positions.get(&sensor.name) {
                Some(&pos) => self.sensors[pos].value = sensor.value,
                None => {
                    self.positions.insert(sensor.name.clone(), self.sensors.len());
                    self.sensors.push(sensor);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    pub fn into_vec(self) -> Vec<Sensor> {
        self.sensors
    }
}
