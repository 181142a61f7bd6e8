//! One collection-and-classification cycle for a single device.

use std::time::{Duration, Instant};

use crate::config::UnmatchedPolicy;
use crate::error::ScrapeError;
use crate::metric::{MetricLine, sanitize_sensor_metric_name};
use crate::profile::DeviceProfile;
use crate::sensor::{SensorSet, join};
use crate::template::classify;
use crate::walker::{OidPair, OidWalker};

/// Request-scoped scrape inputs.
#[derive(Debug, Clone)]
pub struct ScrapeTarget {
    pub device_type: String,
    pub host: String,
    pub credential: String,
}

impl ScrapeTarget {
    pub fn new(
        device_type: impl Into<String>,
        host: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            host: host.into(),
            credential: credential.into(),
        }
    }
}

/// Lines produced by a scrape, ending with the scrape duration line.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub lines: Vec<MetricLine>,
    pub sensors: usize,
    pub elapsed: Duration,
}

/// Walk every subtree pair of `profile` on the target device, join names with
/// readings and classify the sensors.
///
/// Any walk failure aborts the whole scrape; nothing collected so far is
/// returned.
pub async fn scrape<W: OidWalker>(
    walker: &W,
    profile: &DeviceProfile,
    target: &ScrapeTarget,
) -> Result<ScrapeReport, ScrapeError> {
    let started = Instant::now();
    let mut sensors = SensorSet::new();

    for pair in &profile.subtrees {
        // Readings first: the join needs the whole reading column in hand.
        let readings = walk(walker, profile, target, &pair.reading_oid).await?;
        let index = walk(walker, profile, target, &pair.index_oid).await?;

        let joined = join(&index, &readings, profile.replace_spaces);
        tracing::debug!(
            host = %target.host,
            index_oid = %pair.index_oid,
            names = index.len(),
            readings = readings.len(),
            sensors = joined.len(),
            "Joined sensor table"
        );
        sensors.extend(joined);
    }

    let mut lines = Vec::new();
    for sensor in sensors.iter() {
        let matched = classify(sensor, &profile.templates);
        if matched.is_empty() {
            if profile.unmatched == UnmatchedPolicy::Generic {
                lines.push(MetricLine::new(
                    sanitize_sensor_metric_name(&sensor.name),
                    &sensor.value,
                ));
            }
        } else {
            lines.extend(matched);
        }
    }

    let elapsed = started.elapsed();
    lines.push(
        MetricLine::new("scrape_duration", elapsed.as_secs_f64().to_string())
            .with_label("device_type", &target.device_type)
            .with_label("host", &target.host),
    );

    let lines = lines
        .into_iter()
        .map(|line| line.prefixed(&profile.metric_prefix))
        .collect();

    Ok(ScrapeReport {
        lines,
        sensors: sensors.len(),
        elapsed,
    })
}

async fn walk<W: OidWalker>(
    walker: &W,
    profile: &DeviceProfile,
    target: &ScrapeTarget,
    oid: &str,
) -> Result<Vec<OidPair>, ScrapeError> {
    walker
        .walk(&target.host, &target.credential, oid, profile.suffix_mask)
        .await
        .map_err(|source| ScrapeError::CollectionFailed {
            host: target.host.clone(),
            oid: oid.to_string(),
            source,
        })
}
