//! Device profiles and the registry resolving them by device type.
//!
//! A profile captures everything vendor specific about a BMC: where its sensor
//! tables live, how many OID components to mask off to get the sensor key, and
//! which templates turn sensor names into metrics. Profiles are built and
//! validated once at start-up, then shared read-only between requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{
    CaptureConfig, ProfileConfig, TemplateConfig, UnmatchedPolicy, default_metric_prefix,
};
use crate::error::ProfileError;
use crate::template::{Capture, MetricTemplate};

/// A name column and the reading column paired with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidSubtreePair {
    pub index_oid: String,
    pub reading_oid: String,
}

impl OidSubtreePair {
    pub fn new(index_oid: impl Into<String>, reading_oid: impl Into<String>) -> Self {
        Self {
            index_oid: index_oid.into(),
            reading_oid: reading_oid.into(),
        }
    }
}

/// Collection and classification settings for one device model.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub subtrees: Vec<OidSubtreePair>,
    pub suffix_mask: usize,
    pub templates: Vec<MetricTemplate>,
    pub metric_prefix: String,
    pub replace_spaces: bool,
    pub unmatched: UnmatchedPolicy,
}

impl DeviceProfile {
    /// Create a profile with the default prefix, no space replacement and
    /// unmatched sensors dropped.
    pub fn new(
        name: impl Into<String>,
        subtrees: Vec<OidSubtreePair>,
        suffix_mask: usize,
        templates: Vec<MetricTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            subtrees,
            suffix_mask,
            templates,
            metric_prefix: default_metric_prefix(),
            replace_spaces: false,
            unmatched: UnmatchedPolicy::Drop,
        }
    }

    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    pub fn with_replace_spaces(mut self, replace: bool) -> Self {
        self.replace_spaces = replace;
        self
    }

    pub fn with_unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Check the profile is usable: it walks something and every template
    /// accepts its sample.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.subtrees.is_empty() {
            return Err(ProfileError::NoSubtrees(self.name.clone()));
        }
        self.templates.iter().try_for_each(MetricTemplate::validate)
    }

    /// Build a profile from its configuration entry.
    pub fn from_config(name: &str, config: &ProfileConfig) -> Result<Self, ProfileError> {
        let templates = config
            .templates
            .iter()
            .map(template_from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let subtrees = config
            .subtrees
            .iter()
            .map(|s| OidSubtreePair::new(&s.index_oid, &s.reading_oid))
            .collect();

        Ok(DeviceProfile::new(name, subtrees, config.suffix_mask, templates)
            .with_metric_prefix(&config.metric_prefix)
            .with_replace_spaces(config.replace_spaces)
            .with_unmatched(config.unmatched))
    }
}

fn template_from_config(config: &TemplateConfig) -> Result<MetricTemplate, ProfileError> {
    let capture = match &config.capture {
        CaptureConfig::Index(i) => Capture::Index(*i),
        CaptureConfig::Name(n) => Capture::Named(n.clone()),
    };
    let template = MetricTemplate::new(&config.pattern, &config.label, capture, &config.metric)?;
    Ok(match &config.sample {
        Some(sample) => template.with_sample(sample),
        None => template,
    })
}

/// QCT BMCs: two sensor banks under the QCT enterprise tree.
pub fn qct() -> Result<DeviceProfile, ProfileError> {
    Ok(DeviceProfile::new(
        "qct",
        vec![
            OidSubtreePair::new(
                "1.3.6.1.4.1.7244.1.2.1.3.4.1.3",
                "1.3.6.1.4.1.7244.1.2.1.3.4.1.4",
            ),
            OidSubtreePair::new(
                "1.3.6.1.4.1.7244.1.2.1.3.3.1.3",
                "1.3.6.1.4.1.7244.1.2.1.3.3.1.4",
            ),
        ],
        14,
        vec![
            MetricTemplate::new(r"P(\d{1,3}) Temp", "cpu_num", Capture::Index(1), "cpu_temp")?
                .with_sample("P0 Temp"),
            MetricTemplate::new(
                r"GPU(\d{1,3}).*?TEMP",
                "gpu_num",
                Capture::Index(1),
                "gpu_temp",
            )?
            .with_sample("GPU1_TEMP"),
            MetricTemplate::new(
                r"FAN_SYS(\d{1,3}_\d{1,3}).*",
                "fan_num",
                Capture::Index(1),
                "fan",
            )?
            .with_sample("FAN_SYS0_1"),
        ],
    ))
}

/// Supermicro BMCs: a single sensor table.
pub fn supermicro() -> Result<DeviceProfile, ProfileError> {
    Ok(DeviceProfile::new(
        "supermicro",
        vec![OidSubtreePair::new(
            "1.3.6.1.4.1.21317.1.3.1.13",
            "1.3.6.1.4.1.21317.1.3.1.2",
        )],
        11,
        vec![
            MetricTemplate::new(
                r"CPU(\d{1,3}).*?Temp",
                "cpu_num",
                Capture::Index(1),
                "cpu_temp",
            )?
            .with_sample("CPU1 Temp"),
            MetricTemplate::new(
                r"GPU(\d{1,3}).*?Temp",
                "gpu_num",
                Capture::Index(1),
                "gpu_temp",
            )?
            .with_sample("GPU1 Temp"),
            MetricTemplate::new(r"FAN([\d,A-Z]{1,3}).*", "fan_num", Capture::Index(1), "fan")?
                .with_sample("FANA"),
        ],
    ))
}

/// Device profiles keyed by device type.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<DeviceProfile>>,
}

impl ProfileRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in profiles.
    pub fn builtin() -> Result<Self, ProfileError> {
        let mut registry = Self::new();
        registry.register(qct()?)?;
        registry.register(supermicro()?)?;
        Ok(registry)
    }

    /// Built-in profiles plus those declared in the configuration, the latter
    /// replacing built-ins of the same name.
    pub fn from_config(
        profiles: &BTreeMap<String, ProfileConfig>,
    ) -> Result<Self, ProfileError> {
        let mut registry = Self::builtin()?;
        for (name, config) in profiles {
            registry.register(DeviceProfile::from_config(name, config)?)?;
        }
        Ok(registry)
    }

    /// Validate and add a profile under its name.
    pub fn register(&mut self, profile: DeviceProfile) -> Result<(), ProfileError> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.name) {
            tracing::info!(device_type = %profile.name, "Replacing device profile");
        }
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
        Ok(())
    }

    /// Look up the profile for a device type.
    pub fn resolve(&self, device_type: &str) -> Result<Arc<DeviceProfile>, ProfileError> {
        self.profiles
            .get(device_type)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownDeviceType(device_type.to_string()))
    }

    /// Registered device types, sorted.
    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExporterConfig, SubtreeConfig};
    use crate::sensor::Sensor;
    use crate::template::classify;

    #[test]
    fn test_builtin_profiles() {
        let registry = ProfileRegistry::builtin().unwrap();

        assert_eq!(
            registry.device_types().collect::<Vec<_>>(),
            vec!["qct", "supermicro"]
        );

        let qct = registry.resolve("qct").unwrap();
        assert_eq!(qct.subtrees.len(), 2);
        assert_eq!(qct.suffix_mask, 14);
        assert_eq!(qct.metric_prefix, "snmp_");

        let supermicro = registry.resolve("supermicro").unwrap();
        assert_eq!(supermicro.subtrees.len(), 1);
        assert_eq!(supermicro.suffix_mask, 11);
    }

    #[test]
    fn test_builtin_masks_cover_table_prefix() {
        // Masking strips exactly the column OID, leaving the row index.
        for profile in [qct().unwrap(), supermicro().unwrap()] {
            for pair in &profile.subtrees {
                assert_eq!(pair.index_oid.split('.').count(), profile.suffix_mask);
                assert_eq!(pair.reading_oid.split('.').count(), profile.suffix_mask);
            }
        }
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ProfileRegistry::builtin().unwrap();
        let err = registry.resolve("foo").unwrap_err();
        assert!(matches!(err, ProfileError::UnknownDeviceType(t) if t == "foo"));
    }

    #[test]
    fn test_resolve_is_exact() {
        let registry = ProfileRegistry::builtin().unwrap();
        assert!(registry.resolve("QCT").is_err());
        assert!(registry.resolve(" qct").is_err());
    }

    #[test]
    fn test_supermicro_templates() {
        let profile = supermicro().unwrap();

        let cases = [
            ("CPU1 Temp", Some(("cpu_temp", "cpu_num", "1"))),
            ("CPU2 VRM Temp", Some(("cpu_temp", "cpu_num", "2"))),
            ("GPU4 Temp", Some(("gpu_temp", "gpu_num", "4"))),
            ("FANA", Some(("fan", "fan_num", "A"))),
            ("FAN10", Some(("fan", "fan_num", "10"))),
            ("PSU1 Status", None),
        ];

        for (name, expected) in cases {
            let lines = classify(&Sensor::new(name, "1"), &profile.templates);
            match expected {
                Some((metric, label, value)) => {
                    assert_eq!(lines.len(), 1, "{name}");
                    assert_eq!(lines[0].name, metric);
                    assert_eq!(lines[0].labels[label], value);
                }
                None => assert!(lines.is_empty(), "{name}"),
            }
        }
    }

    #[test]
    fn test_qct_templates() {
        let profile = qct().unwrap();

        let lines = classify(&Sensor::new("P1 Temp", "40"), &profile.templates);
        assert_eq!(lines[0].to_string(), r#"cpu_temp {cpu_num="1"} 40"#);

        let lines = classify(&Sensor::new("GPU3_Inlet_TEMP", "33"), &profile.templates);
        assert_eq!(lines[0].labels["gpu_num"], "3");

        let lines = classify(&Sensor::new("FAN_SYS2_1", "8400"), &profile.templates);
        assert_eq!(lines[0].labels["fan_num"], "2_1");
    }

    #[test]
    fn test_register_rejects_bad_sample() {
        let template = MetricTemplate::new(r"CPU(\d+)", "cpu_num", Capture::Index(1), "cpu")
            .unwrap()
            .with_sample("GPU1");
        let profile = DeviceProfile::new(
            "broken",
            vec![OidSubtreePair::new("1.3.6.1", "1.3.6.2")],
            4,
            vec![template],
        );

        let mut registry = ProfileRegistry::new();
        let err = registry.register(profile).unwrap_err();
        assert!(matches!(err, ProfileError::ExtractionMismatch { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_no_subtrees() {
        let profile = DeviceProfile::new("empty", vec![], 0, vec![]);
        let err = ProfileRegistry::new().register(profile).unwrap_err();
        assert!(matches!(err, ProfileError::NoSubtrees(name) if name == "empty"));
    }

    #[test]
    fn test_registry_from_config() {
        let config = ExporterConfig::parse(
            r#"{
                profiles: {
                    dell: {
                        metric_prefix: "bmc_",
                        suffix_mask: 12,
                        replace_spaces: true,
                        unmatched: "generic",
                        subtrees: [{ index_oid: "1.3.6.1.4.1.674.1.8", reading_oid: "1.3.6.1.4.1.674.1.6" }],
                        templates: [{ pattern: "CPU(\\d+)_Temp", label: "cpu_num", metric: "cpu_temp", sample: "CPU1_Temp" }],
                    },
                },
            }"#,
        )
        .unwrap();

        let registry = ProfileRegistry::from_config(&config.profiles).unwrap();
        assert_eq!(registry.len(), 3);

        let dell = registry.resolve("dell").unwrap();
        assert_eq!(dell.metric_prefix, "bmc_");
        assert!(dell.replace_spaces);
        assert_eq!(dell.unmatched, UnmatchedPolicy::Generic);
        assert_eq!(dell.templates[0].metric_name(), "cpu_temp");
    }

    #[test]
    fn test_config_overrides_builtin() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "qct".to_string(),
            ProfileConfig {
                metric_prefix: "qct_".to_string(),
                suffix_mask: 14,
                replace_spaces: false,
                unmatched: UnmatchedPolicy::Drop,
                subtrees: vec![SubtreeConfig {
                    index_oid: "1.3.6.1.4.1.7244.1.2.1.3.4.1.3".to_string(),
                    reading_oid: "1.3.6.1.4.1.7244.1.2.1.3.4.1.4".to_string(),
                }],
                templates: vec![],
            },
        );

        let registry = ProfileRegistry::from_config(&profiles).unwrap();
        let qct = registry.resolve("qct").unwrap();
        assert_eq!(qct.metric_prefix, "qct_");
        assert_eq!(qct.subtrees.len(), 1);
    }

    #[test]
    fn test_config_bad_template_fails_registration() {
        let config = ExporterConfig::parse(
            r#"{
                profiles: {
                    bad: {
                        suffix_mask: 1,
                        subtrees: [{ index_oid: "1.1", reading_oid: "1.2" }],
                        templates: [{ pattern: "CPU\\d+", label: "cpu_num", metric: "cpu_temp" }],
                    },
                },
            }"#,
        )
        .unwrap();

        let err = ProfileRegistry::from_config(&config.profiles).unwrap_err();
        assert!(matches!(err, ProfileError::MissingCaptureGroup { .. }));
    }
}
