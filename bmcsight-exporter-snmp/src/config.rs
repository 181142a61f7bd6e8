//! Configuration for the SNMP exporter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use bmcsight_common::LoggingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] bmcsight_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// SNMP transport settings.
    #[serde(default)]
    pub snmp: SnmpConfig,

    /// Additional device profiles, keyed by device type.
    ///
    /// A key equal to a built-in type ("qct", "supermicro") replaces it.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9116").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for the scrape endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

/// Health check endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Registered device types endpoint.
pub const PROFILES_PATH: &str = "/profiles";

/// Paths the metrics endpoint cannot take.
const RESERVED_PATHS: [&str; 2] = [HEALTH_PATH, PROFILES_PATH];

fn default_listen() -> String {
    "0.0.0.0:9116".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// SNMP protocol version. SNMPv3 is not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "v1")]
    V1,
    #[default]
    #[serde(rename = "v2c")]
    V2c,
}

/// SNMP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpConfig {
    /// Agent port used when the scraped host carries none.
    #[serde(default = "default_port")]
    pub port: u16,

    /// SNMP version ("v1" or "v2c").
    #[serde(default)]
    pub version: SnmpVersion,

    /// Varbinds requested per GETBULK.
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: u32,

    /// Timeout for a single SNMP request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for a whole scrape (seconds).
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
}

fn default_port() -> u16 {
    161
}

fn default_max_repetitions() -> u32 {
    25
}

fn default_request_timeout() -> u64 {
    5
}

fn default_scrape_timeout() -> u64 {
    10
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            version: SnmpVersion::default(),
            max_repetitions: default_max_repetitions(),
            request_timeout_secs: default_request_timeout(),
            scrape_timeout_secs: default_scrape_timeout(),
        }
    }
}

/// What to do with sensors no template recognises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Leave them out of the output.
    #[default]
    Drop,
    /// Emit them as an unlabeled metric named after the sensor.
    Generic,
}

/// A device profile declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Prefix prepended to every metric name.
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,

    /// Number of leading OID components stripped to obtain the sensor key.
    pub suffix_mask: usize,

    /// Replace spaces in sensor names with underscores.
    #[serde(default)]
    pub replace_spaces: bool,

    /// Handling of sensors matching no template.
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,

    /// Name/reading subtree pairs, walked in order.
    pub subtrees: Vec<SubtreeConfig>,

    /// Sensor name templates, evaluated in order.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

pub fn default_metric_prefix() -> String {
    "snmp_".to_string()
}

/// One name/reading subtree pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtreeConfig {
    /// Subtree enumerating sensor names.
    pub index_oid: String,
    /// Subtree enumerating sensor readings.
    pub reading_oid: String,
}

/// A sensor name template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Regular expression searched in the sensor name.
    pub pattern: String,

    /// Label carrying the captured value.
    pub label: String,

    /// Capture group holding the label value: an index or a group name.
    #[serde(default = "default_capture")]
    pub capture: CaptureConfig,

    /// Metric name (without the profile prefix).
    pub metric: String,

    /// A sensor name the template must accept, checked at start-up.
    #[serde(default)]
    pub sample: Option<String>,
}

/// Capture group reference in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureConfig {
    Index(usize),
    Name(String),
}

fn default_capture() -> CaptureConfig {
    CaptureConfig::Index(1)
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = bmcsight_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = bmcsight_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Profile contents (patterns, samples) are checked when the profile
    /// registry is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.http.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.http.path
            )));
        }

        if self.snmp.max_repetitions == 0 {
            return Err(ConfigError::Validation(
                "max_repetitions must be > 0".to_string(),
            ));
        }

        if self.snmp.request_timeout_secs == 0 || self.snmp.scrape_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "SNMP timeouts must be > 0".to_string(),
            ));
        }

        for (name, profile) in &self.profiles {
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "Profile name cannot be empty".to_string(),
                ));
            }
            if profile.subtrees.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Profile '{}' has no subtrees",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcsight_common::LogFormat;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.http.listen, "0.0.0.0:9116");
        assert_eq!(config.http.path, "/metrics");
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.snmp.version, SnmpVersion::V2c);
        assert_eq!(config.snmp.max_repetitions, 25);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            http: { listen: "127.0.0.1:9200", path: "/snmp" },
            snmp: {
                port: 1161,
                version: "v1",
                max_repetitions: 10,
                request_timeout_secs: 2,
                scrape_timeout_secs: 20,
            },
            profiles: {
                dell: {
                    suffix_mask: 12,
                    replace_spaces: true,
                    unmatched: "generic",
                    subtrees: [
                        { index_oid: "1.3.6.1.4.1.674.1.8", reading_oid: "1.3.6.1.4.1.674.1.6" },
                    ],
                    templates: [
                        { pattern: "CPU(\\d+)_Temp", label: "cpu_num", metric: "cpu_temp", sample: "CPU1_Temp" },
                        { pattern: "(?P<fan>FAN\\d+)", label: "fan", capture: "fan", metric: "fan" },
                    ],
                },
            },
            logging: { level: "debug", format: "json" },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.http.listen, "127.0.0.1:9200");
        assert_eq!(config.http.path, "/snmp");
        assert_eq!(config.snmp.port, 1161);
        assert_eq!(config.snmp.version, SnmpVersion::V1);
        assert_eq!(config.snmp.scrape_timeout_secs, 20);
        assert_eq!(config.logging.format, LogFormat::Json);

        let dell = &config.profiles["dell"];
        assert_eq!(dell.metric_prefix, "snmp_");
        assert_eq!(dell.suffix_mask, 12);
        assert!(dell.replace_spaces);
        assert_eq!(dell.unmatched, UnmatchedPolicy::Generic);
        assert_eq!(dell.templates[0].capture, CaptureConfig::Index(1));
        assert_eq!(dell.templates[0].sample.as_deref(), Some("CPU1_Temp"));
        assert_eq!(
            dell.templates[1].capture,
            CaptureConfig::Name("fan".to_string())
        );
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ http: { listen: "not-an-address" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = ExporterConfig::parse(r#"{ http: { path: "metrics" } }"#);
        assert!(result.unwrap_err().to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_health_path_reserved() {
        let result = ExporterConfig::parse(r#"{ http: { path: "/health" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("reserved")));
    }

    #[test]
    fn test_validate_profiles_path_reserved() {
        let result = ExporterConfig::parse(r#"{ http: { path: "/profiles" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("reserved")));
    }

    #[test]
    fn test_validate_zero_repetitions() {
        let result = ExporterConfig::parse(r#"{ snmp: { max_repetitions: 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_profile_without_subtrees() {
        let json = r#"{ profiles: { empty: { suffix_mask: 0, subtrees: [] } } }"#;
        let result = ExporterConfig::parse(json);
        assert!(result.unwrap_err().to_string().contains("no subtrees"));
    }

    #[test]
    fn test_snmpv3_rejected() {
        let result = ExporterConfig::parse(r#"{ snmp: { version: "v3" } }"#);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
