//! Prometheus exporter for BMC hardware sensors read over SNMP.
//!
//! BMCs publish their sensors as two parallel SNMP table columns: one holding
//! sensor names, one holding readings, rows keyed by the same OID suffix. On
//! every scrape this crate walks both columns, joins them into named sensors
//! and classifies each name with per-vendor templates into labeled metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────┐   ┌────────────────┐   ┌─────────────┐
//! │  HTTP request │──>│   Profile    │──>│  OidWalker x2  │──>│ join +      │
//! │ type/host/... │   │   Registry   │   │ (names, values)│   │ classify    │
//! └───────────────┘   └──────────────┘   └────────────────┘   └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! bmcsight-exporter-snmp --config exporter.json5
//! curl 'http://localhost:9116/metrics?type=supermicro&host=10.0.0.5&secret=public'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod error;
pub mod http;
pub mod metric;
pub mod oid;
pub mod profile;
pub mod scrape;
pub mod sensor;
pub mod template;
pub mod walker;

pub use config::ExporterConfig;
pub use error::{ProfileError, ScrapeError, WalkError};
pub use http::HttpServer;
pub use metric::{MetricLine, render};
pub use profile::{DeviceProfile, OidSubtreePair, ProfileRegistry};
pub use scrape::{ScrapeReport, ScrapeTarget, scrape};
pub use sensor::{Sensor, join};
pub use template::{Capture, MetricTemplate, classify};
pub use walker::{OidPair, OidWalker, SnmpWalker};
