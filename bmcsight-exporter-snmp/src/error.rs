//! Error types for the SNMP exporter.

use thiserror::Error;

/// Errors raised while building or resolving device profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile is registered under the requested device type.
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    /// A template pattern failed to compile.
    #[error("Invalid pattern '{pattern}' for metric '{metric}': {source}")]
    InvalidPattern {
        metric: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The capture group a template extracts its label from does not exist.
    #[error("Pattern '{pattern}' for metric '{metric}' has no capture group {capture}")]
    MissingCaptureGroup {
        metric: String,
        pattern: String,
        capture: String,
    },

    /// A template matched its sample sensor name but yielded no label value,
    /// or did not match it at all.
    #[error("Template for metric '{metric}' cannot extract '{label}' from sample '{sample}'")]
    ExtractionMismatch {
        metric: String,
        label: String,
        sample: String,
    },

    /// A profile declares no OID subtrees to walk.
    #[error("Profile '{0}' declares no OID subtrees")]
    NoSubtrees(String),
}

/// Errors returned by an OID walk.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Network, timeout or session failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The agent answered with a non-zero error-status.
    #[error("agent returned error-status {status} at index {index}")]
    Protocol { status: u32, index: u32 },

    /// The subtree prefix is not a valid OID.
    #[error("invalid OID '{0}'")]
    InvalidOid(String),
}

impl WalkError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Errors that abort a scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Walking one of the device's subtrees failed.
    #[error("Collection from {host} failed on {oid}: {source}")]
    CollectionFailed {
        host: String,
        oid: String,
        #[source]
        source: WalkError,
    },
}
