//! OID subtree walking.
//!
//! [`OidWalker`] is the seam between the scrape logic and the network:
//! [`SnmpWalker`] talks to real agents, tests plug in canned walkers.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use snmp2::{AsyncSession, Oid, Value};
use tokio::time::timeout;

use crate::config::{SnmpConfig, SnmpVersion};
use crate::error::WalkError;
use crate::oid::{mask_suffix, oid_starts_with, oid_to_string, parse_oid};

/// One entry of a walked subtree: the masked OID suffix and the value text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidPair {
    pub suffix: String,
    pub value: String,
}

impl OidPair {
    pub fn new(suffix: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            value: value.into(),
        }
    }
}

/// Enumerates an OID subtree on a device.
pub trait OidWalker: Send + Sync {
    /// Walk every OID under `oid_prefix` on `host`, returning entries in agent
    /// order with the first `mask` OID components stripped.
    fn walk(
        &self,
        host: &str,
        credential: &str,
        oid_prefix: &str,
        mask: usize,
    ) -> impl Future<Output = Result<Vec<OidPair>, WalkError>> + Send;
}

/// Walks subtrees with SNMP v1 (GETNEXT) or v2c (GETBULK).
#[derive(Debug, Clone)]
pub struct SnmpWalker {
    port: u16,
    version: SnmpVersion,
    max_repetitions: u32,
    request_timeout: Duration,
}

impl SnmpWalker {
    /// Create a walker from the SNMP section of the configuration.
    pub fn new(config: &SnmpConfig) -> Self {
        Self {
            port: config.port,
            version: config.version,
            max_repetitions: config.max_repetitions,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Resolve the agent address, adding the default port when absent.
    fn target_addr(&self, host: &str) -> String {
        if host.parse::<SocketAddr>().is_ok() {
            return host.to_string();
        }
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            Ok(IpAddr::V4(ip)) => format!("{}:{}", ip, self.port),
            Err(_) => match host.rsplit_once(':') {
                Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
                _ => format!("{}:{}", host, self.port),
            },
        }
    }

    /// Create an SNMP session for one walk.
    async fn create_session(&self, host: &str, community: &str) -> Result<AsyncSession, WalkError> {
        let addr = self.target_addr(host);
        let community = community.as_bytes();

        let session = match self.version {
            SnmpVersion::V1 => AsyncSession::new_v1(&addr, community, 0).await,
            SnmpVersion::V2c => AsyncSession::new_v2c(&addr, community, 0).await,
        };

        session.map_err(|e| WalkError::transport(format!("failed to open session to {addr}: {e}")))
    }

    /// Walk with GETBULK, `max_repetitions` varbinds per round trip.
    async fn walk_bulk(
        &self,
        session: &mut AsyncSession,
        subtree: &Oid<'static>,
    ) -> Result<Vec<(String, String)>, WalkError> {
        let mut results = Vec::new();
        let mut current = subtree.clone();

        loop {
            let response = timeout(
                self.request_timeout,
                session.getbulk(&[&current], 0, self.max_repetitions),
            )
            .await
            .map_err(|_| WalkError::transport("SNMP GETBULK timeout"))?
            .map_err(|e| WalkError::transport(format!("SNMP GETBULK error: {e}")))?;

            if !check_error_status(self.version, response.error_status, response.error_index)? {
                break;
            }

            match collect_varbinds(subtree, &current, response.varbinds, &mut results) {
                WalkStep::Next(next) => current = next,
                WalkStep::Done => break,
            }
        }

        Ok(results)
    }

    /// Walk with GETNEXT, one varbind per round trip.
    async fn walk_next(
        &self,
        session: &mut AsyncSession,
        subtree: &Oid<'static>,
    ) -> Result<Vec<(String, String)>, WalkError> {
        let mut results = Vec::new();
        let mut current = subtree.clone();

        loop {
            let response = timeout(self.request_timeout, session.getnext(&current))
                .await
                .map_err(|_| WalkError::transport("SNMP GETNEXT timeout"))?
                .map_err(|e| WalkError::transport(format!("SNMP GETNEXT error: {e}")))?;

            if !check_error_status(self.version, response.error_status, response.error_index)? {
                break;
            }

            match collect_varbinds(subtree, &current, response.varbinds, &mut results) {
                WalkStep::Next(next) => current = next,
                WalkStep::Done => break,
            }
        }

        Ok(results)
    }
}

impl OidWalker for SnmpWalker {
    async fn walk(
        &self,
        host: &str,
        credential: &str,
        oid_prefix: &str,
        mask: usize,
    ) -> Result<Vec<OidPair>, WalkError> {
        let subtree = parse_oid(oid_prefix)?;
        let mut session = self.create_session(host, credential).await?;

        let entries = match self.version {
            SnmpVersion::V1 => self.walk_next(&mut session, &subtree).await?,
            SnmpVersion::V2c => self.walk_bulk(&mut session, &subtree).await?,
        };

        tracing::trace!(
            host = %host,
            oid = %oid_prefix,
            entries = entries.len(),
            "Walked subtree"
        );

        Ok(entries
            .into_iter()
            .map(|(oid, value)| OidPair::new(mask_suffix(&oid, mask), value))
            .collect())
    }
}

/// Where a walk goes after one response.
#[derive(Debug, PartialEq, Eq)]
enum WalkStep {
    /// Request again, starting after this OID.
    Next(Oid<'static>),
    /// The subtree is exhausted.
    Done,
}

/// Check a response's error-status.
///
/// `Ok(false)` means the walk is over: v1 agents answer GETNEXT past the end
/// of the MIB with noSuchName (2).
fn check_error_status(version: SnmpVersion, status: u32, index: u32) -> Result<bool, WalkError> {
    match (version, status) {
        (_, 0) => Ok(true),
        (SnmpVersion::V1, 2) => Ok(false),
        _ => Err(WalkError::Protocol { status, index }),
    }
}

/// Append the varbinds of one response that lie inside `subtree`.
///
/// Stops at the first OID outside the subtree or at `endOfMibView`. Values
/// without text (`Null`, exceptions) are skipped but still advance the walk.
/// An agent that answers with the OID it was asked for ends the walk.
fn collect_varbinds<'a>(
    subtree: &Oid<'_>,
    requested: &Oid<'_>,
    varbinds: impl IntoIterator<Item = (Oid<'a>, Value<'a>)>,
    results: &mut Vec<(String, String)>,
) -> WalkStep {
    let mut last: Option<Oid<'static>> = None;

    for (oid, value) in varbinds {
        if !oid_starts_with(&oid, subtree) || matches!(value, Value::EndOfMibView) {
            return WalkStep::Done;
        }
        if let Some(text) = snmp_value_to_text(&value) {
            results.push((oid_to_string(&oid), text));
        }
        last = Some(oid.to_owned());
    }

    match last {
        Some(next) if next != *requested => WalkStep::Next(next),
        _ => WalkStep::Done,
    }
}

/// Render an SNMP value as the text the device reported.
///
/// Null-like values and exceptions yield `None` and are left out of the walk.
fn snmp_value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Boolean(b) => Some(b.to_string()),
        Value::Integer(n) => Some(n.to_string()),
        Value::OctetString(s) => Some(octets_to_text(s)),
        Value::ObjectIdentifier(oid) => Some(oid_to_string(oid)),
        Value::IpAddress(ip) => Some(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])),
        Value::Counter32(n) => Some(n.to_string()),
        Value::Unsigned32(n) => Some(n.to_string()),
        Value::Timeticks(n) => Some(n.to_string()),
        Value::Counter64(n) => Some(n.to_string()),
        Value::Null | Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => None,
        _ => None,
    }
}

/// Decode an OCTET STRING as UTF-8, falling back to hex for binary content.
///
/// Trailing NUL padding is dropped; other control characters are kept.
fn octets_to_text(bytes: &[u8]) -> String {
    let trimmed = match bytes.iter().rposition(|b| *b != 0) {
        Some(end) => &bytes[..=end],
        None => &[],
    };

    match std::str::from_utf8(trimmed) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", hex)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Sensor;
    use crate::template::classify;

    fn walker() -> SnmpWalker {
        SnmpWalker::new(&SnmpConfig::default())
    }

    #[test]
    fn test_target_addr_adds_default_port() {
        let w = walker();
        assert_eq!(w.target_addr("10.0.0.5"), "10.0.0.5:161");
        assert_eq!(w.target_addr("bmc01.rack"), "bmc01.rack:161");
        assert_eq!(w.target_addr("fe80::1"), "[fe80::1]:161");
    }

    #[test]
    fn test_target_addr_keeps_explicit_port() {
        let w = walker();
        assert_eq!(w.target_addr("10.0.0.5:1161"), "10.0.0.5:1161");
        assert_eq!(w.target_addr("bmc01.rack:1161"), "bmc01.rack:1161");
        assert_eq!(w.target_addr("[fe80::1]:1161"), "[fe80::1]:1161");
    }

    #[test]
    fn test_value_text() {
        assert_eq!(snmp_value_to_text(&Value::Integer(-12)).unwrap(), "-12");
        assert_eq!(snmp_value_to_text(&Value::Counter64(7)).unwrap(), "7");
        assert_eq!(
            snmp_value_to_text(&Value::OctetString(&b"CPU1 Temp"[..])).unwrap(),
            "CPU1 Temp"
        );
        assert_eq!(
            snmp_value_to_text(&Value::IpAddress([10, 0, 0, 1])).unwrap(),
            "10.0.0.1"
        );
        assert!(snmp_value_to_text(&Value::Null).is_none());
        assert!(snmp_value_to_text(&Value::NoSuchInstance).is_none());
    }

    #[test]
    fn test_octets_to_text() {
        assert_eq!(octets_to_text(b"FAN1\0\0"), "FAN1");
        assert_eq!(octets_to_text(&[0xde, 0xad]), "0xdead");
        assert_eq!(octets_to_text(b""), "");
    }

    #[test]
    fn test_octets_with_control_byte_stay_text() {
        let name = octets_to_text(b"CPU1 Temp\x01");
        assert_eq!(name, "CPU1 Temp\u{1}");

        let profile = crate::profile::supermicro().unwrap();
        let lines = classify(&Sensor::new(name, "45"), &profile.templates);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].to_string(), r#"cpu_temp {cpu_num="1"} 45"#);
    }

    fn oid(s: &str) -> Oid<'static> {
        parse_oid(s).unwrap()
    }

    const SUBTREE: &str = "1.3.6.1.4.1.21317.1.3.1.13";

    #[test]
    fn test_collect_continues_from_last_oid() {
        let subtree = oid(SUBTREE);
        let mut results = Vec::new();
        let step = collect_varbinds(
            &subtree,
            &subtree,
            vec![
                (oid("1.3.6.1.4.1.21317.1.3.1.13.1"), Value::OctetString(&b"FAN1"[..])),
                (oid("1.3.6.1.4.1.21317.1.3.1.13.2"), Value::OctetString(&b"FANA"[..])),
            ],
            &mut results,
        );

        assert_eq!(step, WalkStep::Next(oid("1.3.6.1.4.1.21317.1.3.1.13.2")));
        assert_eq!(
            results,
            vec![
                ("1.3.6.1.4.1.21317.1.3.1.13.1".to_string(), "FAN1".to_string()),
                ("1.3.6.1.4.1.21317.1.3.1.13.2".to_string(), "FANA".to_string()),
            ]
        );
    }

    #[test]
    fn test_collect_stops_outside_subtree() {
        let subtree = oid(SUBTREE);
        let mut results = Vec::new();
        let step = collect_varbinds(
            &subtree,
            &subtree,
            vec![
                (oid("1.3.6.1.4.1.21317.1.3.1.13.1"), Value::OctetString(&b"FAN1"[..])),
                (oid("1.3.6.1.4.1.21317.1.3.1.14.1"), Value::Integer(3)),
                (oid("1.3.6.1.4.1.21317.1.3.1.13.9"), Value::OctetString(&b"late"[..])),
            ],
            &mut results,
        );

        assert_eq!(step, WalkStep::Done);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, "FAN1");
    }

    #[test]
    fn test_collect_stops_at_end_of_mib_view() {
        let subtree = oid(SUBTREE);
        let mut results = Vec::new();
        let step = collect_varbinds(
            &subtree,
            &subtree,
            vec![
                (oid("1.3.6.1.4.1.21317.1.3.1.13.1"), Value::Integer(45)),
                (oid("1.3.6.1.4.1.21317.1.3.1.13.2"), Value::EndOfMibView),
            ],
            &mut results,
        );

        assert_eq!(step, WalkStep::Done);
        assert_eq!(results, vec![("1.3.6.1.4.1.21317.1.3.1.13.1".to_string(), "45".to_string())]);
    }

    #[test]
    fn test_collect_stops_on_repeated_oid() {
        let subtree = oid(SUBTREE);
        let requested = oid("1.3.6.1.4.1.21317.1.3.1.13.4");
        let mut results = Vec::new();
        let step = collect_varbinds(
            &subtree,
            &requested,
            vec![(oid("1.3.6.1.4.1.21317.1.3.1.13.4"), Value::Integer(1))],
            &mut results,
        );

        assert_eq!(step, WalkStep::Done);
    }

    #[test]
    fn test_collect_skips_null_but_advances() {
        let subtree = oid(SUBTREE);
        let mut results = Vec::new();
        let step = collect_varbinds(
            &subtree,
            &subtree,
            vec![(oid("1.3.6.1.4.1.21317.1.3.1.13.3"), Value::Null)],
            &mut results,
        );

        assert!(results.is_empty());
        assert_eq!(step, WalkStep::Next(oid("1.3.6.1.4.1.21317.1.3.1.13.3")));
    }

    #[test]
    fn test_collect_empty_response_ends_walk() {
        let subtree = oid(SUBTREE);
        let mut results = Vec::new();
        let step = collect_varbinds(&subtree, &subtree, Vec::new(), &mut results);
        assert_eq!(step, WalkStep::Done);
    }

    #[test]
    fn test_error_status() {
        assert!(check_error_status(SnmpVersion::V2c, 0, 0).unwrap());
        assert!(!check_error_status(SnmpVersion::V1, 2, 1).unwrap());
        assert!(matches!(
            check_error_status(SnmpVersion::V2c, 2, 1),
            Err(WalkError::Protocol { status: 2, index: 1 })
        ));
        assert!(matches!(
            check_error_status(SnmpVersion::V1, 5, 1),
            Err(WalkError::Protocol { status: 5, index: 1 })
        ));
    }
}
