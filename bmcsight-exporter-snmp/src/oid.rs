use snmp2::Oid;

use crate::error::WalkError;

/// Parse an OID string into an snmp2::Oid.
///
/// Leading and trailing dots are tolerated, so `.1.3.6.1.4.1.21317.1.3.1.13.`
/// and `1.3.6.1.4.1.21317.1.3.1.13` name the same subtree.
pub fn parse_oid(oid_str: &str) -> Result<Oid<'static>, WalkError> {
    normalize_oid(oid_str)
        .parse::<Oid>()
        .map_err(|_| WalkError::InvalidOid(oid_str.to_string()))
        .map(|oid| oid.to_owned())
}

/// Strip surrounding dots and whitespace from a dotted OID string.
pub fn normalize_oid(oid_str: &str) -> &str {
    oid_str.trim().trim_matches('.')
}

/// Convert an snmp2::Oid back to a dotted string representation.
pub fn oid_to_string(oid: &Oid) -> String {
    oid.to_id_string()
}

/// Check if an OID is a child of (or equal to) a parent OID.
pub fn oid_starts_with(oid: &Oid, parent: &Oid) -> bool {
    oid.starts_with(parent)
}

/// Drop the first `mask` components of a dotted OID.
///
/// Masking more components than the OID has yields an empty suffix.
pub fn mask_suffix(oid_str: &str, mask: usize) -> String {
    normalize_oid(oid_str)
        .split('.')
        .skip(mask)
        .collect::<Vec<_>>()
        .join(".")
}
