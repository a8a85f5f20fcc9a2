// BLOB version prefix helpers. [version: u8][payload].

/// Version 1: wincode-encoded snapshot struct.
pub(super) const BLOB_VERSION: u8 = 1;

pub(super) fn with_version_prefix(version: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(payload);
    out
}

/// Payload after the version byte, or None when the version is not `expected_version`.
pub(super) fn blob_payload(bytes: &[u8], expected_version: u8) -> Option<&[u8]> {
    match bytes.split_first() {
        Some((version, payload)) if *version == expected_version => Some(payload),
        _ => None,
    }
}
