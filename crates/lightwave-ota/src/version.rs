//! Firmware version numbers.
//!
//! `major.minor.patch` maps to `major * 10000 + minor * 100 + patch`, so
//! `4.1.1` becomes `40101`. Minor and patch must stay below 100. A leading
//! `v` is accepted. Anything else yields 0, which callers treat as
//! "unknown" and exempt from the downgrade guard.

const MAJOR_WEIGHT: u32 = 10_000;
const MINOR_WEIGHT: u32 = 100;

pub fn parse_version_number(version: &str) -> u32 {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    let mut parts = version.split('.');
    let (Some(major), Some(minor), Some(patch), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return 0;
    };

    let (Ok(major), Ok(minor), Ok(patch)) =
        (major.parse::<u32>(), minor.parse::<u32>(), patch.parse::<u32>())
    else {
        return 0;
    };
    if minor >= MINOR_WEIGHT || patch >= MINOR_WEIGHT || major > u32::MAX / MAJOR_WEIGHT - 1 {
        return 0;
    }

    major * MAJOR_WEIGHT + minor * MINOR_WEIGHT + patch
}

/// Whether an incoming version may replace the running one.
///
/// Unknown versions on either side always pass.
pub fn is_upgrade_allowed(current: u32, incoming: u32, force: bool) -> bool {
    force || current == 0 || incoming == 0 || incoming > current
}
