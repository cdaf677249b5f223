//! Firmware version strings as reported by APM stacks, e.g. `APM:Copter V3.4.0-rc1 (a1b2c3d4)`.
//!
//! The format is a vehicle-type label, a numeric `major.minor.patch` triple (optionally
//! prefixed with `V`), then optional release-channel qualifiers and build metadata.

use crate::{protocol::bounded, CompatError};
use core::cmp::Ordering;
use core::fmt;
use heapless::String;
use log::*;

/// Maximum length of the raw version text we keep. Longer input is truncated, which only
/// affects what is echoed back; parsing works on the full input.
pub const VERSION_TEXT_LEN: usize = 64;

/// Maximum length of the vehicle-type label.
pub const VEHICLE_TYPE_LEN: usize = 24;

const BETA_MARKERS: [&str; 2] = ["rc", "beta"];
const DEV_MARKERS: [&str; 1] = ["dev"];

/// A parsed firmware version.
///
/// The numeric triple is only reachable through `Option` accessors, so an invalid
/// instance can't leak garbage numbers into a comparison.
#[derive(Debug, Clone, Default)]
pub struct VersionInfo {
    text: String<VERSION_TEXT_LEN>,
    vehicle_type: String<VEHICLE_TYPE_LEN>,
    major: u32,
    minor: u32,
    patch: u32,
    valid: bool,
    beta: bool,
    dev: bool,
}

impl VersionInfo {
    /// An invalid version with no text. This is the state before any version is seen.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Parse a version string. Never fails; a malformed string yields an invalid instance
    /// that still carries the raw text.
    pub fn parse(text: &str) -> Self {
        let mut result = Self {
            text: bounded(text),
            ..Self::default()
        };

        let text = text.trim();
        if text.is_empty() {
            return result;
        }

        let (label, rest) = match text.split_once(char::is_whitespace) {
            Some(parts) => parts,
            None => {
                warn!("version text has no version number: {}", text);
                return result;
            }
        };
        if label.starts_with(|c: char| c.is_ascii_digit()) {
            warn!("version text has no vehicle type label: {}", text);
            return result;
        }

        let rest = rest.trim_start();
        let raw_token = rest.split(char::is_whitespace).next().unwrap_or("");
        let token = raw_token
            .strip_prefix('V')
            .or_else(|| raw_token.strip_prefix('v'))
            .unwrap_or(raw_token);

        let numeric_end = token
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(token.len());
        let numeric = token[..numeric_end].trim_end_matches('.');
        // Qualifiers and build metadata: everything after the numeric triple.
        let trailer = &rest[raw_token.len() - token.len() + numeric_end..];

        let (major, minor, patch) = match parse_triple(numeric) {
            Some(triple) => triple,
            None => {
                warn!("unable to parse version number from: {}", text);
                return result;
            }
        };

        result.vehicle_type = bounded(label);
        result.major = major;
        result.minor = minor;
        result.patch = patch;
        result.valid = true;
        result.beta = BETA_MARKERS
            .iter()
            .any(|m| contains_ignore_ascii_case(trailer, m));
        result.dev = DEV_MARKERS
            .iter()
            .any(|m| contains_ignore_ascii_case(trailer, m));
        result
    }

    /// Like `parse`, but an unusable string is an error instead of an invalid instance.
    pub fn try_parse(text: &str) -> Result<Self, CompatError> {
        let version = Self::parse(text);
        if version.valid {
            Ok(version)
        } else {
            Err(CompatError::InvalidVersionString)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Release candidate or beta build. False on an invalid instance.
    pub fn is_beta(&self) -> bool {
        self.valid && self.beta
    }

    /// Development build. False on an invalid instance.
    pub fn is_dev(&self) -> bool {
        self.valid && self.dev
    }

    /// The raw text this instance was parsed from.
    pub fn version_string(&self) -> &str {
        self.text.as_str()
    }

    /// Vehicle type label, e.g. `APM:Copter`. Empty when invalid.
    pub fn vehicle_type(&self) -> &str {
        self.vehicle_type.as_str()
    }

    pub fn major(&self) -> Option<u32> {
        self.triple().map(|t| t.0)
    }

    pub fn minor(&self) -> Option<u32> {
        self.triple().map(|t| t.1)
    }

    pub fn patch(&self) -> Option<u32> {
        self.triple().map(|t| t.2)
    }

    /// `(major, minor, patch)`, or `None` if the version didn't parse.
    pub fn triple(&self) -> Option<(u32, u32, u32)> {
        if self.valid {
            Some((self.major, self.minor, self.patch))
        } else {
            None
        }
    }

    /// True if this is a valid version at or above `major.minor.patch`.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        self.triple()
            .map_or(false, |t| t >= (major, minor, patch))
    }
}

/// Valid versions compare by value; two invalid versions are equal only if their text is.
impl PartialEq for VersionInfo {
    fn eq(&self, other: &Self) -> bool {
        match (self.triple(), other.triple()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.text == other.text,
            _ => false,
        }
    }
}

/// Ordering is only defined between valid versions, so `<` and `>` are false whenever
/// either side is invalid. Release channel doesn't take part.
impl PartialOrd for VersionInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.triple(), other.triple()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text.as_str())
    }
}

/// `3`, `3.4` and `3.4.0` are accepted; missing components are 0. Any component that is
/// empty or overflows fails the whole triple. Components past the third are build numbers
/// and ignored.
fn parse_triple(numeric: &str) -> Option<(u32, u32, u32)> {
    if numeric.is_empty() {
        return None;
    }
    let mut parts = numeric.split('.');
    let mut next = |required: bool| -> Option<u32> {
        match parts.next() {
            Some(p) => p.parse::<u32>().ok(),
            None if required => None,
            None => Some(0),
        }
    };
    let major = next(true)?;
    let minor = next(false)?;
    let patch = next(false)?;
    Some((major, minor, patch))
}

pub(crate) fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() {
        return true;
    }
    h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n))
}
