//! Centralized filename parsing for the `{base}_{suffix}.{ext}` convention.
//!
//! Source images that belong together share a base name and differ only in the
//! final `_`-delimited token:
//!
//! ```text
//! beach_a.jpg   → base "beach",    suffix "a"
//! beach_b.png   → base "beach",    suffix "b"
//! my_trip_a.jpg → base "my_trip",  suffix "a"
//! ```
//!
//! The same module owns the naming of produced artifacts so the folder, ZIP and
//! PDF outputs agree on one scheme.

use serde::{Deserialize, Serialize};

/// Result of parsing a source filename like `my_trip_a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairName {
    /// Every `_`-separated token except the last, joined back with `_`.
    pub base: String,
    /// Last token up to its first `.` (`a` from `x_a.jpg`, `a` from `x_a.v2.jpg`).
    pub suffix: String,
}

/// Parse a filename following the `{base}_{suffix}.{ext}` convention.
///
/// Returns `None` when the name has no `_` or the base would be empty
/// (`_a.jpg`): such files cannot take part in a pair.
///
/// - `"beach_a.jpg"` → base="beach", suffix="a"
/// - `"my_trip_b.PNG"` → base="my_trip", suffix="b"
/// - `"beach.jpg"` → `None`
pub fn parse_pair_name(file_name: &str) -> Option<PairName> {
    let (base, last) = file_name.rsplit_once('_')?;
    if base.is_empty() {
        return None;
    }
    let suffix = last.split('.').next().unwrap_or_default();
    Some(PairName {
        base: base.to_string(),
        suffix: suffix.to_string(),
    })
}

/// Which half of a pair a suffix designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    /// Suffix `a`, placed on the left.
    A,
    /// Suffix `b`, placed on the right.
    B,
}

impl Half {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "a" => Some(Half::A),
            "b" => Some(Half::B),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Half::A => "a",
            Half::B => "b",
        }
    }
}

/// Suffix appended to the base name of a folder-mode artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStyle {
    /// `{base}_ab.{ext}`
    #[default]
    Ab,
    /// `{base}_merged.{ext}`
    Merged,
}

impl NamingStyle {
    fn tag(self) -> &'static str {
        match self {
            NamingStyle::Ab => "ab",
            NamingStyle::Merged => "merged",
        }
    }
}

impl std::str::FromStr for NamingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ab" => Ok(NamingStyle::Ab),
            "merged" => Ok(NamingStyle::Merged),
            other => Err(format!("unknown naming style '{other}' (expected ab or merged)")),
        }
    }
}

/// Artifact filename for a folder-mode pair: `beach` + `Ab` + `jpg` → `beach_ab.jpg`.
pub fn artifact_name(base: &str, style: NamingStyle, extension: &str) -> String {
    format!("{}_{}.{}", base, style.tag(), extension)
}

/// Pair label for upload mode, 1-based: `image_3`.
pub fn upload_pair_label(index: usize) -> String {
    format!("image_{index}")
}

/// Artifact filename for an upload-mode pair: `image_{n}_merged.{ext}`.
pub fn upload_artifact_name(index: usize, extension: &str) -> String {
    format!("{}_merged.{}", upload_pair_label(index), extension)
}
