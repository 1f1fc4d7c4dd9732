//! Parameter types for the merge-and-fit encoder.
//!
//! These structs describe *what* to produce, not *how*. They are the interface
//! between the [`operations`](super::operations) module (which decides what to
//! encode and when to stop) and the [`backend`](super::backend) (which does the
//! actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`OutputFormat`] / [`RasterFormat`]: requested artifact format and the raster codec behind it.
//! - [`SizeBudget`]: Byte ceiling expressed in kilobytes.
//! - [`ReductionPlan`]: Quality schedule (start, step, floor) and optional downsample box.
//! - [`PageSize`] / [`PdfReduction`]: PDF page geometry and document-reduction strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
///
/// Every way in, including deserialization, goes through the clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Format of the artifact handed to the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    /// One-page document embedding a JPEG rendition of the collage.
    Pdf,
}

impl OutputFormat {
    /// File extension used for artifacts of this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/pdf",
        }
    }

    /// Lossless formats have no quality knob and are never reduced.
    pub fn is_lossless(self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Pdf => "PDF",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!(
                "unsupported output format '{other}' (expected jpeg, png or pdf)"
            )),
        }
    }
}

/// Raster codec the backend knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

/// Maximum artifact size, in kilobytes (1 KB = 1024 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBudget {
    pub kilobytes: u64,
}

impl SizeBudget {
    pub fn from_kb(kilobytes: u64) -> Self {
        Self { kilobytes }
    }

    pub fn bytes(self) -> u64 {
        self.kilobytes * 1024
    }

    pub fn admits(self, len: usize) -> bool {
        len as u64 <= self.bytes()
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self::from_kb(100)
    }
}

/// How the quality-reduction loop walks down.
///
/// The loop encodes at `start`, then `start - step`, … and stops after the
/// first value below `floor` would be reached. With the defaults (95, 5, 10)
/// that is at most 18 encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionPlan {
    pub start: Quality,
    pub step: u32,
    pub floor: u32,
    /// Bounding box (width, height) applied once before the loop.
    pub downsample: Option<(u32, u32)>,
}

impl ReductionPlan {
    /// The variant that shrinks to a bounding box first and starts lower.
    pub fn with_downsample(bounds: (u32, u32), start: Quality) -> Self {
        Self {
            start,
            downsample: Some(bounds),
            ..Self::default()
        }
    }
}

impl Default for ReductionPlan {
    fn default() -> Self {
        Self {
            start: Quality::new(95),
            step: 5,
            floor: 10,
            downsample: None,
        }
    }
}

/// Page geometry in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// US Letter, 8.5 × 11 in.
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Strategy used to bring a PDF artifact under its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfReduction {
    /// Re-embed the collage at decreasing JPEG quality until the document fits.
    #[default]
    Reencode,
    /// Copy every page into a fresh document once; keep it only if it fits.
    Rebuild,
}

/// Everything the encoder needs to turn one collage into an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub format: OutputFormat,
    pub budget: Option<SizeBudget>,
    pub plan: ReductionPlan,
    /// Quality of the JPEG embedded in a PDF page before any reduction.
    pub pdf_embed_quality: Quality,
    pub page: PageSize,
    pub pdf_reduction: PdfReduction,
}

impl Default for EncodeRequest {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            budget: Some(SizeBudget::default()),
            plan: ReductionPlan::default(),
            pdf_embed_quality: Quality::new(50),
            page: PageSize::LETTER,
            pdf_reduction: PdfReduction::default(),
        }
    }
}
