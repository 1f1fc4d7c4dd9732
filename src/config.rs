//! Run configuration.
//!
//! Handles loading, validating, and merging `collage.toml`. Configuration is
//! layered: stock defaults, then the user file, then command-line flags. Each
//! layer is a sparse TOML table merged key-by-key over the one below.
//!
//! ## Config File Location
//!
//! Place `collage.toml` in the input folder, or pass any file with `--config`:
//!
//! ```text
//! input/
//! ├── collage.toml      # optional
//! ├── beach_a.jpg
//! └── beach_b.jpg
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! format = "jpeg"             # jpeg, png or pdf
//! naming = "ab"               # ab → beach_ab.jpg, merged → beach_merged.jpg
//! packaging = "files"         # files or zip
//!
//! [budget]
//! enabled = true
//! max_kb = 100                # Ceiling for JPEG and PDF artifacts (1 KB = 1024 bytes)
//! start_quality = 95
//! step = 5
//! floor = 10
//! downsample = false          # Shrink into downsample_box before the quality loop
//! downsample_box = [800, 800]
//! downsample_start_quality = 85
//!
//! [pdf]
//! embed_quality = 50
//! page_size = [612.0, 792.0]  # US Letter, in points
//! reduction = "reencode"      # reencode or rebuild
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [output]
//! format = "pdf"
//! ```
//!
//! ## Validation
//!
//! Unknown keys are rejected. Qualities must be 1-100, `step` non-zero,
//! `floor` not above `start_quality`, `max_kb` non-zero, and the downsample
//! box and page size must have non-zero edges.

use crate::imaging::{
    EncodeRequest, OutputFormat, PageSize, PdfReduction, Quality, ReductionPlan, SizeBudget,
};
use crate::naming::NamingStyle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the input folder.
pub const CONFIG_FILE_NAME: &str = "collage.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete configuration for one run.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollageConfig {
    pub output: OutputConfig,
    pub budget: BudgetConfig,
    pub pdf: PdfConfig,
    pub processing: ProcessingConfig,
}

/// How finished artifacts are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    /// Loose files in the output directory.
    #[default]
    Files,
    /// One ZIP archive.
    Zip,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub naming: NamingStyle,
    pub packaging: Packaging,
}

/// Size budget and the quality-reduction loop that enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    pub enabled: bool,
    pub max_kb: u64,
    pub start_quality: u32,
    pub step: u32,
    pub floor: u32,
    pub downsample: bool,
    pub downsample_box: [u32; 2],
    pub downsample_start_quality: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_kb: 100,
            start_quality: 95,
            step: 5,
            floor: 10,
            downsample: false,
            downsample_box: [800, 800],
            downsample_start_quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfConfig {
    pub embed_quality: u32,
    /// `[width, height]` in points.
    pub page_size: [f32; 2],
    pub reduction: PdfReduction,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            embed_quality: 50,
            page_size: [PageSize::LETTER.width, PageSize::LETTER.height],
            reduction: PdfReduction::default(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel pair workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

fn check_quality(name: &str, value: u32) -> Result<(), ConfigError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{name} must be 1-100, got {value}"
        )))
    }
}

impl CollageConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = &self.budget;
        check_quality("budget.start_quality", budget.start_quality)?;
        check_quality("budget.floor", budget.floor)?;
        check_quality(
            "budget.downsample_start_quality",
            budget.downsample_start_quality,
        )?;
        check_quality("pdf.embed_quality", self.pdf.embed_quality)?;

        if budget.max_kb == 0 {
            return Err(ConfigError::Validation(
                "budget.max_kb must be greater than 0".into(),
            ));
        }
        if budget.step == 0 {
            return Err(ConfigError::Validation(
                "budget.step must be greater than 0".into(),
            ));
        }
        if budget.floor > budget.start_quality {
            return Err(ConfigError::Validation(format!(
                "budget.floor ({}) must not exceed budget.start_quality ({})",
                budget.floor, budget.start_quality
            )));
        }
        if budget.downsample_box.contains(&0) {
            return Err(ConfigError::Validation(
                "budget.downsample_box edges must be non-zero".into(),
            ));
        }
        if self.pdf.page_size.iter().any(|edge| !(*edge > 0.0)) {
            return Err(ConfigError::Validation(
                "pdf.page_size edges must be positive".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The byte ceiling, or `None` when budgeting is switched off.
    pub fn size_budget(&self) -> Option<SizeBudget> {
        self.budget
            .enabled
            .then(|| SizeBudget::from_kb(self.budget.max_kb))
    }

    /// The quality schedule for image artifacts.
    pub fn reduction_plan(&self) -> ReductionPlan {
        let budget = &self.budget;
        let plan = ReductionPlan {
            start: Quality::new(budget.start_quality),
            step: budget.step,
            floor: budget.floor,
            downsample: None,
        };
        if budget.downsample {
            let [w, h] = budget.downsample_box;
            ReductionPlan {
                start: Quality::new(budget.downsample_start_quality),
                downsample: Some((w, h)),
                ..plan
            }
        } else {
            plan
        }
    }

    /// Everything the encoder needs, resolved from this config.
    pub fn encode_request(&self) -> EncodeRequest {
        let [width, height] = self.pdf.page_size;
        EncodeRequest {
            format: self.output.format,
            budget: self.size_budget(),
            plan: self.reduction_plan(),
            pdf_embed_quality: Quality::new(self.pdf.embed_quality),
            page: PageSize { width, height },
            pdf_reduction: self.pdf.reduction,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CollageConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a TOML file into a raw value.
pub fn read_toml_file(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load `collage.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `collage.toml`.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    read_toml_file(&config_path).map(Some)
}

/// Merge overlays in order onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<CollageConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: CollageConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `collage.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<CollageConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(dir)?)
}

/// Values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub format: Option<OutputFormat>,
    pub naming: Option<NamingStyle>,
    pub packaging: Option<Packaging>,
    pub max_kb: Option<u64>,
    pub budget_enabled: Option<bool>,
}

#[derive(Serialize)]
struct OverrideOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    naming: Option<NamingStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packaging: Option<Packaging>,
}

#[derive(Serialize)]
struct OverrideBudget {
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_kb: Option<u64>,
}

#[derive(Serialize)]
struct OverrideLayer {
    output: OverrideOutput,
    budget: OverrideBudget,
}

impl Overrides {
    /// The overrides as a sparse TOML layer.
    pub fn to_toml(&self) -> Result<toml::Value, ConfigError> {
        let layer = OverrideLayer {
            output: OverrideOutput {
                format: self.format,
                naming: self.naming,
                packaging: self.packaging,
            },
            budget: OverrideBudget {
                enabled: self.budget_enabled,
                max_kb: self.max_kb,
            },
        };
        Ok(toml::Value::try_from(layer)?)
    }
}

/// Resolve the full layer stack: stock defaults ← file ← command line.
///
/// With `explicit` set, that file must exist. Otherwise `collage.toml` is
/// looked up in `input_dir` and skipped when absent.
pub fn load_layered(
    input_dir: &Path,
    explicit: Option<&Path>,
    overrides: &Overrides,
) -> Result<CollageConfig, ConfigError> {
    let file_layer = match explicit {
        Some(path) => Some(read_toml_file(path)?),
        None => load_raw_config(input_dir)?,
    };
    let layers = file_layer.into_iter().chain([overrides.to_toml()?]);
    resolve_config(stock_defaults_value(), layers)
}

/// Returns a fully-commented stock `collage.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# collage-fit configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file as collage.toml in the input folder, or pass it with
# --config. Command-line flags override values set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Artifact format: "jpeg", "png" or "pdf".
# PNG is lossless and never reduced. PDF embeds a JPEG on a single page.
format = "jpeg"

# Folder-mode artifact names: "ab" -> beach_ab.jpg, "merged" -> beach_merged.jpg
naming = "ab"

# "files" writes loose files to the output folder, "zip" writes one archive.
packaging = "files"

# ---------------------------------------------------------------------------
# Size budget
# ---------------------------------------------------------------------------
[budget]
# Set to false to encode once at start_quality with no size ceiling.
enabled = true

# Maximum artifact size in kilobytes (1 KB = 1024 bytes).
max_kb = 100

# Quality loop: encode at start_quality, then step down until the artifact
# fits or quality would drop below floor. Best effort: an artifact still
# over budget at the floor is kept and reported.
start_quality = 95
step = 5
floor = 10

# Shrink the collage into downsample_box (aspect preserved, never enlarged)
# before the loop, and start the loop at downsample_start_quality instead.
downsample = false
downsample_box = [800, 800]
downsample_start_quality = 85

# ---------------------------------------------------------------------------
# PDF
# ---------------------------------------------------------------------------
[pdf]
# JPEG quality of the collage embedded in the page.
embed_quality = 50

# Page size in points [width, height]. Default is US Letter.
page_size = [612.0, 792.0]

# How an over-budget document is reduced:
#   "reencode" - re-embed the collage at lower JPEG quality until it fits
#   "rebuild"  - copy the pages into a fresh document once; keep it only if it fits
reduction = "reencode"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit to use all CPU cores.
# max_processes = 4
"##
}
