//! # collage-fit
//!
//! Merge image pairs side by side and fit each result under a byte-size
//! budget.
//!
//! # Pipeline
//!
//! ```text
//! 1. Pair     input/ or uploads  →  pairs          (naming convention or upload order)
//! 2. Merge    pair               →  collage        (first left, second right, black fill)
//! 3. Fit      collage            →  artifact       (JPEG/PNG/PDF, quality loop under budget)
//! 4. Store    artifact           →  files, ZIP, or data-URI links
//! ```
//!
//! Every pair is independent: a failure in one is reported and the batch
//! moves on. Only an odd upload count stops a run before it starts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | `{base}_{suffix}.{ext}` parsing and artifact naming |
//! | [`scan`] | Pairer: folder-name and upload-order pairing |
//! | [`imaging`] | Compose, encode, quality loop, PDF page |
//! | [`sink`] | Loose files, in-memory ZIP, in-memory list, data URIs |
//! | [`process`] | Batch driver with per-pair isolation and progress events |
//! | [`config`] | Layered `collage.toml`: stock defaults ← file ← CLI flags |
//! | [`types`] | Serializable run report |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Best-Effort Budgets
//!
//! The quality loop walks down from 95 in steps of 5 and stops at the first
//! encode that fits. When even quality 10 is too large, the last encode is
//! delivered anyway and marked [`imaging::BudgetStatus::Unmet`]. A missed
//! budget is a warning, never an error.
//!
//! ## PDF Reduction
//!
//! A PDF wraps a JPEG of the collage on one US Letter page. By default an
//! over-budget document is rebuilt from lower-quality embeds until it fits.
//! The `rebuild` strategy instead copies the pages into a fresh document once
//! and keeps whichever of the two fits.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate, PDF assembly uses `lopdf`.
//! There are no system dependencies.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod sink;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
