//! CLI output formatting.
//!
//! # Information-First Display
//!
//! The primary display for every pair is its identity: positional index plus
//! base name (or `image_{n}` label). Source files and artifact details follow
//! as secondary context on the same or an indented line.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Pairs
//! 001 beach
//!     Source: beach_a.jpg + beach_b.jpg
//!
//! Incomplete
//!     dunes (missing b)
//!
//! Ignored
//!     cover.jpg (not a pair name)
//! ```
//!
//! ## Merge
//!
//! ```text
//! Merging 2 pairs → JPEG
//!     001 beach → beach_ab.jpg (84.2 KB, q90, 2 attempts)
//!     002 junk: decode failed: ...
//!
//! Wrote 1 artifact, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure, with no I/O.

use crate::imaging::BudgetStatus;
use crate::naming::Half;
use crate::process::{MergeResponse, ProcessEvent, WrittenArtifact};
use crate::scan::{IgnoreReason, PairingReport};
use crate::sink::data_uri;
use crate::types::RunReport;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Byte count in kilobytes with one decimal: `86220` → `84.2 KB`.
fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// `(84.2 KB, q90, 2 attempts)` plus an over-budget marker when needed.
fn artifact_detail(artifact: &WrittenArtifact) -> String {
    let mut parts = vec![format_kb(artifact.bytes)];
    if let Some(quality) = artifact.quality {
        parts.push(format!("q{quality}"));
    }
    if artifact.attempts > 1 {
        parts.push(plural(artifact.attempts, "attempt"));
    }
    if let BudgetStatus::Unmet { limit_bytes, .. } = artifact.budget {
        parts.push(format!("over budget {}", format_kb(limit_bytes)));
    }
    format!("({})", parts.join(", "))
}

// ============================================================================
// Pairing
// ============================================================================

/// Format the pairing report shown by `check` and before `merge`.
pub fn format_pairing_report(report: &PairingReport) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push("Pairs".to_string());
    if report.pairs.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    for (i, pair) in report.pairs.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), pair.base));
        lines.push(format!(
            "{}Source: {} + {}",
            indent(1),
            pair.first.file_name,
            pair.second.file_name
        ));
    }

    if !report.incomplete.is_empty() {
        lines.push(String::new());
        lines.push("Incomplete".to_string());
        for group in &report.incomplete {
            let missing: Vec<&str> = group.missing.iter().map(|h: &Half| h.suffix()).collect();
            lines.push(format!(
                "{}{} (missing {})",
                indent(1),
                group.base,
                missing.join(" and ")
            ));
        }
    }

    if !report.ignored.is_empty() {
        lines.push(String::new());
        lines.push("Ignored".to_string());
        for file in &report.ignored {
            let reason = match &file.reason {
                IgnoreReason::NotPairable => "not a pair name".to_string(),
                IgnoreReason::InvalidName => "name is not valid UTF-8".to_string(),
                IgnoreReason::DuplicateHalf { half, kept } => {
                    format!("duplicate {}, kept {}", half.suffix(), kept)
                }
            };
            lines.push(format!("{}{} ({})", indent(1), file.file_name, reason));
        }
    }

    lines
}

pub fn print_pairing_report(report: &PairingReport) {
    for line in format_pairing_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Format one progress event. Used by the printer thread in the CLI.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::BatchStarted { pair_count, format } => {
            vec![format!("Merging {} → {}", plural(*pair_count, "pair"), format)]
        }
        ProcessEvent::PairWritten {
            index,
            name,
            artifact,
        } => vec![format!(
            "{}{} {} → {} {}",
            indent(1),
            format_index(*index),
            name,
            artifact.file_name,
            artifact_detail(artifact)
        )],
        ProcessEvent::PairFailed { index, message, .. } => {
            vec![format!("{}{} {}", indent(1), format_index(*index), message)]
        }
    }
}

/// Closing summary line(s) for a run.
pub fn format_summary(report: &RunReport) -> Vec<String> {
    let totals = report.totals();
    let mut parts = vec![format!("Wrote {}", plural(totals.written, "artifact"))];
    if totals.failed > 0 {
        parts.push(format!("{} failed", totals.failed));
    }
    if totals.over_budget > 0 {
        parts.push(format!("{} over budget", totals.over_budget));
    }
    if totals.incomplete > 0 {
        parts.push(format!("{} skipped", plural(totals.incomplete, "incomplete pair")));
    }
    vec![parts.join(", ")]
}

pub fn print_summary(report: &RunReport) {
    for line in format_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Upload mode
// ============================================================================

/// One line per merged upload pair, then one per failure.
///
/// With `links` set each artifact is shown as a data-URI download link
/// instead of its size.
pub fn format_merge_response(response: &MergeResponse, links: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for merged in &response.merged {
        let artifact = &merged.artifact;
        if links {
            lines.push(format!(
                "{}: {}",
                merged.file_name,
                data_uri(artifact.format, &artifact.bytes)
            ));
        } else {
            let mut detail = format_kb(artifact.bytes.len() as u64);
            if artifact.budget.is_unmet() {
                detail.push_str(", over budget");
            }
            lines.push(format!(
                "{} {} + {} → {} ({})",
                merged.label, merged.sources[0], merged.sources[1], merged.file_name, detail
            ));
        }
    }
    for failure in &response.failures {
        lines.push(failure.to_string());
    }
    lines
}

pub fn print_merge_response(response: &MergeResponse, links: bool) {
    for line in format_merge_response(response, links) {
        println!("{}", line);
    }
}
