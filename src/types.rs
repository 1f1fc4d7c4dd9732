//! Shared types for the run report.
//!
//! [`RunReport`] is built by [`process`](crate::process), printed by
//! [`output`](crate::output) and written as JSON by the CLI's `--report` flag.

use crate::imaging::{BudgetStatus, Dimensions, OutputFormat};
use serde::{Deserialize, Serialize};

/// What happened to every pair in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub format: OutputFormat,
    /// Budget in kilobytes, `None` when unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_kb: Option<u64>,
    pub pairs: Vec<PairRecord>,
    /// Base names skipped for a missing half.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete: Vec<String>,
    /// Files that could not take part in any pair.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

/// One pair: its sources and its fate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    /// Base name (folder mode) or `image_{n}` label (upload mode).
    pub name: String,
    pub sources: [String; 2],
    #[serde(flatten)]
    pub status: PairStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PairStatus {
    Written {
        artifact: String,
        location: String,
        bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<u32>,
        attempts: usize,
        dimensions: Dimensions,
        budget: BudgetStatus,
    },
    Failed {
        stage: String,
        message: String,
    },
}

/// Counts across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub written: usize,
    pub failed: usize,
    /// Written artifacts still over their budget.
    pub over_budget: usize,
    pub incomplete: usize,
}

impl RunReport {
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            incomplete: self.incomplete.len(),
            ..RunTotals::default()
        };
        for record in &self.pairs {
            match &record.status {
                PairStatus::Written { budget, .. } => {
                    totals.written += 1;
                    if budget.is_unmet() {
                        totals.over_budget += 1;
                    }
                }
                PairStatus::Failed { .. } => totals.failed += 1,
            }
        }
        totals
    }
}
