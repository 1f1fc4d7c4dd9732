//! Batch driver: runs every pair through the merge-and-fit encoder.
//!
//! Each pair is isolated. A read, decode, compose, encode or store failure is
//! captured in that pair's [`PairOutcome`] and the batch moves on; only
//! pairing-level problems (an odd upload count) stop a run before it starts.
//!
//! ## Modes
//!
//! - [`process_pairs`]: folder-mode pairs, read from disk, artifacts handed to
//!   an [`ArtifactSink`]. Progress is streamed as [`ProcessEvent`]s.
//! - [`merge_uploads`]: upload-order mode on in-memory bytes. Pure
//!   request/response, nothing touches the disk.
//!
//! ## Parallel Processing
//!
//! Pairs are independent, so they run in parallel on the global
//! [rayon](https://docs.rs/rayon) pool. Outcomes come back in pair order; the
//! sink serializes concurrent stores.
//!
//! Nothing here warns the user. Failures and missed budgets travel in the
//! outcomes and events; `tracing` only carries diagnostics below `warn`.

use crate::imaging::{
    BackendError, BudgetStatus, Dimensions, EncodeRequest, EncodedArtifact, ImageBackend,
    OutputFormat, merge_pair,
};
use crate::naming::{NamingStyle, artifact_name, upload_artifact_name};
use crate::scan::{Pair, PairingError, PairingReport, pair_in_order};
use crate::sink::{ArtifactSink, SinkError};
use crate::types::{PairRecord, PairStatus, RunReport};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info};

/// Failure of a single pair. Never aborts the batch.
#[derive(Error, Debug)]
pub enum PairError {
    #[error("{name}: failed to read {}: {source}", .path.display())]
    Read {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name}: {} failed: {source}", .source.stage())]
    Imaging {
        name: String,
        #[source]
        source: BackendError,
    },
    #[error("{name}: failed to store {artifact}: {source}")]
    Store {
        name: String,
        artifact: String,
        #[source]
        source: SinkError,
    },
}

impl PairError {
    /// Name of the pair that failed.
    pub fn name(&self) -> &str {
        match self {
            PairError::Read { name, .. }
            | PairError::Imaging { name, .. }
            | PairError::Store { name, .. } => name,
        }
    }

    /// Pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PairError::Read { .. } => "read",
            PairError::Imaging { source, .. } => source.stage(),
            PairError::Store { .. } => "store",
        }
    }
}

/// Settings shared by every pair in a folder-mode run.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub request: EncodeRequest,
    pub naming: NamingStyle,
}

/// Where a successfully written artifact ended up, and how it was encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenArtifact {
    pub file_name: String,
    pub location: String,
    pub format: OutputFormat,
    pub bytes: u64,
    pub quality: Option<u32>,
    pub attempts: usize,
    pub dimensions: Dimensions,
    pub budget: BudgetStatus,
}

impl WrittenArtifact {
    fn new(file_name: String, location: String, artifact: &EncodedArtifact) -> Self {
        Self {
            file_name,
            location,
            format: artifact.format,
            bytes: artifact.bytes.len() as u64,
            quality: artifact.quality.map(|q| q.value()),
            attempts: artifact.attempts,
            dimensions: artifact.dimensions,
            budget: artifact.budget,
        }
    }
}

/// Result for one folder-mode pair.
#[derive(Debug)]
pub struct PairOutcome {
    /// 1-based position in the batch.
    pub index: usize,
    pub name: String,
    pub sources: [String; 2],
    pub result: Result<WrittenArtifact, PairError>,
}

/// Progress events streamed while a batch runs.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    BatchStarted {
        pair_count: usize,
        format: OutputFormat,
    },
    PairWritten {
        index: usize,
        name: String,
        artifact: WrittenArtifact,
    },
    PairFailed {
        index: usize,
        name: String,
        stage: &'static str,
        message: String,
    },
}

fn emit(events: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is printing progress.
        let _ = tx.send(event);
    }
}

fn log_artifact(name: &str, artifact: &EncodedArtifact) {
    info!(
        pair = name,
        format = %artifact.format,
        bytes = artifact.bytes.len(),
        attempts = artifact.attempts,
        "artifact encoded"
    );
    if let BudgetStatus::Unmet {
        limit_bytes,
        actual_bytes,
    } = artifact.budget
    {
        debug!(
            pair = name,
            limit_bytes, actual_bytes, "size budget not met, keeping best effort"
        );
    }
}

fn read_source(name: &str, path: &Path) -> Result<Vec<u8>, PairError> {
    std::fs::read(path).map_err(|source| PairError::Read {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

fn process_one(
    backend: &impl ImageBackend,
    pair: &Pair,
    settings: &Settings,
    sink: &dyn ArtifactSink,
) -> Result<WrittenArtifact, PairError> {
    let first = read_source(&pair.base, &pair.first.path)?;
    let second = read_source(&pair.base, &pair.second.path)?;

    let artifact =
        merge_pair(backend, &first, &second, &settings.request).map_err(|source| {
            PairError::Imaging {
                name: pair.base.clone(),
                source,
            }
        })?;
    log_artifact(&pair.base, &artifact);

    let file_name = artifact_name(
        &pair.base,
        settings.naming,
        settings.request.format.extension(),
    );
    let location = sink
        .store(&file_name, &artifact.bytes)
        .map_err(|source| PairError::Store {
            name: pair.base.clone(),
            artifact: file_name.clone(),
            source,
        })?;
    Ok(WrittenArtifact::new(file_name, location, &artifact))
}

/// Merge, encode and store every folder-mode pair.
///
/// Returns one outcome per pair, in input order. Failed pairs do not affect
/// the others.
pub fn process_pairs(
    backend: &impl ImageBackend,
    pairs: &[Pair],
    settings: &Settings,
    sink: &dyn ArtifactSink,
    events: Option<Sender<ProcessEvent>>,
) -> Vec<PairOutcome> {
    emit(
        events.as_ref(),
        ProcessEvent::BatchStarted {
            pair_count: pairs.len(),
            format: settings.request.format,
        },
    );

    pairs
        .par_iter()
        .enumerate()
        .map(|(offset, pair)| {
            let index = offset + 1;
            let result = process_one(backend, pair, settings, sink);
            match &result {
                Ok(artifact) => emit(
                    events.as_ref(),
                    ProcessEvent::PairWritten {
                        index,
                        name: pair.base.clone(),
                        artifact: artifact.clone(),
                    },
                ),
                Err(e) => {
                    debug!(pair = %pair.base, stage = e.stage(), "{e}");
                    emit(
                        events.as_ref(),
                        ProcessEvent::PairFailed {
                            index,
                            name: pair.base.clone(),
                            stage: e.stage(),
                            message: e.to_string(),
                        },
                    );
                }
            }
            PairOutcome {
                index,
                name: pair.base.clone(),
                sources: [pair.first.file_name.clone(), pair.second.file_name.clone()],
                result,
            }
        })
        .collect()
}

/// Summarise a folder-mode run for printing or `--report`.
pub fn build_report(
    request: &EncodeRequest,
    pairing: &PairingReport,
    outcomes: &[PairOutcome],
) -> RunReport {
    let pairs = outcomes
        .iter()
        .map(|outcome| PairRecord {
            name: outcome.name.clone(),
            sources: outcome.sources.clone(),
            status: match &outcome.result {
                Ok(written) => PairStatus::Written {
                    artifact: written.file_name.clone(),
                    location: written.location.clone(),
                    bytes: written.bytes,
                    quality: written.quality,
                    attempts: written.attempts,
                    dimensions: written.dimensions,
                    budget: written.budget,
                },
                Err(e) => PairStatus::Failed {
                    stage: e.stage().to_string(),
                    message: e.to_string(),
                },
            },
        })
        .collect();

    RunReport {
        format: request.format,
        budget_kb: request
            .budget
            .filter(|_| !request.format.is_lossless())
            .map(|b| b.kilobytes),
        pairs,
        incomplete: pairing.incomplete.iter().map(|g| g.base.clone()).collect(),
        ignored: pairing.ignored.iter().map(|i| i.file_name.clone()).collect(),
    }
}

// ============================================================================
// Upload mode
// ============================================================================

/// One uploaded image: its original name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Everything needed to merge a list of uploads.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// Uploads in the order they were given. Paired two at a time.
    pub uploads: Vec<Upload>,
    pub encode: EncodeRequest,
}

/// A merged upload pair, ready to be served or packaged.
#[derive(Debug, Clone)]
pub struct MergedUpload {
    /// `image_{n}`.
    pub label: String,
    /// `image_{n}_merged.{ext}`.
    pub file_name: String,
    pub sources: [String; 2],
    pub artifact: EncodedArtifact,
}

#[derive(Debug, Default)]
pub struct MergeResponse {
    /// Successful pairs, in upload order.
    pub merged: Vec<MergedUpload>,
    /// Failed pairs, in upload order.
    pub failures: Vec<PairError>,
}

impl MergeResponse {
    /// Hand every merged artifact to `sink`, in order.
    pub fn store_all(&self, sink: &dyn ArtifactSink) -> Result<Vec<String>, PairError> {
        self.merged
            .iter()
            .map(|m| {
                sink.store(&m.file_name, &m.artifact.bytes)
                    .map_err(|source| PairError::Store {
                        name: m.label.clone(),
                        artifact: m.file_name.clone(),
                        source,
                    })
            })
            .collect()
    }
}

/// Pair uploads in order and merge each pair in memory.
///
/// An odd number of uploads fails the whole request before any decoding.
pub fn merge_uploads(
    backend: &impl ImageBackend,
    request: MergeRequest,
) -> Result<MergeResponse, PairingError> {
    let pairs = pair_in_order(request.uploads)?;
    let encode = &request.encode;

    let results: Vec<Result<MergedUpload, PairError>> = pairs
        .into_par_iter()
        .enumerate()
        .map(|(offset, pair)| -> Result<MergedUpload, PairError> {
            let artifact = merge_pair(backend, &pair.first.bytes, &pair.second.bytes, encode)
                .map_err(|source| PairError::Imaging {
                    name: pair.label.clone(),
                    source,
                })?;
            log_artifact(&pair.label, &artifact);
            Ok(MergedUpload {
                file_name: upload_artifact_name(offset + 1, encode.format.extension()),
                label: pair.label,
                sources: [pair.first.name, pair.second.name],
                artifact,
            })
        })
        .collect();

    let mut response = MergeResponse::default();
    for result in results {
        match result {
            Ok(merged) => response.merged.push(merged),
            Err(e) => {
                debug!(pair = e.name(), stage = e.stage(), "{e}");
                response.failures.push(e);
            }
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{RustBackend, SizeBudget};
    use crate::scan::pair_folder;
    use crate::sink::{DirectorySink, MemorySink};
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn upload(name: &str, bytes: Vec<u8>) -> Upload {
        Upload {
            name: name.into(),
            bytes,
        }
    }

    // =========================================================================
    // Folder mode
    // =========================================================================

    #[test]
    fn folder_pairs_are_written_with_ab_names() {
        let input = input_folder(&[
            ("beach_a.jpg", (40, 30)),
            ("beach_b.png", (40, 20)),
            ("dunes_a.jpg", (10, 10)),
        ]);
        let out = TempDir::new().unwrap();
        let sink = DirectorySink::create(out.path()).unwrap();
        let report = pair_folder(input.path()).unwrap();

        let outcomes = process_pairs(
            &RustBackend::new(),
            &report.pairs,
            &Settings::default(),
            &sink,
            None,
        );

        assert_eq!(outcomes.len(), 1);
        let written = outcomes[0].result.as_ref().unwrap();
        assert_eq!(written.file_name, "beach_ab.jpg");
        assert_eq!(written.dimensions, Dimensions { width: 80, height: 30 });
        assert_eq!(file_names(out.path()), vec!["beach_ab.jpg"]);
    }

    #[test]
    fn merged_naming_style() {
        let input = input_folder(&[("x_a.png", (8, 8)), ("x_b.png", (8, 8))]);
        let sink = MemorySink::new();
        let report = pair_folder(input.path()).unwrap();
        let settings = Settings {
            request: EncodeRequest {
                format: OutputFormat::Png,
                ..EncodeRequest::default()
            },
            naming: NamingStyle::Merged,
        };

        process_pairs(&RustBackend::new(), &report.pairs, &settings, &sink, None);

        let names: Vec<String> = sink.into_entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x_merged.png"]);
    }

    #[test]
    fn bad_pair_does_not_affect_others() {
        let input = input_folder(&[
            ("good_a.jpg", (20, 20)),
            ("good_b.jpg", (20, 20)),
            ("junk_a.jpg", (20, 20)),
            ("later_a.png", (10, 10)),
            ("later_b.png", (10, 10)),
        ]);
        std::fs::write(input.path().join("junk_b.jpg"), b"not a jpeg").unwrap();
        let sink = MemorySink::new();
        let report = pair_folder(input.path()).unwrap();

        let outcomes = process_pairs(
            &RustBackend::new(),
            &report.pairs,
            &Settings::default(),
            &sink,
            None,
        );

        let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["good", "junk", "later"]);
        assert!(outcomes[0].result.is_ok());
        let err = outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(err.stage(), "decode");
        assert!(err.to_string().starts_with("junk: decode failed"));
        assert!(outcomes[2].result.is_ok());
        assert_eq!(sink.into_entries().len(), 2);
    }

    #[test]
    fn missing_source_is_a_read_failure() {
        let input = input_folder(&[("x_a.png", (8, 8)), ("x_b.png", (8, 8))]);
        let report = pair_folder(input.path()).unwrap();
        std::fs::remove_file(input.path().join("x_b.png")).unwrap();

        let outcomes = process_pairs(
            &RustBackend::new(),
            &report.pairs,
            &Settings::default(),
            &MemorySink::new(),
            None,
        );
        assert_eq!(outcomes[0].result.as_ref().unwrap_err().stage(), "read");
    }

    #[test]
    fn events_are_streamed() {
        let input = input_folder(&[
            ("x_a.png", (8, 8)),
            ("x_b.png", (8, 8)),
            ("y_a.png", (8, 8)),
        ]);
        std::fs::write(input.path().join("y_b.png"), b"broken").unwrap();
        let report = pair_folder(input.path()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        process_pairs(
            &RustBackend::new(),
            &report.pairs,
            &Settings::default(),
            &MemorySink::new(),
            Some(tx),
        );

        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert!(matches!(
            events[0],
            ProcessEvent::BatchStarted { pair_count: 2, .. }
        ));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProcessEvent::PairWritten { .. }))
                .count(),
            1
        );
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::PairFailed { name, stage: "decode", .. } if name == "y"
        )));
    }

    #[test]
    fn report_reflects_outcomes_and_pairing() {
        let input = input_folder(&[
            ("x_a.png", (8, 8)),
            ("x_b.png", (8, 8)),
            ("y_a.png", (8, 8)),
            ("cover.png", (8, 8)),
        ]);
        let pairing = pair_folder(input.path()).unwrap();
        let settings = Settings::default();
        let outcomes = process_pairs(
            &RustBackend::new(),
            &pairing.pairs,
            &settings,
            &MemorySink::new(),
            None,
        );

        let report = build_report(&settings.request, &pairing, &outcomes);
        assert_eq!(report.budget_kb, Some(100));
        assert_eq!(report.incomplete, vec!["y"]);
        assert_eq!(report.ignored, vec!["cover.png"]);
        assert_eq!(report.totals().written, 1);
        assert_eq!(report.pairs[0].sources, ["x_a.png".to_string(), "x_b.png".to_string()]);
    }

    // =========================================================================
    // Upload mode
    // =========================================================================

    #[test]
    fn uploads_are_merged_in_order() {
        let request = MergeRequest {
            uploads: vec![
                upload("one.jpg", jpeg_bytes(30, 20)),
                upload("two.png", png_bytes(10, 25)),
                upload("three.jpg", jpeg_bytes(5, 5)),
                upload("four.jpg", jpeg_bytes(5, 5)),
            ],
            encode: EncodeRequest::default(),
        };

        let response = merge_uploads(&RustBackend::new(), request).unwrap();

        assert!(response.failures.is_empty());
        assert_eq!(response.merged.len(), 2);
        let first = &response.merged[0];
        assert_eq!(first.label, "image_1");
        assert_eq!(first.file_name, "image_1_merged.jpg");
        assert_eq!(first.sources, ["one.jpg".to_string(), "two.png".to_string()]);
        assert_eq!(first.artifact.dimensions, Dimensions { width: 40, height: 25 });
        assert_eq!(response.merged[1].file_name, "image_2_merged.jpg");
    }

    #[test]
    fn odd_upload_count_processes_nothing() {
        let backend = MockBackend::new();
        let request = MergeRequest {
            uploads: vec![
                upload("a", vec![1]),
                upload("b", vec![2]),
                upload("c", vec![3]),
            ],
            encode: EncodeRequest::default(),
        };

        let result = merge_uploads(&backend, request);

        assert!(matches!(
            result,
            Err(PairingError::InputCountOdd { count: 3 })
        ));
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn failing_upload_pair_is_reported_and_others_survive() {
        let request = MergeRequest {
            uploads: vec![
                upload("bad.jpg", b"garbage".to_vec()),
                upload("ok.jpg", jpeg_bytes(8, 8)),
                upload("c.jpg", jpeg_bytes(8, 8)),
                upload("d.jpg", jpeg_bytes(8, 8)),
            ],
            encode: EncodeRequest::default(),
        };

        let response = merge_uploads(&RustBackend::new(), request).unwrap();

        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].name(), "image_1");
        assert_eq!(response.merged.len(), 1);
        assert_eq!(response.merged[0].label, "image_2");
        assert_eq!(response.merged[0].file_name, "image_2_merged.jpg");
    }

    #[test]
    fn upload_pdf_artifacts_are_named_pdf() {
        let request = MergeRequest {
            uploads: vec![
                upload("a.png", png_bytes(20, 10)),
                upload("b.png", png_bytes(20, 10)),
            ],
            encode: EncodeRequest {
                format: OutputFormat::Pdf,
                budget: Some(SizeBudget::from_kb(100)),
                ..EncodeRequest::default()
            },
        };

        let response = merge_uploads(&RustBackend::new(), request).unwrap();
        let merged = &response.merged[0];
        assert_eq!(merged.file_name, "image_1_merged.pdf");
        assert!(merged.artifact.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn store_all_writes_every_artifact() {
        let request = MergeRequest {
            uploads: vec![
                upload("a.png", png_bytes(4, 4)),
                upload("b.png", png_bytes(4, 4)),
            ],
            encode: EncodeRequest::default(),
        };
        let response = merge_uploads(&RustBackend::new(), request).unwrap();
        let sink = MemorySink::new();

        let locations = response.store_all(&sink).unwrap();
        assert_eq!(locations, vec!["memory:image_1_merged.jpg"]);
    }
}
