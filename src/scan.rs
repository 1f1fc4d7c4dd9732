//! Pairer: groups source images into pairs to merge.
//!
//! Two pairing modes exist.
//!
//! ## Folder-name mode
//!
//! Files in one directory are grouped by the `{base}_{suffix}.{ext}` convention
//! (see [`naming`](crate::naming)). A pair is formed only when a group holds
//! both an `a` and a `b` file:
//!
//! ```text
//! input/
//! ├── beach_a.jpg        ┐ pair "beach" (a left, b right)
//! ├── beach_b.jpg        ┘
//! ├── dunes_a.png        ← incomplete: no dunes_b, reported and skipped
//! ├── dunes_c.png        ← suffix is neither a nor b, grouped but never used
//! ├── cover.jpg          ← no "_", ignored
//! └── notes.txt          ← not an image, not listed
//! ```
//!
//! Only `.png`, `.jpg` and `.jpeg` files (case-insensitive) at the top level of
//! the directory are considered. Listing is sorted by file name, so groups come
//! out in a stable order.
//!
//! ## Upload-order mode
//!
//! An ordered list of uploads is consumed two at a time. An odd count is a
//! [`PairingError::InputCountOdd`] and yields no pairs at all.

use crate::imaging::rust_backend::is_supported_input;
use crate::naming::{Half, parse_pair_name, upload_pair_label};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to list directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input folder does not exist or is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Batch-level pairing failure. Nothing is processed when this occurs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("{count} images were supplied; upload mode needs an even number, no pairs were formed")]
    InputCountOdd { count: usize },
}

/// One source file taking part in a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceImage {
    pub file_name: String,
    pub path: PathBuf,
}

impl SourceImage {
    /// Fails with the lossy file name when the name is not valid UTF-8.
    fn from_path(path: PathBuf) -> Result<Self, String> {
        match path.file_name().map(|name| name.to_str().ok_or(name)) {
            Some(Ok(name)) => Ok(Self {
                file_name: name.to_string(),
                path,
            }),
            Some(Err(raw)) => Err(raw.to_string_lossy().into_owned()),
            None => Err(path.display().to_string()),
        }
    }
}

/// A complete folder-mode pair: `first` is the `a` file, `second` the `b` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    pub base: String,
    pub first: SourceImage,
    pub second: SourceImage,
}

/// A base name that never got both halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteGroup {
    pub base: String,
    pub missing: Vec<Half>,
    /// Every file that was grouped under this base.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No `_` in the name, or nothing before it.
    NotPairable,
    /// The file name is not valid UTF-8 and cannot be parsed.
    InvalidName,
    /// The slot for this half was already taken by `kept`.
    DuplicateHalf { half: Half, kept: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredFile {
    pub file_name: String,
    #[serde(flatten)]
    pub reason: IgnoreReason,
}

/// Everything folder-name pairing found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingReport {
    pub pairs: Vec<Pair>,
    pub incomplete: Vec<IncompleteGroup>,
    pub ignored: Vec<IgnoredFile>,
}

/// List the source images directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() && is_supported_input(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Pair every source image in `dir` by naming convention.
pub fn pair_folder(dir: &Path) -> Result<PairingReport, ScanError> {
    let files = list_images(dir)?;
    let report = pair_files(files);
    debug!(
        pairs = report.pairs.len(),
        incomplete = report.incomplete.len(),
        ignored = report.ignored.len(),
        "paired folder"
    );
    Ok(report)
}

#[derive(Default)]
struct Group {
    a: Option<SourceImage>,
    b: Option<SourceImage>,
    files: Vec<String>,
}

/// Group `files` by base name and emit complete pairs.
///
/// Pure: only file names are inspected. Groups keep the order in which their
/// first file appears.
pub fn pair_files(files: impl IntoIterator<Item = PathBuf>) -> PairingReport {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();
    let mut ignored = Vec::new();

    for path in files {
        let source = match SourceImage::from_path(path) {
            Ok(source) => source,
            Err(file_name) => {
                ignored.push(IgnoredFile {
                    file_name,
                    reason: IgnoreReason::InvalidName,
                });
                continue;
            }
        };
        let Some(name) = parse_pair_name(&source.file_name) else {
            ignored.push(IgnoredFile {
                file_name: source.file_name,
                reason: IgnoreReason::NotPairable,
            });
            continue;
        };

        let group = groups.entry(name.base.clone()).or_insert_with(|| {
            order.push(name.base.clone());
            Group::default()
        });
        group.files.push(source.file_name.clone());

        let Some(half) = Half::from_suffix(&name.suffix) else {
            continue;
        };
        let slot = match half {
            Half::A => &mut group.a,
            Half::B => &mut group.b,
        };
        if let Some(kept) = slot.as_ref() {
            ignored.push(IgnoredFile {
                file_name: source.file_name,
                reason: IgnoreReason::DuplicateHalf {
                    half,
                    kept: kept.file_name.clone(),
                },
            });
        } else {
            *slot = Some(source);
        }
    }

    let mut report = PairingReport {
        ignored,
        ..PairingReport::default()
    };
    for base in order {
        let Some(group) = groups.remove(&base) else {
            continue;
        };
        match (group.a, group.b) {
            (Some(first), Some(second)) => report.pairs.push(Pair {
                base,
                first,
                second,
            }),
            (a, b) => {
                let missing = [(Half::A, a.is_none()), (Half::B, b.is_none())]
                    .into_iter()
                    .filter_map(|(half, absent)| absent.then_some(half))
                    .collect();
                report.incomplete.push(IncompleteGroup {
                    base,
                    missing,
                    files: group.files,
                });
            }
        }
    }
    report
}

/// An upload-mode pair, labelled `image_{n}` (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedPair<T> {
    pub label: String,
    pub first: T,
    pub second: T,
}

fn check_even(count: usize) -> Result<(), PairingError> {
    if count % 2 == 0 {
        Ok(())
    } else {
        Err(PairingError::InputCountOdd { count })
    }
}

/// Consume `items` two at a time, in order.
pub fn pair_in_order<T>(items: Vec<T>) -> Result<Vec<OrderedPair<T>>, PairingError> {
    check_even(items.len())?;
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(first), Some(second)) = (items.next(), items.next()) {
        pairs.push(OrderedPair {
            label: upload_pair_label(pairs.len() + 1),
            first,
            second,
        });
    }
    Ok(pairs)
}

/// Lazy, borrowing variant of [`pair_in_order`].
///
/// The parity check happens up front, so an odd count yields no iterator.
pub fn pairs_in_order<T>(
    items: &[T],
) -> Result<impl Iterator<Item = OrderedPair<&T>> + '_, PairingError> {
    check_even(items.len())?;
    Ok(items
        .chunks_exact(2)
        .enumerate()
        .map(|(index, chunk)| OrderedPair {
            label: upload_pair_label(index + 1),
            first: &chunk[0],
            second: &chunk[1],
        }))
}
