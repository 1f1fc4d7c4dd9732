//! High-level image operations.
//!
//! These functions combine calculations with backend execution: build the
//! collage, then encode it in the requested format, walking the quality
//! schedule down until the artifact fits its [`SizeBudget`].

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{collage_dimensions, fit_within, quality_schedule};
use super::params::{
    EncodeRequest, OutputFormat, PdfReduction, Quality, RasterFormat, ReductionPlan, SizeBudget,
};
use super::pdf;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Whether an artifact honoured its size budget.
///
/// An unmet budget is not an error: the oversized artifact is still delivered
/// and the caller decides how loudly to warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetStatus {
    /// No budget was configured (or the format is never reduced).
    Unlimited,
    Met { limit_bytes: u64 },
    Unmet { limit_bytes: u64, actual_bytes: u64 },
}

impl BudgetStatus {
    fn evaluate(budget: SizeBudget, len: usize) -> Self {
        if budget.admits(len) {
            BudgetStatus::Met {
                limit_bytes: budget.bytes(),
            }
        } else {
            BudgetStatus::Unmet {
                limit_bytes: budget.bytes(),
                actual_bytes: len as u64,
            }
        }
    }

    pub fn is_unmet(self) -> bool {
        matches!(self, BudgetStatus::Unmet { .. })
    }
}

/// Encoded output for one pair.
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    /// Quality of the final JPEG encode (`None` for PNG).
    pub quality: Option<Quality>,
    /// Number of encodes performed, including the accepted one.
    pub attempts: usize,
    /// Pixel size of the encoded raster (after any downsampling).
    pub dimensions: Dimensions,
    pub budget: BudgetStatus,
}

/// Place `first` at the origin and `second` directly to its right.
///
/// The canvas is `width(first) + width(second)` wide and as tall as the taller
/// image; uncovered area stays black. Alpha is dropped.
pub fn compose(first: &DynamicImage, second: &DynamicImage) -> Result<DynamicImage> {
    let a = Dimensions::of(first);
    let b = Dimensions::of(second);
    if a.width == 0 || a.height == 0 || b.width == 0 || b.height == 0 {
        return Err(BackendError::Compose(format!(
            "cannot merge empty image ({}x{} + {}x{})",
            a.width, a.height, b.width, b.height
        )));
    }

    let (width, height) = collage_dimensions(a.as_tuple(), b.as_tuple()).ok_or_else(|| {
        BackendError::Compose(format!(
            "combined width {} + {} overflows",
            a.width, b.width
        ))
    })?;
    let pixels = u64::from(width) * u64::from(height) * 3;
    if pixels > isize::MAX as u64 {
        return Err(BackendError::Compose(format!(
            "collage of {width}x{height} is too large"
        )));
    }

    let mut canvas = RgbImage::new(width, height);
    imageops::replace(&mut canvas, &first.to_rgb8(), 0, 0);
    imageops::replace(&mut canvas, &second.to_rgb8(), i64::from(a.width), 0);
    Ok(DynamicImage::ImageRgb8(canvas))
}

/// Outcome of walking a quality schedule.
struct Attempt {
    bytes: Vec<u8>,
    quality: Quality,
    attempts: usize,
}

/// Encode along `schedule` until the output fits `budget`.
///
/// Returns the first fitting encode, or the last one when the schedule runs
/// out. Stops as soon as something fits, so an input that already fits at the
/// first quality costs exactly one encode.
fn first_fit<F>(schedule: &[Quality], budget: SizeBudget, mut encode: F) -> Result<Attempt>
where
    F: FnMut(Quality) -> Result<Vec<u8>>,
{
    let mut last = None;
    for (index, &quality) in schedule.iter().enumerate() {
        let bytes = encode(quality)?;
        debug!(
            quality = quality.value(),
            bytes = bytes.len(),
            limit = budget.bytes(),
            "encode attempt"
        );
        let fits = budget.admits(bytes.len());
        last = Some(Attempt {
            bytes,
            quality,
            attempts: index + 1,
        });
        if fits {
            break;
        }
    }
    last.ok_or_else(|| BackendError::Encode("empty quality schedule".to_string()))
}

/// Encode `image` as JPEG, reducing quality until it fits `budget`.
///
/// With a downsample box in the plan the image is shrunk into it once before
/// the first encode. Without a budget a single encode at `plan.start` is made.
pub fn fit_to_budget(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    plan: &ReductionPlan,
    budget: Option<SizeBudget>,
) -> Result<EncodedArtifact> {
    let downsampled;
    let image = match plan.downsample {
        Some(bounds) => {
            let source = Dimensions::of(image).as_tuple();
            let (w, h) = fit_within(source, bounds);
            if (w, h) == source {
                image
            } else {
                debug!(from = ?source, to = ?(w, h), "downsampling before quality loop");
                downsampled = image.resize_exact(w, h, FilterType::Lanczos3);
                &downsampled
            }
        }
        None => image,
    };
    let dimensions = Dimensions::of(image);

    let Some(budget) = budget else {
        let bytes = backend.encode(image, RasterFormat::Jpeg, plan.start)?;
        return Ok(EncodedArtifact {
            format: OutputFormat::Jpeg,
            bytes,
            quality: Some(plan.start),
            attempts: 1,
            dimensions,
            budget: BudgetStatus::Unlimited,
        });
    };

    let schedule = quality_schedule(plan);
    let attempt = first_fit(&schedule, budget, |quality| {
        backend.encode(image, RasterFormat::Jpeg, quality)
    })?;
    let status = BudgetStatus::evaluate(budget, attempt.bytes.len());

    Ok(EncodedArtifact {
        format: OutputFormat::Jpeg,
        bytes: attempt.bytes,
        quality: Some(attempt.quality),
        attempts: attempt.attempts,
        dimensions,
        budget: status,
    })
}

/// Wrap `collage` in a one-page PDF and bring the document under budget.
fn fit_pdf(
    backend: &impl ImageBackend,
    collage: &DynamicImage,
    request: &EncodeRequest,
) -> Result<EncodedArtifact> {
    let dimensions = Dimensions::of(collage);
    let embed = |quality: Quality| -> Result<Vec<u8>> {
        let jpeg = backend.encode(collage, RasterFormat::Jpeg, quality)?;
        pdf::single_page_document(jpeg, dimensions, request.page)
    };
    let artifact = |bytes: Vec<u8>, quality: Quality, attempts: usize, budget: BudgetStatus| {
        EncodedArtifact {
            format: OutputFormat::Pdf,
            bytes,
            quality: Some(quality),
            attempts,
            dimensions,
            budget,
        }
    };

    let Some(budget) = request.budget else {
        let document = embed(request.pdf_embed_quality)?;
        return Ok(artifact(
            document,
            request.pdf_embed_quality,
            1,
            BudgetStatus::Unlimited,
        ));
    };

    match request.pdf_reduction {
        PdfReduction::Rebuild => {
            let original = embed(request.pdf_embed_quality)?;
            let rebuilt = pdf::rebuild_document(&original)?;
            let kept = if budget.admits(rebuilt.len()) {
                rebuilt
            } else {
                debug!(
                    bytes = rebuilt.len(),
                    "rebuilt document still over budget, keeping original"
                );
                original
            };
            let status = BudgetStatus::evaluate(budget, kept.len());
            Ok(artifact(kept, request.pdf_embed_quality, 1, status))
        }
        PdfReduction::Reencode => {
            let schedule = quality_schedule(&ReductionPlan {
                start: request.pdf_embed_quality,
                downsample: None,
                ..request.plan
            });
            let attempt = first_fit(&schedule, budget, embed)?;
            let status = BudgetStatus::evaluate(budget, attempt.bytes.len());
            Ok(artifact(
                attempt.bytes,
                attempt.quality,
                attempt.attempts,
                status,
            ))
        }
    }
}

/// Encode a collage as the artifact described by `request`.
///
/// - **PNG**: one lossless encode, never reduced.
/// - **JPEG**: [`fit_to_budget`] with the request's plan and budget.
/// - **PDF**: JPEG at the embed quality on a single page, then document reduction.
pub fn encode_collage(
    backend: &impl ImageBackend,
    collage: &DynamicImage,
    request: &EncodeRequest,
) -> Result<EncodedArtifact> {
    match request.format {
        OutputFormat::Png => {
            let bytes = backend.encode(collage, RasterFormat::Png, Quality::default())?;
            Ok(EncodedArtifact {
                format: OutputFormat::Png,
                bytes,
                quality: None,
                attempts: 1,
                dimensions: Dimensions::of(collage),
                budget: BudgetStatus::Unlimited,
            })
        }
        OutputFormat::Jpeg => fit_to_budget(backend, collage, &request.plan, request.budget),
        OutputFormat::Pdf => fit_pdf(backend, collage, request),
    }
}

/// Decode both halves of a pair, merge them and encode the collage.
pub fn merge_pair(
    backend: &impl ImageBackend,
    first: &[u8],
    second: &[u8],
    request: &EncodeRequest,
) -> Result<EncodedArtifact> {
    let first = backend.decode(first)?;
    let second = backend.decode(second)?;
    let collage = compose(&first, &second)?;
    encode_collage(backend, &collage, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::{jpeg_bytes, noise_image, solid_image};
    use image::Rgb;

    fn jpeg_request(budget_kb: Option<u64>) -> EncodeRequest {
        EncodeRequest {
            format: OutputFormat::Jpeg,
            budget: budget_kb.map(SizeBudget::from_kb),
            ..EncodeRequest::default()
        }
    }

    // =========================================================================
    // compose
    // =========================================================================

    #[test]
    fn compose_dimensions() {
        let collage = compose(&solid_image(400, 300, [255, 0, 0]), &solid_image(400, 300, [0, 0, 255]))
            .unwrap();
        assert_eq!((collage.width(), collage.height()), (800, 300));
    }

    #[test]
    fn compose_places_second_to_the_right() {
        let collage = compose(&solid_image(10, 10, [255, 0, 0]), &solid_image(5, 10, [0, 0, 255]))
            .unwrap()
            .to_rgb8();
        assert_eq!(collage.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(collage.get_pixel(9, 9), &Rgb([255, 0, 0]));
        assert_eq!(collage.get_pixel(10, 0), &Rgb([0, 0, 255]));
        assert_eq!(collage.get_pixel(14, 9), &Rgb([0, 0, 255]));
    }

    #[test]
    fn compose_fills_uncovered_area_black() {
        let collage = compose(&solid_image(10, 4, [255, 255, 255]), &solid_image(10, 8, [255, 255, 255]))
            .unwrap()
            .to_rgb8();
        assert_eq!(collage.dimensions(), (20, 8));
        assert_eq!(collage.get_pixel(3, 6), &Rgb([0, 0, 0]));
        assert_eq!(collage.get_pixel(13, 6), &Rgb([255, 255, 255]));
    }

    #[test]
    fn compose_flattens_alpha_inputs() {
        let rgba = DynamicImage::new_rgba8(6, 6);
        let collage = compose(&rgba, &solid_image(6, 6, [1, 2, 3])).unwrap();
        assert!(matches!(collage, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn compose_rejects_empty_image() {
        let result = compose(&DynamicImage::new_rgb8(0, 10), &solid_image(5, 5, [0, 0, 0]));
        assert!(matches!(result, Err(BackendError::Compose(_))));
    }

    // =========================================================================
    // fit_to_budget with mock backend
    // =========================================================================

    #[test]
    fn fitting_at_start_quality_encodes_once() {
        let backend = MockBackend::with_size_curve(|_| 10 * 1024);
        let img = solid_image(8, 8, [0, 0, 0]);

        let artifact =
            fit_to_budget(&backend, &img, &ReductionPlan::default(), Some(SizeBudget::from_kb(100)))
                .unwrap();

        assert_eq!(backend.encode_count(), 1);
        assert_eq!(artifact.attempts, 1);
        assert_eq!(artifact.quality, Some(Quality::new(95)));
        assert_eq!(artifact.budget, BudgetStatus::Met { limit_bytes: 102_400 });
    }

    #[test]
    fn quality_steps_down_by_five_until_fit() {
        // 2 KB per quality point: fits (≤ 100 KB) once quality ≤ 50
        let backend = MockBackend::with_size_curve(|q| q as usize * 2048);
        let img = solid_image(8, 8, [0, 0, 0]);

        let artifact =
            fit_to_budget(&backend, &img, &ReductionPlan::default(), Some(SizeBudget::from_kb(100)))
                .unwrap();

        assert_eq!(
            backend.encoded_qualities(),
            vec![95, 90, 85, 80, 75, 70, 65, 60, 55, 50]
        );
        assert_eq!(artifact.quality, Some(Quality::new(50)));
        assert_eq!(artifact.attempts, 10);
        assert!(!artifact.budget.is_unmet());
    }

    #[test]
    fn never_fitting_stops_after_eighteen_attempts() {
        let backend = MockBackend::with_size_curve(|_| 1024 * 1024);
        let img = solid_image(8, 8, [0, 0, 0]);

        let artifact =
            fit_to_budget(&backend, &img, &ReductionPlan::default(), Some(SizeBudget::from_kb(100)))
                .unwrap();

        assert_eq!(backend.encode_count(), 18);
        assert_eq!(backend.encoded_qualities().last(), Some(&10));
        assert_eq!(artifact.quality, Some(Quality::new(10)));
        assert_eq!(
            artifact.budget,
            BudgetStatus::Unmet {
                limit_bytes: 102_400,
                actual_bytes: 1024 * 1024
            }
        );
        // The oversized result is still delivered
        assert_eq!(artifact.bytes.len(), 1024 * 1024);
    }

    #[test]
    fn no_budget_means_single_encode() {
        let backend = MockBackend::with_size_curve(|_| 10 * 1024 * 1024);
        let img = solid_image(8, 8, [0, 0, 0]);

        let artifact = fit_to_budget(&backend, &img, &ReductionPlan::default(), None).unwrap();

        assert_eq!(backend.encode_count(), 1);
        assert_eq!(artifact.budget, BudgetStatus::Unlimited);
    }

    #[test]
    fn downsample_happens_before_first_encode() {
        let backend = MockBackend::with_size_curve(|_| 1024);
        let img = solid_image(1600, 600, [9, 9, 9]);
        let plan = ReductionPlan::with_downsample((800, 800), Quality::new(85));

        let artifact = fit_to_budget(&backend, &img, &plan, Some(SizeBudget::from_kb(100))).unwrap();

        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Encode {
                format: RasterFormat::Jpeg,
                quality: 85,
                width: 800,
                height: 300,
            }]
        );
        assert_eq!(artifact.dimensions, Dimensions { width: 800, height: 300 });
    }

    #[test]
    fn encoder_failure_propagates() {
        let backend = MockBackend::failing_encode();
        let img = solid_image(8, 8, [0, 0, 0]);
        let result = fit_to_budget(&backend, &img, &ReductionPlan::default(), Some(SizeBudget::default()));
        assert!(matches!(result, Err(BackendError::Encode(_))));
    }

    // =========================================================================
    // encode_collage
    // =========================================================================

    #[test]
    fn png_is_never_reduced() {
        let backend = MockBackend::with_size_curve(|_| 10 * 1024 * 1024);
        let request = EncodeRequest {
            format: OutputFormat::Png,
            ..EncodeRequest::default()
        };

        let artifact = encode_collage(&backend, &solid_image(8, 8, [0, 0, 0]), &request).unwrap();

        assert_eq!(backend.encode_count(), 1);
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Encode {
                format: RasterFormat::Png,
                ..
            }
        ));
        assert_eq!(artifact.quality, None);
        assert_eq!(artifact.budget, BudgetStatus::Unlimited);
    }

    #[test]
    fn pdf_embeds_jpeg_at_quality_50() {
        let backend = MockBackend::with_size_curve(|_| 2048);
        let request = EncodeRequest {
            format: OutputFormat::Pdf,
            ..EncodeRequest::default()
        };

        let artifact = encode_collage(&backend, &solid_image(80, 30, [0, 0, 0]), &request).unwrap();

        assert_eq!(backend.encoded_qualities(), vec![50]);
        assert_eq!(artifact.format, OutputFormat::Pdf);
        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert!(!artifact.budget.is_unmet());
    }

    #[test]
    fn pdf_reencode_walks_down_from_embed_quality() {
        // Document = JPEG payload + small overhead; payload fits once quality ≤ 30
        let backend = MockBackend::with_size_curve(|q| q as usize * 3 * 1024);
        let request = EncodeRequest {
            format: OutputFormat::Pdf,
            ..EncodeRequest::default()
        };

        let artifact = encode_collage(&backend, &solid_image(80, 30, [0, 0, 0]), &request).unwrap();

        assert_eq!(backend.encoded_qualities(), vec![50, 45, 40, 35, 30]);
        assert_eq!(artifact.quality, Some(Quality::new(30)));
        assert!(!artifact.budget.is_unmet());
    }

    #[test]
    fn pdf_rebuild_keeps_original_when_over_budget() {
        let backend = MockBackend::with_size_curve(|_| 200 * 1024);
        let request = EncodeRequest {
            format: OutputFormat::Pdf,
            pdf_reduction: PdfReduction::Rebuild,
            ..EncodeRequest::default()
        };

        let artifact = encode_collage(&backend, &solid_image(80, 30, [0, 0, 0]), &request).unwrap();

        assert_eq!(backend.encode_count(), 1);
        assert!(artifact.budget.is_unmet());
        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert_eq!(pdf::page_geometry(&artifact.bytes).unwrap().len(), 1);
    }

    #[test]
    fn pdf_rebuild_within_budget_is_met() {
        let backend = MockBackend::with_size_curve(|_| 1024);
        let request = EncodeRequest {
            format: OutputFormat::Pdf,
            pdf_reduction: PdfReduction::Rebuild,
            ..EncodeRequest::default()
        };

        let artifact = encode_collage(&backend, &solid_image(80, 30, [0, 0, 0]), &request).unwrap();
        assert!(matches!(artifact.budget, BudgetStatus::Met { .. }));
    }

    // =========================================================================
    // Real backend
    // =========================================================================

    #[test]
    fn merge_two_400x300_jpegs() {
        let backend = RustBackend::new();
        let artifact = merge_pair(
            &backend,
            &jpeg_bytes(400, 300),
            &jpeg_bytes(400, 300),
            &jpeg_request(Some(100)),
        )
        .unwrap();

        assert_eq!(artifact.dimensions, Dimensions { width: 800, height: 300 });
        assert!(artifact.bytes.len() as u64 <= 100 * 1024);
        let decoded = backend.decode(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 300));
    }

    #[test]
    fn noisy_collage_is_reduced_below_budget() {
        let backend = RustBackend::new();
        let collage = compose(&noise_image(400, 300, 1), &noise_image(400, 300, 2)).unwrap();

        let unlimited = fit_to_budget(&backend, &collage, &ReductionPlan::default(), None).unwrap();
        let budget_kb = (unlimited.bytes.len() as u64 / 1024) / 2;
        let fitted = fit_to_budget(
            &backend,
            &collage,
            &ReductionPlan::default(),
            Some(SizeBudget::from_kb(budget_kb)),
        )
        .unwrap();

        assert!(fitted.attempts > 1);
        assert!(fitted.quality.unwrap() < Quality::new(95));
        assert!(fitted.bytes.len() < unlimited.bytes.len());
    }

    #[test]
    fn merge_reports_decode_failure() {
        let backend = RustBackend::new();
        let result = merge_pair(&backend, b"junk", &jpeg_bytes(10, 10), &jpeg_request(None));
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }
}
