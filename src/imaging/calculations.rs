//! Pure calculation functions for collage geometry and quality schedules.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{PageSize, Quality, ReductionPlan};

/// Dimensions of the side-by-side collage of two images.
///
/// Returns `None` if the combined width does not fit in a `u32`.
///
/// # Examples
/// ```
/// # use collage_fit::imaging::collage_dimensions;
/// assert_eq!(collage_dimensions((400, 300), (400, 300)), Some((800, 300)));
/// assert_eq!(collage_dimensions((100, 50), (200, 80)), Some((300, 80)));
/// ```
pub fn collage_dimensions(first: (u32, u32), second: (u32, u32)) -> Option<(u32, u32)> {
    let width = first.0.checked_add(second.0)?;
    Some((width, first.1.max(second.1)))
}

/// Shrink `source` to fit inside `bounds`, preserving aspect ratio.
///
/// Never upscales: images already inside the box are returned unchanged.
/// Each output edge is at least 1px.
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Rectangle an image occupies on a PDF page, in points from the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Largest aspect-preserving rectangle for `image` on `page`, centered.
///
/// The image is scaled up or down so one edge spans the full page; the other
/// edge is centered. Nothing is ever stretched.
pub fn place_on_page(image: (u32, u32), page: PageSize) -> Placement {
    let (img_w, img_h) = (image.0.max(1) as f32, image.1.max(1) as f32);
    let scale = (page.width / img_w).min(page.height / img_h);
    let width = img_w * scale;
    let height = img_h * scale;
    Placement {
        x: (page.width - width) / 2.0,
        y: (page.height - height) / 2.0,
        width,
        height,
    }
}

/// Every quality the reduction loop may try, in order.
///
/// Starts at `plan.start` and decreases by `plan.step` while the value stays at
/// or above `plan.floor`. The start value is always included, even when it is
/// already below the floor.
///
/// ```
/// # use collage_fit::imaging::{ReductionPlan, quality_schedule};
/// let schedule = quality_schedule(&ReductionPlan::default());
/// assert_eq!(schedule.len(), 18);
/// assert_eq!(schedule.first().map(|q| q.value()), Some(95));
/// assert_eq!(schedule.last().map(|q| q.value()), Some(10));
/// ```
pub fn quality_schedule(plan: &ReductionPlan) -> Vec<Quality> {
    let step = plan.step.max(1);
    let mut schedule = vec![plan.start];
    let mut current = plan.start.value();
    while current >= step && current - step >= plan.floor {
        current -= step;
        schedule.push(Quality::new(current));
    }
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // collage_dimensions
    // =========================================================================

    #[test]
    fn collage_of_equal_images() {
        assert_eq!(collage_dimensions((400, 300), (400, 300)), Some((800, 300)));
    }

    #[test]
    fn collage_takes_taller_height() {
        assert_eq!(collage_dimensions((100, 50), (200, 80)), Some((300, 80)));
        assert_eq!(collage_dimensions((100, 90), (200, 80)), Some((300, 90)));
    }

    #[test]
    fn collage_width_overflow() {
        assert_eq!(collage_dimensions((u32::MAX, 1), (1, 1)), None);
    }

    #[test]
    fn collage_dimensions_hold_for_many_sizes() {
        for a in [(1, 1), (3, 7), (640, 480), (1920, 1080)] {
            for b in [(1, 9), (480, 640), (1000, 1)] {
                let (w, h) = collage_dimensions(a, b).unwrap();
                assert_eq!(w, a.0 + b.0);
                assert_eq!(h, a.1.max(b.1));
            }
        }
    }

    // =========================================================================
    // fit_within
    // =========================================================================

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within((640, 480), (800, 800)), (640, 480));
    }

    #[test]
    fn fit_within_landscape() {
        // 1600x600 collage into 800x800 → width-bound
        assert_eq!(fit_within((1600, 600), (800, 800)), (800, 300));
    }

    #[test]
    fn fit_within_portrait() {
        assert_eq!(fit_within((1000, 2000), (800, 800)), (400, 800));
    }

    #[test]
    fn fit_within_never_collapses_to_zero() {
        assert_eq!(fit_within((10_000, 1), (800, 800)), (800, 1));
    }

    // =========================================================================
    // place_on_page
    // =========================================================================

    #[test]
    fn wide_collage_spans_page_width() {
        let p = place_on_page((800, 300), PageSize::LETTER);
        assert!((p.width - 612.0).abs() < 1e-3);
        assert!((p.height - 229.5).abs() < 1e-3);
        assert!(p.x.abs() < 1e-3);
        assert!((p.y - (792.0 - 229.5) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn tall_collage_spans_page_height() {
        let p = place_on_page((300, 1200), PageSize::LETTER);
        assert!((p.height - 792.0).abs() < 1e-3);
        assert!((p.width - 198.0).abs() < 1e-3);
        assert!(p.y.abs() < 1e-3);
    }

    #[test]
    fn placement_preserves_aspect_ratio() {
        for dims in [(800, 300), (1, 1), (3000, 200), (123, 4567)] {
            let p = place_on_page(dims, PageSize::LETTER);
            let source = dims.0 as f32 / dims.1 as f32;
            let placed = p.width / p.height;
            assert!((source - placed).abs() / source < 1e-4, "{dims:?}");
            assert!(p.width <= 612.0 + 1e-3 && p.height <= 792.0 + 1e-3);
        }
    }

    // =========================================================================
    // quality_schedule
    // =========================================================================

    #[test]
    fn default_schedule_is_95_to_10() {
        let values: Vec<u32> = quality_schedule(&ReductionPlan::default())
            .iter()
            .map(|q| q.value())
            .collect();
        let expected: Vec<u32> = (2..=19).rev().map(|n| n * 5).collect();
        assert_eq!(values, expected);
        assert_eq!(values.len(), 18);
    }

    #[test]
    fn downsample_schedule_starts_at_85() {
        let plan = ReductionPlan::with_downsample((800, 800), Quality::new(85));
        let schedule = quality_schedule(&plan);
        assert_eq!(schedule[0].value(), 85);
        assert_eq!(schedule.len(), 16);
    }

    #[test]
    fn schedule_strictly_decreases() {
        let schedule = quality_schedule(&ReductionPlan {
            start: Quality::new(73),
            step: 7,
            floor: 12,
            downsample: None,
        });
        assert!(schedule.windows(2).all(|w| w[0] > w[1]));
        assert!(schedule.iter().all(|q| q.value() >= 12));
    }

    #[test]
    fn schedule_with_start_below_floor_tries_once() {
        let schedule = quality_schedule(&ReductionPlan {
            start: Quality::new(5),
            ..ReductionPlan::default()
        });
        assert_eq!(schedule, vec![Quality::new(5)]);
    }
}
