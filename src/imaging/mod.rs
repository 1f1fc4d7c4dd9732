//! Image processing: merge two images, then encode under a size budget.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Compose** | `RgbImage::new` (black canvas) + `imageops::replace` |
//! | **Downsample** | Lanczos3 `resize_exact` into a bounding box |
//! | **Encode → JPEG/PNG** | `JpegEncoder` / `PngEncoder` |
//! | **Wrap → PDF** | `lopdf` single-page document, `/DCTDecode` image |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for collage geometry and quality schedules (unit testable)
//! - **Parameters**: Data structures describing what to encode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **PDF**: document assembly and inspection
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod pdf;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{Placement, collage_dimensions, fit_within, place_on_page, quality_schedule};
pub use operations::{
    BudgetStatus, EncodedArtifact, compose, encode_collage, fit_to_budget, merge_pair,
};
pub use params::{
    EncodeRequest, OutputFormat, PageSize, PdfReduction, Quality, RasterFormat, ReductionPlan,
    SizeBudget,
};
pub use rust_backend::RustBackend;
