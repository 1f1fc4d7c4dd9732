//! Shared test utilities for the collage-fit test suite.
//!
//! Provides synthetic images (so no binary fixtures live in the repo) and
//! helpers that lay out an input folder of `{base}_a` / `{base}_b` files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = input_folder(&[("beach_a.jpg", (400, 300)), ("beach_b.jpg", (400, 300))]);
//! let report = scan::pair_folder(tmp.path()).unwrap();
//! assert_eq!(pair_bases(&report), vec!["beach"]);
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

use crate::scan::PairingReport;

// =========================================================================
// Synthetic images
// =========================================================================

/// Single-colour RGB image.
pub fn solid_image(width: u32, height: u32, colour: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(colour)))
}

/// Smooth diagonal gradient. Compresses well.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    });
    DynamicImage::ImageRgb8(img)
}

/// Deterministic pseudo-random noise. Compresses badly, so JPEG size tracks
/// quality closely.
pub fn noise_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    DynamicImage::ImageRgb8(img)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A gradient image encoded as JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient_image(width, height), ImageFormat::Jpeg)
}

/// A gradient image encoded as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient_image(width, height), ImageFormat::Png)
}

// =========================================================================
// Input folders
// =========================================================================

/// Write a synthetic image to `dir/name`, picking the codec from the extension.
///
/// Names with a non-image extension get a few bytes of text instead.
pub fn write_image(dir: &Path, name: &str, size: (u32, u32)) {
    let lower = name.to_ascii_lowercase();
    let bytes = if lower.ends_with(".png") {
        png_bytes(size.0, size.1)
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        jpeg_bytes(size.0, size.1)
    } else {
        b"not an image".to_vec()
    };
    std::fs::write(dir.join(name), bytes).unwrap();
}

/// Create a temp input folder holding the given `(file name, size)` entries.
pub fn input_folder(files: &[(&str, (u32, u32))]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (name, size) in files {
        write_image(tmp.path(), name, *size);
    }
    tmp
}

// =========================================================================
// Report extractors
// =========================================================================

/// Base names of every complete pair, in report order.
pub fn pair_bases(report: &PairingReport) -> Vec<&str> {
    report.pairs.iter().map(|p| p.base.as_str()).collect()
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
