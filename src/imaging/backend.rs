//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two codec operations the encoder
//! needs: decode source bytes into a raster and encode a raster at a given
//! quality. Composition, budget fitting and PDF wrapping are built on top of
//! these two calls in [`operations`](super::operations), so a mock backend can
//! count and shape every encode attempt.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust, built on the
//! `image` crate.

use super::params::{Quality, RasterFormat};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Compose failed: {0}")]
    Compose(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("PDF assembly failed: {0}")]
    Pdf(String),
}

impl BackendError {
    /// Pipeline stage that produced the error, for user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            BackendError::Decode(_) => "decode",
            BackendError::Compose(_) => "compose",
            BackendError::Encode(_) => "encode",
            BackendError::Pdf(_) => "pdf",
        }
    }
}

/// Width and height of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image codec backends.
///
/// `Sync` so one backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Decode PNG/JPEG bytes into a raster.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError>;

    /// Encode a raster. `quality` is ignored by lossless formats.
    fn encode(
        &self,
        image: &DynamicImage,
        format: RasterFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
