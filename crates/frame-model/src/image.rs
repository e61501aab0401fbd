//! Interleaved image container.

use serde::{Deserialize, Serialize};

/// Channel arrangement of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    /// Single luma channel.
    Gray,
    /// Three interleaved channels in blue, green, red order.
    Bgr,
}

impl PixelLayout {
    /// Samples per pixel.
    pub const fn channels(self) -> usize {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::Bgr => 3,
        }
    }
}

/// A row-major image with interleaved channels.
///
/// `data.len() == width * height * layout.channels()` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    layout: PixelLayout,
    data: Vec<T>,
}

/// 8-bit image as captured and displayed.
pub type Frame = Image<u8>;

/// 32-bit float image used for pyramid and spectral processing.
pub type FloatImage = Image<f32>;

impl<T: Copy> Image<T> {
    /// Wrap existing samples. Fails if the length does not match the shape.
    pub fn from_vec(
        width: usize,
        height: usize,
        layout: PixelLayout,
        data: Vec<T>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimension { width, height });
        }
        let expected = width * height * layout.channels();
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Caller guarantees the length matches the shape.
    pub(crate) fn from_parts(width: usize, height: usize, layout: PixelLayout, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), width * height * layout.channels());
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    /// Image with every sample set to `value`.
    pub fn filled(width: usize, height: usize, layout: PixelLayout, value: T) -> Self {
        Self {
            width,
            height,
            layout,
            data: vec![value; width * height * layout.channels()],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Number of samples (pixels times channels).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples in one row.
    pub fn stride(&self) -> usize {
        self.width * self.channels()
    }

    /// Whether `other` has the same width, height, and layout.
    pub fn same_shape<U>(&self, other: &Image<U>) -> bool {
        self.width == other.width && self.height == other.height && self.layout == other.layout
    }

    /// Sample at column `x`, row `y`, channel `c`.
    pub fn get(&self, x: usize, y: usize, c: usize) -> T {
        self.data[(y * self.width + x) * self.channels() + c]
    }

    pub fn set(&mut self, x: usize, y: usize, c: usize, value: T) {
        let channels = self.channels();
        self.data[(y * self.width + x) * channels + c] = value;
    }

    /// Samples of row `y`.
    pub fn row(&self, y: usize) -> &[T] {
        let stride = self.stride();
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Mirror left-to-right in place, keeping each pixel's channels intact.
    pub fn flip_horizontal(&mut self) {
        let channels = self.channels();
        let stride = self.stride();
        let width = self.width;
        if stride == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(stride) {
            for x in 0..width / 2 {
                let mirror = width - 1 - x;
                for c in 0..channels {
                    row.swap(x * channels + c, mirror * channels + c);
                }
            }
        }
    }
}

impl FloatImage {
    /// Float image of zeros.
    pub fn zeros(width: usize, height: usize, layout: PixelLayout) -> Self {
        Self::filled(width, height, layout, 0.0)
    }

    /// Multiply every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for v in &mut self.data {
            *v *= gain;
        }
    }

    /// Mean of all samples, or 0 for an empty image.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Largest absolute sample.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
    }
}

impl Frame {
    /// Mean of all samples, or 0 for an empty frame.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&v| v as u64).sum();
        (sum as f64 / self.data.len() as f64) as f32
    }
}

/// Errors constructing or combining images.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    EmptyDimension { width: usize, height: usize },

    #[error("sample buffer has {actual} values, shape requires {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("shape mismatch: {left} vs {right}")]
    ShapeMismatch { left: String, right: String },
}

impl FrameError {
    pub fn shape_mismatch<A, B>(left: &Image<A>, right: &Image<B>) -> Self {
        Self::ShapeMismatch {
            left: format!("{}x{} {:?}", left.width, left.height, left.layout),
            right: format!("{}x{} {:?}", right.width, right.height, right.layout),
        }
    }
}
