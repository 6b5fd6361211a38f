use std::fmt;

use super::{
    chunk::{Planes, PlanesMut},
    Error,
};

/// The dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageSize {
    pub rows: usize,
    pub cols: usize,
}

impl ImageSize {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}×{}", self.rows, self.cols)
    }
}

/// A partial image: a depth plane and a value plane of the same shape, both
/// stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    size: ImageSize,
    depth: Vec<f32>,
    value: Vec<f32>,
}

impl DepthImage {
    /// Construct a `DepthImage` from planes. Both planes must contain exactly
    /// `size.pixel_count()` elements.
    pub fn new(size: ImageSize, depth: Vec<f32>, value: Vec<f32>) -> Result<Self, Error> {
        let expected = size.pixel_count();
        for plane in &[&depth, &value] {
            if plane.len() != expected {
                return Err(Error::PlaneLength {
                    expected,
                    actual: plane.len(),
                });
            }
        }

        Ok(Self { size, depth, value })
    }

    /// Construct a `DepthImage` where every pixel is `(depth, value)`.
    ///
    /// `DepthImage::filled(size, f32::INFINITY, background)` is an image that
    /// contributes nothing to a composite.
    pub fn filled(size: ImageSize, depth: f32, value: f32) -> Self {
        let count = size.pixel_count();
        Self {
            size,
            depth: vec![depth; count],
            value: vec![value; count],
        }
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn value(&self) -> &[f32] {
        &self.value
    }

    pub fn planes(&self) -> Planes<'_> {
        Planes {
            depth: &self.depth,
            value: &self.value,
        }
    }

    pub fn planes_mut(&mut self) -> PlanesMut<'_> {
        PlanesMut {
            depth: &mut self.depth,
            value: &mut self.value,
        }
    }

    /// Take the planes out of `self`, returning `(depth, value)`.
    pub fn into_planes(self) -> (Vec<f32>, Vec<f32>) {
        (self.depth, self.value)
    }
}
