//! Wrapping the composited planes into the caller-visible image.
use std::borrow::Cow;

use super::{DepthImage, ImageSize};

/// The result of a compositing call, as seen by one participant.
///
/// If the participant doesn't receive a result under the active delivery
/// mode, the image is *invalid*: `is_valid()` returns `false` and both planes
/// are empty.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputImage {
    size: ImageSize,
    value: Vec<f32>,
    depth: Option<Vec<f32>>,
    valid: bool,
}

impl OutputImage {
    /// Construct an invalid `OutputImage`.
    pub fn invalid(size: ImageSize) -> Self {
        Self {
            size,
            value: Vec::new(),
            depth: None,
            valid: false,
        }
    }

    /// The size of the composited image. Also available for an invalid
    /// image.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The value plane. Empty if `self` is invalid.
    pub fn value(&self) -> &[f32] {
        &self.value
    }

    /// The depth plane. `None` if the depth output wasn't requested or
    /// `self` is invalid.
    pub fn depth(&self) -> Option<&[f32]> {
        self.depth.as_deref()
    }

    /// Take the planes out of `self`, returning `(value, depth)`.
    pub fn into_planes(self) -> (Vec<f32>, Option<Vec<f32>>) {
        (self.value, self.depth)
    }
}

/// Build the [`OutputImage`] from the final result of a compositing call.
///
/// `result` is `None` on a participant that doesn't receive a result. If
/// `want_depth` is `true`, the output carries both planes. Otherwise the
/// depth plane is discarded.
///
/// The planes of an owned image are moved into the output. A borrowed image
/// (which is the case when a single input image is the final result) is
/// copied, but only the planes the output needs.
pub fn assemble(size: ImageSize, result: Option<Cow<'_, DepthImage>>, want_depth: bool) -> OutputImage {
    let (depth, value) = match result {
        None => return OutputImage::invalid(size),
        Some(Cow::Owned(image)) => {
            let (depth, value) = image.into_planes();
            (if want_depth { Some(depth) } else { None }, value)
        }
        Some(Cow::Borrowed(image)) => (
            if want_depth {
                Some(image.depth().to_vec())
            } else {
                None
            },
            image.value().to_vec(),
        ),
    };

    OutputImage {
        size,
        value,
        depth,
        valid: true,
    }
}
