use super::{ImageSize, MergeParams, TieBreak};

/// The default value of [`CompositingConfig::chunk_limit`]. A chunk of this
/// many pixels occupies 8 MB of scratch space per buffer.
pub const DEFAULT_CHUNK_LIMIT: usize = 1_000_000;

/// Specifies which participants receive the composited image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Only the participant with the given rank receives the result. The
    /// other participants get an invalid (empty) [`OutputImage`].
    ///
    /// [`OutputImage`]: crate::OutputImage
    ToRoot(usize),
    /// Every participant receives an identical copy of the result.
    ToAll,
    /// Don't communicate. The result of the local merge is returned as is.
    NoDistribution,
}

impl Default for DeliveryMode {
    fn default() -> Self {
        DeliveryMode::NoDistribution
    }
}

/// The per-call configuration of a [`Compositor`](crate::Compositor).
///
/// # Examples
///
///     use depthcomp::{CompositingConfig, DeliveryMode, ImageSize};
///
///     let config = CompositingConfig::new(ImageSize::new(480, 640))
///         .with_delivery(DeliveryMode::ToRoot(0))
///         .with_chunk_limit(65536)
///         .with_depth_output(true);
///
///     assert_eq!(config.chunk_limit(), 65536);
///     assert!(config.wants_depth());
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositingConfig {
    size: ImageSize,
    chunk_limit: usize,
    delivery: DeliveryMode,
    background: f32,
    want_depth: bool,
    tie_break: TieBreak,
}

impl CompositingConfig {
    /// Construct a `CompositingConfig` with the output size `size` and
    /// default values for everything else.
    pub fn new(size: ImageSize) -> Self {
        Self {
            size,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            delivery: DeliveryMode::default(),
            background: 0.0,
            want_depth: false,
            tie_break: TieBreak::default(),
        }
    }

    /// Set the maximum number of pixels processed in a single reduction
    /// step. Must be at least `1`.
    pub fn with_chunk_limit(self, chunk_limit: usize) -> Self {
        Self {
            chunk_limit,
            ..self
        }
    }

    pub fn with_delivery(self, delivery: DeliveryMode) -> Self {
        Self { delivery, ..self }
    }

    /// Set the background value. It's used by [`TieBreak::PreferForeground`].
    pub fn with_background(self, background: f32) -> Self {
        Self { background, ..self }
    }

    /// Specify whether the output should include the depth plane.
    pub fn with_depth_output(self, want_depth: bool) -> Self {
        Self { want_depth, ..self }
    }

    pub fn with_tie_break(self, tie_break: TieBreak) -> Self {
        Self { tie_break, ..self }
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    pub fn background(&self) -> f32 {
        self.background
    }

    pub fn wants_depth(&self) -> bool {
        self.want_depth
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// The parameters of the per-pixel merge rule.
    pub fn merge_params(&self) -> MergeParams {
        MergeParams {
            background: self.background,
            tie_break: self.tie_break,
        }
    }
}
