//! The per-pixel merge rule and the wire representation of pixels.
use std::cmp::Ordering;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use super::opreg;

/// The size of [`WirePixel`] in bytes.
pub const WIRE_PIXEL_SIZE: usize = 8;

const _: () = assert!(std::mem::size_of::<WirePixel>() == WIRE_PIXEL_SIZE);

/// A `(depth, value)` pair as exchanged between participants.
///
/// Both fields are IEEE 754 binary32 numbers in little-endian byte order.
/// The record has no padding and no alignment requirement, so any byte
/// buffer of a multiple of [`WIRE_PIXEL_SIZE`] bytes can be viewed as
/// `[WirePixel]`. The layout doesn't depend on the compiler's structure
/// layout rules.
#[derive(Clone, Copy, PartialEq, Eq, Default, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct WirePixel {
    depth: [u8; 4],
    value: [u8; 4],
}

impl WirePixel {
    #[inline]
    pub fn new(depth: f32, value: f32) -> Self {
        Self {
            depth: depth.to_le_bytes(),
            value: value.to_le_bytes(),
        }
    }

    #[inline]
    pub fn depth(&self) -> f32 {
        f32::from_le_bytes(self.depth)
    }

    #[inline]
    pub fn value(&self) -> f32 {
        f32::from_le_bytes(self.value)
    }
}

impl std::fmt::Debug for WirePixel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("WirePixel")
            .field(&self.depth())
            .field(&self.value())
            .finish()
    }
}

/// Decides which of two contributions of the same depth survives.
///
/// Every policy is independent of the order in which the contributions are
/// combined, which keeps the merge rule associative and commutative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TieBreak {
    /// The smaller value wins.
    LowestValue,
    /// A value different from the background value wins over the background
    /// value. If both or neither are the background value, the smaller value
    /// wins.
    PreferForeground,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::LowestValue
    }
}

/// The parameters of the merge rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    pub background: f32,
    pub tie_break: TieBreak,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            background: 0.0,
            tie_break: TieBreak::default(),
        }
    }
}

impl MergeParams {
    /// Returns `true` if `x` should replace `y`.
    ///
    /// Depths are compared by `f32::total_cmp` after folding `-0.0` into
    /// `+0.0`, so IEEE-equal depths are a tie and go through the tie-break
    /// policy. Pixels that are still equal after that are ordered by their
    /// raw depth bits. This makes the rule a strict total order on the bit
    /// patterns of `(depth, value)`, so merging is associative, commutative,
    /// and idempotent.
    #[inline]
    pub fn wins(&self, x: &WirePixel, y: &WirePixel) -> bool {
        let (x_depth, y_depth) = (x.depth(), y.depth());
        let (x_value, y_value) = (x.value(), y.value());
        let ord = unsigned_zero(x_depth)
            .total_cmp(&unsigned_zero(y_depth))
            .then_with(|| match self.tie_break {
                TieBreak::LowestValue => x_value.total_cmp(&y_value),
                TieBreak::PreferForeground => {
                    let is_bg = |v: f32| v.total_cmp(&self.background) == Ordering::Equal;
                    // `false < true`, so foreground values come first
                    is_bg(x_value)
                        .cmp(&is_bg(y_value))
                        .then_with(|| x_value.total_cmp(&y_value))
                }
            })
            .then_with(|| x_depth.total_cmp(&y_depth));
        ord == Ordering::Less
    }
}

/// Map `-0.0` to `+0.0`. Everything else, including NaNs, is unchanged.
#[inline]
fn unsigned_zero(x: f32) -> f32 {
    if x == 0.0 {
        0.0
    } else {
        x
    }
}

/// Merge `input` into `inout`: each element of `inout` is replaced with the
/// corresponding element of `input` if the latter is nearer.
///
/// Panics if the slices differ in length.
pub fn merge_pixels(params: &MergeParams, input: &[WirePixel], inout: &mut [WirePixel]) {
    assert_eq!(input.len(), inout.len());

    for (x, y) in input.iter().zip(inout.iter_mut()) {
        if params.wins(x, y) {
            *y = *x;
        }
    }
}

/// [`merge_pixels`] as a [`spmd::ReduceFn`]. The merge parameters are read
/// from the slot set by [`opreg::stage`].
///
/// Panics if no parameters are staged on the calling thread or the buffers
/// aren't made of whole pixels.
pub fn reduce_wire_pixels(input: &[u8], inout: &mut [u8]) {
    let params = opreg::staged_params()
        .expect("the pixel reduction was invoked outside a staged collective call");

    let input = LayoutVerified::<_, [WirePixel]>::new_slice_unaligned(input)
        .expect("the input buffer is not made of whole pixels")
        .into_slice();
    let inout = LayoutVerified::<_, [WirePixel]>::new_slice_unaligned(inout)
        .expect("the in/out buffer is not made of whole pixels")
        .into_mut_slice();

    merge_pixels(&params, input, inout);
}
