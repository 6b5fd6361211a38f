//! Chunked reduction over large pixel planes.
use itertools::izip;
use log::trace;
use spmd::Comm;
use std::cmp::min;
use zerocopy::AsBytes;

use super::{
    opreg::{self, PixelReduction},
    pixel::{merge_pixels, MergeParams, WirePixel},
    Error,
};

/// A read-only pair of a depth plane and a value plane.
#[derive(Debug, Clone, Copy)]
pub struct Planes<'a> {
    pub depth: &'a [f32],
    pub value: &'a [f32],
}

/// A mutable pair of a depth plane and a value plane.
#[derive(Debug)]
pub struct PlanesMut<'a> {
    pub depth: &'a mut [f32],
    pub value: &'a mut [f32],
}

/// The participants receiving the result of a collective reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Root(usize),
    All,
}

impl Target {
    /// Returns `true` if the participant `rank` receives the result.
    pub fn includes(self, rank: usize) -> bool {
        match self {
            Target::Root(root) => root == rank,
            Target::All => true,
        }
    }
}

/// Where [`merge_chunked`] merges.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Merge into the destination planes in this process.
    Local(MergeParams),
    /// Merge the source planes of every participant using a collective
    /// reduction.
    Collective {
        comm: &'a dyn Comm,
        reduction: &'a PixelReduction,
        params: MergeParams,
        target: Target,
    },
}

impl Route<'_> {
    /// Returns `true` if the calling participant receives a result.
    pub fn receives(&self) -> bool {
        match self {
            Route::Local(_) => true,
            Route::Collective { comm, target, .. } => target.includes(comm.rank()),
        }
    }
}

/// Statistics of a [`merge_chunked`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkStats {
    /// The number of chunks (and collective calls, if any).
    pub chunks: usize,
    pub pixels: usize,
}

/// Merge `src` into `dst` in chunks of at most `chunk_limit` pixels.
///
/// With [`Route::Local`], `dst` must be `Some(_)` and each chunk of `dst` is
/// replaced with the merge of itself and the corresponding chunk of `src`.
///
/// With [`Route::Collective`], every participant of the participant set must
/// call this function with the same number of pixels and the same
/// `chunk_limit`. Each chunk is reduced by one collective call, and the
/// merged chunk is written to `dst` on the participants included in the
/// target. `dst` must be `Some(_)` on those participants. On the others,
/// `dst` is ignored and may be `None`.
///
/// Scratch space for at most `2 * chunk_limit` pixels is allocated.
pub fn merge_chunked(
    route: &Route<'_>,
    src: Planes<'_>,
    mut dst: Option<PlanesMut<'_>>,
    chunk_limit: usize,
) -> Result<ChunkStats, Error> {
    if chunk_limit == 0 {
        return Err(Error::ZeroChunkLimit);
    }

    let n = src.depth.len();
    check_plane_len(n, src.value.len())?;

    let receives = route.receives();
    if receives {
        let dst = dst.as_ref().ok_or(Error::MissingDestination)?;
        check_plane_len(n, dst.depth.len())?;
        check_plane_len(n, dst.value.len())?;
    }

    let scratch_len = min(chunk_limit, n);
    let mut input = vec![WirePixel::default(); scratch_len];
    let mut inout = vec![WirePixel::default(); if receives { scratch_len } else { 0 }];

    let mut stats = ChunkStats::default();
    let mut start = 0;

    while start < n {
        let end = min(start.saturating_add(chunk_limit), n);
        let len = end - start;

        let in_chunk = &mut input[..len];
        pack(in_chunk, &src.depth[start..end], &src.value[start..end]);

        match *route {
            Route::Local(ref params) => {
                let dst = dst.as_ref().ok_or(Error::MissingDestination)?;
                let inout_chunk = &mut inout[..len];

                // Seed the accumulator with its own prior state
                pack(inout_chunk, &dst.depth[start..end], &dst.value[start..end]);
                merge_pixels(params, in_chunk, inout_chunk);
            }
            Route::Collective {
                comm,
                reduction,
                params,
                target,
            } => {
                let recv = if receives {
                    Some(inout[..len].as_bytes_mut())
                } else {
                    None
                };

                let _staged = opreg::stage(params);

                match (target, recv) {
                    (Target::Root(root), recv) => comm.reduce(
                        reduction.op(),
                        reduction.datatype(),
                        in_chunk.as_bytes(),
                        recv,
                        root,
                    )?,
                    (Target::All, Some(recv)) => comm.all_reduce(
                        reduction.op(),
                        reduction.datatype(),
                        in_chunk.as_bytes(),
                        recv,
                    )?,
                    (Target::All, None) => return Err(Error::MissingDestination),
                }
            }
        }

        if receives {
            if let Some(dst) = dst.as_mut() {
                unpack(
                    &inout[..len],
                    &mut dst.depth[start..end],
                    &mut dst.value[start..end],
                );
            }
        }

        stats.chunks += 1;
        stats.pixels += len;
        start = end;
    }

    trace!(
        "merge_chunked: {:?} ({} pixels in {} chunks)",
        route,
        stats.pixels,
        stats.chunks
    );

    Ok(stats)
}

fn check_plane_len(expected: usize, actual: usize) -> Result<(), Error> {
    if expected != actual {
        Err(Error::PlaneLength { expected, actual })
    } else {
        Ok(())
    }
}

fn pack(out: &mut [WirePixel], depth: &[f32], value: &[f32]) {
    for (out, &depth, &value) in izip!(out, depth, value) {
        *out = WirePixel::new(depth, value);
    }
}

fn unpack(pixels: &[WirePixel], depth: &mut [f32], value: &mut [f32]) {
    for (pixel, depth, value) in izip!(pixels, depth, value) {
        *depth = pixel.depth();
        *value = pixel.value();
    }
}
