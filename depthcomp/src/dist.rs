//! Merging the accumulators of all participants.
use log::debug;
use spmd::Comm;

use super::{
    chunk::{merge_chunked, Route, Target},
    opreg::PixelReduction,
    DeliveryMode, DepthImage, Error, MergeParams,
};

/// Determine the reduction target for `delivery`.
///
/// Returns `Ok(None)` for [`DeliveryMode::NoDistribution`]. Fails if
/// `delivery` requests distribution but `comm` is not parallel or has only
/// one participant, or if the root rank is out of range. These checks don't
/// communicate.
pub fn reduction_target(comm: &dyn Comm, delivery: DeliveryMode) -> Result<Option<Target>, Error> {
    let target = match delivery {
        DeliveryMode::NoDistribution => return Ok(None),
        DeliveryMode::ToRoot(root) => Target::Root(root),
        DeliveryMode::ToAll => Target::All,
    };

    if !comm.is_parallel() || comm.size() < 2 {
        return Err(Error::NotDistributed);
    }

    if let Target::Root(root) = target {
        if root >= comm.size() {
            return Err(Error::InvalidRoot {
                root,
                size: comm.size(),
            });
        }
    }

    Ok(Some(target))
}

/// Merge `accum` with the accumulators of the other participants.
///
/// This is a collective operation: every participant of `comm` must call it
/// with the same `target`, image size, and `chunk_limit`. Destination planes
/// are only allocated on the participants included in `target`, which get
/// `Some(merged)`. The others get `None`.
pub fn merge_distributed(
    comm: &dyn Comm,
    target: Target,
    accum: &DepthImage,
    reduction: &PixelReduction,
    params: MergeParams,
    chunk_limit: usize,
) -> Result<Option<DepthImage>, Error> {
    let mut merged = if target.includes(comm.rank()) {
        Some(DepthImage::filled(accum.size(), 0.0, 0.0))
    } else {
        None
    };

    let route = Route::Collective {
        comm,
        reduction,
        params,
        target,
    };
    let stats = merge_chunked(
        &route,
        accum.planes(),
        merged.as_mut().map(DepthImage::planes_mut),
        chunk_limit,
    )?;

    debug!(
        "merge_distributed: rank {}/{}, {:?}, {} collective calls, result {}",
        comm.rank(),
        comm.size(),
        target,
        stats.chunks,
        if merged.is_some() { "received" } else { "not received" },
    );

    Ok(merged)
}
