//! Process-wide collective resources: the registration of the pixel
//! datatype and reduction operator, and the merge parameters staged for the
//! reduction callback.
//!
//! # Registration
//!
//! The datatype and the operator are registered on the first
//! [`PixelReduction::acquire`] and unregistered when the last
//! `PixelReduction` is dropped.
//!
//! # Staging
//!
//! [`spmd::ReduceFn`] can't carry caller context, but the merge rule needs
//! [`MergeParams`]. Therefore, the parameters are written to a slot right
//! before each collective call ([`stage`]) and cleared right after it (when
//! the returned [`StagedParams`] is dropped). The reduction callback runs on
//! the thread that entered the collective call and reads the slot from there.
//!
//! The slot is per-thread. A participant has no internal threading, so this
//! amounts to process-wide state for that participant. It is **not
//! reentrant**: nothing may composite on the same thread while parameters are
//! staged (e.g., from within a reduction callback).
use lazy_static::lazy_static;
use log::debug;
use spmd::{Comm, Datatype, Scalar, UserOp};
use std::{cell::Cell, marker::PhantomData, sync::Mutex};

use super::{
    pixel::{reduce_wire_pixels, WIRE_PIXEL_SIZE},
    Error, MergeParams,
};

#[derive(Debug, Clone, Copy)]
struct Registration {
    datatype: Datatype,
    op: UserOp,
}

#[derive(Debug)]
struct Registry {
    users: usize,
    registration: Option<Registration>,
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry {
        users: 0,
        registration: None,
    });
}

fn lock_registry() -> std::sync::MutexGuard<'static, Registry> {
    // The registry is consistent even if a holder panicked
    REGISTRY.lock().unwrap_or_else(|e| e.into_inner())
}

/// A counted reference to the process-wide registration of the pixel
/// datatype and the pixel reduction operator.
#[derive(Debug)]
pub struct PixelReduction {
    registration: Registration,
}

impl PixelReduction {
    /// Acquire a reference, registering the datatype and the operator if
    /// there are no other references.
    pub fn acquire() -> Self {
        let mut registry = lock_registry();

        let registration = *registry.registration.get_or_insert_with(|| {
            debug!("Registering the pixel datatype and reduction operator");
            Registration {
                datatype: Datatype::contiguous(Scalar::F32, 2),
                op: UserOp::new(reduce_wire_pixels, true),
            }
        });
        registry.users += 1;

        Self { registration }
    }

    pub fn datatype(&self) -> &Datatype {
        &self.registration.datatype
    }

    pub fn op(&self) -> &UserOp {
        &self.registration.op
    }

    /// Check that the communication layer uses the same record size for
    /// the pixel datatype as [`WirePixel`](crate::WirePixel) does.
    pub fn verify(&self, comm: &dyn Comm) -> Result<(), Error> {
        let layer = comm.type_size(self.datatype());
        if layer != WIRE_PIXEL_SIZE {
            return Err(Error::WireSizeMismatch {
                wire: WIRE_PIXEL_SIZE,
                layer,
            });
        }
        Ok(())
    }
}

impl Drop for PixelReduction {
    fn drop(&mut self) {
        let mut registry = lock_registry();
        registry.users -= 1;
        if registry.users == 0 {
            debug!("Unregistering the pixel datatype and reduction operator");
            registry.registration = None;
        }
    }
}

/// The number of live [`PixelReduction`]s.
pub fn live_references() -> usize {
    lock_registry().users
}

thread_local! {
    static STAGED: Cell<Option<MergeParams>> = Cell::new(None);
}

/// Keeps merge parameters staged for the reduction callback. Clears the slot
/// when dropped.
#[derive(Debug)]
pub struct StagedParams {
    /// The slot is thread-local, so the guard must stay on this thread.
    _no_send: PhantomData<*const ()>,
}

/// Stage `params` for the reduction callback on the calling thread.
///
/// Staging while parameters are already staged is a programming error.
pub fn stage(params: MergeParams) -> StagedParams {
    STAGED.with(|slot| {
        debug_assert!(slot.get().is_none(), "merge parameters are already staged");
        slot.set(Some(params));
    });
    StagedParams {
        _no_send: PhantomData,
    }
}

impl Drop for StagedParams {
    fn drop(&mut self) {
        STAGED.with(|slot| slot.set(None));
    }
}

/// Get the parameters staged on the calling thread.
pub fn staged_params() -> Option<MergeParams> {
    STAGED.with(|slot| slot.get())
}
