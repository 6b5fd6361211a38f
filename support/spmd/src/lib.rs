//! A minimal collective-communication interface for SPMD participant sets.
//!
//! A *participant set* is a fixed group of cooperating participants that all
//! execute the same program. They coordinate exclusively through collective
//! calls ([`Comm::reduce`], [`Comm::all_reduce`], [`Comm::broadcast`],
//! [`Comm::barrier`]), which block until the relevant participants have
//! entered the same call. Every participant must enter the collectives in the
//! same order.
//!
//! Reduction rules are supplied as [`UserOp`]s wrapping a plain function
//! pointer ([`ReduceFn`]). The signature is fixed and carries no caller
//! context, mirroring what message-passing libraries accept for user-defined
//! operators.
//!
//! Two backends are provided:
//!
//!  - [`SelfComm`] is a participant set consisting only of the calling
//!    process. It cannot distribute anything ([`Comm::is_parallel`] returns
//!    `false`).
//!  - [`ThreadComm`] (created by [`thread_group`] or [`run`]) runs each
//!    participant on its own thread. Data only crosses participants by copy.
//!
//! # Examples
//!
//!     use spmd::{Comm, Datatype, Scalar, UserOp};
//!
//!     fn max_u8(input: &[u8], inout: &mut [u8]) {
//!         for (i, o) in input.iter().zip(inout.iter_mut()) {
//!             *o = (*o).max(*i);
//!         }
//!     }
//!
//!     let op = UserOp::new(max_u8, true);
//!     let dtype = Datatype::contiguous(Scalar::U8, 1);
//!
//!     let results = spmd::run(3, |comm| {
//!         let send = [comm.rank() as u8 * 10, 7];
//!         let mut recv = [0u8; 2];
//!         comm.all_reduce(&op, &dtype, &send, &mut recv).unwrap();
//!         recv
//!     });
//!
//!     assert_eq!(results, vec![[20, 7]; 3]);
//!
use quick_error::quick_error;

mod single;
mod thread;
pub use self::{single::*, thread::*};

/// An element type understood by the collective layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    U8,
    U32,
    F32,
    F64,
}

impl Scalar {
    /// The size of a single element, in bytes.
    pub fn size(self) -> usize {
        match self {
            Scalar::U8 => 1,
            Scalar::U32 | Scalar::F32 => 4,
            Scalar::F64 => 8,
        }
    }
}

/// Describes the record exchanged by a collective call: `count` consecutive
/// elements of type `scalar`, without any padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Datatype {
    pub scalar: Scalar,
    pub count: usize,
}

impl Datatype {
    pub const fn contiguous(scalar: Scalar, count: usize) -> Self {
        Self { scalar, count }
    }

    /// The size of a record, in bytes.
    pub fn size(&self) -> usize {
        self.scalar.size() * self.count
    }
}

/// The signature of a user-defined reduction function.
///
/// The function combines `input` into `inout` element-wise. Both buffers hold
/// the same number of whole records. There's no way to pass extra context;
/// a reduction rule that needs parameters has to get them from elsewhere.
pub type ReduceFn = fn(input: &[u8], inout: &mut [u8]);

/// A user-defined reduction operator.
#[derive(Clone, Copy)]
pub struct UserOp {
    func: ReduceFn,
    commutative: bool,
}

impl UserOp {
    /// Construct a `UserOp`.
    ///
    /// If `commutative` is `false`, the collective layer combines the
    /// contributions in rank order. Otherwise it may combine them in any
    /// order (e.g., in the order they arrive).
    pub const fn new(func: ReduceFn, commutative: bool) -> Self {
        Self { func, commutative }
    }

    pub fn is_commutative(&self) -> bool {
        self.commutative
    }

    /// Apply the operator: `inout := input ∘ inout`.
    #[inline]
    pub fn apply(&self, input: &[u8], inout: &mut [u8]) {
        (self.func)(input, inout)
    }
}

impl std::fmt::Debug for UserOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("UserOp")
            .field("func", &(self.func as *const ()))
            .field("commutative", &self.commutative)
            .finish()
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CommError {
        /// A rank does not name a participant of the set.
        InvalidRank(rank: usize, size: usize) {
            display("rank {} is out of range for a participant set of size {}", rank, size)
        }
        /// A buffer is not made of whole records, or the contributions of
        /// the participants disagree in length.
        BufferLength(len: usize, record: usize) {
            display("a buffer of {} bytes does not match the expected layout \
                     (record size: {} bytes)", len, record)
        }
        /// The receive buffer is missing on a receiving participant or does
        /// not match the send buffer.
        RecvBuffer {
            display("the receive buffer is missing or has a wrong length")
        }
        /// A peer participant is gone.
        Disconnected {
            display("a peer participant has disconnected")
        }
    }
}

/// A handle to a participant set, viewed from one participant.
pub trait Comm {
    /// The rank of the calling participant, in range `0..self.size()`.
    fn rank(&self) -> usize;

    /// The number of participants.
    fn size(&self) -> usize;

    /// Returns `true` if this participant set is backed by a real
    /// communication layer and can deliver results across participants.
    fn is_parallel(&self) -> bool;

    /// The number of bytes the layer uses for a record of type `dtype`.
    fn type_size(&self, dtype: &Datatype) -> usize;

    /// Combine `send` of all participants using `op` and store the result to
    /// `recv` of the participant `root`.
    ///
    /// `recv` must be `Some(_)` with `send.len()` bytes on `root`. It's
    /// ignored on the other participants.
    fn reduce(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: Option<&mut [u8]>,
        root: usize,
    ) -> Result<(), CommError>;

    /// Combine `send` of all participants using `op` and store the result to
    /// `recv` of every participant.
    fn all_reduce(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(), CommError>;

    /// Copy `buf` of the participant `root` to `buf` of every other
    /// participant.
    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<(), CommError>;

    /// Block until every participant has entered `barrier`.
    fn barrier(&self) -> Result<(), CommError>;
}

impl std::fmt::Debug for dyn Comm + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Comm")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

/// Check the arguments common to the reduction collectives.
fn check_reduce_args(
    comm: &(impl Comm + ?Sized),
    dtype: &Datatype,
    send: &[u8],
    root: usize,
) -> Result<(), CommError> {
    if root >= comm.size() {
        return Err(CommError::InvalidRank(root, comm.size()));
    }

    let record = comm.type_size(dtype);
    if record == 0 || send.len() % record != 0 {
        return Err(CommError::BufferLength(send.len(), record));
    }

    Ok(())
}
