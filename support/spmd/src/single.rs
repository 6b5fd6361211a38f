use super::{check_reduce_args, Comm, CommError, Datatype, UserOp};

/// A participant set consisting only of the calling process.
///
/// Collective calls complete immediately. Since there are no peers, this
/// reports `is_parallel() == false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfComm;

impl Comm for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_parallel(&self) -> bool {
        false
    }

    fn type_size(&self, dtype: &Datatype) -> usize {
        dtype.size()
    }

    fn reduce(
        &self,
        _op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: Option<&mut [u8]>,
        root: usize,
    ) -> Result<(), CommError> {
        check_reduce_args(self, dtype, send, root)?;

        match recv {
            Some(recv) if recv.len() == send.len() => {
                recv.copy_from_slice(send);
                Ok(())
            }
            _ => Err(CommError::RecvBuffer),
        }
    }

    fn all_reduce(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(), CommError> {
        self.reduce(op, dtype, send, Some(recv), 0)
    }

    fn broadcast(&self, _buf: &mut [u8], root: usize) -> Result<(), CommError> {
        if root != 0 {
            return Err(CommError::InvalidRank(root, 1));
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }
}
