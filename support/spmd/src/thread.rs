//! The in-process thread backend.
use log::trace;
use std::{
    cell::{Cell, RefCell},
    sync::mpsc::{channel, Receiver, Sender},
};

use super::{check_reduce_args, Comm, CommError, Datatype, UserOp};

/// A message exchanged between participants. `seq` identifies the collective
/// call the message belongs to.
#[derive(Debug)]
struct Packet {
    seq: u64,
    src: usize,
    data: Vec<u8>,
}

/// One participant of an in-process participant set created by
/// [`thread_group`].
///
/// Each participant is meant to be moved to its own thread. Collective calls
/// block the calling thread until the peers enter the matching call.
/// `reduce` with a commutative operator combines the peer contributions in
/// the order they arrive.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    /// Senders to each participant's inbox. The entry for `rank` is `None` so
    /// that a participant whose peers are all gone observes disconnection
    /// instead of blocking forever.
    peers: Vec<Option<Sender<Packet>>>,
    inbox: Receiver<Packet>,
    /// Messages that arrived ahead of the collective call they belong to.
    pending: RefCell<Vec<Packet>>,
    next_seq: Cell<u64>,
}

/// Create an in-process participant set of `size` participants. The returned
/// `ThreadComm`s are ordered by rank.
pub fn thread_group(size: usize) -> Vec<ThreadComm> {
    let (senders, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();

    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ThreadComm {
            rank,
            peers: senders
                .iter()
                .enumerate()
                .map(|(i, s)| if i == rank { None } else { Some(s.clone()) })
                .collect(),
            inbox,
            pending: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
        })
        .collect()
}

/// Run `f` on each participant of a new `size`-participant set, each on its
/// own thread, and return the results in rank order.
///
/// Panics if a participant thread can't be spawned or if any of the
/// participants panics.
pub fn run<T, F>(size: usize, f: F) -> Vec<T>
where
    F: Fn(ThreadComm) -> T + Sync,
    T: Send,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = thread_group(size)
            .into_iter()
            .map(|comm| {
                std::thread::Builder::new()
                    .name(format!("spmd rank {}", comm.rank))
                    .spawn_scoped(scope, move || f(comm))
                    .expect("failed to spawn a participant thread")
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(x) => x,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    })
}

impl ThreadComm {
    fn take_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    fn send_to(&self, dst: usize, seq: u64, data: Vec<u8>) -> Result<(), CommError> {
        let sender = self.peers[dst].as_ref().ok_or(CommError::InvalidRank(dst, self.size()))?;
        sender
            .send(Packet {
                seq,
                src: self.rank,
                data,
            })
            .map_err(|_| CommError::Disconnected)
    }

    /// Receive a message belonging to the collective call `seq`, optionally
    /// only from the participant `src`.
    fn recv_from(&self, seq: u64, src: Option<usize>) -> Result<Packet, CommError> {
        let matches = |p: &Packet| p.seq == seq && src.map_or(true, |src| p.src == src);

        let mut pending = self.pending.borrow_mut();
        if let Some(i) = pending.iter().position(matches) {
            return Ok(pending.remove(i));
        }

        loop {
            let packet = self.inbox.recv().map_err(|_| CommError::Disconnected)?;
            if matches(&packet) {
                return Ok(packet);
            }
            pending.push(packet);
        }
    }

    /// Reduce `send` of every participant into `recv` of `root`.
    ///
    /// If `acknowledge` is `true`, the root releases the other participants
    /// only after it has folded every contribution, so a participant can't
    /// get ahead of the root by more than one call. Otherwise, the caller
    /// must synchronize the participants by itself (e.g., by a subsequent
    /// broadcast from `root`).
    fn reduce_to(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: Option<&mut [u8]>,
        root: usize,
        acknowledge: bool,
    ) -> Result<(), CommError> {
        check_reduce_args(self, dtype, send, root)?;
        let seq = self.take_seq();

        if self.rank != root {
            self.send_to(root, seq, send.to_vec())?;
            if acknowledge {
                self.recv_from(seq, Some(root))?;
            }
            return Ok(());
        }

        let result = match recv {
            Some(recv) if recv.len() == send.len() => self.fold(op, dtype, send, recv, seq),
            _ => Err(CommError::RecvBuffer),
        };

        if acknowledge {
            // Release the peers even if folding failed so that they don't
            // block forever
            for dst in (0..self.size()).filter(|&i| i != root) {
                self.send_to(dst, seq, Vec::new())?;
            }
        }

        result
    }

    /// Fold the contributions of the participants other than `self` into
    /// `recv`, which is initialized from `send`.
    fn fold(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: &mut [u8],
        seq: u64,
    ) -> Result<(), CommError> {
        let record = self.type_size(dtype);

        if op.is_commutative() {
            recv.copy_from_slice(send);
            for _ in 1..self.size() {
                let packet = self.recv_from(seq, None)?;
                if packet.data.len() != recv.len() {
                    return Err(CommError::BufferLength(packet.data.len(), record));
                }
                trace!("reduce #{}: folding the contribution of rank {}", seq, packet.src);
                op.apply(&packet.data, recv);
            }
        } else {
            // Compute `x[0] ∘ (x[1] ∘ (… ∘ x[size - 1]))`
            let mut contribs: Vec<Option<Vec<u8>>> = vec![None; self.size()];
            for _ in 1..self.size() {
                let packet = self.recv_from(seq, None)?;
                if packet.data.len() != recv.len() {
                    return Err(CommError::BufferLength(packet.data.len(), record));
                }
                contribs[packet.src] = Some(packet.data);
            }

            let mut first = true;
            for src in (0..self.size()).rev() {
                let data = if src == self.rank {
                    send
                } else {
                    contribs[src].as_deref().ok_or(CommError::Disconnected)?
                };
                if first {
                    recv.copy_from_slice(data);
                    first = false;
                } else {
                    op.apply(data, recv);
                }
            }
        }

        Ok(())
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn is_parallel(&self) -> bool {
        true
    }

    fn type_size(&self, dtype: &Datatype) -> usize {
        dtype.size()
    }

    fn reduce(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: Option<&mut [u8]>,
        root: usize,
    ) -> Result<(), CommError> {
        self.reduce_to(op, dtype, send, recv, root, true)
    }

    fn all_reduce(
        &self,
        op: &UserOp,
        dtype: &Datatype,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(), CommError> {
        if recv.len() != send.len() {
            return Err(CommError::RecvBuffer);
        }

        // The broadcast keeps the participants in step
        if self.rank == 0 {
            self.reduce_to(op, dtype, send, Some(&mut *recv), 0, false)?;
        } else {
            self.reduce_to(op, dtype, send, None, 0, false)?;
        }

        self.broadcast(recv, 0)
    }

    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<(), CommError> {
        if root >= self.size() {
            return Err(CommError::InvalidRank(root, self.size()));
        }
        let seq = self.take_seq();

        if self.rank == root {
            for dst in (0..self.size()).filter(|&i| i != root) {
                self.send_to(dst, seq, buf.to_vec())?;
            }
        } else {
            let packet = self.recv_from(seq, Some(root))?;
            if packet.data.len() != buf.len() {
                return Err(CommError::RecvBuffer);
            }
            buf.copy_from_slice(&packet.data);
        }

        Ok(())
    }

    fn barrier(&self) -> Result<(), CommError> {
        let seq = self.take_seq();

        if self.rank == 0 {
            for _ in 1..self.size() {
                self.recv_from(seq, None)?;
            }
        } else {
            self.send_to(0, seq, Vec::new())?;
        }

        self.broadcast(&mut [], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;
    use quickcheck_macros::quickcheck;

    fn add_u32(input: &[u8], inout: &mut [u8]) {
        for (i, o) in input.chunks_exact(4).zip(inout.chunks_exact_mut(4)) {
            let x = u32::from_le_bytes([i[0], i[1], i[2], i[3]]);
            let y = u32::from_le_bytes([o[0], o[1], o[2], o[3]]);
            o.copy_from_slice(&x.wrapping_add(y).to_le_bytes());
        }
    }

    /// Prepends the decimal digits of `input` to those of `inout`. Not
    /// commutative.
    fn concat_digits(input: &[u8], inout: &mut [u8]) {
        for (i, o) in input.chunks_exact(4).zip(inout.chunks_exact_mut(4)) {
            let x = u32::from_le_bytes([i[0], i[1], i[2], i[3]]);
            let y = u32::from_le_bytes([o[0], o[1], o[2], o[3]]);
            let digits = if y == 0 { 1 } else { (y as f64).log10().floor() as u32 + 1 };
            o.copy_from_slice(&(x * 10u32.pow(digits) + y).to_le_bytes());
        }
    }

    const U32: Datatype = Datatype::contiguous(Scalar::U32, 1);

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn bytes(x: &[u32]) -> Vec<u8> {
        x.iter().flat_map(|x| x.to_le_bytes().to_vec()).collect()
    }

    #[test]
    fn reduce_to_root() {
        init_logger();
        let op = UserOp::new(add_u32, true);
        let results = run(4, |comm| {
            let send = bytes(&[comm.rank() as u32, 1]);
            let mut recv = vec![0u8; send.len()];
            comm.reduce(&op, &U32, &send, Some(&mut recv), 2).unwrap();
            recv
        });

        assert_eq!(results[2], bytes(&[6, 4]));
        // Non-root receive buffers are left untouched
        assert_eq!(results[0], vec![0u8; 8]);
    }

    #[test]
    fn reduce_waits_for_root() {
        use std::{
            sync::atomic::{AtomicUsize, Ordering},
            thread::sleep,
            time::Duration,
        };

        const ROUNDS: usize = 8;
        let op = UserOp::new(add_u32, true);
        let entered = AtomicUsize::new(0);

        let results = run(3, |comm| {
            let mut recv = vec![0u8; 4];
            (0..ROUNDS)
                .map(|round| {
                    if comm.rank() == 0 {
                        sleep(Duration::from_millis(20));
                        entered.store(round + 1, Ordering::SeqCst);
                    }
                    comm.reduce(&op, &U32, &bytes(&[1]), Some(&mut recv), 0)
                        .unwrap();

                    // The root has entered this round
                    entered.load(Ordering::SeqCst)
                })
                .collect::<Vec<_>>()
        });

        for observed in &results[1..] {
            for (round, &entered) in observed.iter().enumerate() {
                assert!(entered > round, "{:?}", observed);
            }
        }
    }

    #[test]
    fn failed_root_releases_peers() {
        let op = UserOp::new(add_u32, true);
        let results = run(3, |comm| comm.reduce(&op, &U32, &[0; 4], None, 0));
        assert_eq!(results, vec![Err(CommError::RecvBuffer), Ok(()), Ok(())]);
    }

    #[test]
    fn all_reduce_delivers_everywhere() {
        let op = UserOp::new(add_u32, true);
        let results = run(3, |comm| {
            let send = bytes(&[comm.rank() as u32 + 1]);
            let mut recv = vec![0u8; 4];
            comm.all_reduce(&op, &U32, &send, &mut recv).unwrap();
            recv
        });

        assert_eq!(results, vec![bytes(&[6]); 3]);
    }

    #[test]
    fn non_commutative_reduce_uses_rank_order() {
        let op = UserOp::new(concat_digits, false);
        let results = run(4, |comm| {
            let send = bytes(&[comm.rank() as u32 + 1]);
            let mut recv = vec![0u8; 4];
            comm.reduce(&op, &U32, &send, Some(&mut recv), 0).unwrap();
            recv
        });

        assert_eq!(results[0], bytes(&[1234]));
    }

    #[test]
    fn broadcast_and_barrier() {
        let results = run(3, |comm| {
            let mut buf = if comm.rank() == 1 { [9u8, 8, 7] } else { [0; 3] };
            comm.broadcast(&mut buf, 1).unwrap();
            comm.barrier().unwrap();
            buf
        });

        assert_eq!(results, vec![[9, 8, 7]; 3]);
    }

    #[test]
    fn invalid_root() {
        let op = UserOp::new(add_u32, true);
        let results = run(2, |comm| comm.reduce(&op, &U32, &[0; 4], None, 5));
        assert_eq!(results, vec![Err(CommError::InvalidRank(5, 2)); 2]);
    }

    #[test]
    fn disconnected_peer() {
        let mut comms = thread_group(2);
        let rank1 = comms.pop().unwrap();
        drop(comms);

        let op = UserOp::new(add_u32, true);
        let mut recv = [0u8; 4];
        assert_eq!(
            rank1.all_reduce(&op, &U32, &[0; 4], &mut recv),
            Err(CommError::Disconnected)
        );
    }

    #[quickcheck]
    fn many_collectives_stay_in_step(size: u8, rounds: u8) -> bool {
        let size = size as usize % 5 + 1;
        let rounds = rounds as u32 % 16;
        let op = UserOp::new(add_u32, true);

        let results = run(size, |comm| {
            (0..rounds)
                .map(|round| {
                    let send = bytes(&[round + comm.rank() as u32]);
                    let mut recv = vec![0u8; 4];
                    comm.reduce(&op, &U32, &send, Some(&mut recv), round as usize % size)
                        .unwrap();
                    recv
                })
                .collect::<Vec<_>>()
        });

        (0..rounds).all(|round| {
            let root = round as usize % size;
            let expected = round * size as u32 + (0..size as u32).sum::<u32>();
            results[root][round as usize] == bytes(&[expected])
        })
    }
}
