//! MPI communicator wrapper (spec §4.12), generalized from the teacher's
//! transport-agnostic `Communicator` trait (`message::comm`) so that it can
//! be backed by any point-to-point transport, not just the teacher's TCP
//! implementation.
//!
//! A real MPI binding duplicates the underlying communicator context on
//! copy and frees it on drop. We approximate that with an `Arc<dyn
//! Transport>`: cloning a `Communicator` is cheap and each clone is an
//! independent handle onto the same peer group, and the transport is torn
//! down (if `Transport` arranges that in its own `Drop`) once the last
//! handle is gone — the same "independently owned duplicates" contract
//! spec §4.12 asks for, without assuming a specific MPI crate exists.

use crate::error::{bail, Result};
use std::sync::Arc;

/// Point-to-point + collective transport a [`Communicator`] wraps. Mirrors
/// the teacher's `message::comm::Communicator` trait.
pub trait Transport: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Must return immediately; may not block for a matching receive.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// May block until a message is ready.
    fn recv(&self) -> Vec<u8>;
}

fn ceil_log2(p: usize) -> u32 {
    if p <= 1 {
        0
    } else {
        (usize::BITS - (p - 1).leading_zeros()).max(1)
    }
}

/// RAII wrapper around an optional [`Transport`]. A default-constructed
/// `Communicator` holds no transport and every accessor returns
/// `RuntimeError`, matching spec §4.12's "default-constructed instances
/// hold a null communicator".
#[derive(Clone)]
pub struct Communicator {
    transport: Option<Arc<dyn Transport>>,
}

impl Communicator {
    pub fn null() -> Self {
        Self { transport: None }
    }

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport: Some(transport) }
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>> {
        self.transport.as_ref().ok_or_else(|| crate::error::RuntimeError::new("communicator is null"))
    }

    pub fn rank(&self) -> Result<usize> {
        Ok(self.transport()?.rank())
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.transport()?.size())
    }

    pub fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        self.transport()?.send(rank, message);
        Ok(())
    }

    pub fn recv(&self) -> Result<Vec<u8>> {
        Ok(self.transport()?.recv())
    }

    /// Binomial-tree broadcast from rank 0, mirroring the teacher's
    /// `message::comm::Communicator::broadcast`.
    pub fn broadcast(&self, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let t = self.transport()?;
        let r = t.rank();
        let p = t.size();
        let value = match value {
            Some(v) => v,
            None => t.recv(),
        };
        for level in (0..ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);
            if r % two == 0 && r + one <= p {
                t.send(r + one, value.clone());
            }
        }
        Ok(value)
    }

    /// Binomial-tree reduce to rank 0. Every rank but 0 returns `None`.
    pub fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Result<Option<Vec<u8>>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let t = self.transport()?;
        let r = t.rank();
        let p = t.size();
        for level in (0..ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);
            if r % two == 0 {
                value = f(value, t.recv());
            } else {
                t.send(r - one, value);
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    pub fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Result<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let reduced = self.reduce(&f, value)?;
        self.broadcast(reduced)
    }

    /// `dot`/`twoNorm`-style floating point all-reduce (spec §4.4, §5).
    pub fn all_reduce_sum_f64(&self, local: f64) -> Result<f64> {
        let bytes = self.all_reduce(
            |a, b| {
                let x = f64::from_le_bytes(a.try_into().unwrap());
                let y = f64::from_le_bytes(b.try_into().unwrap());
                (x + y).to_le_bytes().to_vec()
            },
            local.to_le_bytes().to_vec(),
        )?;
        Ok(f64::from_le_bytes(bytes.try_into().map_err(|_| crate::error::RuntimeError::new("malformed reduction payload"))?))
    }

    pub fn all_reduce_max_f64(&self, local: f64) -> Result<f64> {
        let bytes = self.all_reduce(
            |a, b| {
                let x = f64::from_le_bytes(a.try_into().unwrap());
                let y = f64::from_le_bytes(b.try_into().unwrap());
                x.max(y).to_le_bytes().to_vec()
            },
            local.to_le_bytes().to_vec(),
        )?;
        Ok(f64::from_le_bytes(bytes.try_into().map_err(|_| crate::error::RuntimeError::new("malformed reduction payload"))?))
    }
}

/// A single-rank transport, useful for tests and serial runs: `recv` would
/// block forever since no peer ever sends, but `rank`/`size`/`send`-to-self
/// are well defined and that's all a one-rank `Domain` ever needs.
pub struct SingleRankTransport;

impl Transport for SingleRankTransport {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn send(&self, _rank: usize, _message: Vec<u8>) {
        bail_unreachable()
    }
    fn recv(&self) -> Vec<u8> {
        bail_unreachable()
    }
}

fn bail_unreachable() -> ! {
    unreachable!("single-rank communicator never needs to exchange messages")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn null_communicator_errors_on_every_accessor() {
        let c = Communicator::null();
        assert!(c.rank().is_err());
        assert!(c.size().is_err());
        assert!(c.send(0, vec![]).is_err());
        assert!(c.recv().is_err());
    }

    #[test]
    fn single_rank_communicator_reports_rank_zero_of_one() {
        let c = Communicator::new(Arc::new(SingleRankTransport));
        assert_eq!(c.rank().unwrap(), 0);
        assert_eq!(c.size().unwrap(), 1);
    }

    #[test]
    fn single_rank_sum_reduction_is_identity() {
        let c = Communicator::new(Arc::new(SingleRankTransport));
        assert_eq!(c.all_reduce_sum_f64(3.5).unwrap(), 3.5);
        assert_eq!(c.all_reduce_max_f64(3.5).unwrap(), 3.5);
    }

    #[test]
    fn clone_shares_the_same_transport() {
        let c = Communicator::new(Arc::new(SingleRankTransport));
        let c2 = c.clone();
        assert_eq!(c.rank().unwrap(), c2.rank().unwrap());
    }
}
