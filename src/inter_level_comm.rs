//! Parent-child mapping between a fine [`Domain`] and the coarser `Domain`
//! that owns its parents (spec §4.8). Restrictor and Interpolator both drive
//! an `InterLevelComm` rather than talking to a `Communicator` directly.

use crate::communicator::Communicator;
use crate::domain::Domain;
use crate::error::{bail, Result};
use crate::patch_info::PatchInfo;
use crate::vector::Vector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One contiguous staging slot per unique off-rank coarse parent patch.
struct GhostParent {
    coarse_patch_id: i64,
    owner_rank: i32,
}

pub struct InterLevelComm {
    fine: Arc<Domain>,
    coarse: Arc<Domain>,
    /// `(coarse_local_index, fine patch)` for fine patches whose parent is
    /// owned by this rank.
    patches_with_local_parent: Vec<(usize, PatchInfo)>,
    /// `(ghost_local_index, fine patch)` for fine patches whose parent is
    /// owned by a different rank.
    patches_with_ghost_parent: Vec<(usize, PatchInfo)>,
    ghost_parents: Vec<GhostParent>,
    /// Guards spec §4.8's "at most one communication in progress" invariant.
    in_flight: AtomicBool,
}

impl InterLevelComm {
    pub fn new(fine: Arc<Domain>, coarse: Arc<Domain>) -> Result<Self> {
        let my_rank = fine.communicator().rank().unwrap_or(0) as i32;
        let mut patches_with_local_parent = Vec::new();
        let mut patches_with_ghost_parent = Vec::new();
        let mut ghost_parents: Vec<GhostParent> = Vec::new();
        let mut slot_of_parent: HashMap<i64, usize> = HashMap::new();

        for p in fine.patches() {
            if p.parent_id == crate::patch_info::NO_PATCH {
                bail!("fine patch {} has no parent; it cannot participate in an InterLevelComm", p.id);
            }
            if p.parent_rank == my_rank {
                let coarse_local = coarse
                    .patch_by_id(p.parent_id)
                    .ok_or_else(|| crate::error::RuntimeError::new(format!("parent patch {} of fine patch {} is not present on the coarse domain", p.parent_id, p.id)))?
                    .local_index;
                patches_with_local_parent.push((coarse_local, p.clone()));
            } else {
                let slot = *slot_of_parent.entry(p.parent_id).or_insert_with(|| {
                    ghost_parents.push(GhostParent { coarse_patch_id: p.parent_id, owner_rank: p.parent_rank });
                    ghost_parents.len() - 1
                });
                patches_with_ghost_parent.push((slot, p.clone()));
            }
        }

        Ok(Self { fine, coarse, patches_with_local_parent, patches_with_ghost_parent, ghost_parents, in_flight: AtomicBool::new(false) })
    }

    pub fn patches_with_local_parent(&self) -> &[(usize, PatchInfo)] {
        &self.patches_with_local_parent
    }

    pub fn patches_with_ghost_parent(&self) -> &[(usize, PatchInfo)] {
        &self.patches_with_ghost_parent
    }

    pub fn fine_domain(&self) -> &Arc<Domain> {
        &self.fine
    }

    pub fn coarse_domain(&self) -> &Arc<Domain> {
        &self.coarse
    }

    /// One coarse-shaped patch per unique off-rank parent (spec §4.8's
    /// staging buffer). Patch shapes are taken from the first local coarse
    /// patch, per the teacher's assumption that patches on one level share a
    /// uniform shape.
    pub fn get_new_ghost_vector(&self, num_components: usize) -> Result<Vector> {
        let template = self.coarse.patches().first().ok_or_else(|| crate::error::RuntimeError::new("coarse domain has no local patches to copy a shape from"))?;
        let dim = self.coarse.dim();
        let patches: Vec<PatchInfo> = self
            .ghost_parents
            .iter()
            .map(|gp| PatchInfo::new(gp.coarse_patch_id, dim, template.ns.clone(), template.starts.clone(), template.spacings.clone(), self.coarse.num_ghost_cells(), gp.owner_rank))
            .collect();
        let n = patches.len();
        let ghost_domain = Domain::new(self.coarse.id(), dim, patches, Communicator::null(), n, self.coarse.num_ghost_cells(), num_components)?;
        Ok(Vector::zeros(Arc::new(ghost_domain), num_components))
    }

    fn begin(&self) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            bail!("InterLevelComm already has a communication in progress");
        }
        Ok(())
    }

    fn end(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Encodes a patch's components as `[patch_id: i64][raw f64 cells...]`.
    /// The id header lets the receiver address the right local patch without
    /// a real MPI tag/source-rank match, since `Communicator::recv` here is a
    /// plain FIFO queue rather than a tagged channel.
    fn encode(vec: &Vector, local_index: usize, patch_id: i64) -> Result<Vec<u8>> {
        let patch = vec.patch(local_index)?;
        let mut bytes = Vec::with_capacity(8 + patch.num_components() * 64);
        bytes.extend_from_slice(&patch_id.to_le_bytes());
        for c in 0..patch.num_components() {
            for &value in patch.component(c).raw() {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(bytes)
    }

    fn decode_id(bytes: &[u8]) -> Result<i64> {
        let chunk: [u8; 8] = bytes[0..8].try_into().map_err(|_| crate::error::RuntimeError::new("truncated ghost-parent payload header"))?;
        Ok(i64::from_le_bytes(chunk))
    }

    fn accumulate(vec: &mut Vector, local_index: usize, bytes: &[u8]) -> Result<()> {
        let patch = vec.patch_mut(local_index)?;
        let mut offset = 8usize;
        for c in 0..patch.num_components() {
            let raw = patch.component_mut(c).raw_mut();
            for slot in raw.iter_mut() {
                let chunk: [u8; 8] = bytes[offset..offset + 8].try_into().map_err(|_| crate::error::RuntimeError::new("truncated ghost-parent payload"))?;
                *slot += f64::from_le_bytes(chunk);
                offset += 8;
            }
        }
        Ok(())
    }

    fn overwrite(vec: &mut Vector, local_index: usize, bytes: &[u8]) -> Result<()> {
        let patch = vec.patch_mut(local_index)?;
        let mut offset = 8usize;
        for c in 0..patch.num_components() {
            let raw = patch.component_mut(c).raw_mut();
            for slot in raw.iter_mut() {
                let chunk: [u8; 8] = bytes[offset..offset + 8].try_into().map_err(|_| crate::error::RuntimeError::new("truncated ghost-parent payload"))?;
                *slot = f64::from_le_bytes(chunk);
                offset += 8;
            }
        }
        Ok(())
    }

    /// Fine→coarse restriction scatter: start non-blocking sends of the
    /// staged `ghost_vec` slabs to the ranks owning those coarse patches.
    pub fn send_ghost_patches_start(&self, ghost_vec: &Vector) -> Result<()> {
        self.begin()?;
        let comm = self.fine.communicator();
        for gp in &self.ghost_parents {
            // `ghost_vec`'s local indexes are sorted by patch id (Domain::new),
            // which need not match `self.ghost_parents`' construction order.
            let local_index = ghost_vec
                .domain()?
                .patch_by_id(gp.coarse_patch_id)
                .ok_or_else(|| crate::error::RuntimeError::new(format!("ghost vector has no staged slot for coarse patch {}", gp.coarse_patch_id)))?
                .local_index;
            let bytes = Self::encode(ghost_vec, local_index, gp.coarse_patch_id)?;
            comm.send(gp.owner_rank as usize, bytes)?;
        }
        Ok(())
    }

    /// Number of remote children a local coarse patch has, read straight off
    /// its `child_ranks` (already known from the static forest topology the
    /// `DomainGenerator` produced, independent of which rank owns which
    /// array data).
    fn remote_child_count(&self, my_rank: i32) -> usize {
        self.coarse.patches().iter().map(|p| p.child_ranks.iter().filter(|&&r| r >= 0 && r != my_rank).count()).sum()
    }

    /// Waits for every remote contribution expected on this rank — one per
    /// fine child, owned elsewhere, of one of our coarse patches — then
    /// accumulates into `coarse_vec` (already cleared by the caller, per
    /// spec §4.8). A single-rank run never expects any.
    pub fn send_ghost_patches_finish(&self, coarse_vec: &mut Vector) -> Result<()> {
        let comm = self.fine.communicator();
        let my_rank = comm.rank().unwrap_or(0) as i32;
        let expected = self.remote_child_count(my_rank);
        for _ in 0..expected {
            let bytes = comm.recv()?;
            let coarse_id = Self::decode_id(&bytes)?;
            let local_index = self
                .coarse
                .patch_by_id(coarse_id)
                .ok_or_else(|| crate::error::RuntimeError::new(format!("received a ghost-parent contribution for unknown coarse patch {}", coarse_id)))?
                .local_index;
            Self::accumulate(coarse_vec, local_index, &bytes)?;
        }
        self.end();
        Ok(())
    }

    /// Coarse→fine interpolation gather: send coarse interior data out to
    /// every rank that owns one of this patch's children remotely, once per
    /// such rank's ghost-parent need.
    pub fn get_ghost_patches_start(&self, coarse_vec: &Vector) -> Result<()> {
        self.begin()?;
        let comm = self.fine.communicator();
        let my_rank = comm.rank().unwrap_or(0) as i32;
        for coarse_patch in self.coarse.patches() {
            for &child_rank in &coarse_patch.child_ranks {
                if child_rank >= 0 && child_rank != my_rank {
                    let bytes = Self::encode(coarse_vec, coarse_patch.local_index, coarse_patch.id)?;
                    comm.send(child_rank as usize, bytes)?;
                }
            }
        }
        Ok(())
    }

    pub fn get_ghost_patches_finish(&self, ghost_vec: &mut Vector) -> Result<()> {
        let comm = self.fine.communicator();
        for _ in 0..self.ghost_parents.len() {
            let bytes = comm.recv()?;
            let coarse_id = Self::decode_id(&bytes)?;
            let local_index = ghost_vec
                .domain()?
                .patch_by_id(coarse_id)
                .ok_or_else(|| crate::error::RuntimeError::new(format!("received a ghost-parent update for unknown coarse patch {}", coarse_id)))?
                .local_index;
            Self::overwrite(ghost_vec, local_index, &bytes)?;
        }
        self.end();
        Ok(())
    }
}
