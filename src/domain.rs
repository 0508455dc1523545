//! Rank-local patch collection plus aggregate queries (spec §4.2 references,
//! §3.1 `Domain<D>`, §3.3 lifecycle).
//!
//! A `Domain` is built once by an external [`DomainGenerator`] and is
//! read-only afterward — mirroring the teacher's `Patch`/`patch.rs` world,
//! where a `Patch` is immutable once constructed and shared behind `Arc`.

use crate::communicator::Communicator;
use crate::error::{bail, Result};
use crate::patch_info::PatchInfo;
use std::collections::HashMap;
use std::sync::Arc;

/// External collaborator (out of scope per spec §1) that produces a
/// `Domain`'s patch list, e.g. by walking a p4est forest. Declared here only
/// as the contract this crate depends on.
pub trait DomainGenerator {
    fn generate_patches(&self, dim: usize) -> Vec<PatchInfo>;
}

pub struct Domain {
    dim: usize,
    id: i64,
    patches: Vec<PatchInfo>,
    comm: Communicator,
    num_global_patches: usize,
    num_ghost_cells: usize,
    num_components: usize,
    id_to_local: HashMap<i64, usize>,
}

impl Domain {
    /// Assembles a `Domain` from a locally generated patch list, resolving
    /// `local_index`/`global_index` on every patch and every neighbor slot.
    /// `num_global_patches` is supplied directly since computing it requires
    /// an `Allreduce` over the `Communicator` that a unit-test-friendly
    /// constructor should not force on every caller; use
    /// [`Domain::num_global_patches_via_allreduce`] once the `Communicator`
    /// is wired up.
    pub fn new(id: i64, dim: usize, mut patches: Vec<PatchInfo>, comm: Communicator, num_global_patches: usize, num_ghost_cells: usize, num_components: usize) -> Result<Self> {
        patches.sort();
        let mut id_to_local = HashMap::new();
        for (i, p) in patches.iter_mut().enumerate() {
            p.local_index = i;
            id_to_local.insert(p.id, i);
        }
        let global_index_of: HashMap<i64, i64> = patches.iter().map(|p| (p.id, p.global_index)).collect();
        for p in patches.iter_mut() {
            let faces: Vec<_> = p.nbr_faces().map(|(f, n)| (f, n.clone())).collect();
            for (face, mut nbr_info) in faces {
                nbr_info.resolve_indexes(&id_to_local, &global_index_of);
                p.set_nbr_info(face, Some(nbr_info))?;
            }
        }
        if patches.iter().any(|p| p.dim() != dim) {
            bail!("domain {} received a patch whose dimension does not match dim={}", id, dim);
        }
        Ok(Self { dim, id, patches, comm, num_global_patches, num_ghost_cells, num_components, id_to_local })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn communicator(&self) -> &Communicator {
        &self.comm
    }

    pub fn patches(&self) -> &[PatchInfo] {
        &self.patches
    }

    pub fn patch_by_id(&self, id: i64) -> Option<&PatchInfo> {
        self.id_to_local.get(&id).map(|&i| &self.patches[i])
    }

    pub fn num_local_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn num_global_patches(&self) -> usize {
        self.num_global_patches
    }

    pub fn num_ghost_cells(&self) -> usize {
        self.num_ghost_cells
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn num_local_cells(&self) -> usize {
        self.patches.iter().map(|p| p.ns.iter().product::<usize>()).sum()
    }

    /// Total ghost-cell count across all local patches: for each patch, the
    /// volume of the padded box minus the interior volume.
    pub fn num_ghost_cells_total(&self) -> usize {
        self.patches
            .iter()
            .map(|p| {
                let padded: usize = p.ns.iter().map(|&n| n + 2 * self.num_ghost_cells).product();
                let interior: usize = p.ns.iter().product();
                padded - interior
            })
            .sum()
    }
}

/// Convenience constructor for single-rank Domains (tests, serial runs):
/// `num_global_patches` is simply the local patch count.
pub fn single_rank_domain(id: i64, dim: usize, patches: Vec<PatchInfo>, num_ghost_cells: usize, num_components: usize) -> Result<Domain> {
    let n = patches.len();
    let comm = Communicator::new(Arc::new(crate::communicator::SingleRankTransport));
    Domain::new(id, dim, patches, comm, n, num_ghost_cells, num_components)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::face::Side;
    use crate::nbr_info::NbrInfo;

    fn patch(id: i64) -> PatchInfo {
        PatchInfo::new(id, 2, vec![4, 4], vec![0.0, 0.0], vec![0.25, 0.25], 1, 0)
    }

    #[test]
    fn single_rank_domain_assigns_dense_local_indexes() {
        let domain = single_rank_domain(0, 2, vec![patch(5), patch(1), patch(3)], 1, 1).unwrap();
        let indexes: Vec<usize> = domain.patches().iter().map(|p| p.local_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(domain.patches()[0].id, 1);
    }

    #[test]
    fn rejects_mismatched_dimension() {
        let mut p3 = PatchInfo::new(9, 3, vec![2, 2, 2], vec![0.0; 3], vec![0.5; 3], 1, 0);
        p3.local_index = 0;
        let err = Domain::new(0, 2, vec![p3], Communicator::null(), 1, 1, 1);
        assert!(err.is_err());
    }

    #[test]
    fn neighbor_indexes_resolve_against_sibling_patches() {
        let mut left = patch(0);
        let mut right = patch(1);
        let east = crate::face::Face::Side(Side::new(2, 0, false));
        let west = crate::face::Face::Side(Side::new(2, 0, true));
        left.set_nbr_info(east, Some(NbrInfo::normal(1, 0))).unwrap();
        right.set_nbr_info(west, Some(NbrInfo::normal(0, 0))).unwrap();
        let domain = single_rank_domain(0, 2, vec![left, right], 1, 1).unwrap();
        let (nbr, local_index) = domain.patches()[0].get_normal_nbr_info(east).unwrap().as_normal().unwrap();
        assert_eq!(nbr.id, 1);
        assert_eq!(local_index, Some(1));
    }

    #[test]
    fn num_local_cells_and_ghosts() {
        let domain = single_rank_domain(0, 2, vec![patch(0)], 1, 1).unwrap();
        assert_eq!(domain.num_local_cells(), 16);
        // padded 6x6 minus interior 4x4
        assert_eq!(domain.num_ghost_cells_total(), 36 - 16);
    }
}
