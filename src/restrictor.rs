//! Fine→coarse data transfer (spec §4.9). `Restrictor::restrict` returns a
//! freshly allocated coarse [`Vector`]; concrete restriction stencils plug
//! into [`MPIRestrictor`] via the `restrictPatches` override point.

use crate::error::Result;
use crate::inter_level_comm::InterLevelComm;
use crate::vector::Vector;
use crate::view::loop_over_interior_indexes;
use std::sync::Arc;

pub trait Restrictor: Send + Sync {
    fn restrict(&self, fine_vec: &Vector) -> Result<Vector>;

    fn clone_box(&self) -> Box<dyn Restrictor>;
}

/// Per-patch override point a concrete restriction stencil implements:
/// given a set of `(coarse_local_index, fine PatchInfo)` pairs, write
/// restricted values from `fine_vec` into `dst` at those coarse indexes.
pub trait RestrictionStencil: Send + Sync {
    fn restrict_patches(&self, pairs: &[(usize, crate::patch_info::PatchInfo)], fine_vec: &Vector, dst: &mut Vector) -> Result<()>;

    fn clone_box(&self) -> Box<dyn RestrictionStencil>;
}

/// MPI-driven base: wraps an [`InterLevelComm`] and overlaps the local
/// restriction work with the off-rank scatter (spec §4.9 steps 1-7).
pub struct MpiRestrictor {
    ilc: Arc<InterLevelComm>,
    stencil: Box<dyn RestrictionStencil>,
    num_components: usize,
}

impl MpiRestrictor {
    pub fn new(ilc: Arc<InterLevelComm>, stencil: Box<dyn RestrictionStencil>, num_components: usize) -> Self {
        Self { ilc, stencil, num_components }
    }
}

impl Restrictor for MpiRestrictor {
    fn restrict(&self, fine_vec: &Vector) -> Result<Vector> {
        let mut ghost_vec = self.ilc.get_new_ghost_vector(self.num_components)?;
        let mut coarse_vec = Vector::zeros(self.ilc.coarse_domain().clone(), self.num_components);

        self.stencil.restrict_patches(self.ilc.patches_with_ghost_parent(), fine_vec, &mut ghost_vec)?;
        coarse_vec.set_with_ghost(0.0);
        self.ilc.send_ghost_patches_start(&ghost_vec)?;
        self.stencil.restrict_patches(self.ilc.patches_with_local_parent(), fine_vec, &mut coarse_vec)?;
        self.ilc.send_ghost_patches_finish(&mut coarse_vec)?;

        Ok(coarse_vec)
    }

    fn clone_box(&self) -> Box<dyn Restrictor> {
        Box::new(MpiRestrictor { ilc: self.ilc.clone(), stencil: self.stencil.clone_box(), num_components: self.num_components })
    }
}

fn coord_mapped_to_coarse(coord: &[isize], orth: crate::face::Orthant, coarse_ns: &[usize]) -> Vec<isize> {
    (0..coord.len())
        .map(|axis| {
            let offset = if orth.is_lower_on_axis(axis) { 0 } else { coarse_ns[axis] as isize };
            (coord[axis] + offset).div_euclid(2)
        })
        .collect()
}

/// Averages the `2^D` fine cells under each coarse cell. With
/// `extrapolate_boundary_ghosts` set, additionally linearly extrapolates
/// coarse boundary ghosts from the two adjacent fine interior slabs (spec
/// §4.9).
#[derive(Clone)]
pub struct LinearRestrictor {
    pub extrapolate_boundary_ghosts: bool,
}

impl LinearRestrictor {
    pub fn new(extrapolate_boundary_ghosts: bool) -> Self {
        Self { extrapolate_boundary_ghosts }
    }
}

impl RestrictionStencil for LinearRestrictor {
    fn restrict_patches(&self, pairs: &[(usize, crate::patch_info::PatchInfo)], fine_vec: &Vector, dst: &mut Vector) -> Result<()> {
        for (coarse_local, fine_pinfo) in pairs {
            let orth = fine_pinfo.orth_on_parent;
            let fine_patch = fine_vec.patch(fine_pinfo.local_index)?.clone();
            let ncomp = fine_patch.num_components();
            let coarse_ns: Vec<usize> = fine_pinfo.ns.iter().map(|&n| n).collect();
            for c in 0..ncomp {
                let fine_view = fine_patch.component(c).const_view();
                let start = fine_view.start().to_vec();
                let end = fine_view.end().to_vec();
                let dim = start.len();
                let coarse_patch = dst.patch_mut(*coarse_local)?;
                let mut coarse_view = coarse_patch.component_mut(c).view();
                let mut err = None;
                loop_over_interior_indexes(&start, &end, |fine_coord| {
                    if err.is_some() {
                        return;
                    }
                    if fine_coord.iter().any(|&x| x % 2 != 0) {
                        // visit once per coarse cell: only the lower corner
                        // of each 2^D fine block triggers an average.
                        return;
                    }
                    let mapped = coord_mapped_to_coarse(fine_coord, orth, &coarse_ns);
                    let mut sum = 0.0;
                    let corners = 1usize << dim;
                    for corner in 0..corners {
                        let mut cell = fine_coord.to_vec();
                        for axis in 0..dim {
                            if (corner >> axis) & 1 == 1 {
                                cell[axis] += 1;
                            }
                        }
                        match fine_view.at(&cell) {
                            Ok(v) => sum += v,
                            Err(e) => {
                                err = Some(e);
                                return;
                            }
                        }
                    }
                    if let Err(e) = coarse_view.set(&mapped, sum / corners as f64) {
                        err = Some(e);
                    }
                });
                if let Some(e) = err {
                    return Err(e);
                }
            }
        }
        if self.extrapolate_boundary_ghosts {
            extrapolate_boundary_ghosts(dst)?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn RestrictionStencil> {
        Box::new(self.clone())
    }
}

/// Linear extrapolation of coarse boundary ghosts from the two adjacent
/// interior slabs along each boundary axis: `ghost = 2*slab0 - slab1`.
fn extrapolate_boundary_ghosts(vec: &mut Vector) -> Result<()> {
    for local_index in 0..vec.get_num_local_patches() {
        let ncomp = vec.patch(local_index)?.num_components();
        for c in 0..ncomp {
            let dim = vec.patch(local_index)?.component(c).dim();
            for axis in 0..dim {
                for &is_lower in &[true, false] {
                    let patch = vec.patch(local_index)?.clone();
                    let view = patch.component(c).const_view();
                    let slab0 = view.get_slice_on(axis, is_lower, 0)?;
                    let slab1 = view.get_slice_on(axis, is_lower, -1).unwrap_or_else(|_| slab0.clone());
                    let start = view.start().to_vec();
                    let end = view.end().to_vec();
                    let mut tangential_start = start.clone();
                    let mut tangential_end = end.clone();
                    tangential_start.remove(axis);
                    tangential_end.remove(axis);
                    let coord_on_axis = if is_lower { start[axis] - 1 } else { end[axis] };
                    let out = vec.patch_mut(local_index)?;
                    let mut out_view = out.component_mut(c).view();
                    let mut err = None;
                    loop_over_interior_indexes(&tangential_start, &tangential_end, |tangential| {
                        if err.is_some() {
                            return;
                        }
                        let (s0, s1) = match (slab0.at(tangential), slab1.at(tangential)) {
                            (Ok(a), Ok(b)) => (a, b),
                            (Ok(a), Err(_)) => (a, a),
                            (Err(e), _) => {
                                err = Some(e);
                                return;
                            }
                        };
                        let mut coord = tangential.to_vec();
                        coord.insert(axis, coord_on_axis);
                        if let Err(e) = out_view.set(&coord, 2.0 * s0 - s1) {
                            err = Some(e);
                        }
                    });
                    if let Some(e) = err {
                        return Err(e);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Plain averaging with no boundary extrapolation; used where the fine
/// "parent" is the same patch shape as the coarse one (no coarsening — the
/// stencil falls back to a copy).
#[derive(Clone)]
pub struct AvgRstr;

impl RestrictionStencil for AvgRstr {
    fn restrict_patches(&self, pairs: &[(usize, crate::patch_info::PatchInfo)], fine_vec: &Vector, dst: &mut Vector) -> Result<()> {
        LinearRestrictor::new(false).restrict_patches(pairs, fine_vec, dst)
    }

    fn clone_box(&self) -> Box<dyn RestrictionStencil> {
        Box::new(self.clone())
    }
}
