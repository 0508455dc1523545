//! Coarse→fine data transfer (spec §4.9). `Interpolator::interpolate`
//! **adds** interpolated coarse values into `fine_vec` rather than clearing
//! it first — the additive semantics [`crate::cycle::Cycle`] relies on to
//! overlay a correction onto the current iterate (spec invariant 4).

use crate::error::Result;
use crate::inter_level_comm::InterLevelComm;
use crate::vector::Vector;
use crate::view::loop_over_interior_indexes;
use std::sync::Arc;

pub trait Interpolator: Send + Sync {
    fn interpolate(&self, coarse_vec: &Vector, fine_vec: &mut Vector) -> Result<()>;

    fn clone_box(&self) -> Box<dyn Interpolator>;
}

/// Per-patch override point a concrete interpolation scheme implements:
/// given `(coarse_local_index, fine PatchInfo)` pairs and a `src` vector
/// shaped like the coarse domain, add interpolated contributions into
/// `fine_vec`.
pub trait InterpolationStencil: Send + Sync {
    fn interpolate_patches(&self, pairs: &[(usize, crate::patch_info::PatchInfo)], src: &Vector, fine_vec: &mut Vector) -> Result<()>;

    fn clone_box(&self) -> Box<dyn InterpolationStencil>;
}

/// MPI-driven base: wraps an [`InterLevelComm`] and overlaps the local
/// interpolation work with the off-rank gather, symmetric with
/// [`crate::restrictor::MpiRestrictor`] (spec §4.9's "MPIInterpolator.interpolate
/// is symmetric with getGhostPatches*").
pub struct MpiInterpolator {
    ilc: Arc<InterLevelComm>,
    stencil: Box<dyn InterpolationStencil>,
    num_components: usize,
}

impl MpiInterpolator {
    pub fn new(ilc: Arc<InterLevelComm>, stencil: Box<dyn InterpolationStencil>, num_components: usize) -> Self {
        Self { ilc, stencil, num_components }
    }
}

impl Interpolator for MpiInterpolator {
    fn interpolate(&self, coarse_vec: &Vector, fine_vec: &mut Vector) -> Result<()> {
        let mut ghost_vec = self.ilc.get_new_ghost_vector(self.num_components)?;
        self.ilc.get_ghost_patches_start(coarse_vec)?;
        self.stencil.interpolate_patches(self.ilc.patches_with_local_parent(), coarse_vec, fine_vec)?;
        self.ilc.get_ghost_patches_finish(&mut ghost_vec)?;
        self.stencil.interpolate_patches(self.ilc.patches_with_ghost_parent(), &ghost_vec, fine_vec)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Interpolator> {
        Box::new(MpiInterpolator { ilc: self.ilc.clone(), stencil: self.stencil.clone_box(), num_components: self.num_components })
    }
}

/// `coord_mapped = (coord + offset) / 2`, where `coord` is the fine patch's
/// own local coordinate and `offset` is `0` on the lower half of the parent
/// along an axis, or the coarse patch's exclusive end on that axis on the
/// upper half (spec §9's Open Question: resolved to the `getEnd() + 1` form,
/// not the older `getLengths()` form — and since this crate's `View::end()`
/// is already exclusive, it equals the spec's inclusive `getEnd() + 1`
/// directly, with no further adjustment needed here).
fn coord_mapped_to_coarse(fine_coord: &[isize], orth: crate::face::Orthant, coarse_exclusive_end: &[isize]) -> Vec<isize> {
    (0..fine_coord.len())
        .map(|axis| {
            let offset = if orth.is_lower_on_axis(axis) { 0 } else { coarse_exclusive_end[axis] };
            (fine_coord[axis] + offset).div_euclid(2)
        })
        .collect()
}

/// For each fine patch whose parent is given, add `coarse_parent[coord_mapped]`
/// into `fine[coord]` — nearest-neighbor injection of the coarse value
/// covering each fine cell (spec §4.9).
#[derive(Clone)]
pub struct DirectInterpolator;

impl InterpolationStencil for DirectInterpolator {
    fn interpolate_patches(&self, pairs: &[(usize, crate::patch_info::PatchInfo)], src: &Vector, fine_vec: &mut Vector) -> Result<()> {
        for (coarse_local, fine_pinfo) in pairs {
            let orth = fine_pinfo.orth_on_parent;
            let coarse_patch = src.patch(*coarse_local)?.clone();
            let ncomp = coarse_patch.num_components();
            for c in 0..ncomp {
                let coarse_view = coarse_patch.component(c).const_view();
                let coarse_end = coarse_view.end().to_vec();

                let fine_patch = fine_vec.patch_mut(fine_pinfo.local_index)?;
                let mut fine_view = fine_patch.component_mut(c).view();
                let start = fine_view.start().to_vec();
                let end = fine_view.end().to_vec();

                let mut err = None;
                loop_over_interior_indexes(&start, &end, |fine_coord| {
                    if err.is_some() {
                        return;
                    }
                    let coarse_coord = coord_mapped_to_coarse(fine_coord, orth, &coarse_end);
                    match coarse_view.at(&coarse_coord) {
                        Ok(value) => match fine_view.at(fine_coord) {
                            Ok(existing) => {
                                if let Err(e) = fine_view.set(fine_coord, existing + value) {
                                    err = Some(e);
                                }
                            }
                            Err(e) => err = Some(e),
                        },
                        Err(e) => err = Some(e),
                    }
                });
                if let Some(e) = err {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn InterpolationStencil> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::domain::single_rank_domain;
    use crate::face::Orthant;
    use crate::patch_info::PatchInfo;

    #[test]
    fn direct_interpolator_injects_coarse_value_into_all_covered_fine_cells() {
        let coarse_patch = PatchInfo::new(10, 2, vec![1, 1], vec![0.0, 0.0], vec![1.0, 1.0], 1, 0);
        let coarse = Arc::new(single_rank_domain(0, 2, vec![coarse_patch], 1, 1).unwrap());

        let mut fine_patch = PatchInfo::new(20, 2, vec![2, 2], vec![0.0, 0.0], vec![0.5, 0.5], 1, 0);
        fine_patch.parent_id = 10;
        fine_patch.parent_rank = 0;
        fine_patch.orth_on_parent = Orthant::new(2, 0);
        let fine = Arc::new(single_rank_domain(1, 2, vec![fine_patch], 1, 1).unwrap());

        let mut coarse_vec = Vector::zeros(coarse.clone(), 1);
        coarse_vec.set(1.0);
        let mut fine_vec = Vector::zeros(fine.clone(), 1);

        let ilc = Arc::new(InterLevelComm::new(fine, coarse).unwrap());
        let interp = MpiInterpolator::new(ilc, Box::new(DirectInterpolator), 1);
        interp.interpolate(&coarse_vec, &mut fine_vec).unwrap();

        let view = fine_vec.patch(0).unwrap().component(0).const_view();
        for x in 0..2isize {
            for y in 0..2isize {
                assert_eq!(view.at(&[x, y]).unwrap(), 1.0);
            }
        }
    }

    #[test]
    fn interpolation_is_additive_not_overwriting() {
        let coarse_patch = PatchInfo::new(10, 2, vec![1, 1], vec![0.0, 0.0], vec![1.0, 1.0], 1, 0);
        let coarse = Arc::new(single_rank_domain(0, 2, vec![coarse_patch], 1, 1).unwrap());
        let mut fine_patch = PatchInfo::new(20, 2, vec![2, 2], vec![0.0, 0.0], vec![0.5, 0.5], 1, 0);
        fine_patch.parent_id = 10;
        fine_patch.parent_rank = 0;
        fine_patch.orth_on_parent = Orthant::new(2, 0);
        let fine = Arc::new(single_rank_domain(1, 2, vec![fine_patch], 1, 1).unwrap());

        let mut coarse_vec = Vector::zeros(coarse.clone(), 1);
        coarse_vec.set(1.0);
        let mut fine_vec = Vector::zeros(fine.clone(), 1);
        fine_vec.set(5.0);

        let ilc = Arc::new(InterLevelComm::new(fine, coarse).unwrap());
        let interp = MpiInterpolator::new(ilc, Box::new(DirectInterpolator), 1);
        interp.interpolate(&coarse_vec, &mut fine_vec).unwrap();

        let view = fine_vec.patch(0).unwrap().component(0).const_view();
        assert_eq!(view.at(&[0, 0]).unwrap(), 6.0);
    }
}
