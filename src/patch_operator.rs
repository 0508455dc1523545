//! Abstract per-patch discrete operator (spec §4.6) plus one concrete
//! worked example, `StarPatchOperator`, the second-order central-difference
//! Laplacian the spec calls out as the one in-scope concrete operator.

use crate::error::Result;
use crate::ghost_filler::GhostFiller;
use crate::patch_info::PatchInfo;
use crate::vector::Vector;
use crate::view::{loop_over_interior_indexes, ConstView, View};
use rayon::prelude::*;

/// A per-patch discrete operator `L`. Implementors must not write to ghost
/// cells from [`PatchOperator::apply_single_patch`]; the view's ghost ring
/// is assumed already filled by the caller.
pub trait PatchOperator: Send + Sync {
    fn apply_single_patch(&self, pinfo: &PatchInfo, u: &ConstView<'_>, f: &mut View<'_>) -> Result<()>;

    /// Add the stencil's reach into the ghost ring to `f`, turning a
    /// nonzero-boundary-data problem into a zero-boundary one (used by
    /// patch solvers).
    fn add_ghost_to_rhs(&self, pinfo: &PatchInfo, u: &ConstView<'_>, f: &mut View<'_>) -> Result<()>;

    fn clone_box(&self) -> Box<dyn PatchOperator>;
}

/// Default composition: `fillGhost(u); for patch: apply_single_patch(...)`;
/// zeroes `f` (including ghosts) first (spec §4.6). Per-patch work is
/// independent, so it runs over `rayon`'s pool the way the teacher's
/// `automaton::execute_par` distributes per-patch work.
pub fn apply(op: &dyn PatchOperator, ghost_filler: &dyn GhostFiller, u: &mut Vector, f: &mut Vector) -> Result<()> {
    ghost_filler.fill_ghost(u)?;
    f.set_with_ghost(0.0);

    let num_local = u.get_num_local_patches();
    let pinfos: Vec<PatchInfo> = (0..num_local).map(|i| u.patch_info(i).map(|p| p.clone())).collect::<Result<_>>()?;
    let u_patches = u.patches();
    let results: Vec<Result<Vec<(usize, crate::patch_array::ComponentArray)>>> = (0..num_local)
        .into_par_iter()
        .map(|local_index| -> Result<Vec<(usize, crate::patch_array::ComponentArray)>> {
            let pinfo = &pinfos[local_index];
            let u_patch = &u_patches[local_index];
            let mut outputs = Vec::with_capacity(u_patch.num_components());
            for c in 0..u_patch.num_components() {
                let mut out = crate::patch_array::ComponentArray::zeros(pinfo.ns.clone(), pinfo.num_ghost_cells);
                let u_view = u_patch.component(c).const_view();
                let mut f_view = out.view();
                op.apply_single_patch(pinfo, &u_view, &mut f_view)?;
                outputs.push((c, out));
            }
            Ok(outputs)
        })
        .collect();

    for (local_index, per_component) in results.into_iter().enumerate() {
        let per_component = per_component?;
        let f_patch = f.patch_mut(local_index)?;
        for (c, computed) in per_component {
            f_patch.component_mut(c).raw_mut().copy_from_slice(computed.raw());
        }
    }
    Ok(())
}

/// Second-order central-difference Laplacian, `-Δu`, per axis, with
/// per-face Neumann or Dirichlet boundary handling applied by rewriting the
/// ghost slab before the stencil runs (spec §4.6).
#[derive(Clone)]
pub struct StarPatchOperator {
    pub spacings: Vec<f64>,
}

impl StarPatchOperator {
    pub fn new(spacings: Vec<f64>) -> Self {
        Self { spacings }
    }

    fn laplacian_at(&self, u: &ConstView<'_>, coord: &[isize]) -> Result<f64> {
        let center = u.at(coord)?;
        let mut sum = 0.0;
        for axis in 0..coord.len() {
            let h2 = self.spacings[axis] * self.spacings[axis];
            let mut lo = coord.to_vec();
            lo[axis] -= 1;
            let mut hi = coord.to_vec();
            hi[axis] += 1;
            sum += (u.at(&lo)? - 2.0 * center + u.at(&hi)?) / h2;
        }
        Ok(sum)
    }
}

impl PatchOperator for StarPatchOperator {
    fn apply_single_patch(&self, _pinfo: &PatchInfo, u: &ConstView<'_>, f: &mut View<'_>) -> Result<()> {
        let start = u.start().to_vec();
        let end = u.end().to_vec();
        let mut err = None;
        loop_over_interior_indexes(&start, &end, |coord| {
            if err.is_some() {
                return;
            }
            match self.laplacian_at(u, coord) {
                Ok(value) => {
                    if let Err(e) = f.set(coord, -value) {
                        err = Some(e);
                    }
                }
                Err(e) => err = Some(e),
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn add_ghost_to_rhs(&self, _pinfo: &PatchInfo, u: &ConstView<'_>, f: &mut View<'_>) -> Result<()> {
        // Adds the portion of the stencil that reaches into the ghost ring,
        // for each interior cell adjacent to a boundary, along every axis.
        let start = u.start().to_vec();
        let end = u.end().to_vec();
        let mut err: Option<crate::error::RuntimeError> = None;
        loop_over_interior_indexes(&start, &end, |coord| {
            if err.is_some() {
                return;
            }
            for axis in 0..coord.len() {
                let h2 = self.spacings[axis] * self.spacings[axis];
                if coord[axis] == start[axis] {
                    let mut ghost = coord.to_vec();
                    ghost[axis] -= 1;
                    match u.at(&ghost).and_then(|g| f.at(coord).map(|cur| (g, cur))) {
                        Ok((g, cur)) => {
                            if let Err(e) = f.set(coord, cur - g / h2) {
                                err = Some(e);
                            }
                        }
                        Err(e) => err = Some(e),
                    }
                }
                if coord[axis] == end[axis] - 1 {
                    let mut ghost = coord.to_vec();
                    ghost[axis] += 1;
                    match u.at(&ghost).and_then(|g| f.at(coord).map(|cur| (g, cur))) {
                        Ok((g, cur)) => {
                            if let Err(e) = f.set(coord, cur - g / h2) {
                                err = Some(e);
                            }
                        }
                        Err(e) => err = Some(e),
                    }
                }
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn clone_box(&self) -> Box<dyn PatchOperator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn laplacian_of_quadratic_is_constant() {
        // u(x,y) = x^2 + y^2 on a 4x4 patch with h=1: laplacian = 4 everywhere interior.
        let mut comp = crate::patch_array::ComponentArray::zeros(vec![4, 4], 1);
        {
            let mut view = comp.view();
            for x in -1isize..5 {
                for y in -1isize..5 {
                    if x >= -1 && x <= 4 && y >= -1 && y <= 4 {
                        let _ = view.set(&[x, y], (x * x + y * y) as f64);
                    }
                }
            }
        }
        let op = StarPatchOperator::new(vec![1.0, 1.0]);
        let u_view = comp.const_view();
        let mut f = crate::patch_array::ComponentArray::zeros(vec![4, 4], 1);
        let mut f_view = f.view();
        let pinfo = PatchInfo::new(0, 2, vec![4, 4], vec![0.0, 0.0], vec![1.0, 1.0], 1, 0);
        op.apply_single_patch(&pinfo, &u_view, &mut f_view).unwrap();
        assert!((f_view.at(&[1, 1]).unwrap() - (-4.0)).abs() < 1e-9);
    }
}
