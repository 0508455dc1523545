//! Applies `L_patch^{-1}` locally as a block-Jacobi smoother (spec §4.7):
//! either a small Krylov iteration per patch, or (for the out-of-scope FFT
//! eigendecomposition collaborator) a precomputed diagonal solve.

use crate::error::{Result, SolveError};
use crate::ghost_filler::GhostFiller;
use crate::iterative::{bicgstab, cg, KrylovConfig, Matvec};
use crate::patch_operator::PatchOperator;
use crate::vector::Vector;

pub trait Smoother: Send + Sync {
    /// Ghost-fill `u`, then for each patch solve `L_patch u_patch = f_patch`
    /// using the current boundary ghosts.
    fn smooth(&self, f: &Vector, u: &mut Vector, ghost_filler: &dyn GhostFiller) -> Result<()>;

    /// Same as [`Smoother::smooth`] but zeroes `u`'s ghosts first so the
    /// initial boundaries are 0.
    fn apply(&self, f: &Vector, u: &mut Vector, ghost_filler: &dyn GhostFiller) -> Result<()> {
        u.set_with_ghost(0.0);
        self.smooth(f, u, ghost_filler)
    }

    fn clone_box(&self) -> Box<dyn Smoother>;
}

/// Wraps a patch-local operator in a flat-buffer [`Matvec`] so the generic
/// CG/BiCGStab routines in [`crate::iterative`] can drive it. `u_interior`
/// is the flattened interior of a single patch/component; ghost cells are
/// read from a fixed snapshot taken before the Krylov iteration starts,
/// matching `addGhostToRHS`'s "reduce to zero boundary data" contract.
struct PatchMatvec<'a> {
    op: &'a dyn PatchOperator,
    pinfo: &'a crate::patch_info::PatchInfo,
    ns: Vec<usize>,
    num_ghost_cells: usize,
}

impl<'a> Matvec for PatchMatvec<'a> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let mut scratch = crate::patch_array::ComponentArray::zeros(self.ns.clone(), self.num_ghost_cells);
        {
            let mut view = scratch.view();
            let start = view.start().to_vec();
            let end = view.end().to_vec();
            let mut i = 0;
            crate::view::loop_over_interior_indexes(&start, &end, |coord| {
                let _ = view.set(coord, x[i]);
                i += 1;
            });
        }
        let mut f_scratch = crate::patch_array::ComponentArray::zeros(self.ns.clone(), self.num_ghost_cells);
        {
            let u_view = scratch.const_view();
            let mut f_view = f_scratch.view();
            // Dirichlet-zero ghosts: `addGhostToRHS` already folded the true
            // boundary contribution into the right-hand side, so the
            // operator only needs interior cells here (spec §4.6, §4.7).
            let _ = self.op.apply_single_patch(self.pinfo, &u_view, &mut f_view);
        }
        let start = f_scratch.view().start().to_vec();
        let end = f_scratch.view().end().to_vec();
        let view = f_scratch.const_view();
        let mut i = 0;
        crate::view::loop_over_interior_indexes(&start, &end, |coord| {
            y[i] = view.at(coord).unwrap_or(0.0);
            i += 1;
        });
    }

    fn len(&self) -> usize {
        self.ns.iter().product()
    }
}

/// Two-variant patch solver: a local Krylov iteration (CG or BiCGStab)
/// against a single-patch right-hand side formed with `add_ghost_to_rhs`.
pub enum KrylovVariant {
    Cg,
    BiCgStab,
}

pub struct KrylovPatchSolver {
    pub op: Box<dyn PatchOperator>,
    pub variant: KrylovVariant,
    pub config: KrylovConfig,
}

impl KrylovPatchSolver {
    pub fn new(op: Box<dyn PatchOperator>, variant: KrylovVariant, config: KrylovConfig) -> Self {
        Self { op, variant, config }
    }

    fn solve_patch(&self, pinfo: &crate::patch_info::PatchInfo, u: &mut crate::patch_array::ComponentArray, f: &crate::patch_array::ComponentArray) -> std::result::Result<(), SolveError> {
        let mut rhs = f.clone();
        {
            let u_view = u.const_view();
            let mut f_view = rhs.view();
            self.op.add_ghost_to_rhs(pinfo, &u_view, &mut f_view)?;
        }
        let start = rhs.view().start().to_vec();
        let end = rhs.view().end().to_vec();
        let rhs_view = rhs.const_view();
        let mut b = Vec::with_capacity(pinfo.ns.iter().product());
        crate::view::loop_over_interior_indexes(&start, &end, |coord| b.push(rhs_view.at(coord).unwrap_or(0.0)));

        let mut x = vec![0.0; b.len()];
        let matvec = PatchMatvec { op: &*self.op, pinfo, ns: pinfo.ns.clone(), num_ghost_cells: pinfo.num_ghost_cells };

        match self.variant {
            KrylovVariant::Cg => cg(&matvec, &b, &mut x, &self.config)?,
            KrylovVariant::BiCgStab => bicgstab(&matvec, &b, &mut x, &self.config)?,
        };

        let mut view = u.view();
        let mut i = 0;
        crate::view::loop_over_interior_indexes(&start, &end, |coord| {
            let _ = view.set(coord, x[i]);
            i += 1;
        });
        Ok(())
    }
}

impl Smoother for KrylovPatchSolver {
    fn smooth(&self, f: &Vector, u: &mut Vector, ghost_filler: &dyn GhostFiller) -> Result<()> {
        ghost_filler.fill_ghost(u)?;
        for local_index in 0..u.get_num_local_patches() {
            let pinfo = u.patch_info(local_index)?.clone();
            let ncomp = u.patch(local_index)?.num_components();
            for c in 0..ncomp {
                let f_component = f.patch(local_index)?.component(c).clone();
                let u_patch = u.patch_mut(local_index)?;
                self.solve_patch(&pinfo, u_patch.component_mut(c), &f_component)
                    .map_err(|e| crate::error::RuntimeError::new(format!("patch solver failed on patch {}: {}", pinfo.id, e)))?;
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Smoother> {
        Box::new(KrylovPatchSolver { op: self.op.clone_box(), variant: match self.variant { KrylovVariant::Cg => KrylovVariant::Cg, KrylovVariant::BiCgStab => KrylovVariant::BiCgStab }, config: KrylovConfig { max_it: self.config.max_it, tol: self.config.tol, continue_on_breakdown: self.config.continue_on_breakdown } })
    }
}

/// Precomputed per-patch eigendecomposition block-Jacobi smoother. The
/// eigendecomposition itself is an out-of-scope collaborator (spec §4.7);
/// this struct holds whatever diagonal inverse it hands back and applies it
/// pointwise in eigenspace, exactly the shape of a block-Jacobi sweep.
pub struct FftBlockJacobiSmoother {
    /// `eigenvalues[local_patch_index]` — one inverse eigenvalue per
    /// interior cell, flattened in the same row-major order `PatchMatvec`
    /// uses.
    pub inverse_eigenvalues: Vec<Vec<f64>>,
}

impl Smoother for FftBlockJacobiSmoother {
    fn smooth(&self, f: &Vector, u: &mut Vector, ghost_filler: &dyn GhostFiller) -> Result<()> {
        ghost_filler.fill_ghost(u)?;
        for local_index in 0..u.get_num_local_patches() {
            let ncomp = u.patch(local_index)?.num_components();
            let inv_eig = &self.inverse_eigenvalues[local_index];
            for c in 0..ncomp {
                let f_component = f.patch(local_index)?.component(c).clone();
                let f_view = f_component.const_view();
                let start = f_view.start().to_vec();
                let end = f_view.end().to_vec();
                let u_patch = u.patch_mut(local_index)?;
                let mut u_view = u_patch.component_mut(c).view();
                let mut i = 0;
                crate::view::loop_over_interior_indexes(&start, &end, |coord| {
                    let value = f_view.at(coord).unwrap_or(0.0) * inv_eig.get(i).copied().unwrap_or(0.0);
                    let _ = u_view.set(coord, value);
                    i += 1;
                });
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Smoother> {
        Box::new(FftBlockJacobiSmoother { inverse_eigenvalues: self.inverse_eigenvalues.clone() })
    }
}
