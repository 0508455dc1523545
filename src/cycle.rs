//! Cycle schemes that walk a [`Level`] chain: V, W, and full multigrid
//! (spec §4.10). Every scheme shares the same entry point,
//! `u.set_with_ghost(0); visit(finest, f, u)`, and differs only in how
//! `visit` recurses.

use crate::error::Result;
use crate::level::Level;
use crate::patch_operator::apply as apply_operator;
use crate::vector::Vector;
use log::debug;

/// Sweep counts and cycle shape, deserializable from the diagnostics config
/// block the way the rest of this crate's knobs are (spec §6).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CycleConfig {
    #[serde(default = "one")]
    pub pre_sweeps: usize,
    #[serde(default = "one")]
    pub post_sweeps: usize,
    #[serde(default = "one")]
    pub mid_sweeps: usize,
    #[serde(default = "one")]
    pub coarse_sweeps: usize,
    #[serde(default)]
    pub cycle_type: CycleType,
}

fn one() -> usize {
    1
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { pre_sweeps: 1, post_sweeps: 1, mid_sweeps: 1, coarse_sweeps: 1, cycle_type: CycleType::default() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CycleType {
    #[serde(rename = "V")]
    V,
    #[serde(rename = "W")]
    W,
    #[serde(rename = "FMG")]
    Fmg,
}

impl Default for CycleType {
    fn default() -> Self {
        CycleType::V
    }
}

/// Residual `r = f - L u`, ghost-filling `u` as a side effect of applying the
/// level's operator (spec §4.10 step "form the residual").
fn residual(level: &Level, f: &Vector, u: &mut Vector) -> Result<Vector> {
    let mut lu = u.get_zero_clone();
    apply_operator(level.operator(), level.ghost_filler(), u, &mut lu)?;
    let mut r = f.get_zero_clone();
    r.copy(f)?;
    r.add_scaled(-1.0, &lu)?;
    Ok(r)
}

fn smooth_n(level: &Level, f: &Vector, u: &mut Vector, n: usize) -> Result<()> {
    for _ in 0..n {
        level.smoother().smooth(f, u, level.ghost_filler())?;
    }
    Ok(())
}

/// One V-cycle step at `level`: pre-smooth, restrict the residual to
/// `level`'s coarser neighbor, recurse, interpolate the coarse correction
/// back in additively, post-smooth. Coarsest level just smooths
/// `coarse_sweeps` times (spec §4.10).
fn visit_v(level: &Level, f: &Vector, u: &mut Vector, config: &CycleConfig) -> Result<()> {
    if level.is_coarsest() {
        return smooth_n(level, f, u, config.coarse_sweeps);
    }
    smooth_n(level, f, u, config.pre_sweeps)?;

    let r = residual(level, f, u)?;
    let coarser = level.coarser()?;
    let coarser_f = level.restrictor()?.restrict(&r)?;
    let mut coarser_u = coarser_f.get_zero_clone();
    visit_v(coarser, &coarser_f, &mut coarser_u, config)?;
    coarser.interpolator()?.interpolate(&coarser_u, u)?;

    smooth_n(level, f, u, config.post_sweeps)
}

/// Identical to [`visit_v`] except it recurses into the coarser level twice,
/// with `mid_sweeps` smoothing iterations on `level` between the two
/// recursions (spec §4.10's "W-cycle ... recurses twice").
fn visit_w(level: &Level, f: &Vector, u: &mut Vector, config: &CycleConfig) -> Result<()> {
    if level.is_coarsest() {
        return smooth_n(level, f, u, config.coarse_sweeps);
    }
    smooth_n(level, f, u, config.pre_sweeps)?;

    for pass in 0..2 {
        let r = residual(level, f, u)?;
        let coarser = level.coarser()?;
        let coarser_f = level.restrictor()?.restrict(&r)?;
        let mut coarser_u = coarser_f.get_zero_clone();
        visit_w(coarser, &coarser_f, &mut coarser_u, config)?;
        coarser.interpolator()?.interpolate(&coarser_u, u)?;
        if pass == 0 {
            smooth_n(level, f, u, config.mid_sweeps)?;
        }
    }

    smooth_n(level, f, u, config.post_sweeps)
}

/// Builds an initial guess by restricting `f` all the way to the coarsest
/// level, smoothing there, then interpolating back up one level at a time,
/// running a full V-cycle at each level on the way — ending with one V-cycle
/// at `level` itself (spec §4.10's "FMGCycle ... V-cycles on successively
/// coarser representations of the right-hand side to produce an initial
/// guess on the finest level, then performs a single V-cycle from the finest
/// to coarsest and back").
fn visit_fmg(level: &Level, f: &Vector, u: &mut Vector, config: &CycleConfig) -> Result<()> {
    if level.is_coarsest() {
        smooth_n(level, f, u, config.coarse_sweeps)?;
        return Ok(());
    }
    let coarser = level.coarser()?;
    let coarser_f = level.restrictor()?.restrict(f)?;
    let mut coarser_u = coarser_f.get_zero_clone();
    visit_fmg(coarser, &coarser_f, &mut coarser_u, config)?;
    coarser.interpolator()?.interpolate(&coarser_u, u)?;
    visit_v(level, f, u, config)
}

/// Top-level entry point: owns the full `Level` chain (rooted at the finest
/// level) and a fixed [`CycleConfig`].
pub struct Cycle {
    finest: Level,
    pub config: CycleConfig,
}

impl Cycle {
    pub fn new(finest: Level, config: CycleConfig) -> Self {
        Self { finest, config }
    }

    /// `u.set_with_ghost(0); visit(finest, f, u)` (spec §4.10). Mutates `u`
    /// in place; `f` is left untouched.
    pub fn apply(&self, f: &Vector, u: &mut Vector) -> Result<()> {
        u.set_with_ghost(0.0);
        debug!("starting {:?} cycle", self.config.cycle_type);
        let result = match self.config.cycle_type {
            CycleType::V => visit_v(&self.finest, f, u, &self.config),
            CycleType::W => visit_w(&self.finest, f, u, &self.config),
            CycleType::Fmg => visit_fmg(&self.finest, f, u, &self.config),
        };
        debug!("finished {:?} cycle", self.config.cycle_type);
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::domain::single_rank_domain;
    use crate::ghost_filler::{GhostFillingType, MpiGhostFiller};
    use crate::interpolator::{DirectInterpolator, MpiInterpolator};
    use crate::inter_level_comm::InterLevelComm;
    use crate::iterative::KrylovConfig;
    use crate::patch_info::PatchInfo;
    use crate::patch_operator::StarPatchOperator;
    use crate::patch_solver::{KrylovPatchSolver, KrylovVariant};
    use crate::restrictor::{LinearRestrictor, MpiRestrictor};
    use std::sync::Arc;

    fn solver(h: f64) -> Box<dyn crate::patch_solver::Smoother> {
        Box::new(KrylovPatchSolver::new(
            Box::new(StarPatchOperator::new(vec![h, h])),
            KrylovVariant::Cg,
            KrylovConfig { max_it: 200, tol: 1e-10, continue_on_breakdown: true },
        ))
    }

    fn two_level_cycle() -> (Cycle, Arc<crate::domain::Domain>) {
        let coarse_patch = PatchInfo::new(10, 2, vec![2, 2], vec![0.0, 0.0], vec![0.5, 0.5], 1, 0);
        let coarse = Arc::new(single_rank_domain(0, 2, vec![coarse_patch], 1, 1).unwrap());
        let mut fine_patch = PatchInfo::new(20, 2, vec![4, 4], vec![0.0, 0.0], vec![0.25, 0.25], 1, 0);
        fine_patch.parent_id = 10;
        fine_patch.parent_rank = 0;
        fine_patch.orth_on_parent = crate::face::Orthant::new(2, 0);
        let fine = Arc::new(single_rank_domain(1, 2, vec![fine_patch], 1, 1).unwrap());
        let ilc = Arc::new(InterLevelComm::new(fine.clone(), coarse.clone()).unwrap());

        let coarse_level = Level::coarsest(Box::new(StarPatchOperator::new(vec![0.5, 0.5])), solver(0.5), Box::new(MpiGhostFiller::new(GhostFillingType::Faces)));
        let fine_level = coarse_level.add_finer(
            Box::new(StarPatchOperator::new(vec![0.25, 0.25])),
            solver(0.25),
            Box::new(MpiGhostFiller::new(GhostFillingType::Faces)),
            Box::new(MpiRestrictor::new(ilc.clone(), Box::new(LinearRestrictor::new(false)), 1)),
            Box::new(MpiInterpolator::new(ilc, Box::new(DirectInterpolator), 1)),
        );

        let cycle = Cycle::new(fine_level, CycleConfig::default());
        (cycle, fine)
    }

    #[test]
    fn v_cycle_on_zero_rhs_stays_zero() {
        let (cycle, fine_domain) = two_level_cycle();
        let f = Vector::zeros(fine_domain.clone(), 1);
        let mut u = Vector::zeros(fine_domain, 1);
        cycle.apply(&f, &mut u).unwrap();
        let view = u.patch(0).unwrap().component(0).const_view();
        for x in 0..4isize {
            for y in 0..4isize {
                assert!(view.at(&[x, y]).unwrap().abs() < 1e-9);
            }
        }
    }

    #[test]
    fn w_cycle_config_runs_to_completion() {
        let (mut cycle, fine_domain) = two_level_cycle();
        cycle.config.cycle_type = CycleType::W;
        let mut f = Vector::zeros(fine_domain.clone(), 1);
        f.set(1.0);
        let mut u = Vector::zeros(fine_domain, 1);
        cycle.apply(&f, &mut u).unwrap();
        assert!(u.two_norm().unwrap() > 0.0);
    }

    #[test]
    fn fmg_cycle_config_runs_to_completion() {
        let (mut cycle, fine_domain) = two_level_cycle();
        cycle.config.cycle_type = CycleType::Fmg;
        let mut f = Vector::zeros(fine_domain.clone(), 1);
        f.set(1.0);
        let mut u = Vector::zeros(fine_domain, 1);
        cycle.apply(&f, &mut u).unwrap();
        assert!(u.two_norm().unwrap() > 0.0);
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = CycleConfig::default();
        assert_eq!(config.pre_sweeps, 1);
        assert_eq!(config.post_sweeps, 1);
        assert_eq!(config.mid_sweeps, 1);
        assert_eq!(config.coarse_sweeps, 1);
        assert_eq!(config.cycle_type, CycleType::V);
    }
}
