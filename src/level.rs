//! A `Level` bundles the four per-level collaborators (spec §3.1, §4.10):
//! an `Operator`, a `Smoother`, a `Restrictor` that carries this level's
//! residual down to its coarser neighbor, and an `Interpolator` that carries
//! *this* level's corrected solution up into whichever level was built
//! directly on top of it ("to next finer", spec §3.1's Level table). Levels
//! are built coarsest-first (spec §3.3) and linked into a singly owned chain
//! that only ever points downward — the finer/back link the source keeps is
//! deliberately dropped per spec §9's design note.

use crate::error::{Result, RuntimeError};
use crate::ghost_filler::GhostFiller;
use crate::interpolator::Interpolator;
use crate::patch_operator::PatchOperator;
use crate::patch_solver::Smoother;
use crate::restrictor::Restrictor;

pub struct Level {
    operator: Box<dyn PatchOperator>,
    smoother: Box<dyn Smoother>,
    ghost_filler: Box<dyn GhostFiller>,
    /// Restricts this level's residual down to `coarser` (spec: "Restrictor
    /// (to next coarser)"). `None` iff this is the coarsest level.
    restrictor: Option<Box<dyn Restrictor>>,
    /// Interpolates *this* level's correction up into the level that was
    /// built on top of it (spec: "Interpolator (to next finer)"). `None` iff
    /// this level is the finest — there is no finer level to push into.
    interpolator: Option<Box<dyn Interpolator>>,
    coarser: Option<Box<Level>>,
}

impl Level {
    /// Starts a new chain with a single, coarsest level.
    pub fn coarsest(operator: Box<dyn PatchOperator>, smoother: Box<dyn Smoother>, ghost_filler: Box<dyn GhostFiller>) -> Self {
        Self { operator, smoother, ghost_filler, restrictor: None, interpolator: None, coarser: None }
    }

    /// Builds a new level directly finer than `self`, consuming `self` as
    /// the new level's coarser neighbor. `interpolator_up` is installed on
    /// `self` (it is `self`'s "to next finer" interpolator, called when the
    /// new level ascends from it); `restrictor_down` is installed on the new
    /// level, carrying its residual down to `self`.
    pub fn add_finer(
        mut self,
        operator: Box<dyn PatchOperator>,
        smoother: Box<dyn Smoother>,
        ghost_filler: Box<dyn GhostFiller>,
        restrictor_down: Box<dyn Restrictor>,
        interpolator_up: Box<dyn Interpolator>,
    ) -> Self {
        self.interpolator = Some(interpolator_up);
        Self { operator, smoother, ghost_filler, restrictor: Some(restrictor_down), interpolator: None, coarser: Some(Box::new(self)) }
    }

    pub fn operator(&self) -> &dyn PatchOperator {
        &*self.operator
    }

    pub fn smoother(&self) -> &dyn Smoother {
        &*self.smoother
    }

    pub fn ghost_filler(&self) -> &dyn GhostFiller {
        &*self.ghost_filler
    }

    pub fn is_finest(&self) -> bool {
        self.interpolator.is_none()
    }

    pub fn is_coarsest(&self) -> bool {
        self.coarser.is_none()
    }

    pub fn restrictor(&self) -> Result<&dyn Restrictor> {
        self.restrictor.as_deref().ok_or_else(|| RuntimeError::new("This level does not have a restrictor"))
    }

    pub fn interpolator(&self) -> Result<&dyn Interpolator> {
        self.interpolator.as_deref().ok_or_else(|| RuntimeError::new("This level does not have an interpolator"))
    }

    pub fn coarser(&self) -> Result<&Level> {
        self.coarser.as_deref().ok_or_else(|| RuntimeError::new("This level does not have a coarser level"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ghost_filler::{GhostFillingType, MpiGhostFiller};
    use crate::interpolator::{DirectInterpolator, MpiInterpolator};
    use crate::patch_operator::StarPatchOperator;
    use crate::patch_solver::{KrylovPatchSolver, KrylovVariant};
    use crate::restrictor::{LinearRestrictor, MpiRestrictor};
    use crate::{domain::single_rank_domain, inter_level_comm::InterLevelComm, iterative::KrylovConfig, patch_info::PatchInfo};
    use std::sync::Arc;

    fn solver() -> Box<dyn Smoother> {
        Box::new(KrylovPatchSolver::new(Box::new(StarPatchOperator::new(vec![1.0, 1.0])), KrylovVariant::Cg, KrylovConfig::default()))
    }

    #[test]
    fn single_level_is_both_finest_and_coarsest() {
        let op = Box::new(StarPatchOperator::new(vec![1.0, 1.0]));
        let gf = Box::new(MpiGhostFiller::new(GhostFillingType::Faces));
        let level = Level::coarsest(op, solver(), gf);
        assert!(level.is_finest());
        assert!(level.is_coarsest());
        assert!(level.restrictor().is_err());
        assert!(level.interpolator().is_err());
        assert!(level.coarser().is_err());
    }

    #[test]
    fn two_level_chain_has_restrictor_and_interpolator_on_the_right_sides() {
        let coarse_patch = PatchInfo::new(0, 2, vec![2, 2], vec![0.0, 0.0], vec![1.0, 1.0], 1, 0);
        let coarse = Arc::new(single_rank_domain(0, 2, vec![coarse_patch], 1, 1).unwrap());
        let mut fine_patch = PatchInfo::new(1, 2, vec![2, 2], vec![0.0, 0.0], vec![0.5, 0.5], 1, 0);
        fine_patch.parent_id = 0;
        fine_patch.parent_rank = 0;
        let fine = Arc::new(single_rank_domain(1, 2, vec![fine_patch], 1, 1).unwrap());
        let ilc = Arc::new(InterLevelComm::new(fine, coarse).unwrap());

        let coarse_level = Level::coarsest(
            Box::new(StarPatchOperator::new(vec![1.0, 1.0])),
            solver(),
            Box::new(MpiGhostFiller::new(GhostFillingType::Faces)),
        );
        let fine_level = coarse_level.add_finer(
            Box::new(StarPatchOperator::new(vec![0.5, 0.5])),
            solver(),
            Box::new(MpiGhostFiller::new(GhostFillingType::Faces)),
            Box::new(MpiRestrictor::new(ilc.clone(), Box::new(LinearRestrictor::new(false)), 1)),
            Box::new(MpiInterpolator::new(ilc, Box::new(DirectInterpolator), 1)),
        );

        assert!(fine_level.is_finest());
        assert!(!fine_level.is_coarsest());
        assert!(fine_level.restrictor().is_ok());
        assert!(fine_level.interpolator().is_err());

        let coarser = fine_level.coarser().unwrap();
        assert!(coarser.is_coarsest());
        assert!(coarser.restrictor().is_err());
        assert!(coarser.interpolator().is_ok());
    }
}
