//! Collection of [`PatchArray`]s sharing a [`Domain`] (spec §3.1, §4.4).
//! Pointwise arithmetic and reductions mirror the teacher's `num_vec`
//! module's elementwise helpers, generalized across an arbitrary number of
//! local patches and driven through [`Domain`]'s patch-order (spec §5's
//! "patches are processed in the order fixed by `Domain::getPatchInfoVector()`").

use crate::communicator::Communicator;
use crate::domain::Domain;
use crate::error::{bail, Result};
use crate::patch_array::PatchArray;
use crate::view::loop_over_interior_indexes;
use std::sync::Arc;

pub struct Vector {
    domain: Option<Arc<Domain>>,
    num_components: usize,
    patches: Vec<PatchArray>,
}

impl Vector {
    /// Default-constructed: zero for every count, errors on every other
    /// accessor (spec §4.4).
    pub fn default_constructed() -> Self {
        Self { domain: None, num_components: 0, patches: Vec::new() }
    }

    pub fn zeros(domain: Arc<Domain>, num_components: usize) -> Self {
        let ng = domain.num_ghost_cells();
        let patches = domain.patches().iter().map(|p| PatchArray::zeros(p.ns.clone(), ng, num_components)).collect();
        Self { domain: Some(domain), num_components, patches }
    }

    pub(crate) fn domain(&self) -> Result<&Arc<Domain>> {
        self.domain.as_ref().ok_or_else(|| crate::error::RuntimeError::new("vector is default-constructed; it has no domain"))
    }

    pub fn get_communicator(&self) -> Result<&Communicator> {
        Ok(self.domain()?.communicator())
    }

    pub fn patch_info(&self, local_index: usize) -> Result<&crate::patch_info::PatchInfo> {
        self.domain()?.patches().get(local_index).ok_or_else(|| crate::error::RuntimeError::new(format!("local patch index {} out of range", local_index)))
    }

    pub fn get_num_local_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn get_num_components(&self) -> usize {
        self.num_components
    }

    pub fn get_num_local_cells(&self) -> usize {
        self.domain.as_ref().map(|d| d.num_local_cells()).unwrap_or(0)
    }

    pub fn get_num_ghost_cells(&self) -> usize {
        self.domain.as_ref().map(|d| d.num_ghost_cells()).unwrap_or(0)
    }

    pub fn patch(&self, local_index: usize) -> Result<&PatchArray> {
        self.patches.get(local_index).ok_or_else(|| crate::error::RuntimeError::new(format!("local patch index {} out of range", local_index)))
    }

    pub fn patch_mut(&mut self, local_index: usize) -> Result<&mut PatchArray> {
        let n = self.patches.len();
        self.patches.get_mut(local_index).ok_or_else(|| crate::error::RuntimeError::new(format!("local patch index {} out of range ({} local patches)", local_index, n)))
    }

    pub fn patches(&self) -> &[PatchArray] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [PatchArray] {
        &mut self.patches
    }

    pub fn get_zero_clone(&self) -> Self {
        Self { domain: self.domain.clone(), num_components: self.num_components, patches: self.patches.iter().map(|p| p.zero_clone()).collect() }
    }

    fn check_conformal(&self, other: &Vector) -> Result<()> {
        if self.patches.len() != other.patches.len() || self.num_components != other.num_components {
            bail!("vector shape mismatch: {} patches/{} components vs {} patches/{} components", self.patches.len(), self.num_components, other.patches.len(), other.num_components);
        }
        Ok(())
    }

    /// Overwrite interior cells with `v`, leaving ghosts untouched.
    pub fn set(&mut self, v: f64) {
        for patch in &mut self.patches {
            for c in patch.components_mut() {
                let view_start = vec![0isize; c.dim()];
                let view_end: Vec<isize> = c.ns().iter().map(|&n| n as isize).collect();
                let mut view = c.view();
                crate::view::loop_over_interior_indexes(&view_start, &view_end, |coord| {
                    let _ = view.set(coord, v);
                });
            }
        }
    }

    /// Overwrite interior *and* ghost cells with `v`.
    pub fn set_with_ghost(&mut self, v: f64) {
        for patch in &mut self.patches {
            for c in patch.components_mut() {
                c.raw_mut().iter_mut().for_each(|x| *x = v);
            }
        }
    }

    pub fn copy(&mut self, other: &Vector) -> Result<()> {
        self.check_conformal(other)?;
        for (dst, src) in self.patches.iter_mut().zip(&other.patches) {
            for (dc, sc) in dst.components_mut().iter_mut().zip(src.components()) {
                dc.raw_mut().copy_from_slice(sc.raw());
            }
        }
        Ok(())
    }

    pub fn add(&mut self, other: &Vector) -> Result<()> {
        self.add_scaled(1.0, other)
    }

    pub fn add_scaled(&mut self, alpha: f64, other: &Vector) -> Result<()> {
        self.check_conformal(other)?;
        for (dst, src) in self.patches.iter_mut().zip(&other.patches) {
            for (dc, sc) in dst.components_mut().iter_mut().zip(src.components()) {
                for (d, s) in dc.raw_mut().iter_mut().zip(sc.raw()) {
                    *d += alpha * s;
                }
            }
        }
        Ok(())
    }

    pub fn scale(&mut self, alpha: f64) {
        for patch in &mut self.patches {
            for c in patch.components_mut() {
                c.raw_mut().iter_mut().for_each(|x| *x *= alpha);
            }
        }
    }

    pub fn scale_then_add(&mut self, alpha: f64, other: &Vector) -> Result<()> {
        self.scale(alpha);
        self.add(other)
    }

    pub fn shift(&mut self, delta: f64) {
        for patch in &mut self.patches {
            for c in patch.components_mut() {
                c.raw_mut().iter_mut().for_each(|x| *x += delta);
            }
        }
    }

    /// Interior-only (spec §8 property 2: "sum ignores ghosts"); ghost cells
    /// mirror neighbor interiors after `fill_ghost` and would be
    /// double-counted if included.
    fn local_dot(&self, other: &Vector) -> f64 {
        let mut sum = 0.0;
        for (a, b) in self.patches.iter().zip(&other.patches) {
            for (ca, cb) in a.components().iter().zip(b.components()) {
                let va = ca.const_view();
                let vb = cb.const_view();
                loop_over_interior_indexes(va.start(), va.end(), |coord| {
                    sum += va.at(coord).unwrap_or(0.0) * vb.at(coord).unwrap_or(0.0);
                });
            }
        }
        sum
    }

    fn local_inf_norm(&self) -> f64 {
        let mut max = 0.0f64;
        for p in &self.patches {
            for c in p.components() {
                let view = c.const_view();
                loop_over_interior_indexes(view.start(), view.end(), |coord| {
                    max = max.max(view.at(coord).unwrap_or(0.0).abs());
                });
            }
        }
        max
    }

    pub fn dot(&self, other: &Vector) -> Result<f64> {
        self.check_conformal(other)?;
        self.domain()?.communicator().all_reduce_sum_f64(self.local_dot(other))
    }

    pub fn two_norm(&self) -> Result<f64> {
        Ok(self.dot(self)?.sqrt())
    }

    pub fn inf_norm(&self) -> Result<f64> {
        self.domain()?.communicator().all_reduce_max_f64(self.local_inf_norm())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::domain::single_rank_domain;
    use crate::patch_info::PatchInfo;

    fn domain() -> Arc<Domain> {
        let p = PatchInfo::new(0, 2, vec![2, 2], vec![0.0, 0.0], vec![0.5, 0.5], 1, 0);
        Arc::new(single_rank_domain(0, 2, vec![p], 1, 1).unwrap())
    }

    #[test]
    fn default_constructed_vector_errors_on_communicator() {
        let v = Vector::default_constructed();
        assert!(v.get_communicator().is_err());
        assert_eq!(v.get_num_local_patches(), 0);
    }

    #[test]
    fn set_then_dot_matches_analytic_value() {
        let mut v = Vector::zeros(domain(), 1);
        v.set(2.0);
        let mut w = v.get_zero_clone();
        w.set(2.0);
        // 4 interior cells at value 2 => dot = 4 * 4 = 16
        assert_eq!(v.dot(&w).unwrap(), 16.0);
    }

    #[test]
    fn two_norm_matches_dot_self_sqrt() {
        let mut v = Vector::zeros(domain(), 1);
        v.set(3.0);
        let dot = v.dot(&v).unwrap();
        let norm = v.two_norm().unwrap();
        assert!((dot.sqrt() - norm).abs() < 1e-12);
    }

    #[test]
    fn add_scaled_is_pointwise() {
        let mut a = Vector::zeros(domain(), 1);
        let mut b = Vector::zeros(domain(), 1);
        a.set(1.0);
        b.set(2.0);
        a.add_scaled(3.0, &b).unwrap();
        assert_eq!(a.patch(0).unwrap().component(0).const_view().at(&[0, 0]).unwrap(), 1.0 + 3.0 * 2.0);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let a = Vector::zeros(domain(), 1);
        let b = Vector::zeros(domain(), 2);
        assert!(a.dot(&b).is_err());
    }
}
