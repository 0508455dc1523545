//! Owned per-patch storage: [`ComponentArray`] (one scalar field) and
//! [`PatchArray`] (`num_components` of them, trailing-axis-indexed as the
//! spec's `PatchView<T,D>` describes) plus the strides/boxes needed to hand
//! out [`View`]/[`ConstView`]s into it.

use crate::view::{ConstView, View};

fn row_major_strides(padded_shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; padded_shape.len()];
    for i in (0..padded_shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * padded_shape[i + 1] as isize;
    }
    strides
}

/// One scalar field over a patch's interior-plus-ghost box.
#[derive(Clone)]
pub struct ComponentArray {
    ns: Vec<usize>,
    num_ghost_cells: usize,
    data: Vec<f64>,
    strides: Vec<isize>,
}

impl ComponentArray {
    pub fn zeros(ns: Vec<usize>, num_ghost_cells: usize) -> Self {
        let padded: Vec<usize> = ns.iter().map(|&n| n + 2 * num_ghost_cells).collect();
        let strides = row_major_strides(&padded);
        let len = padded.iter().product();
        Self { ns, num_ghost_cells, data: vec![0.0; len], strides }
    }

    pub fn dim(&self) -> usize {
        self.ns.len()
    }

    pub fn ns(&self) -> &[usize] {
        &self.ns
    }

    fn start(&self) -> Vec<isize> {
        vec![0; self.dim()]
    }

    fn end(&self) -> Vec<isize> {
        self.ns.iter().map(|&n| n as isize).collect()
    }

    pub fn view(&mut self) -> View<'_> {
        View::new(&mut self.data, self.strides.clone(), self.start(), self.end(), self.num_ghost_cells as isize)
    }

    pub fn const_view(&self) -> ConstView<'_> {
        ConstView::new(&self.data, self.strides.clone(), self.start(), self.end(), self.num_ghost_cells as isize)
    }

    pub fn raw(&self) -> &[f64] {
        &self.data
    }

    pub fn raw_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// `num_components` [`ComponentArray`]s sharing shape, the storage backing
/// one local patch of a [`crate::vector::Vector`].
#[derive(Clone)]
pub struct PatchArray {
    components: Vec<ComponentArray>,
}

impl PatchArray {
    pub fn zeros(ns: Vec<usize>, num_ghost_cells: usize, num_components: usize) -> Self {
        Self { components: (0..num_components).map(|_| ComponentArray::zeros(ns.clone(), num_ghost_cells)).collect() }
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, c: usize) -> &ComponentArray {
        &self.components[c]
    }

    pub fn component_mut(&mut self, c: usize) -> &mut ComponentArray {
        &mut self.components[c]
    }

    pub fn components(&self) -> &[ComponentArray] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [ComponentArray] {
        &mut self.components
    }

    pub fn zero_clone(&self) -> Self {
        Self { components: self.components.iter().map(|c| ComponentArray::zeros(c.ns.clone(), c.num_ghost_cells)).collect() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zeros_is_all_zero_including_ghosts() {
        let mut arr = ComponentArray::zeros(vec![2, 2], 1);
        let view = arr.view();
        assert_eq!(view.at(&[-1, -1]).unwrap(), 0.0);
        assert_eq!(view.at(&[1, 1]).unwrap(), 0.0);
    }

    #[test]
    fn component_writes_are_independent() {
        let mut patch = PatchArray::zeros(vec![2, 2], 1, 2);
        patch.component_mut(0).view().set(&[0, 0], 1.0).unwrap();
        assert_eq!(patch.component(0).const_view().at(&[0, 0]).unwrap(), 1.0);
        assert_eq!(patch.component(1).const_view().at(&[0, 0]).unwrap(), 0.0);
    }

    #[test]
    fn zero_clone_has_same_shape_but_zero_data() {
        let mut patch = PatchArray::zeros(vec![2, 2], 1, 1);
        patch.component_mut(0).view().set(&[0, 0], 3.0).unwrap();
        let clone = patch.zero_clone();
        assert_eq!(clone.num_components(), 1);
        assert_eq!(clone.component(0).const_view().at(&[0, 0]).unwrap(), 0.0);
    }
}
