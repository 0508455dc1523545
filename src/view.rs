//! Strided D-dimensional views over contiguous patch storage (spec §3.1,
//! §4.3). A view never owns data; it borrows from a [`crate::patch_array::PatchArray`]
//! or a foreign buffer, the way the teacher's `num_vec`/`rect_map` types
//! borrow into a backing `Vec` rather than copying.

use crate::error::{bail, Result};

/// A read-only view of a `D`-dimensional box. Both halves of the spec's
/// `ConstView`/`View` split share this shape; only mutability of the
/// backing slice differs, so `View` below is a thin wrapper that always
/// hands out a `ConstView` for reads.
#[derive(Clone)]
pub struct ConstView<'a> {
    data: &'a [f64],
    strides: Vec<isize>,
    /// Coordinate of the first ghost cell on each axis (inclusive), e.g. `-ng`.
    ghost_start: Vec<isize>,
    /// Coordinate of the first interior cell on each axis (inclusive).
    start: Vec<isize>,
    /// Coordinate one past the last interior cell on each axis (exclusive).
    end: Vec<isize>,
    /// Coordinate one past the last ghost cell on each axis (exclusive).
    ghost_end: Vec<isize>,
    base_offset: isize,
}

impl<'a> ConstView<'a> {
    pub fn new(data: &'a [f64], strides: Vec<isize>, start: Vec<isize>, end: Vec<isize>, num_ghost_cells: isize) -> Self {
        let dim = start.len();
        let ghost_start: Vec<isize> = start.iter().map(|&s| s - num_ghost_cells).collect();
        let ghost_end: Vec<isize> = end.iter().map(|&e| e + num_ghost_cells).collect();
        debug_assert_eq!(strides.len(), dim);
        Self { data, strides, ghost_start, start, end, ghost_end, base_offset: 0 }
    }

    pub fn dim(&self) -> usize {
        self.start.len()
    }

    pub fn start(&self) -> &[isize] {
        &self.start
    }

    pub fn end(&self) -> &[isize] {
        &self.end
    }

    pub fn ghost_start(&self) -> &[isize] {
        &self.ghost_start
    }

    pub fn ghost_end(&self) -> &[isize] {
        &self.ghost_end
    }

    fn offset_of(&self, coord: &[isize]) -> Result<isize> {
        if coord.len() != self.dim() {
            bail!("coordinate has {} components, view is {}-dimensional", coord.len(), self.dim());
        }
        for i in 0..self.dim() {
            if coord[i] < self.ghost_start[i] || coord[i] >= self.ghost_end[i] {
                bail!("index {:?} outside ghost box [{:?}, {:?})", coord, self.ghost_start, self.ghost_end);
            }
        }
        Ok(self.base_offset + coord.iter().zip(&self.strides).map(|(&c, &s)| c * s).sum::<isize>())
    }

    pub fn at(&self, coord: &[isize]) -> Result<f64> {
        let off = self.offset_of(coord)?;
        Ok(self.data[off as usize])
    }

    /// Slab of one lower dimension sitting `offset` cells from the face
    /// normal to `face_axis` (spec §4.3): `offset == 0` is the first
    /// interior slab, `offset == -1` the first ghost slab, and so on down
    /// to `-num_ghost_cells`.
    pub fn get_slice_on(&self, face_axis: usize, face_is_lower: bool, offset: isize) -> Result<ConstView<'a>> {
        let ng = self.start[face_axis] - self.ghost_start[face_axis];
        if offset > 0 || offset < -ng {
            bail!("slab offset {} out of range for {} ghost cells", offset, ng);
        }
        let coord = if face_is_lower { self.start[face_axis] + offset } else { self.end[face_axis] - 1 - offset };
        let extra = self.strides[face_axis] * coord;

        let mut strides = self.strides.clone();
        let mut start = self.start.clone();
        let mut end = self.end.clone();
        strides.remove(face_axis);
        start.remove(face_axis);
        end.remove(face_axis);

        let mut slab = ConstView::new(self.data, strides, start, end, ng);
        slab.base_offset = self.base_offset + extra;
        Ok(slab)
    }

    /// Ghost-only slab addressed by a non-negative offset counted into the
    /// ghost region (spec §4.3's `getGhostSliceOn`).
    pub fn get_ghost_slice_on(&self, face_axis: usize, face_is_lower: bool, ghost_offset: isize) -> Result<ConstView<'a>> {
        self.get_slice_on(face_axis, face_is_lower, -ghost_offset - 1)
    }
}

/// The mutable counterpart of [`ConstView`]. Per spec §9, a view's lifetime
/// is bounded by its source array's, and mutable/immutable views never
/// coexist over overlapping regions — enforced here by ordinary borrow
/// checking rather than runtime bookkeeping.
pub struct View<'a> {
    data: &'a mut [f64],
    strides: Vec<isize>,
    ghost_start: Vec<isize>,
    start: Vec<isize>,
    end: Vec<isize>,
    ghost_end: Vec<isize>,
}

impl<'a> View<'a> {
    pub fn new(data: &'a mut [f64], strides: Vec<isize>, start: Vec<isize>, end: Vec<isize>, num_ghost_cells: isize) -> Self {
        let ghost_start: Vec<isize> = start.iter().map(|&s| s - num_ghost_cells).collect();
        let ghost_end: Vec<isize> = end.iter().map(|&e| e + num_ghost_cells).collect();
        Self { data, strides, ghost_start, start, end, ghost_end }
    }

    pub fn dim(&self) -> usize {
        self.start.len()
    }

    pub fn start(&self) -> &[isize] {
        &self.start
    }

    pub fn end(&self) -> &[isize] {
        &self.end
    }

    fn offset_of(&self, coord: &[isize]) -> Result<isize> {
        if coord.len() != self.dim() {
            bail!("coordinate has {} components, view is {}-dimensional", coord.len(), self.dim());
        }
        for i in 0..self.dim() {
            if coord[i] < self.ghost_start[i] || coord[i] >= self.ghost_end[i] {
                bail!("index {:?} outside ghost box [{:?}, {:?})", coord, self.ghost_start, self.ghost_end);
            }
        }
        Ok(coord.iter().zip(&self.strides).map(|(&c, &s)| c * s).sum())
    }

    pub fn at(&self, coord: &[isize]) -> Result<f64> {
        Ok(self.data[self.offset_of(coord)? as usize])
    }

    pub fn set(&mut self, coord: &[isize], value: f64) -> Result<()> {
        let off = self.offset_of(coord)?;
        self.data[off as usize] = value;
        Ok(())
    }

    pub fn as_const(&self) -> ConstView<'_> {
        ConstView {
            data: self.data,
            strides: self.strides.clone(),
            ghost_start: self.ghost_start.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            ghost_end: self.ghost_end.clone(),
            base_offset: 0,
        }
    }
}

/// Visits every interior coordinate in natural (last axis fastest) order.
pub fn loop_over_interior_indexes(start: &[isize], end: &[isize], mut f: impl FnMut(&[isize])) {
    loop_over_box(start, end, &mut f);
}

/// Visits every coordinate in the ghost box, including padding.
pub fn loop_over_all_indexes(ghost_start: &[isize], ghost_end: &[isize], mut f: impl FnMut(&[isize])) {
    loop_over_box(ghost_start, ghost_end, &mut f);
}

fn loop_over_box(start: &[isize], end: &[isize], f: &mut impl FnMut(&[isize])) {
    let dim = start.len();
    if dim == 0 || start.iter().zip(end).any(|(&s, &e)| s >= e) {
        return;
    }
    let mut coord = start.to_vec();
    loop {
        f(&coord);
        let mut axis = dim;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            coord[axis] += 1;
            if coord[axis] < end[axis] {
                break;
            }
            coord[axis] = start[axis];
            if axis == 0 {
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row_major_strides(ns: &[usize], num_ghost_cells: usize) -> Vec<isize> {
        let padded: Vec<isize> = ns.iter().map(|&n| (n + 2 * num_ghost_cells) as isize).collect();
        let mut strides = vec![1isize; padded.len()];
        for i in (0..padded.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * padded[i + 1];
        }
        strides
    }

    #[test]
    fn loop_over_interior_visits_every_cell_once() {
        let mut count = 0;
        loop_over_interior_indexes(&[0, 0], &[3, 2], |_| count += 1);
        assert_eq!(count, 6);
    }

    #[test]
    fn loop_over_all_includes_ghost_padding() {
        let mut count = 0;
        loop_over_all_indexes(&[-1, -1], &[5, 5], |_| count += 1);
        assert_eq!(count, 36);
    }

    #[test]
    fn view_rejects_out_of_ghost_box_index() {
        let ns = [2usize, 2];
        let ng = 1usize;
        let strides = row_major_strides(&ns, ng);
        let mut data = vec![0.0; (ns[0] + 2 * ng) * (ns[1] + 2 * ng)];
        let view = View::new(&mut data, strides, vec![0, 0], vec![2, 2], ng as isize);
        assert!(view.at(&[0, 0]).is_ok());
        assert!(view.at(&[-1, 0]).is_ok());
        assert!(view.at(&[-2, 0]).is_err());
    }

    #[test]
    fn set_then_get_round_trips() {
        let ns = [2usize, 2];
        let ng = 1usize;
        let strides = row_major_strides(&ns, ng);
        let mut data = vec![0.0; (ns[0] + 2 * ng) * (ns[1] + 2 * ng)];
        let mut view = View::new(&mut data, strides, vec![0, 0], vec![2, 2], ng as isize);
        view.set(&[0, 0], 42.0).unwrap();
        assert_eq!(view.at(&[0, 0]).unwrap(), 42.0);
    }

    #[test]
    fn get_slice_on_lower_face_is_first_interior_row() {
        let ns = [3usize, 2];
        let ng = 1usize;
        let strides = row_major_strides(&ns, ng);
        let padded_len = (ns[0] + 2 * ng) * (ns[1] + 2 * ng);
        let mut data = vec![0.0; padded_len];
        {
            let mut view = View::new(&mut data, strides.clone(), vec![0, 0], vec![3, 2], ng as isize);
            for x in 0..3isize {
                for y in 0..2isize {
                    view.set(&[x, y], (x + 10 * y) as f64).unwrap();
                }
            }
        }
        let const_view = ConstView::new(&data, strides, vec![0, 0], vec![3, 2], ng as isize);
        // axis 0 (x), lower face: slab at x == 0
        let slab = const_view.get_slice_on(0, true, 0).unwrap();
        assert_eq!(slab.dim(), 1);
        assert_eq!(slab.at(&[0]).unwrap(), 0.0);
        assert_eq!(slab.at(&[1]).unwrap(), 10.0);
    }
}
