//! Per-patch metadata (spec §4.2). Holds no cell values — just enough to
//! locate a patch in the refinement forest and describe what lies across
//! each of its faces.

use crate::error::{bail, Result};
use crate::face::{Face, Orthant, Side};
use crate::nbr_info::{NbrInfo, NbrType};
use std::cmp::Ordering;
use std::io::{self, Read, Write};

/// Sentinel orthant byte meaning "no parent, `orth_on_parent` unset" (spec §6).
const NULL_ORTHANT_BYTE: u8 = u8::MAX;

/// Sentinel used in place of `Option<i64>` for parent/child ids, matching
/// the wire format's `-1 == absent` convention (spec §6).
pub const NO_PATCH: i64 = -1;

#[derive(Clone, Debug)]
pub struct PatchInfo {
    pub id: i64,
    pub local_index: usize,
    pub global_index: i64,
    pub refine_level: i32,
    pub rank: i32,

    pub parent_id: i64,
    pub parent_rank: i32,
    pub orth_on_parent: Orthant,

    pub child_ids: Vec<i64>,
    pub child_ranks: Vec<i32>,

    pub ns: Vec<usize>,
    pub starts: Vec<f64>,
    pub spacings: Vec<f64>,
    pub num_ghost_cells: usize,

    /// One slot per face of every codimension `0..dim`, ordered: all sides,
    /// then (if `dim == 3`) all edges, then all corners. `None` means no
    /// neighbor across that face (a physical boundary).
    nbr_slots: Vec<Option<NbrInfo>>,
    faces: Vec<Face>,
}

impl PatchInfo {
    pub fn new(id: i64, dim: usize, ns: Vec<usize>, starts: Vec<f64>, spacings: Vec<f64>, num_ghost_cells: usize, rank: i32) -> Self {
        assert_eq!(ns.len(), dim);
        assert_eq!(starts.len(), dim);
        assert_eq!(spacings.len(), dim);

        let mut faces: Vec<Face> = Face::sides(dim).collect();
        if dim == 3 {
            faces.extend(crate::face::Edge::get_values().map(Face::Edge));
        }
        faces.extend(Orthant::get_values(dim).map(Face::Corner));

        let num_children = 1usize << dim;
        Self {
            id,
            local_index: 0,
            global_index: id,
            refine_level: 0,
            rank,
            parent_id: NO_PATCH,
            parent_rank: -1,
            orth_on_parent: Orthant::null(),
            child_ids: vec![NO_PATCH; num_children],
            child_ranks: vec![-1; num_children],
            ns,
            starts,
            spacings,
            num_ghost_cells,
            nbr_slots: vec![None; faces.len()],
            faces,
        }
    }

    pub fn dim(&self) -> usize {
        self.ns.len()
    }

    pub fn has_coarse_parent(&self) -> bool {
        self.parent_id != NO_PATCH && self.refine_level > 0
    }

    fn slot_index(&self, face: Face) -> Option<usize> {
        self.faces.iter().position(|f| *f == face)
    }

    fn slot_index_checked(&self, face: Face) -> Result<usize> {
        self.slot_index(face).ok_or_else(|| {
            crate::error::RuntimeError::new(format!("face {} is not a face of a {}-dimensional patch", face, self.dim()))
        })
    }

    pub fn has_nbr(&self, face: Face) -> bool {
        self.slot_index(face).map(|i| self.nbr_slots[i].is_some()).unwrap_or(false)
    }

    pub fn get_nbr_type(&self, face: Face) -> Result<NbrType> {
        let i = self.slot_index_checked(face)?;
        match &self.nbr_slots[i] {
            Some(info) => Ok(info.nbr_type()),
            None => bail!("patch {} has no neighbor on face {}", self.id, face),
        }
    }

    /// Install (or, with `None`, clear) the neighbor descriptor on `face`.
    pub fn set_nbr_info(&mut self, face: Face, info: Option<NbrInfo>) -> Result<()> {
        let i = self.slot_index_checked(face)?;
        self.nbr_slots[i] = info;
        Ok(())
    }

    pub fn get_normal_nbr_info(&self, face: Face) -> Result<&NbrInfo> {
        let i = self.slot_index_checked(face)?;
        match &self.nbr_slots[i] {
            Some(info @ NbrInfo::Normal { .. }) => Ok(info),
            Some(other) => bail!("face {} is {:?}, not Normal", face, other.nbr_type()),
            None => bail!("patch {} has no neighbor on face {}", self.id, face),
        }
    }

    pub fn get_coarse_nbr_info(&self, face: Face) -> Result<&NbrInfo> {
        let i = self.slot_index_checked(face)?;
        match &self.nbr_slots[i] {
            Some(info @ NbrInfo::Coarse { .. }) => Ok(info),
            Some(other) => bail!("face {} is {:?}, not Coarse", face, other.nbr_type()),
            None => bail!("patch {} has no neighbor on face {}", self.id, face),
        }
    }

    pub fn get_fine_nbr_info(&self, face: Face) -> Result<&NbrInfo> {
        let i = self.slot_index_checked(face)?;
        match &self.nbr_slots[i] {
            Some(info @ NbrInfo::Fine { .. }) => Ok(info),
            Some(other) => bail!("face {} is {:?}, not Fine", face, other.nbr_type()),
            None => bail!("patch {} has no neighbor on face {}", self.id, face),
        }
    }

    /// All faces with an installed neighbor, paired with their descriptor.
    pub fn nbr_faces(&self) -> impl Iterator<Item = (Face, &NbrInfo)> {
        self.faces.iter().zip(self.nbr_slots.iter()).filter_map(|(f, n)| n.as_ref().map(|n| (*f, n)))
    }

    pub fn sides(&self) -> impl Iterator<Item = Side> + '_ {
        self.faces.iter().filter_map(|f| f.as_side().ok())
    }
}

impl PartialEq for PatchInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for PatchInfo {}

impl PartialOrd for PatchInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PatchInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
