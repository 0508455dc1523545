//! Per-face neighbor descriptors (spec §3.1, §4.1) and their wire format
//! (spec §6).
//!
//! The variant set is closed and enumerated (spec §9's "sum-type neighbor
//! descriptors" note): `NbrInfo` is a plain `enum`, not a trait object, and
//! the wrong-variant accessors return a `RuntimeError` rather than panicking.

use crate::error::{bail, Result, RuntimeError};
use crate::face::Orthant;
use std::collections::HashMap;
use std::io::{self, Read, Write};

/// The three ways a patch can be connected to whatever lies across one of
/// its faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NbrType {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "COARSE")]
    Coarse,
    #[serde(rename = "FINE")]
    Fine,
}

/// A single neighbor's global id and owning rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NbrId {
    pub id: i64,
    pub rank: i32,
}

/// Per-face neighbor descriptor: what lies across a face, and (once resolved
/// against the owning `Domain`) the local/global index of each neighbor.
#[derive(Clone, Debug, PartialEq)]
pub enum NbrInfo {
    /// Same refinement level: exactly one neighbor.
    Normal { nbr: NbrId, local_index: Option<usize>, global_index: Option<i64> },
    /// Neighbor is one level coarser; `orth_on_coarse` locates this patch's
    /// sub-region of the coarse face.
    Coarse { nbr: NbrId, orth_on_coarse: Orthant, local_index: Option<usize>, global_index: Option<i64> },
    /// Neighbor is one level finer: `2^(D-1)` neighbors, indexed by the same
    /// `Orthant<D-1>` used for `orth_on_coarse` on the fine side.
    Fine { nbrs: Vec<NbrId>, local_indexes: Vec<Option<usize>>, global_indexes: Vec<Option<i64>> },
}

impl NbrInfo {
    pub fn normal(id: i64, rank: i32) -> Self {
        NbrInfo::Normal { nbr: NbrId { id, rank }, local_index: None, global_index: None }
    }

    pub fn coarse(id: i64, rank: i32, orth_on_coarse: Orthant) -> Self {
        NbrInfo::Coarse { nbr: NbrId { id, rank }, orth_on_coarse, local_index: None, global_index: None }
    }

    pub fn fine(nbrs: Vec<NbrId>) -> Self {
        let n = nbrs.len();
        NbrInfo::Fine { nbrs, local_indexes: vec![None; n], global_indexes: vec![None; n] }
    }

    pub fn nbr_type(&self) -> NbrType {
        match self {
            NbrInfo::Normal { .. } => NbrType::Normal,
            NbrInfo::Coarse { .. } => NbrType::Coarse,
            NbrInfo::Fine { .. } => NbrType::Fine,
        }
    }

    /// All neighbor ids referenced by this descriptor, in storage order.
    pub fn ids(&self) -> Vec<i64> {
        match self {
            NbrInfo::Normal { nbr, .. } => vec![nbr.id],
            NbrInfo::Coarse { nbr, .. } => vec![nbr.id],
            NbrInfo::Fine { nbrs, .. } => nbrs.iter().map(|n| n.id).collect(),
        }
    }

    /// All neighbor owning ranks referenced by this descriptor, in storage
    /// order (parallel to [`NbrInfo::ids`]).
    pub fn ranks(&self) -> Vec<i32> {
        match self {
            NbrInfo::Normal { nbr, .. } => vec![nbr.rank],
            NbrInfo::Coarse { nbr, .. } => vec![nbr.rank],
            NbrInfo::Fine { nbrs, .. } => nbrs.iter().map(|n| n.rank).collect(),
        }
    }

    /// Resolve local/global indexes against maps built from a `Domain`'s
    /// patch list. Unresolvable ids (neighbor not yet known, e.g. during
    /// incremental construction) are left as `None`.
    pub fn resolve_indexes(&mut self, local_index_of: &HashMap<i64, usize>, global_index_of: &HashMap<i64, i64>) {
        match self {
            NbrInfo::Normal { nbr, local_index, global_index } => {
                *local_index = local_index_of.get(&nbr.id).copied();
                *global_index = global_index_of.get(&nbr.id).copied();
            }
            NbrInfo::Coarse { nbr, local_index, global_index, .. } => {
                *local_index = local_index_of.get(&nbr.id).copied();
                *global_index = global_index_of.get(&nbr.id).copied();
            }
            NbrInfo::Fine { nbrs, local_indexes, global_indexes } => {
                for (i, nbr) in nbrs.iter().enumerate() {
                    local_indexes[i] = local_index_of.get(&nbr.id).copied();
                    global_indexes[i] = global_index_of.get(&nbr.id).copied();
                }
            }
        }
    }

    pub fn as_normal(&self) -> Result<(NbrId, Option<usize>)> {
        match self {
            NbrInfo::Normal { nbr, local_index, .. } => Ok((*nbr, *local_index)),
            _ => bail!("neighbor descriptor is not Normal (found {:?})", self.nbr_type()),
        }
    }

    pub fn as_coarse(&self) -> Result<(NbrId, Orthant, Option<usize>)> {
        match self {
            NbrInfo::Coarse { nbr, orth_on_coarse, local_index, .. } => Ok((*nbr, *orth_on_coarse, *local_index)),
            _ => bail!("neighbor descriptor is not Coarse (found {:?})", self.nbr_type()),
        }
    }

    pub fn as_fine(&self) -> Result<(&[NbrId], &[Option<usize>])> {
        match self {
            NbrInfo::Fine { nbrs, local_indexes, .. } => Ok((nbrs, local_indexes)),
            _ => bail!("neighbor descriptor is not Fine (found {:?})", self.nbr_type()),
        }
    }

    /// Serialize to the fixed wire layout of spec §6: `i32 rank, i32 id`
    /// (`Fine` repeats each as a `2^(D-1)`-length array), then orthant where
    /// applicable, each field in declaration order.
    pub fn write_wire(&self, out: &mut impl Write) -> io::Result<()> {
        match self {
            NbrInfo::Normal { nbr, .. } => {
                out.write_all(&nbr.rank.to_le_bytes())?;
                out.write_all(&(nbr.id as i32).to_le_bytes())?;
            }
            NbrInfo::Coarse { nbr, orth_on_coarse, .. } => {
                out.write_all(&nbr.rank.to_le_bytes())?;
                out.write_all(&(nbr.id as i32).to_le_bytes())?;
                out.write_all(&[orth_on_coarse.get_index() as u8])?;
            }
            NbrInfo::Fine { nbrs, .. } => {
                for nbr in nbrs {
                    out.write_all(&nbr.rank.to_le_bytes())?;
                }
                for nbr in nbrs {
                    out.write_all(&(nbr.id as i32).to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    /// Inverse of [`NbrInfo::write_wire`]. `orth_dim` is `D-1`, the
    /// dimension of `orth_on_coarse` / the fine sibling count `2^(D-1)`.
    pub fn read_wire(nbr_type: NbrType, orth_dim: usize, input: &mut impl Read) -> io::Result<Self> {
        let read_i32 = |r: &mut dyn Read| -> io::Result<i32> {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(i32::from_le_bytes(buf))
        };
        match nbr_type {
            NbrType::Normal => {
                let rank = read_i32(input)?;
                let id = read_i32(input)? as i64;
                Ok(NbrInfo::normal(id, rank))
            }
            NbrType::Coarse => {
                let rank = read_i32(input)?;
                let id = read_i32(input)? as i64;
                let mut orth_byte = [0u8; 1];
                input.read_exact(&mut orth_byte)?;
                let orth = Orthant::new(orth_dim, orth_byte[0] as usize);
                Ok(NbrInfo::coarse(id, rank, orth))
            }
            NbrType::Fine => {
                let n = 1usize << orth_dim;
                let mut ranks = Vec::with_capacity(n);
                for _ in 0..n {
                    ranks.push(read_i32(input)?);
                }
                let mut ids = Vec::with_capacity(n);
                for _ in 0..n {
                    ids.push(read_i32(input)? as i64);
                }
                let nbrs = ids.into_iter().zip(ranks).map(|(id, rank)| NbrId { id, rank }).collect();
                Ok(NbrInfo::fine(nbrs))
            }
        }
    }
}

impl From<RuntimeError> for io::Error {
    fn from(e: RuntimeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normal_round_trips_through_wire() {
        let info = NbrInfo::normal(42, 3);
        let mut buf = Vec::new();
        info.write_wire(&mut buf).unwrap();
        let back = NbrInfo::read_wire(NbrType::Normal, 1, &mut &buf[..]).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn coarse_round_trips_through_wire() {
        let info = NbrInfo::coarse(7, 1, Orthant::new(1, 1));
        let mut buf = Vec::new();
        info.write_wire(&mut buf).unwrap();
        let back = NbrInfo::read_wire(NbrType::Coarse, 1, &mut &buf[..]).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn fine_round_trips_through_wire() {
        let info = NbrInfo::fine(vec![NbrId { id: 1, rank: 0 }, NbrId { id: 2, rank: 1 }]);
        let mut buf = Vec::new();
        info.write_wire(&mut buf).unwrap();
        let back = NbrInfo::read_wire(NbrType::Fine, 1, &mut &buf[..]).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn wrong_variant_accessor_errors() {
        let info = NbrInfo::normal(1, 0);
        assert!(info.as_coarse().is_err());
        assert!(info.as_fine().is_err());
    }

    #[test]
    fn nbr_type_json_tags() {
        assert_eq!(serde_json::to_string(&NbrType::Normal).unwrap(), "\"NORMAL\"");
        assert_eq!(serde_json::to_string(&NbrType::Coarse).unwrap(), "\"COARSE\"");
        assert_eq!(serde_json::to_string(&NbrType::Fine).unwrap(), "\"FINE\"");
    }
}
