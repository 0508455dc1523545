//! Face algebra: sides, edges, corners/orthants of a `D`-dimensional
//! hypercube, and the `Face` enum that unifies them (spec §4.1).
//!
//! Per the spec's Design Notes, dimensionality is handled as a runtime
//! parameter rather than by const-generic arithmetic on `D` and `M`: each
//! type carries its own `dim` field and is validated against the `Domain`'s
//! dimension at the call sites that matter. This keeps the face algebra in
//! stable, unexceptional Rust while still supporting both 2-D and 3-D grids
//! from the same types, following the teacher's preference for small
//! generic value types (`num_vec::Vector<T, DIM>`) over type-level recursion.

use crate::error::{bail, RuntimeError};
use std::fmt;

/// A side (codimension-1 face) of a `dim`-dimensional patch: normal to
/// `axis`, on the `lower` or `upper` extreme of that axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Side {
    dim: u8,
    axis: u8,
    lower: bool,
}

impl Side {
    pub fn new(dim: usize, axis: usize, lower: bool) -> Self {
        assert!(axis < dim, "axis {} out of range for dim {}", axis, dim);
        Self { dim: dim as u8, axis: axis as u8, lower }
    }

    /// Number of sides of a `dim`-dimensional hypercube: `2 * dim`.
    pub fn number_of(dim: usize) -> usize {
        2 * dim
    }

    pub fn dim(&self) -> usize {
        self.dim as usize
    }

    pub fn axis(&self) -> usize {
        self.axis as usize
    }

    pub fn is_lower_on_axis(&self) -> bool {
        self.lower
    }

    /// Canonical index in `0..number_of(dim)`, axis-major.
    pub fn get_index(&self) -> usize {
        self.axis as usize * 2 + usize::from(!self.lower)
    }

    pub fn opposite(&self) -> Self {
        Self { dim: self.dim, axis: self.axis, lower: !self.lower }
    }

    /// All sides of a `dim`-dimensional hypercube, in canonical order.
    pub fn get_values(dim: usize) -> impl Iterator<Item = Side> {
        (0..dim).flat_map(move |axis| [true, false].into_iter().map(move |lower| Side::new(dim, axis, lower)))
    }

    fn tag(&self) -> &'static str {
        match (self.axis, self.lower) {
            (0, true) => "WEST",
            (0, false) => "EAST",
            (1, true) => "SOUTH",
            (1, false) => "NORTH",
            (2, true) => "BOTTOM",
            (2, false) => "TOP",
            _ => "UNKNOWN",
        }
    }

    fn from_tag(dim: usize, tag: &str) -> Option<Self> {
        let (axis, lower) = match tag {
            "WEST" => (0, true),
            "EAST" => (0, false),
            "SOUTH" => (1, true),
            "NORTH" => (1, false),
            "BOTTOM" => (2, true),
            "TOP" => (2, false),
            _ => return None,
        };
        Some(Side::new(dim, axis, lower))
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// An edge (codimension-2 face) of a 3-D patch: free along `axis`, with the
/// other two axes pinned. `fixed[0]` is the lower/upper state of the smaller
/// of the two other axes, `fixed[1]` of the larger (`true` = upper).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    axis: u8,
    fixed: [bool; 2],
}

impl Edge {
    pub fn new(axis: usize, fixed: [bool; 2]) -> Self {
        assert!(axis < 3, "edges are only defined in 3 dimensions");
        Self { axis: axis as u8, fixed }
    }

    /// Number of edges of a 3-cube: 12. Edges are not defined for `dim != 3`.
    pub fn number_of(dim: usize) -> usize {
        if dim == 3 {
            12
        } else {
            0
        }
    }

    pub fn axis(&self) -> usize {
        self.axis as usize
    }

    /// The two axes other than the free one, in increasing order: `[lo, hi]`.
    pub fn other_axes(&self) -> [usize; 2] {
        let other: Vec<usize> = (0..3usize).filter(|&a| a != self.axis as usize).collect();
        [other[0], other[1]]
    }

    pub fn opposite(&self) -> Self {
        Self { axis: self.axis, fixed: [!self.fixed[0], !self.fixed[1]] }
    }

    pub fn get_values() -> impl Iterator<Item = Edge> {
        (0..3u8).flat_map(|axis| {
            [false, true].into_iter().flat_map(move |a| {
                [false, true].into_iter().map(move |b| Edge { axis, fixed: [a, b] })
            })
        })
    }

    /// `letter(axis, upper)`: axis 0 (x) is W/E, axis 1 (y) is S/N, axis 2
    /// (z) is B/T.
    fn letter(axis: usize, upper: bool) -> char {
        match (axis, upper) {
            (0, false) => 'W',
            (0, true) => 'E',
            (1, false) => 'S',
            (1, true) => 'N',
            (2, false) => 'B',
            (2, true) => 'T',
            _ => '?',
        }
    }

    fn axis_for_letter(c: char) -> Option<(usize, bool)> {
        match c {
            'W' => Some((0, false)),
            'E' => Some((0, true)),
            'S' => Some((1, false)),
            'N' => Some((1, true)),
            'B' => Some((2, false)),
            'T' => Some((2, true)),
            _ => None,
        }
    }

    fn tag(&self) -> String {
        let [lo, hi] = self.other_axes();
        format!("{}{}", Self::letter(hi, self.fixed[1]), Self::letter(lo, self.fixed[0]))
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let mut chars = tag.chars();
        let (hi_axis, hi_upper) = Self::axis_for_letter(chars.next()?)?;
        let (lo_axis, lo_upper) = Self::axis_for_letter(chars.next()?)?;
        if chars.next().is_some() {
            return None;
        }
        let axis = (0..3usize).find(|a| *a != hi_axis && *a != lo_axis)?;
        Some(Edge { axis: axis as u8, fixed: [lo_upper, hi_upper] })
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One of the `2^dim` orthants of a `dim`-dimensional hypercube. Bit `i` of
/// `bits` is `1` iff the orthant occupies the upper half along axis `i`.
///
/// Per the spec's glossary, `Orthant<D>` and `Corner<D>` share the same tag
/// set, so this one type serves both roles: it locates a child patch (or the
/// fine half of a coarse-fine interface) among `2^dim` siblings, and it also
/// represents the codimension-`dim` corner face of a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Orthant {
    dim: u8,
    bits: u8,
}

impl Orthant {
    pub fn new(dim: usize, bits: usize) -> Self {
        assert!(dim <= 3, "orthants are only supported up to 3 dimensions");
        assert!(bits < (1 << dim), "orthant index {} out of range for dim {}", bits, dim);
        Self { dim: dim as u8, bits: bits as u8 }
    }

    /// The canonical "null" orthant inhabiting the degenerate `dim == 0` case.
    pub fn null() -> Self {
        Self { dim: 0, bits: 0 }
    }

    pub fn is_null(&self) -> bool {
        self.dim == 0
    }

    pub fn dim(&self) -> usize {
        self.dim as usize
    }

    pub fn get_index(&self) -> usize {
        self.bits as usize
    }

    pub fn number_of(dim: usize) -> usize {
        1 << dim
    }

    pub fn is_lower_on_axis(&self, axis: usize) -> bool {
        assert!(axis < self.dim as usize);
        self.bits & (1 << axis) == 0
    }

    /// The orthant on the other side of `side` from this one (flips the bit
    /// on `side`'s axis). Used to find the sibling sharing an interior face.
    pub fn get_nbr_on_side(&self, side: Side) -> Self {
        assert_eq!(side.dim(), self.dim as usize);
        Self { dim: self.dim, bits: self.bits ^ (1 << side.axis()) }
    }

    /// Sides shared with sibling orthants of the same parent (one per axis).
    pub fn get_interior_sides(&self) -> Vec<Side> {
        (0..self.dim as usize)
            .map(|axis| Side::new(self.dim as usize, axis, !self.is_lower_on_axis(axis)))
            .collect()
    }

    /// Sides coincident with the parent's own boundary (one per axis).
    pub fn get_exterior_sides(&self) -> Vec<Side> {
        (0..self.dim as usize)
            .map(|axis| Side::new(self.dim as usize, axis, self.is_lower_on_axis(axis)))
            .collect()
    }

    /// Drop `axis` from this orthant, producing the orthant one dimension
    /// lower that describes the same position on the remaining axes.
    pub fn collapse_on_axis(&self, axis: usize) -> Self {
        assert!(axis < self.dim as usize);
        let mut bits = 0u8;
        let mut out_bit = 0u8;
        for i in 0..self.dim {
            if i as usize == axis {
                continue;
            }
            if self.bits & (1 << i) != 0 {
                bits |= 1 << out_bit;
            }
            out_bit += 1;
        }
        Self { dim: self.dim - 1, bits }
    }

    pub fn get_values(dim: usize) -> impl Iterator<Item = Orthant> {
        (0..Self::number_of(dim)).map(move |bits| Orthant::new(dim, bits))
    }

    fn tag(&self) -> String {
        match self.dim {
            0 => "NULL".to_string(),
            1 => if self.bits == 0 { "LOWER" } else { "UPPER" }.to_string(),
            2 => {
                let ew = if self.bits & 1 == 0 { "W" } else { "E" };
                let sn = if self.bits & 2 == 0 { "S" } else { "N" };
                format!("{}{}", sn, ew)
            }
            3 => {
                let ew = if self.bits & 1 == 0 { "W" } else { "E" };
                let sn = if self.bits & 2 == 0 { "S" } else { "N" };
                let bt = if self.bits & 4 == 0 { "B" } else { "T" };
                format!("{}{}{}", bt, sn, ew)
            }
            _ => "UNKNOWN".to_string(),
        }
    }

    fn from_tag(dim: usize, tag: &str) -> Option<Self> {
        let bits = match (dim, tag) {
            (0, "NULL") => 0,
            (1, "LOWER") => 0,
            (1, "UPPER") => 1,
            (2, "SW") => 0,
            (2, "SE") => 1,
            (2, "NW") => 2,
            (2, "NE") => 3,
            (3, "BSW") => 0,
            (3, "BSE") => 1,
            (3, "BNW") => 2,
            (3, "BNE") => 3,
            (3, "TSW") => 4,
            (3, "TSE") => 5,
            (3, "TNW") => 6,
            (3, "TNE") => 7,
            _ => return None,
        };
        Some(Orthant::new(dim, bits))
    }
}

impl fmt::Display for Orthant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A `Corner` is the same entity as an [`Orthant`] used as a codimension-`dim`
/// face (spec glossary: "Orthant<D> uses the same tags as Corner<D>").
pub type Corner = Orthant;

/// A face of a `dim`-dimensional patch, of any codimension: a [`Side`]
/// (codim 1), an [`Edge`] (codim 2, 3-D only), or a [`Corner`] (codim `dim`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Side(Side),
    Edge(Edge),
    Corner(Corner),
}

impl Face {
    pub fn dim(&self) -> usize {
        match self {
            Face::Side(s) => s.dim(),
            Face::Edge(_) => 3,
            Face::Corner(c) => c.dim(),
        }
    }

    /// The sub-face dimension `M`: `dim - 1` for sides, `1` for edges, `0`
    /// for corners.
    pub fn codim(&self) -> usize {
        match self {
            Face::Side(_) => 1,
            Face::Edge(_) => 2,
            Face::Corner(_) => self.dim(),
        }
    }

    pub fn opposite(&self) -> Face {
        match self {
            Face::Side(s) => Face::Side(s.opposite()),
            Face::Edge(e) => Face::Edge(e.opposite()),
            Face::Corner(c) => {
                Face::Corner(Orthant { dim: c.dim, bits: c.bits ^ ((1 << c.dim) - 1) })
            }
        }
    }

    /// All sides of a `dim`-dimensional hypercube, wrapped as `Face`s.
    pub fn sides(dim: usize) -> impl Iterator<Item = Face> {
        Side::get_values(dim).map(Face::Side)
    }

    /// All faces lying on the given side (i.e. sub-faces of codimension
    /// `>= 1` whose free axes are a subset of `side`'s orthogonal axes and
    /// which share `side`'s fixed axis). Used by `GhostFillingType::Edges`
    /// and `::Corners` to enumerate which lower-dimensional faces to also
    /// fill once a side has been handled.
    pub fn get_values_on_side(side: Side) -> Vec<Face> {
        let dim = side.dim();
        let mut faces = Vec::new();
        if dim == 3 {
            for edge in Edge::get_values() {
                let other = edge.other_axes();
                if other.contains(&side.axis()) {
                    let pos_in_other = other.iter().position(|&a| a == side.axis()).unwrap();
                    if edge.fixed[pos_in_other] == !side.is_lower_on_axis() {
                        faces.push(Face::Edge(edge));
                    }
                }
            }
        }
        for corner in Orthant::get_values(dim) {
            if corner.is_lower_on_axis(side.axis()) == side.is_lower_on_axis() {
                faces.push(Face::Corner(corner));
            }
        }
        faces
    }

    pub fn as_side(&self) -> Result<Side, RuntimeError> {
        match self {
            Face::Side(s) => Ok(*s),
            _ => bail!("face is not a side"),
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Face::Side(s) => write!(f, "{}", s),
            Face::Edge(e) => write!(f, "{}", e),
            Face::Corner(c) => write!(f, "{}", c),
        }
    }
}

// ============================================================================
// JSON (de)serialization, producing the tag strings mandated by spec §6
// (`Side<1>`: "WEST"|"EAST"; `Side<2>` adds "SOUTH"|"NORTH"; `Side<3>` adds
// "BOTTOM"|"TOP"; `Corner<2>`/`Corner<3>` and `Edge` similarly). These are
// diagnostic-output formats: they round-trip the geometric identity of a
// face but not necessarily the `dim` it was constructed with, since the tags
// themselves carry no dimension information.

impl serde::Serialize for Side {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.tag())
    }
}

impl<'de> serde::Deserialize<'de> for Side {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(d)?;
        Side::from_tag(3, &tag).ok_or_else(|| serde::de::Error::custom(format!("unknown side tag {:?}", tag)))
    }
}

impl serde::Serialize for Edge {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.tag())
    }
}

impl<'de> serde::Deserialize<'de> for Edge {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(d)?;
        Edge::from_tag(&tag).ok_or_else(|| serde::de::Error::custom(format!("unknown edge tag {:?}", tag)))
    }
}

impl serde::Serialize for Orthant {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.tag())
    }
}

impl<'de> serde::Deserialize<'de> for Orthant {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(d)?;
        for dim in 0..=3 {
            if let Some(o) = Orthant::from_tag(dim, &tag) {
                return Ok(o);
            }
        }
        Err(serde::de::Error::custom(format!("unknown orthant tag {:?}", tag)))
    }
}

impl serde::Serialize for Face {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Face::Side(x) => x.serialize(s),
            Face::Edge(x) => x.serialize(s),
            Face::Corner(x) => x.serialize(s),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn side_opposite_and_index() {
        let west = Side::new(2, 0, true);
        assert_eq!(west.opposite(), Side::new(2, 0, false));
        assert_eq!(Side::get_values(2).count(), 4);
        assert_eq!(Side::get_values(3).count(), 6);
    }

    #[test]
    fn side_tags_round_trip() {
        for side in Side::get_values(3) {
            let tag = side.tag();
            assert_eq!(Side::from_tag(3, tag), Some(side));
        }
    }

    #[test]
    fn orthant_collapse_matches_manual() {
        // BNE (dim 3, bits 0b101 = bit0 E, bit1 N, bit2 T) collapsed on axis 2 (z)
        // drops the T/B bit and keeps the NE corner in 2-D.
        let bne = Orthant::new(3, 0b101);
        assert_eq!(bne.to_string(), "TNE");
        let collapsed = bne.collapse_on_axis(2);
        assert_eq!(collapsed, Orthant::new(2, 0b01));
        assert_eq!(collapsed.to_string(), "SE");
    }

    #[test]
    fn orthant_interior_exterior_sides_partition_axes() {
        let o = Orthant::new(2, 0b01); // SE: lower on axis1(y), upper on axis0(x)
        let interior = o.get_interior_sides();
        let exterior = o.get_exterior_sides();
        assert_eq!(interior.len(), 2);
        assert_eq!(exterior.len(), 2);
        for (i, e) in interior.iter().zip(exterior.iter()) {
            assert_eq!(i.axis(), e.axis());
            assert_ne!(i.is_lower_on_axis(), e.is_lower_on_axis());
        }
    }

    #[test]
    fn orthant_number_of() {
        assert_eq!(Orthant::number_of(0), 1);
        assert_eq!(Orthant::number_of(2), 4);
        assert_eq!(Orthant::number_of(3), 8);
    }

    #[test]
    fn edge_tags_round_trip() {
        for edge in Edge::get_values() {
            assert_eq!(Edge::from_tag(&edge.tag()), Some(edge));
        }
        assert_eq!(Edge::get_values().count(), 12);
    }

    #[test]
    fn face_number_of_matches_formula() {
        // number_of(D, M) = 2^(D-M) * C(D, M)
        assert_eq!(Face::sides(2).count(), 4); // 2^(2-1) * C(2,1) = 2*2
        assert_eq!(Face::sides(3).count(), 6); // 2^(3-2) * C(3,2) = 2*3
        assert_eq!(Edge::number_of(3), 12); // 2^(3-1) * C(3,1) = 4*3
        assert_eq!(Orthant::number_of(3), 8); // 2^3 * C(3,0)
    }

    #[test]
    fn json_tags_match_spec() {
        assert_eq!(serde_json::to_string(&"WEST").unwrap(), "\"WEST\"");
        let side = Side::new(2, 1, false);
        assert_eq!(side.tag(), "NORTH");
    }
}
