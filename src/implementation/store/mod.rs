//! The arena of fragments and directed overlap edges.
//!
//! All relationships are dense integer indices into the two arrays.
//! Accessors never touch the adjacency segments, which are owned by the segment indexer.

use crate::implementation::error::{Result, UnitiggerError};
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::str::FromStr;

pub mod ingest;

/// Dense internal index of a fragment (VID).
pub type FragmentIndex = usize;
/// Index of a directed edge in the edge array.
pub type EdgeIndex = usize;
/// Stable external id of a fragment (IID).
pub type Iid = u64;

/// One end of a fragment: the prefix (5') or the suffix (3').
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FragmentEnd {
    /// The fragment.
    pub fragment: FragmentIndex,
    /// True for the suffix, false for the prefix.
    pub suffix: bool,
}

impl FragmentEnd {
    /// Creates a fragment-end.
    pub fn new(fragment: FragmentIndex, suffix: bool) -> Self {
        Self { fragment, suffix }
    }

    /// The dense key `2 * fragment + suffix`, used to address per-end arrays.
    pub fn key(self) -> usize {
        2 * self.fragment + self.suffix as usize
    }

    /// Inverse of [Self::key].
    pub fn from_key(key: usize) -> Self {
        Self::new(key / 2, key % 2 == 1)
    }

    /// The other end of the same fragment.
    pub fn opposite(self) -> Self {
        Self::new(self.fragment, !self.suffix)
    }
}

/// The kind of sequencing read a fragment stems from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FragmentKind {
    /// A trusted, randomly sampled shotgun read ('R').
    Read,
    /// An external randomly sampled shotgun read ('X').
    External,
    /// Any other kind of read, identified by its letter code. These are not randomly sampled.
    Guide(char),
}

impl FragmentKind {
    /// Only randomly sampled reads contribute to arrival rate statistics.
    pub fn is_randomly_sampled(self) -> bool {
        matches!(self, Self::Read | Self::External)
    }

    /// The single letter code of this kind.
    pub fn code(self) -> char {
        match self {
            Self::Read => 'R',
            Self::External => 'X',
            Self::Guide(code) => code,
        }
    }
}

impl FromStr for FragmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.chars();
        Ok(match (chars.next(), chars.next()) {
            (Some('R'), None) => Self::Read,
            (Some('X'), None) => Self::External,
            (Some(code), None) if code.is_ascii_alphabetic() => Self::Guide(code),
            _ => {
                return Err(format!("Unknown fragment kind: {s}"));
            }
        })
    }
}

/// The classification state of a fragment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum FragmentLabel {
    /// Not yet classified.
    Unlabeled,
    /// No dovetail overlaps at either end.
    Solo,
    /// Dovetail overlaps at exactly one end.
    Hanging,
    /// Dovetail overlaps at both ends.
    Thru,
    /// A hanging fragment suspected to be a spur.
    HangingCrappy,
    /// A hanging fragment that ends a chunk.
    HangingChunk,
    /// A fragment at a chunk end with overlaps continuing outward.
    Interchunk,
    /// A fragment in the interior of a chunk.
    Intrachunk,
    /// A contained fragment that no chunk could place.
    OrphanedCont,
    /// A contained fragment placed by more than one container.
    MultiCont,
    /// A contained fragment placed by exactly one container.
    SingleCont,
    /// A fragment marked as a chimera breaker.
    MarkedBreaker,
    /// A chimera breaker that has been removed.
    RemovedBreaker,
    /// A contained fragment not placed yet.
    UnplacedCont,
    /// A contained fragment on a path of thickest overlaps between essential fragments.
    BranchMultiCont,
    /// A contained fragment that must be kept as essential.
    EssentialCont,
    /// A deleted fragment.
    Deleted,
}

impl FragmentLabel {
    /// All labels in report order.
    pub const ALL: [Self; 17] = [
        Self::Unlabeled,
        Self::Solo,
        Self::Hanging,
        Self::Thru,
        Self::HangingCrappy,
        Self::HangingChunk,
        Self::Interchunk,
        Self::Intrachunk,
        Self::OrphanedCont,
        Self::MultiCont,
        Self::SingleCont,
        Self::MarkedBreaker,
        Self::RemovedBreaker,
        Self::UnplacedCont,
        Self::BranchMultiCont,
        Self::EssentialCont,
        Self::Deleted,
    ];

    /// True for the labels a contained fragment may carry.
    pub fn is_contained_family(self) -> bool {
        matches!(
            self,
            Self::OrphanedCont
                | Self::MultiCont
                | Self::SingleCont
                | Self::UnplacedCont
                | Self::BranchMultiCont
                | Self::EssentialCont
        )
    }

    /// The short name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unlabeled => "UNLABELED",
            Self::Solo => "SOLO",
            Self::Hanging => "HANGING",
            Self::Thru => "THRU",
            Self::HangingCrappy => "HANGING_CRAPPY",
            Self::HangingChunk => "HANGING_CHUNK",
            Self::Interchunk => "INTERCHUNK",
            Self::Intrachunk => "INTRACHUNK",
            Self::OrphanedCont => "ORPHANEDCONT",
            Self::MultiCont => "MULTICONT",
            Self::SingleCont => "SINGLECONT",
            Self::MarkedBreaker => "MARKED_BREAKER",
            Self::RemovedBreaker => "REMOVED_BREAKER",
            Self::UnplacedCont => "UNPLACEDCONT",
            Self::BranchMultiCont => "BRANCHMULTICONT",
            Self::EssentialCont => "ESSENTIAL_CONT",
            Self::Deleted => "DELETED",
        }
    }
}

impl Display for FragmentLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The classification state of a directed overlap edge.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum EdgeLabel {
    /// Not an active overlap.
    Unused,
    /// A dovetail overlap.
    Dovetail,
    /// The thickest dovetail overlap at its proximal fragment-end.
    Thickest,
    /// A mutually thickest dovetail overlap.
    Buddy,
    /// A dovetail overlap between two contained fragments.
    BetweenContained,
    /// A dovetail overlap between a contained and a non-contained fragment.
    TouchesContained,
    /// A containment overlap.
    Contained,
    /// A dovetail overlap connecting two chunks.
    Interchunk,
    /// A dovetail overlap inside a chunk.
    Intrachunk,
    /// A dovetail overlap touching one spur fragment.
    TouchesCrappyDvt,
    /// A dovetail overlap between two spur fragments.
    BetweenCrappyDvt,
    /// A containment overlap touching one spur fragment.
    TouchesCrappyCon,
    /// A containment overlap between two spur fragments.
    BetweenCrappyCon,
    /// A dovetail overlap marked at a branch point.
    MarkedByBranchDvt,
    /// An overlap marked by a chimera breaker.
    MarkedByBreaker,
    /// A dovetail overlap touching a deleted fragment.
    MarkedByDeletedDvt,
    /// A containment overlap touching a deleted fragment.
    MarkedByDeletedCon,
    /// A dovetail overlap inferable from a path of other overlaps.
    RemovedByTransitivityDvt,
    /// A containment overlap inferable from a path of other overlaps.
    RemovedByTransitivityCon,
    /// A dovetail overlap beyond the fragment-end degree cutoff.
    RemovedByThresholdDvt,
    /// A containment overlap beyond the fragment-end degree cutoff.
    RemovedByThresholdCon,
    /// A repeated copy of a dovetail overlap.
    RemovedByDuplicateDvt,
    /// A repeated copy of a containment overlap.
    RemovedByDuplicateCon,
}

impl EdgeLabel {
    /// All labels in report order.
    pub const ALL: [Self; 23] = [
        Self::Unused,
        Self::Dovetail,
        Self::Thickest,
        Self::Buddy,
        Self::BetweenContained,
        Self::TouchesContained,
        Self::Contained,
        Self::Interchunk,
        Self::Intrachunk,
        Self::TouchesCrappyDvt,
        Self::BetweenCrappyDvt,
        Self::TouchesCrappyCon,
        Self::BetweenCrappyCon,
        Self::MarkedByBranchDvt,
        Self::MarkedByBreaker,
        Self::MarkedByDeletedDvt,
        Self::MarkedByDeletedCon,
        Self::RemovedByTransitivityDvt,
        Self::RemovedByTransitivityCon,
        Self::RemovedByThresholdDvt,
        Self::RemovedByThresholdCon,
        Self::RemovedByDuplicateDvt,
        Self::RemovedByDuplicateCon,
    ];

    /// Soft-deleted edges. They stay in the array until packed.
    pub fn is_removed(self) -> bool {
        matches!(
            self,
            Self::RemovedByTransitivityDvt
                | Self::RemovedByTransitivityCon
                | Self::RemovedByThresholdDvt
                | Self::RemovedByThresholdCon
                | Self::RemovedByDuplicateDvt
                | Self::RemovedByDuplicateCon
        )
    }

    /// Marked edges are sticky and excluded from further classification.
    pub fn is_marked(self) -> bool {
        matches!(
            self,
            Self::MarkedByBranchDvt
                | Self::MarkedByBreaker
                | Self::MarkedByDeletedDvt
                | Self::MarkedByDeletedCon
        )
    }

    /// Labels that survive [pack_edges](crate::implementation::segments::pack_edges).
    pub fn is_live(self) -> bool {
        match self {
            Self::Dovetail
            | Self::Thickest
            | Self::Buddy
            | Self::Interchunk
            | Self::Intrachunk
            | Self::TouchesContained
            | Self::BetweenContained
            | Self::TouchesCrappyDvt
            | Self::Contained
            | Self::TouchesCrappyCon => true,
            Self::Unused
            | Self::BetweenCrappyDvt
            | Self::BetweenCrappyCon
            | Self::MarkedByBranchDvt
            | Self::MarkedByBreaker
            | Self::MarkedByDeletedDvt
            | Self::MarkedByDeletedCon
            | Self::RemovedByTransitivityDvt
            | Self::RemovedByTransitivityCon
            | Self::RemovedByThresholdDvt
            | Self::RemovedByThresholdCon
            | Self::RemovedByDuplicateDvt
            | Self::RemovedByDuplicateCon => false,
        }
    }

    /// True for the labels of the containment family.
    pub fn is_containment_family(self) -> bool {
        matches!(
            self,
            Self::Contained
                | Self::TouchesCrappyCon
                | Self::BetweenCrappyCon
                | Self::MarkedByDeletedCon
                | Self::RemovedByTransitivityCon
                | Self::RemovedByThresholdCon
                | Self::RemovedByDuplicateCon
        )
    }

    /// INTRACHUNK.
    pub fn is_intrachunk(self) -> bool {
        self == Self::Intrachunk
    }

    /// INTRACHUNK or INTERCHUNK.
    pub fn is_interchunk(self) -> bool {
        self.is_intrachunk() || self == Self::Interchunk
    }

    /// INTRACHUNK, INTERCHUNK, BUDDY or THICKEST.
    pub fn is_thickest(self) -> bool {
        self.is_interchunk() || matches!(self, Self::Buddy | Self::Thickest)
    }

    /// The short name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unused => "UNUSED",
            Self::Dovetail => "DOVETAIL",
            Self::Thickest => "THICKEST",
            Self::Buddy => "BUDDY",
            Self::BetweenContained => "BETWEEN_CONTAINED",
            Self::TouchesContained => "TOUCHES_CONTAINED",
            Self::Contained => "CONTAINED",
            Self::Interchunk => "INTERCHUNK",
            Self::Intrachunk => "INTRACHUNK",
            Self::TouchesCrappyDvt => "TOUCHES_CRAPPY_DVT",
            Self::BetweenCrappyDvt => "BETWEEN_CRAPPY_DVT",
            Self::TouchesCrappyCon => "TOUCHES_CRAPPY_CON",
            Self::BetweenCrappyCon => "BETWEEN_CRAPPY_CON",
            Self::MarkedByBranchDvt => "MARKED_BY_BRANCH_DVT",
            Self::MarkedByBreaker => "MARKED_BY_BREAKER",
            Self::MarkedByDeletedDvt => "MARKED_BY_DELETED_DVT",
            Self::MarkedByDeletedCon => "MARKED_BY_DELETED_CON",
            Self::RemovedByTransitivityDvt => "REMOVED_BY_TRANSITIVITY_DVT",
            Self::RemovedByTransitivityCon => "REMOVED_BY_TRANSITIVITY_CON",
            Self::RemovedByThresholdDvt => "REMOVED_BY_THRESHOLD_DVT",
            Self::RemovedByThresholdCon => "REMOVED_BY_THRESHOLD_CON",
            Self::RemovedByDuplicateDvt => "REMOVED_BY_DUPLICATE_DVT",
            Self::RemovedByDuplicateCon => "REMOVED_BY_DUPLICATE_CON",
        }
    }
}

impl Display for EdgeLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Adjacency and degree bookkeeping of one fragment-end.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct FragmentEndData {
    /// First edge of the adjacency segment.
    pub segment_start: EdgeIndex,
    /// Number of edges in the adjacency segment.
    pub segment_length: usize,
    /// Live dovetail edges in the segment.
    pub dovetail_degree: usize,
    /// Live containment edges in the segment.
    pub containment_degree: usize,
    /// Dovetail overlaps seen at ingestion.
    pub raw_dovetail_count: usize,
    /// Only blessed overlaps may attach to a blessed end.
    pub blessed: bool,
}

/// A sequencing read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Fragment {
    /// External id.
    pub iid: Iid,
    /// The read kind.
    pub kind: FragmentKind,
    /// Length in base pairs.
    pub length: i64,
    /// Current classification.
    pub label: FragmentLabel,
    /// The chunk the fragment was placed in by the current chunking pass.
    pub chunk: Option<usize>,
    /// External id of the fragment that placed this contained fragment.
    pub container: Option<Iid>,
    /// Logically removed from the graph.
    pub deleted: bool,
    /// Contained in another fragment.
    pub contained: bool,
    /// Suspected spur.
    pub spur: bool,
    /// Chunk-relative coordinate of the 5' end.
    pub offset5p: i64,
    /// Chunk-relative coordinate of the 3' end.
    pub offset3p: i64,
    /// Containment overlaps in which this fragment was the contained one at ingestion.
    pub raw_from_contained_count: usize,
    /// Containment overlaps in which this fragment was the container at ingestion.
    pub raw_to_contained_count: usize,
    ends: [FragmentEndData; 2],
}

impl Fragment {
    /// A fresh, unlabeled fragment.
    pub fn new(iid: Iid, kind: FragmentKind, length: i64) -> Self {
        Self {
            iid,
            kind,
            length,
            label: FragmentLabel::Unlabeled,
            chunk: None,
            container: None,
            deleted: false,
            contained: false,
            spur: false,
            offset5p: 0,
            offset3p: 0,
            raw_from_contained_count: 0,
            raw_to_contained_count: 0,
            ends: [FragmentEndData::default(); 2],
        }
    }

    /// Bookkeeping of the given end.
    pub fn end(&self, suffix: bool) -> &FragmentEndData {
        &self.ends[suffix as usize]
    }

    /// Mutable bookkeeping of the given end.
    pub fn end_mut(&mut self, suffix: bool) -> &mut FragmentEndData {
        &mut self.ends[suffix as usize]
    }
}

/// The geometric relationship an edge describes, derived from the overhang signs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OverlapTopology {
    /// Both fragments extend past each other.
    Dovetail,
    /// The proximal fragment is contained in the distal one.
    FromContained,
    /// The distal fragment is contained in the proximal one.
    ToContained,
    /// Both fragments have identical extent.
    Degenerate,
}

/// One directed half of an undirected overlap.
///
/// Orient the proximal fragment so that `a` lies on its right. Then the distal fragment spans
/// `[a_hang, a_length + b_hang]` with `b` on its left.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Edge {
    /// Proximal fragment-end.
    pub a: FragmentEnd,
    /// Proximal overhang.
    pub a_hang: i32,
    /// Distal fragment-end.
    pub b: FragmentEnd,
    /// Distal overhang.
    pub b_hang: i32,
    /// Classification.
    pub label: EdgeLabel,
    /// Overlap quality, lower is better.
    pub quality: u32,
    /// Flagged as invalid by an external consistency check.
    pub invalid: bool,
    /// Confirmed by a unique chunk.
    pub blessed: bool,
    /// Produced by reflection.
    pub reflected: bool,
    /// Produced by the containment mate transform.
    pub grangered: bool,
}

impl Edge {
    /// A fresh edge with all flags cleared.
    pub fn new(a: FragmentEnd, a_hang: i32, b: FragmentEnd, b_hang: i32, label: EdgeLabel) -> Self {
        Self {
            a,
            a_hang,
            b,
            b_hang,
            label,
            quality: 0,
            invalid: false,
            blessed: false,
            reflected: false,
            grangered: false,
        }
    }

    /// The topology implied by the overhang signs.
    pub fn topology(&self) -> OverlapTopology {
        topology_of(self.a_hang, self.b_hang)
    }

    /// Both overhangs positive.
    pub fn is_dovetail(&self) -> bool {
        self.topology() == OverlapTopology::Dovetail
    }

    /// The proximal fragment is contained in the distal one.
    pub fn is_from_contained(&self) -> bool {
        self.topology() == OverlapTopology::FromContained
    }

    /// The distal fragment is contained in the proximal one.
    pub fn is_to_contained(&self) -> bool {
        self.topology() == OverlapTopology::ToContained
    }

    /// Both overhangs zero.
    pub fn is_degenerate(&self) -> bool {
        self.topology() == OverlapTopology::Degenerate
    }
}

/// Classifies a pair of overhangs. At least one overhang must be non-negative.
pub fn topology_of(a_hang: i32, b_hang: i32) -> OverlapTopology {
    debug_assert!(a_hang >= 0 || b_hang >= 0);
    if a_hang > 0 && b_hang > 0 {
        OverlapTopology::Dovetail
    } else if a_hang < 0 || (a_hang == 0 && b_hang > 0) {
        OverlapTopology::FromContained
    } else if b_hang < 0 || (b_hang == 0 && a_hang > 0) {
        OverlapTopology::ToContained
    } else {
        OverlapTopology::Degenerate
    }
}

/// The fragment and edge arrays of an overlap graph.
#[derive(Debug, Clone, Default)]
pub struct OverlapGraph {
    fragments: Vec<Fragment>,
    edges: Vec<Edge>,
    iid_map: hashbrown::HashMap<Iid, FragmentIndex>,
}

impl OverlapGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph with memory reserved for the given number of fragments and edges.
    pub fn with_capacity(fragments: usize, edges: usize) -> Self {
        Self {
            fragments: Vec::with_capacity(fragments),
            edges: Vec::with_capacity(edges),
            iid_map: hashbrown::HashMap::with_capacity(fragments),
        }
    }

    /// The number of fragments.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// The number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The fragment with the given index.
    pub fn fragment(&self, fragment: FragmentIndex) -> Result<&Fragment> {
        let len = self.fragments.len();
        self.fragments
            .get(fragment)
            .ok_or(UnitiggerError::IndexOutOfRange {
                kind: "fragment",
                index: fragment,
                len,
            })
    }

    /// The fragment with the given index, mutably.
    pub fn fragment_mut(&mut self, fragment: FragmentIndex) -> Result<&mut Fragment> {
        let len = self.fragments.len();
        self.fragments
            .get_mut(fragment)
            .ok_or(UnitiggerError::IndexOutOfRange {
                kind: "fragment",
                index: fragment,
                len,
            })
    }

    /// The edge with the given index.
    pub fn edge(&self, edge: EdgeIndex) -> Result<&Edge> {
        let len = self.edges.len();
        self.edges.get(edge).ok_or(UnitiggerError::IndexOutOfRange {
            kind: "edge",
            index: edge,
            len,
        })
    }

    /// The edge with the given index, mutably.
    pub fn edge_mut(&mut self, edge: EdgeIndex) -> Result<&mut Edge> {
        let len = self.edges.len();
        self.edges
            .get_mut(edge)
            .ok_or(UnitiggerError::IndexOutOfRange {
                kind: "edge",
                index: edge,
                len,
            })
    }

    /// All fragments in index order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// All edges in array order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub(crate) fn fragments_mut(&mut self) -> &mut [Fragment] {
        &mut self.fragments
    }

    pub(crate) fn edges_vec_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// The internal index of a fragment, if the external id is known.
    pub fn fragment_index(&self, iid: Iid) -> Option<FragmentIndex> {
        self.iid_map.get(&iid).copied()
    }

    /// The external id of the fragment with the given index.
    pub fn iid(&self, fragment: FragmentIndex) -> Result<Iid> {
        Ok(self.fragment(fragment)?.iid)
    }

    /// The label of an edge.
    pub fn edge_label(&self, edge: EdgeIndex) -> Result<EdgeLabel> {
        Ok(self.edge(edge)?.label)
    }

    /// Sets the label of a single edge. The mate is left untouched.
    pub fn set_edge_label(&mut self, edge: EdgeIndex, label: EdgeLabel) -> Result<()> {
        self.edge_mut(edge)?.label = label;
        Ok(())
    }

    /// The label of a fragment.
    pub fn fragment_label(&self, fragment: FragmentIndex) -> Result<FragmentLabel> {
        Ok(self.fragment(fragment)?.label)
    }

    /// Sets the label of a fragment.
    pub fn set_fragment_label(&mut self, fragment: FragmentIndex, label: FragmentLabel) -> Result<()> {
        self.fragment_mut(fragment)?.label = label;
        Ok(())
    }

    /// The first edge of the adjacency segment of a fragment-end.
    pub fn segment_start(&self, end: FragmentEnd) -> Result<EdgeIndex> {
        Ok(self.fragment(end.fragment)?.end(end.suffix).segment_start)
    }

    /// The number of edges in the adjacency segment of a fragment-end.
    pub fn segment_length(&self, end: FragmentEnd) -> Result<usize> {
        Ok(self.fragment(end.fragment)?.end(end.suffix).segment_length)
    }

    /// The edge index range of the adjacency segment of a fragment-end.
    pub fn segment(&self, end: FragmentEnd) -> Result<Range<EdgeIndex>> {
        let data = self.fragment(end.fragment)?.end(end.suffix);
        let range = data.segment_start..data.segment_start + data.segment_length;
        if range.end > self.edges.len() {
            return Err(UnitiggerError::IndexOutOfRange {
                kind: "edge",
                index: range.end,
                len: self.edges.len(),
            });
        }
        Ok(range)
    }

    /// The fragment-end bookkeeping of both ends of all fragments, in key order.
    pub fn fragment_ends(&self) -> impl '_ + Iterator<Item = (FragmentEnd, &FragmentEndData)> {
        self.fragments.iter().enumerate().flat_map(|(fragment, data)| {
            [false, true]
                .into_iter()
                .map(move |suffix| (FragmentEnd::new(fragment, suffix), data.end(suffix)))
        })
    }

    /// The length of a fragment.
    pub fn fragment_length(&self, fragment: FragmentIndex) -> Result<i64> {
        Ok(self.fragment(fragment)?.length)
    }

    /// Logically removes a fragment. All its edges are ignored by later phases.
    pub fn delete_fragment(&mut self, iid: Iid) -> Result<()> {
        let fragment = self
            .fragment_index(iid)
            .ok_or(UnitiggerError::UnknownFragment(iid))?;
        let fragment = self.fragment_mut(fragment)?;
        fragment.deleted = true;
        fragment.label = FragmentLabel::Deleted;
        Ok(())
    }

    pub(crate) fn insert_fragment(&mut self, fragment: Fragment) -> Result<FragmentIndex> {
        if self.iid_map.contains_key(&fragment.iid) {
            return Err(UnitiggerError::DuplicateFragment(fragment.iid));
        }
        let index = self.fragments.len();
        self.iid_map.insert(fragment.iid, index);
        self.fragments.push(fragment);
        Ok(index)
    }
}
