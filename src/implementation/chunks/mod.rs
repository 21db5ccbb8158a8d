//! Chunk construction over the classified overlap graph.
//!
//! A chunk is a maximal walk of INTRACHUNK edges. Contained fragments are folded into the
//! chunk of their container if they can be placed at exactly one position. Chunks are built
//! twice: the light pass only lists essential fragments and finds the multiply placed
//! contained fragments, the heavy pass additionally lists the singly placed ones. A final chaff
//! pass gives every fragment that is still unplaced a chunk of its own.

use crate::implementation::config::{SlopTolerance, UnitiggerConfiguration};
use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::mate::reflect;
use crate::implementation::store::{
    Edge, EdgeLabel, FragmentEnd, FragmentIndex, FragmentLabel, Iid, OverlapGraph,
};
use std::f64::consts::LN_2;
use std::fmt::{Display, Formatter};
use std::ops::Range;

/// An index into a [ChunkSet].
pub type ChunkIndex = usize;

/// The structure of the graph beyond a chunk tip.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BranchPointKind {
    /// At most one dovetail neighbour.
    None,
    /// More than one dovetail neighbour.
    Fork,
}

/// A chunk tip together with the chunk-relative coordinate of its fragment-end.
///
/// The offset is the coordinate of the tip itself. No divergence position inside the tip
/// fragment is detected, since that needs the fragment sequences.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BranchPoint {
    /// Chunk-relative coordinate of the tip.
    pub offset: i64,
    /// What lies beyond the tip.
    pub kind: BranchPointKind,
}

/// One fragment of a chunk's fragment list.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChunkMember {
    /// The fragment.
    pub fragment: FragmentIndex,
    /// Its external id.
    pub iid: Iid,
    /// Chunk-relative coordinate of the 5' end.
    pub offset5p: i64,
    /// Chunk-relative coordinate of the 3' end.
    pub offset3p: i64,
    /// External id of the container that placed this fragment, if it is contained.
    pub container: Option<Iid>,
}

impl ChunkMember {
    /// True if the fragment runs from left to right in chunk coordinates.
    pub fn is_forward(&self) -> bool {
        self.offset5p <= self.offset3p
    }
}

/// A unitig.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in the [ChunkSet].
    pub index: ChunkIndex,
    /// Range of the fragment list in [ChunkSet::members].
    pub members: Range<usize>,
    /// The free fragment-end at the start of the chunk.
    pub a_tip: FragmentEnd,
    /// The free fragment-end at the end of the chunk.
    pub b_tip: FragmentEnd,
    /// The sum of A-hangs along the backbone, or the mean containment spread of a singleton.
    pub rho: i64,
    /// Length of the chunk spanned by its essential fragments.
    pub bp_length: i64,
    /// Listed non-contained fragments.
    pub essential_fragments: usize,
    /// Listed contained fragments.
    pub contained_fragments: usize,
    /// Number of edges at the A tip.
    pub a_raw_degree: usize,
    /// Number of edges at the B tip.
    pub b_raw_degree: usize,
    /// The A-statistic. Positive values indicate single copy sequence.
    pub coverage_statistic: f64,
    /// Branch point at the A tip.
    pub a_branch_point: BranchPoint,
    /// Branch point at the B tip.
    pub b_branch_point: BranchPoint,
    /// The walk returned to its first fragment.
    pub circular: bool,
}

/// The chunks of a chunking run and their fragment lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkSet {
    chunks: Vec<Chunk>,
    members: Vec<ChunkMember>,
}

impl ChunkSet {
    /// The number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True if there are no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All chunks in index order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The chunk with the given index.
    pub fn chunk(&self, chunk: ChunkIndex) -> Result<&Chunk> {
        self.chunks
            .get(chunk)
            .ok_or(UnitiggerError::IndexOutOfRange {
                kind: "chunk",
                index: chunk,
                len: self.chunks.len(),
            })
    }

    /// The fragment list of a chunk, in placement order.
    pub fn members(&self, chunk: &Chunk) -> &[ChunkMember] {
        &self.members[chunk.members.clone()]
    }

    /// All chunks together with their fragment lists.
    pub fn iter(&self) -> impl '_ + Iterator<Item = (&Chunk, &[ChunkMember])> {
        self.chunks
            .iter()
            .map(move |chunk| (chunk, self.members(chunk)))
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.members.clear();
    }
}

/// The three rounds of chunk construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum ChunkingPass {
    /// Essential fragments only. Contained fragments are placed but not listed.
    Light,
    /// Singly placed contained fragments are listed as well.
    Heavy,
    /// Every fragment still unplaced gets a chunk of its own.
    Chaff,
}

/// Containment edges grouped by the container fragment-end, in container-proximal form.
///
/// The graph keeps containment edges at the contained fragment, so they are reflected here.
struct ContainmentIndex {
    starts: Vec<usize>,
    edges: Vec<Edge>,
}

impl ContainmentIndex {
    fn build(graph: &OverlapGraph) -> Self {
        let end_count = 2 * graph.fragment_count();
        let mut edges: Vec<_> = graph
            .edges()
            .iter()
            .filter(|edge| edge.label == EdgeLabel::Contained && !edge.is_dovetail())
            .map(reflect)
            .collect();
        edges.sort_by_key(|edge| edge.a.key());

        let mut starts = vec![0usize; end_count + 1];
        for edge in &edges {
            starts[edge.a.key() + 1] += 1;
        }
        for key in 1..=end_count {
            starts[key] += starts[key - 1];
        }
        Self { starts, edges }
    }

    fn at(&self, end: FragmentEnd) -> &[Edge] {
        let key = end.key();
        &self.edges[self.starts[key]..self.starts[key + 1]]
    }
}

#[derive(Debug, Clone, Copy)]
struct ContainmentStep {
    container: Iid,
    right: bool,
    hang: i64,
    from_root: bool,
}

/// A fragment waiting to be placed at the given chunk coordinates.
#[derive(Debug, Clone, Copy)]
struct Placement {
    fragment: FragmentIndex,
    forward: bool,
    offset_a: i64,
    offset_b: i64,
    via: Option<ContainmentStep>,
}

impl Placement {
    fn root(fragment: FragmentIndex, forward: bool, offset_a: i64, length: i64) -> Self {
        Self {
            fragment,
            forward,
            offset_a,
            offset_b: offset_a + length,
            via: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WalkTally {
    essential: usize,
    contained: usize,
    left_spread: i64,
    right_spread: i64,
}

struct ChunkWalk {
    a_tip: FragmentEnd,
    b_tip: FragmentEnd,
    rho: i64,
    bp_length: i64,
    circular: bool,
    tally: WalkTally,
}

fn is_counted_as_contained(label: FragmentLabel) -> bool {
    matches!(
        label,
        FragmentLabel::UnplacedCont | FragmentLabel::SingleCont | FragmentLabel::MultiCont
    )
}

/// Contained fragments of fragments with these labels are not explored.
fn stops_exploration(label: FragmentLabel) -> bool {
    matches!(
        label,
        FragmentLabel::Unlabeled
            | FragmentLabel::HangingCrappy
            | FragmentLabel::OrphanedCont
            | FragmentLabel::MarkedBreaker
            | FragmentLabel::RemovedBreaker
            | FragmentLabel::MultiCont
            | FragmentLabel::BranchMultiCont
    )
}

/// The first INTRACHUNK edge at the given fragment-end.
fn intrachunk_edge(graph: &OverlapGraph, end: FragmentEnd) -> Result<Option<Edge>> {
    let segment = graph.segment(end)?;
    Ok(graph.edges()[segment]
        .iter()
        .find(|edge| edge.label == EdgeLabel::Intrachunk)
        .copied())
}

fn branch_point(graph: &OverlapGraph, tip: FragmentEnd) -> Result<BranchPoint> {
    let fragment = graph.fragment(tip.fragment)?;
    let offset = if tip.suffix {
        fragment.offset3p
    } else {
        fragment.offset5p
    };
    let kind = if fragment.end(tip.suffix).dovetail_degree > 1 {
        BranchPointKind::Fork
    } else {
        BranchPointKind::None
    };
    Ok(BranchPoint { offset, kind })
}

struct ChunkBuilder<'graph> {
    graph: &'graph mut OverlapGraph,
    slop: SlopTolerance,
    containments: ContainmentIndex,
    occurrences: Vec<usize>,
    chunks: ChunkSet,
}

impl<'graph> ChunkBuilder<'graph> {
    fn new(graph: &'graph mut OverlapGraph, configuration: &UnitiggerConfiguration) -> Self {
        let containments = ContainmentIndex::build(graph);
        let occurrences = vec![0; graph.fragment_count()];
        Self {
            graph,
            slop: configuration.slop,
            containments,
            occurrences,
            chunks: ChunkSet::default(),
        }
    }

    fn reset_pass(&mut self) {
        self.chunks.clear();
        self.occurrences.fill(0);
        for fragment in self.graph.fragments_mut() {
            fragment.chunk = None;
            fragment.offset5p = 0;
            fragment.offset3p = 0;
            fragment.container = None;
            if fragment.label == FragmentLabel::SingleCont {
                fragment.label = FragmentLabel::UnplacedCont;
            }
        }
    }

    fn run_pass(&mut self, pass: ChunkingPass) -> Result<()> {
        self.reset_pass();

        for fragment in 0..self.graph.fragment_count() {
            let opens_chunk = match self.graph.fragment_label(fragment)? {
                FragmentLabel::Solo
                | FragmentLabel::Hanging
                | FragmentLabel::HangingCrappy
                | FragmentLabel::BranchMultiCont
                | FragmentLabel::Thru => true,
                FragmentLabel::Interchunk | FragmentLabel::HangingChunk => {
                    self.occurrences[fragment] == 0
                }
                _ => false,
            };
            if opens_chunk {
                self.fill_chunk_starting_at(pass, fragment)?;
            }
        }

        for fragment in 0..self.graph.fragment_count() {
            if self.occurrences[fragment] == 0
                && self.graph.fragment_label(fragment)? == FragmentLabel::Intrachunk
            {
                debug!(
                    "Starting a possibly circular chunk with fragment iid={}",
                    self.graph.iid(fragment)?
                );
                self.fill_chunk_starting_at(pass, fragment)?;
            }
        }

        let promoted = self.promote_multiply_placed()?;
        info!(
            "Chunking pass {pass:?}: {} chunks, {promoted} fragments promoted to {}",
            self.chunks.len(),
            FragmentLabel::MultiCont
        );
        Ok(())
    }

    fn run_chaff_pass(&mut self) -> Result<()> {
        let mut orphaned = 0;
        for fragment in self.graph.fragments_mut() {
            if fragment.label == FragmentLabel::UnplacedCont {
                fragment.label = FragmentLabel::OrphanedCont;
                orphaned += 1;
            }
        }

        let before = self.chunks.len();
        for fragment in 0..self.graph.fragment_count() {
            let data = self.graph.fragment(fragment)?;
            if self.occurrences[fragment] == 0
                && !data.deleted
                && data.label != FragmentLabel::Deleted
            {
                self.fill_chunk_starting_at(ChunkingPass::Chaff, fragment)?;
            }
        }

        info!(
            "Chaff pass: {orphaned} orphaned contained fragments, {} singleton chunks",
            self.chunks.len() - before
        );
        Ok(())
    }

    /// Fragments listed more than once become MULTICONT. Returns their number.
    fn promote_multiply_placed(&mut self) -> Result<usize> {
        let mut promoted = 0;
        for (fragment, &occurrences) in self.occurrences.iter().enumerate() {
            if occurrences <= 1 {
                continue;
            }
            let data = self.graph.fragment_mut(fragment)?;
            if !data.contained
                || !matches!(
                    data.label,
                    FragmentLabel::UnplacedCont | FragmentLabel::MultiCont
                )
            {
                return Err(UnitiggerError::InconsistentGraphState(format!(
                    "fragment iid={} label={} contained={} occurs {occurrences} times in the chunks",
                    data.iid, data.label, data.contained
                )));
            }
            data.label = FragmentLabel::MultiCont;
            promoted += 1;
        }
        Ok(promoted)
    }

    fn fill_chunk_starting_at(&mut self, pass: ChunkingPass, start: FragmentIndex) -> Result<()> {
        let index = self.chunks.len();
        let data = self.graph.fragment(start)?;
        if data.label == FragmentLabel::UnplacedCont || self.occurrences[start] != 0 {
            return Err(UnitiggerError::InconsistentGraphState(format!(
                "chunk {index} cannot start at fragment iid={} label={} occurrences={} in pass {pass:?}",
                data.iid, data.label, self.occurrences[start]
            )));
        }

        let members_start = self.chunks.members.len();
        let walk = self.make_chunk(pass, index, start)?;
        let members = members_start..self.chunks.members.len();
        if members.is_empty() {
            return Err(UnitiggerError::InconsistentGraphState(format!(
                "chunk {index} started at fragment iid={} lists no fragments",
                self.graph.iid(start)?
            )));
        }

        let chunk = Chunk {
            index,
            members,
            a_tip: walk.a_tip,
            b_tip: walk.b_tip,
            rho: walk.rho,
            bp_length: walk.bp_length,
            essential_fragments: walk.tally.essential,
            contained_fragments: walk.tally.contained,
            a_raw_degree: self.graph.segment_length(walk.a_tip)?,
            b_raw_degree: self.graph.segment_length(walk.b_tip)?,
            coverage_statistic: 0.0,
            a_branch_point: branch_point(self.graph, walk.a_tip)?,
            b_branch_point: branch_point(self.graph, walk.b_tip)?,
            circular: walk.circular,
        };
        self.chunks.chunks.push(chunk);
        Ok(())
    }

    fn make_chunk(
        &mut self,
        pass: ChunkingPass,
        chunk: ChunkIndex,
        start: FragmentIndex,
    ) -> Result<ChunkWalk> {
        let label = self.graph.fragment_label(start)?;
        let length = self.graph.fragment_length(start)?;
        let mut tally = WalkTally::default();

        let spanned = match label {
            FragmentLabel::Solo
            | FragmentLabel::Hanging
            | FragmentLabel::HangingCrappy
            | FragmentLabel::Thru
            | FragmentLabel::BranchMultiCont
            | FragmentLabel::OrphanedCont => true,
            FragmentLabel::SingleCont => pass >= ChunkingPass::Heavy,
            FragmentLabel::MultiCont => pass >= ChunkingPass::Chaff,
            _ => false,
        };
        if spanned {
            self.place(pass, chunk, Placement::root(start, true, 0, length), &mut tally)?;
            return Ok(ChunkWalk {
                a_tip: FragmentEnd::new(start, false),
                b_tip: FragmentEnd::new(start, true),
                rho: (tally.left_spread + tally.right_spread) / 2,
                bp_length: length,
                circular: false,
                tally,
            });
        }

        let opens_walk = match label {
            FragmentLabel::Interchunk | FragmentLabel::HangingChunk => true,
            FragmentLabel::Intrachunk => self.occurrences[start] == 0,
            _ => false,
        };
        let iid = self.graph.iid(start)?;
        if !opens_walk {
            return Err(UnitiggerError::UnexpectedFragmentLabel {
                phase: "chunk construction",
                iid,
                label,
            });
        }

        let prefix = intrachunk_edge(self.graph, FragmentEnd::new(start, false))?;
        let suffix = intrachunk_edge(self.graph, FragmentEnd::new(start, true))?;
        let first = match (prefix, suffix) {
            (Some(edge), None) | (None, Some(edge)) => edge,
            (Some(edge), Some(_)) if label == FragmentLabel::Intrachunk => edge,
            _ => {
                return Err(UnitiggerError::InconsistentGraphState(format!(
                    "chunk {chunk} cannot leave fragment iid={iid} label={label}: prefix intrachunk edge {}, suffix intrachunk edge {}",
                    prefix.is_some(),
                    suffix.is_some()
                )));
            }
        };
        let first_label = self.graph.fragment_label(first.b.fragment)?;
        if !matches!(
            first_label,
            FragmentLabel::Intrachunk | FragmentLabel::Interchunk | FragmentLabel::HangingChunk
        ) || self.occurrences[first.b.fragment] != 0
        {
            return Err(UnitiggerError::InconsistentGraphState(format!(
                "first intrachunk edge of chunk {chunk} leads from iid={iid} to iid={} label={first_label}",
                self.graph.iid(first.b.fragment)?
            )));
        }

        let a_tip = first.a.opposite();
        self.place(
            pass,
            chunk,
            Placement::root(start, first.a.suffix, 0, length),
            &mut tally,
        )?;

        let mut sum_of_ahg = 0;
        let mut edge = first;
        let mut circular = false;
        loop {
            let next = edge.b;
            if self.occurrences[next.fragment] != 0 {
                if next.fragment != start {
                    return Err(UnitiggerError::InconsistentGraphState(format!(
                        "chunk {chunk} starting at fragment iid={iid} runs into fragment iid={} placed before",
                        self.graph.iid(next.fragment)?
                    )));
                }
                circular = true;
                break;
            }
            sum_of_ahg += i64::from(edge.a_hang);

            let label = self.graph.fragment_label(next.fragment)?;
            let next_iid = self.graph.iid(next.fragment)?;
            if !matches!(
                label,
                FragmentLabel::Intrachunk | FragmentLabel::Interchunk | FragmentLabel::HangingChunk
            ) {
                return Err(UnitiggerError::UnexpectedFragmentLabel {
                    phase: "chunk walk",
                    iid: next_iid,
                    label,
                });
            }
            let length = self.graph.fragment_length(next.fragment)?;
            self.place(
                pass,
                chunk,
                Placement::root(next.fragment, !next.suffix, sum_of_ahg, length),
                &mut tally,
            )?;

            let onward = intrachunk_edge(self.graph, next.opposite())?;
            match (label, onward) {
                (FragmentLabel::Intrachunk, Some(onward)) => edge = onward,
                (FragmentLabel::Intrachunk, None) => {
                    return Err(UnitiggerError::InconsistentGraphState(format!(
                        "chunk {chunk} ends at intrachunk fragment iid={next_iid}"
                    )));
                }
                (_, None) => break,
                (_, Some(_)) => {
                    return Err(UnitiggerError::InconsistentGraphState(format!(
                        "chunk {chunk} continues past chunk-end fragment iid={next_iid} label={label}"
                    )));
                }
            }
        }

        let b_tip = edge.b.opposite();
        if circular {
            warn!("Chunk {chunk} starting at fragment iid={iid} is circular");
        }
        Ok(ChunkWalk {
            a_tip,
            b_tip,
            rho: sum_of_ahg,
            bp_length: sum_of_ahg + self.graph.fragment_length(b_tip.fragment)?,
            circular,
            tally,
        })
    }

    /// Decides whether a contained fragment reached through a containment edge is placed.
    ///
    /// A fragment already placed at the same position of the same chunk is not placed again.
    /// Otherwise UNPLACEDCONT becomes SINGLECONT and SINGLECONT becomes MULTICONT.
    fn accept_containment(
        &mut self,
        chunk: ChunkIndex,
        placement: &Placement,
        step: ContainmentStep,
    ) -> Result<bool> {
        let slop = self.slop;
        let fragment = self.graph.fragment_mut(placement.fragment)?;
        if !fragment.contained
            || !matches!(
                fragment.label,
                FragmentLabel::UnplacedCont | FragmentLabel::SingleCont
            )
        {
            return Ok(false);
        }

        let tolerance = slop.for_length(fragment.length);
        let (offset5p, offset3p) = if placement.forward {
            (placement.offset_a, placement.offset_b)
        } else {
            (placement.offset_b, placement.offset_a)
        };
        if fragment.chunk == Some(chunk)
            && (offset5p - fragment.offset5p).abs() <= tolerance
            && (offset3p - fragment.offset3p).abs() <= tolerance
        {
            return Ok(false);
        }

        fragment.label = match fragment.label {
            FragmentLabel::UnplacedCont => FragmentLabel::SingleCont,
            _ => FragmentLabel::MultiCont,
        };
        fragment.container = Some(step.container);
        Ok(true)
    }

    /// Places a fragment and, transitively, the fragments contained in it.
    fn place(
        &mut self,
        pass: ChunkingPass,
        chunk: ChunkIndex,
        root: Placement,
        tally: &mut WalkTally,
    ) -> Result<()> {
        let mut stack = vec![root];
        while let Some(placement) = stack.pop() {
            if let Some(step) = placement.via {
                if !self.accept_containment(chunk, &placement, step)? {
                    continue;
                }
                if step.from_root {
                    let spread = if step.right {
                        &mut tally.right_spread
                    } else {
                        &mut tally.left_spread
                    };
                    *spread = (*spread).max(step.hang);
                }
            }

            let fragment = self.graph.fragment_mut(placement.fragment)?;
            let label = fragment.label;
            let offset_a = placement.offset_a;
            let offset_b = offset_a + fragment.length;
            (fragment.offset5p, fragment.offset3p) = if placement.forward {
                (offset_a, offset_b)
            } else {
                (offset_b, offset_a)
            };
            fragment.chunk = Some(chunk);
            let member = ChunkMember {
                fragment: placement.fragment,
                iid: fragment.iid,
                offset5p: fragment.offset5p,
                offset3p: fragment.offset3p,
                container: fragment.container,
            };

            let counted_as_contained = is_counted_as_contained(label);
            let listed = match pass {
                ChunkingPass::Light => !counted_as_contained,
                ChunkingPass::Heavy => label != FragmentLabel::MultiCont,
                ChunkingPass::Chaff => true,
            };
            if listed {
                self.chunks.members.push(member);
                self.occurrences[placement.fragment] += 1;
                if counted_as_contained {
                    tally.contained += 1;
                } else {
                    tally.essential += 1;
                }
            }

            if stops_exploration(label) {
                continue;
            }

            let first_child = stack.len();
            for right in [false, true] {
                let end = FragmentEnd::new(placement.fragment, right ^ !placement.forward);
                for edge in self.containments.at(end) {
                    let (a_hang, b_hang) = (i64::from(edge.a_hang), i64::from(edge.b_hang));
                    let (child_a, child_b) = if right {
                        (offset_a + a_hang, offset_b + b_hang)
                    } else {
                        (offset_a - b_hang, offset_b - a_hang)
                    };
                    stack.push(Placement {
                        fragment: edge.b.fragment,
                        forward: right ^ edge.b.suffix,
                        offset_a: child_a,
                        offset_b: child_b,
                        via: Some(ContainmentStep {
                            container: member.iid,
                            right,
                            hang: a_hang,
                            from_root: placement.via.is_none(),
                        }),
                    });
                }
            }
            // Children are popped in edge order.
            stack[first_child..].reverse();
        }
        Ok(())
    }
}

/// Builds the chunks of a classified graph with the light, heavy and chaff passes.
///
/// The segments must be current. Fragment labels, offsets, chunk ids and containers are
/// updated in place.
pub fn build_chunks(
    graph: &mut OverlapGraph,
    configuration: &UnitiggerConfiguration,
) -> Result<ChunkSet> {
    let mut builder = ChunkBuilder::new(graph, configuration);
    builder.run_pass(ChunkingPass::Light)?;
    builder.run_pass(ChunkingPass::Heavy)?;
    builder.run_chaff_pass()?;
    info!(
        "Built {} chunks from {} fragment placements",
        builder.chunks.len(),
        builder.chunks.members.len()
    );
    Ok(builder.chunks)
}

/// Fragments that do not occur exactly once in the chunks.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OccurrenceReport {
    /// Non-deleted fragments that occur in no chunk.
    pub orphaned: Vec<Iid>,
    /// Fragments that occur in more than one chunk, with their number of occurrences.
    pub over_counted: Vec<(Iid, usize)>,
}

impl OccurrenceReport {
    /// True if every non-deleted fragment occurs exactly once.
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.over_counted.is_empty()
    }
}

impl Display for OccurrenceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} orphaned and {} over-counted fragments",
            self.orphaned.len(),
            self.over_counted.len()
        )
    }
}

/// Counts how often every fragment occurs in the chunks.
///
/// Orphaned and over-counted fragments are reported, a chunk that starts with a contained
/// fragment is an error.
pub fn check_fragment_occurrences(
    graph: &OverlapGraph,
    chunks: &ChunkSet,
) -> Result<OccurrenceReport> {
    let mut occurrences = vec![0usize; graph.fragment_count()];
    for (chunk, members) in chunks.iter() {
        if let Some(first) = members.first() {
            if let Some(container) = first.container {
                return Err(UnitiggerError::InconsistentGraphState(format!(
                    "the first fragment iid={} of chunk {} is contained in iid={container}",
                    first.iid, chunk.index
                )));
            }
        }
        for member in members {
            let occurrence = occurrences.get_mut(member.fragment).ok_or(
                UnitiggerError::IndexOutOfRange {
                    kind: "fragment",
                    index: member.fragment,
                    len: graph.fragment_count(),
                },
            )?;
            *occurrence += 1;
        }
    }

    let mut report = OccurrenceReport::default();
    for (fragment, &count) in graph.fragments().iter().zip(&occurrences) {
        if fragment.label == FragmentLabel::Deleted {
            continue;
        }
        if count == 0 {
            warn!(
                "Orphaned fragment: iid={} chunk={:?} label={}",
                fragment.iid, fragment.chunk, fragment.label
            );
            report.orphaned.push(fragment.iid);
        } else if count > 1 {
            warn!(
                "Fragment occurs {count} times: iid={} chunk={:?} label={}",
                fragment.iid, fragment.chunk, fragment.label
            );
            report.over_counted.push((fragment.iid, count));
        }
    }

    info!("Chunk quality control: {report}");
    Ok(report)
}

/// Warns about non-contained fragment-ends whose dovetail overlaps were all trimmed away.
/// Returns the number of such fragment-ends.
pub fn check_edge_trimming(graph: &OverlapGraph) -> usize {
    let mut disconnected = 0;
    for (end, data) in graph.fragment_ends() {
        let fragment = &graph.fragments()[end.fragment];
        let mut old_dovetails = 0;
        let mut new_dovetails = 0;
        let segment = data.segment_start..data.segment_start + data.segment_length;
        for edge in graph.edges().get(segment).unwrap_or_default() {
            match edge.label {
                EdgeLabel::Dovetail
                | EdgeLabel::Thickest
                | EdgeLabel::Buddy
                | EdgeLabel::Interchunk
                | EdgeLabel::Intrachunk
                | EdgeLabel::TouchesContained
                | EdgeLabel::BetweenContained
                | EdgeLabel::TouchesCrappyDvt => {
                    new_dovetails += 1;
                    old_dovetails += 1;
                }
                EdgeLabel::BetweenCrappyDvt
                | EdgeLabel::MarkedByBranchDvt
                | EdgeLabel::MarkedByDeletedDvt
                | EdgeLabel::RemovedByTransitivityDvt
                | EdgeLabel::RemovedByThresholdDvt => old_dovetails += 1,
                EdgeLabel::MarkedByBreaker => {
                    if edge.is_dovetail() {
                        old_dovetails += 1;
                    }
                }
                EdgeLabel::Unused
                | EdgeLabel::Contained
                | EdgeLabel::TouchesCrappyCon
                | EdgeLabel::BetweenCrappyCon
                | EdgeLabel::MarkedByDeletedCon
                | EdgeLabel::RemovedByTransitivityCon
                | EdgeLabel::RemovedByThresholdCon
                | EdgeLabel::RemovedByDuplicateDvt
                | EdgeLabel::RemovedByDuplicateCon => {}
            }
        }

        if old_dovetails > 0
            && new_dovetails == 0
            && !fragment.contained
            && !matches!(
                fragment.label,
                FragmentLabel::HangingCrappy | FragmentLabel::Deleted
            )
        {
            warn!(
                "Dovetail disconnected non-contained fragment-end: iid={} suffix={} label={} old_count={old_dovetails}",
                fragment.iid, end.suffix, fragment.label
            );
            disconnected += 1;
        }
    }
    disconnected
}

/// The number of listed fragments of a chunk that count towards the arrival rate.
pub fn count_randomly_sampled_fragments(
    graph: &OverlapGraph,
    chunks: &ChunkSet,
    chunk: ChunkIndex,
) -> Result<usize> {
    let chunk = chunks.chunk(chunk)?;
    chunks
        .members(chunk)
        .iter()
        .try_fold(0, |count, member| -> Result<usize> {
            Ok(count + usize::from(graph.fragment(member.fragment)?.kind.is_randomly_sampled()))
        })
}

/// The A-statistic of a chunk: `rho * rate - ln(2) * (sampled - 1)`, or zero without a rate.
pub fn compute_coverage_statistic(rho: i64, sampled_fragments: usize, arrival_rate: f64) -> f64 {
    if arrival_rate > 0.0 {
        rho as f64 * arrival_rate - LN_2 * (sampled_fragments as f64 - 1.0)
    } else {
        0.0
    }
}

/// How the global fragment arrival rate was derived.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArrivalRateEstimate {
    /// Sum of rho over all chunks.
    pub total_rho: i64,
    /// Sum over all chunks of the sampled fragments minus one.
    pub total_arrivals: usize,
    /// Randomly sampled fragments in all chunks.
    pub sampled_fragments: usize,
    /// `total_arrivals / total_rho`.
    pub computed_rate: f64,
    /// The rate used for coverage statistics.
    pub rate: f64,
    /// The rate was raised by recalibration.
    pub recalibrated: bool,
}

impl Display for ArrivalRateEstimate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total rho {}, {} arrivals, {} sampled fragments, computed rate {}, used rate {}{}",
            self.total_rho,
            self.total_arrivals,
            self.sampled_fragments,
            self.computed_rate,
            self.rate,
            if self.recalibrated {
                " (recalibrated)"
            } else {
                ""
            }
        )
    }
}

const RECALIBRATION_BIN: i64 = 10_000;

/// Estimates the single copy arrival rate from the local rates of long chunks.
///
/// Every chunk with rho above 10kbp contributes one local rate per 10kbp. The 95th percentile is
/// capped by twice the 10th percentile, by 1.25 times the median and by the rate just below the
/// first large gap above the median. Returns `None` if the long chunks cover less than half of
/// the total rho.
fn recalibrated_arrival_rate(samples: &[(i64, usize)], total_rho: i64) -> Option<f64> {
    let sample_count: i64 = samples
        .iter()
        .filter(|(rho, _)| *rho > RECALIBRATION_BIN)
        .map(|(rho, _)| rho / RECALIBRATION_BIN)
        .sum();
    if sample_count * 2 * RECALIBRATION_BIN <= total_rho {
        return None;
    }

    let mut rates: Vec<f64> = samples
        .iter()
        .filter(|(rho, _)| *rho > RECALIBRATION_BIN)
        .flat_map(|&(rho, sampled)| {
            let local_rate = (sampled as f64 - 1.0) / rho as f64;
            std::iter::repeat(local_rate).take((rho / RECALIBRATION_BIN) as usize)
        })
        .collect();
    if rates.is_empty() {
        return None;
    }
    rates.sort_by(f64::total_cmp);

    let n = rates.len();
    let low_index = n / 10;
    let median_index = n / 2;
    let low = rates[low_index];
    let median = rates[median_index];

    let mut previous = low;
    let mut max_step = 0.0f64;
    for &rate in &rates[low_index..median_index] {
        max_step = max_step.max(rate - previous);
        previous = rate;
    }
    max_step *= 2.0;

    let mut gap_index = n - 1;
    for (index, &rate) in rates.iter().enumerate().skip(median_index) {
        let step = rate - previous;
        previous = rate;
        if step > max_step {
            gap_index = index.saturating_sub(1);
            break;
        }
    }

    Some(
        rates[(n * 19) / 20]
            .min((low * 2.0).min(median * 1.25))
            .min(rates[gap_index]),
    )
}

/// Computes the global fragment arrival rate used by the coverage statistic.
///
/// Without a genome length the rate is estimated from the chunks and optionally recalibrated.
/// With a genome length it is the number of randomly sampled fragments per base.
pub fn compute_global_fragment_arrival_rate(
    graph: &OverlapGraph,
    chunks: &ChunkSet,
    configuration: &UnitiggerConfiguration,
) -> Result<ArrivalRateEstimate> {
    let mut estimate = ArrivalRateEstimate::default();
    let mut samples = Vec::with_capacity(chunks.len());
    for chunk in chunks.chunks() {
        let sampled = count_randomly_sampled_fragments(graph, chunks, chunk.index)?;
        estimate.total_rho += chunk.rho;
        estimate.total_arrivals += sampled.saturating_sub(1);
        estimate.sampled_fragments += sampled;
        samples.push((chunk.rho, sampled));
    }

    estimate.computed_rate = if estimate.total_rho > 0 {
        estimate.total_arrivals as f64 / estimate.total_rho as f64
    } else {
        0.0
    };
    if estimate.computed_rate > 0.0 {
        debug!(
            "Computed genome length {}",
            estimate.sampled_fragments as f64 / estimate.computed_rate
        );
    }

    estimate.rate = if configuration.nbase_in_genome == 0 {
        estimate.computed_rate
    } else {
        estimate.sampled_fragments as f64 / configuration.nbase_in_genome as f64
    };

    if configuration.recalibrate_global_arrival_rate && configuration.nbase_in_genome == 0 {
        if let Some(recalibrated) = recalibrated_arrival_rate(&samples, estimate.total_rho) {
            if recalibrated > estimate.rate {
                estimate.rate = recalibrated;
                estimate.recalibrated = true;
            }
        }
    }

    info!("Global fragment arrival rate: {estimate}");
    if estimate.rate > 0.0 {
        info!("Global fragment arrival distance: {}", 1.0 / estimate.rate);
    }
    Ok(estimate)
}

/// Sets the coverage statistic of every chunk.
pub fn apply_coverage_statistics(
    graph: &OverlapGraph,
    chunks: &mut ChunkSet,
    arrival_rate: f64,
) -> Result<()> {
    for index in 0..chunks.len() {
        let sampled = count_randomly_sampled_fragments(graph, chunks, index)?;
        let chunk = &mut chunks.chunks[index];
        chunk.coverage_statistic = compute_coverage_statistic(chunk.rho, sampled, arrival_rate);
    }
    Ok(())
}

/// Blesses the overlaps inside unique chunks.
///
/// In chunks whose coverage statistic reaches `cutoff`, INTRACHUNK edges and the
/// from-contained CONTAINED edges of SINGLECONT fragments become blessed.
/// Returns the number of blessed directed edges.
pub fn bless_unique_overlaps(
    graph: &mut OverlapGraph,
    chunks: &ChunkSet,
    cutoff: f32,
) -> Result<usize> {
    let cutoff = f64::from(cutoff);
    let mut blessed = 0;
    for edge in 0..graph.edge_count() {
        let data = *graph.edge(edge)?;
        let fragment = graph.fragment(data.a.fragment)?;
        let Some(chunk) = fragment.chunk else {
            continue;
        };
        if chunks.chunk(chunk)?.coverage_statistic < cutoff {
            continue;
        }

        let bless = data.label == EdgeLabel::Intrachunk
            || (fragment.label == FragmentLabel::SingleCont
                && data.label == EdgeLabel::Contained
                && data.is_from_contained());
        if bless {
            graph.edge_mut(edge)?.blessed = true;
            blessed += 1;
        }
    }

    info!("Blessed {blessed} overlap edges in unique chunks");
    Ok(blessed)
}

#[cfg(test)]
mod tests {
    use super::{
        bless_unique_overlaps, build_chunks, check_edge_trimming, check_fragment_occurrences,
        compute_coverage_statistic, compute_global_fragment_arrival_rate,
        apply_coverage_statistics, recalibrated_arrival_rate, BranchPointKind, ChunkBuilder,
        ChunkSet, ChunkingPass,
    };
    use crate::implementation::classify::{
        classify_fragment_labels, classify_intrachunk_edges, identify_early_spur_fragments,
        identify_essential_components, identify_thickest_overlaps, mark_contained_fragments,
        mask_overlaps_touching_crappy_fragments, separate_fragments_as_solo_hanging_thru,
    };
    use crate::implementation::config::UnitiggerConfiguration;
    use crate::implementation::error::UnitiggerError;
    use crate::implementation::mate::relabel_overlap;
    use crate::implementation::store::ingest::{FragmentRecord, OverlapRecord};
    use crate::implementation::store::{
        EdgeLabel, FragmentEnd, FragmentKind, FragmentLabel, OverlapGraph,
    };
    use crate::implementation::segments::sort_and_reindex;

    fn classified_graph(lengths: &[i64], overlaps: &[OverlapRecord]) -> OverlapGraph {
        let configuration = UnitiggerConfiguration::default();
        let mut graph = OverlapGraph::new();
        for (iid, &length) in (1..).zip(lengths) {
            graph
                .add_fragment(FragmentRecord::new(iid, length, FragmentKind::Read))
                .unwrap();
        }
        for overlap in overlaps {
            graph.add_overlap(overlap, &configuration).unwrap();
        }
        sort_and_reindex(&mut graph, configuration.edge_sort_strategy).unwrap();

        separate_fragments_as_solo_hanging_thru(&mut graph).unwrap();
        identify_early_spur_fragments(&mut graph).unwrap();
        mark_contained_fragments(&mut graph).unwrap();
        mask_overlaps_touching_crappy_fragments(&mut graph).unwrap();
        identify_thickest_overlaps(&mut graph).unwrap();
        identify_essential_components(&mut graph).unwrap();
        classify_intrachunk_edges(&mut graph).unwrap();
        classify_fragment_labels(&mut graph).unwrap();
        graph
    }

    fn chain(fragments: u64) -> Vec<OverlapRecord> {
        (1..fragments)
            .map(|iid| OverlapRecord::new(iid, true, iid + 1, false, 900, 900))
            .collect()
    }

    fn member_iids(chunks: &ChunkSet, index: usize) -> Vec<u64> {
        let chunk = chunks.chunk(index).unwrap();
        chunks.members(chunk).iter().map(|member| member.iid).collect()
    }

    #[test]
    fn test_linear_chain_is_one_chunk() {
        let mut graph = classified_graph(&[1000; 5], &chain(5));
        let chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(member_iids(&chunks, 0), vec![1, 2, 3, 4, 5]);
        let chunk = chunks.chunk(0).unwrap();
        assert_eq!(chunk.rho, 3600);
        assert_eq!(chunk.bp_length, 4600);
        assert_eq!(chunk.a_tip, FragmentEnd::new(0, false));
        assert_eq!(chunk.b_tip, FragmentEnd::new(4, true));
        assert_eq!(chunk.essential_fragments, 5);
        assert!(!chunk.circular);
        assert_eq!(chunk.a_branch_point.kind, BranchPointKind::None);
        assert_eq!(chunk.b_branch_point.offset, 4600);

        let offsets: Vec<_> = chunks
            .members(chunk)
            .iter()
            .map(|member| (member.offset5p, member.offset3p))
            .collect();
        assert_eq!(offsets[2], (1800, 2800));
        assert!(check_fragment_occurrences(&graph, &chunks)
            .unwrap()
            .is_clean());
    }

    #[test]
    fn test_contained_fragment_is_folded_in() {
        let overlaps = [
            OverlapRecord::new(1, true, 2, false, 600, 600),
            OverlapRecord::new(3, false, 1, false, -200, 300),
        ];
        let mut graph = classified_graph(&[1000, 1000, 500], &overlaps);
        let chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(member_iids(&chunks, 0), vec![1, 3, 2]);
        let chunk = chunks.chunk(0).unwrap();
        assert_eq!(chunk.essential_fragments, 2);
        assert_eq!(chunk.contained_fragments, 1);
        assert_eq!(chunk.rho, 600);

        let contained = chunks.members(chunk)[1];
        assert_eq!(contained.container, Some(1));
        assert_eq!((contained.offset5p, contained.offset3p), (700, 200));
        assert!(!contained.is_forward());
        assert_eq!(graph.fragments()[2].label, FragmentLabel::SingleCont);
        assert!(check_fragment_occurrences(&graph, &chunks)
            .unwrap()
            .is_clean());
    }

    #[test]
    fn test_walk_into_other_chunk_is_inconsistent() {
        let mut graph = classified_graph(&[1000; 5], &chain(5));
        let configuration = UnitiggerConfiguration::default();
        let mut builder = ChunkBuilder::new(&mut graph, &configuration);
        // Fragment 4 already belongs to some other chunk.
        builder.occurrences[3] = 1;
        match builder.fill_chunk_starting_at(ChunkingPass::Light, 0) {
            Err(UnitiggerError::InconsistentGraphState(message)) => {
                assert!(message.contains("iid=1"));
                assert!(message.contains("iid=4"));
            }
            other => panic!("expected an inconsistent graph state, got {other:?}"),
        }
    }

    #[test]
    fn test_multiply_listed_contained_fragment_is_promoted() {
        let overlaps = [
            OverlapRecord::new(1, true, 2, false, 600, 600),
            OverlapRecord::new(3, false, 1, false, -200, 300),
        ];
        let mut graph = classified_graph(&[1000, 1000, 500], &overlaps);
        let configuration = UnitiggerConfiguration::default();
        let mut builder = ChunkBuilder::new(&mut graph, &configuration);
        builder.occurrences[2] = 2;
        assert_eq!(builder.promote_multiply_placed().unwrap(), 1);

        // Essential fragments must never be listed twice.
        builder.occurrences[0] = 2;
        assert!(matches!(
            builder.promote_multiply_placed(),
            Err(UnitiggerError::InconsistentGraphState(_))
        ));
        assert_eq!(graph.fragments()[2].label, FragmentLabel::MultiCont);
    }

    #[test]
    fn test_circular_chunk() {
        let overlaps = [
            OverlapRecord::new(1, true, 2, false, 500, 500),
            OverlapRecord::new(2, true, 3, false, 500, 500),
            OverlapRecord::new(3, true, 1, false, 500, 500),
        ];
        let mut graph = classified_graph(&[1000; 3], &overlaps);
        assert!(graph
            .fragments()
            .iter()
            .all(|fragment| fragment.label == FragmentLabel::Intrachunk));

        let chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        let chunk = chunks.chunk(0).unwrap();
        assert!(chunk.circular);
        assert_eq!(member_iids(&chunks, 0), vec![1, 3, 2]);
        assert_eq!(chunk.a_tip, FragmentEnd::new(0, true));
        assert_eq!(chunk.b_tip, FragmentEnd::new(0, false));
        assert!(check_fragment_occurrences(&graph, &chunks)
            .unwrap()
            .is_clean());
    }

    #[test]
    fn test_solo_fragments_get_singleton_chunks() {
        let mut graph = classified_graph(&[1000; 3], &chain(2));
        let chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(member_iids(&chunks, 0), vec![1, 2]);
        assert_eq!(member_iids(&chunks, 1), vec![3]);
        assert_eq!(chunks.chunk(1).unwrap().rho, 0);
        assert_eq!(chunks.chunk(1).unwrap().bp_length, 1000);
    }

    #[test]
    fn test_orphaned_fragments_are_reported() {
        let graph = classified_graph(&[1000; 2], &[]);
        let report = check_fragment_occurrences(&graph, &ChunkSet::default()).unwrap();
        assert_eq!(report.orphaned, vec![1, 2]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_coverage_statistic_sign() {
        let unique = compute_coverage_statistic(1000, 20, 0.02);
        assert!(unique > 0.0);
        // Twice the fragments in the same interval, as in a two copy repeat.
        let repeat = compute_coverage_statistic(1000, 40, 0.02);
        assert!(repeat < 0.0);
        assert_eq!(compute_coverage_statistic(1000, 20, 0.0), 0.0);
    }

    #[test]
    fn test_arrival_rate_from_chunks_and_genome_length() {
        let mut graph = classified_graph(&[1000; 5], &chain(5));
        let chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();

        let estimate =
            compute_global_fragment_arrival_rate(&graph, &chunks, &UnitiggerConfiguration::default())
                .unwrap();
        assert_eq!(estimate.total_rho, 3600);
        assert_eq!(estimate.total_arrivals, 4);
        assert_eq!(estimate.sampled_fragments, 5);
        assert!((estimate.rate - 4.0 / 3600.0).abs() < 1e-12);

        let configuration = UnitiggerConfiguration {
            nbase_in_genome: 10_000,
            ..Default::default()
        };
        let estimate = compute_global_fragment_arrival_rate(&graph, &chunks, &configuration).unwrap();
        assert!((estimate.rate - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_recalibration_ignores_repeat_chunks() {
        let mut samples = vec![(20_000, 21); 10];
        assert_eq!(recalibrated_arrival_rate(&samples, 200_000), Some(0.001));

        samples.push((20_000, 81));
        assert_eq!(recalibrated_arrival_rate(&samples, 220_000), Some(0.001));

        // Long chunks cover too little of the total.
        assert_eq!(recalibrated_arrival_rate(&samples, 10_000_000), None);
    }

    #[test]
    fn test_bless_unique_overlaps() {
        let mut graph = classified_graph(&[1000; 5], &chain(5));
        let mut chunks = build_chunks(&mut graph, &UnitiggerConfiguration::default()).unwrap();
        apply_coverage_statistics(&graph, &mut chunks, 4.0 / 3600.0).unwrap();
        let statistic = chunks.chunk(0).unwrap().coverage_statistic;
        assert!(statistic > 1.0 && statistic < 5.0);

        assert_eq!(bless_unique_overlaps(&mut graph, &chunks, 5.0).unwrap(), 0);
        assert_eq!(bless_unique_overlaps(&mut graph, &chunks, 1.0).unwrap(), 8);
        assert!(graph
            .edges()
            .iter()
            .all(|edge| edge.blessed == (edge.label == EdgeLabel::Intrachunk)));
    }

    #[test]
    fn test_edge_trimming_check() {
        let mut graph = classified_graph(&[1000; 3], &chain(3));
        assert_eq!(check_edge_trimming(&graph), 0);
        let edge = graph.segment(FragmentEnd::new(1, true)).unwrap().start;
        relabel_overlap(&mut graph, edge, EdgeLabel::RemovedByTransitivityDvt).unwrap();
        assert_eq!(check_edge_trimming(&graph), 2);
    }
}
