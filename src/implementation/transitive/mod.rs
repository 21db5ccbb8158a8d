//! Removal of overlaps that are implied by a path of other overlaps.

use crate::implementation::config::{SlopTolerance, UnitiggerConfiguration};
use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::mate::{relabel_overlap, verify_symmetric};
use crate::implementation::segments::pack_edges;
use crate::implementation::store::{
    Edge, EdgeIndex, EdgeLabel, FragmentEnd, FragmentIndex, OverlapGraph, OverlapTopology,
};
use crate::implementation::RelaxedAtomicBoolVec;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::{Mutex, PoisonError};

/// The result of a search for an alternative path.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SearchOutcome {
    /// A path with the given number of edges proves the overlap.
    Inferred {
        /// The number of edges on the proving path.
        path_length: usize,
    },
    /// The search space within the depth bound was exhausted without a proof.
    NotInferred,
    /// The work budget ran out. This is not a proof of non-redundancy.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy)]
struct SearchFrame {
    next_edge: EdgeIndex,
    segment_end: EdgeIndex,
    a_hang: i64,
    b_hang: i64,
    depth: usize,
    dovetail_seen: bool,
}

/// Whether a path step of the given topology may follow the path so far.
/// Returns the new value of `dovetail_seen`.
///
/// Dovetail targets accept `(FRC)*(DVT)*`, from-contained and degenerate targets accept
/// `(FRC)*`, and to-contained targets accept `(TOC)*`.
fn step_allowed(
    target: OverlapTopology,
    step: OverlapTopology,
    dovetail_seen: bool,
) -> Option<bool> {
    use OverlapTopology::*;
    match (target, step) {
        (Dovetail, Dovetail) => Some(true),
        (Dovetail, FromContained | Degenerate) => (!dovetail_seen).then_some(false),
        (Dovetail, ToContained) => None,
        (FromContained | Degenerate, FromContained | Degenerate) => Some(false),
        (FromContained | Degenerate, Dovetail | ToContained) => None,
        (ToContained, ToContained) => Some(false),
        (ToContained, Dovetail | FromContained | Degenerate) => None,
    }
}

fn sign(value: i64) -> i64 {
    if value >= 0 {
        1
    } else {
        -1
    }
}

/// False if the path has moved past the target offset by more than the tolerance.
fn within_reach(target: i64, offset: i64, tolerance: i64) -> bool {
    (target - offset) * sign(target) + tolerance > 0
}

/// A reusable bounded depth-first search over the overlap graph.
///
/// The search keeps its frames on an explicit stack and marks visited fragment-ends with the
/// index of the candidate they were visited for, so the marks never need clearing.
pub struct TransitiveSearch<'graph> {
    graph: &'graph OverlapGraph,
    walk_depth: usize,
    work_limit: usize,
    slop: SlopTolerance,
    visited: Vec<Option<EdgeIndex>>,
    stack: Vec<SearchFrame>,
    test_failures: usize,
}

impl<'graph> TransitiveSearch<'graph> {
    /// Creates a search over `graph`. The edges must be sorted and the segments current.
    pub fn new(graph: &'graph OverlapGraph, configuration: &UnitiggerConfiguration) -> Self {
        Self {
            graph,
            walk_depth: configuration.walk_depth,
            work_limit: configuration.work_limit_per_candidate_edge,
            slop: configuration.slop,
            visited: vec![None; 2 * graph.fragment_count()],
            stack: Vec::with_capacity(configuration.walk_depth.min(1024)),
            test_failures: 0,
        }
    }

    /// Paths that reached the distal end of a candidate outside of the tolerance.
    pub fn test_failures(&self) -> usize {
        self.test_failures
    }

    /// Searches for a path of at least two edges from the proximal to the distal end of
    /// `candidate` whose summed overhangs match those of the candidate.
    pub fn is_inferable(&mut self, candidate: EdgeIndex) -> Result<SearchOutcome> {
        let graph = self.graph;
        let target = *graph.edge(candidate)?;
        let target_a_hang = i64::from(target.a_hang);
        let target_b_hang = i64::from(target.b_hang);
        let tolerance = self.slop.for_overlap(
            graph.fragment_length(target.a.fragment)?,
            target_a_hang,
            graph.fragment_length(target.b.fragment)?,
            target_b_hang,
        );
        let target_topology = target.topology();

        let root = graph.segment(target.a)?;
        self.stack.clear();
        self.visited[target.a.key()] = Some(candidate);
        self.stack.push(SearchFrame {
            next_edge: root.start,
            segment_end: root.end,
            a_hang: 0,
            b_hang: 0,
            depth: 0,
            dovetail_seen: false,
        });

        let mut work_tally = 0;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                break;
            };
            if frame.next_edge == frame.segment_end {
                self.stack.pop();
                continue;
            }
            let edge = frame.next_edge;
            frame.next_edge += 1;
            let frame = *frame;

            if work_tally >= self.work_limit {
                return Ok(SearchOutcome::BudgetExhausted);
            }
            work_tally += 1;
            if edge == candidate {
                continue;
            }

            let step: &Edge = &graph.edges()[edge];
            let Some(dovetail_seen) =
                step_allowed(target_topology, step.topology(), frame.dovetail_seen)
            else {
                continue;
            };
            let a_hang = frame.a_hang + i64::from(step.a_hang);
            let b_hang = frame.b_hang + i64::from(step.b_hang);
            if !within_reach(target_a_hang, a_hang, tolerance)
                || !within_reach(target_b_hang, b_hang, tolerance)
            {
                continue;
            }

            if frame.depth > 0 && step.b == target.b {
                if (target_a_hang - a_hang).abs() <= tolerance
                    && (target_b_hang - b_hang).abs() <= tolerance
                {
                    return Ok(SearchOutcome::Inferred {
                        path_length: frame.depth + 1,
                    });
                }
                self.test_failures += 1;
            }

            let next = step.b.opposite();
            if self.visited[next.key()] == Some(candidate) || frame.depth + 1 >= self.walk_depth {
                continue;
            }
            let segment = graph.segment(next)?;
            self.visited[next.key()] = Some(candidate);
            self.stack.push(SearchFrame {
                next_edge: segment.start,
                segment_end: segment.end,
                a_hang,
                b_hang,
                depth: frame.depth + 1,
                dovetail_seen,
            });
        }

        Ok(SearchOutcome::NotInferred)
    }
}

/// Whether an edge is considered for removal.
fn is_candidate(label: EdgeLabel) -> bool {
    !label.is_removed()
        && !matches!(
            label,
            EdgeLabel::MarkedByBranchDvt
                | EdgeLabel::MarkedByDeletedDvt
                | EdgeLabel::MarkedByDeletedCon
        )
}

/// Marks an overlap as removed by transitivity, together with its mate.
pub fn mark_removed(graph: &mut OverlapGraph, edge: EdgeIndex) -> Result<()> {
    let data = graph.edge(edge)?;
    let label = if data.label == EdgeLabel::Contained || !data.is_dovetail() {
        EdgeLabel::RemovedByTransitivityCon
    } else {
        EdgeLabel::RemovedByTransitivityDvt
    };
    relabel_overlap(graph, edge, label)
}

/// Statistics of a transitive reduction run.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TransitiveReport {
    /// Directed candidate edges searched.
    pub candidates: usize,
    /// Dovetail overlaps removed.
    pub inferred_dovetail: usize,
    /// Containment overlaps removed.
    pub inferred_containment: usize,
    /// Searches that ran out of work budget.
    pub budget_exhaustions: usize,
    /// Paths that reached a candidate's distal end outside of the tolerance.
    pub test_failures: usize,
    /// The number of proofs by path length, indexed by the number of edges.
    pub path_lengths: Vec<usize>,
}

impl Display for TransitiveReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "searched {} candidates, removed {} dovetail and {} containment overlaps, {} searches ran out of budget, {} test failures",
            self.candidates,
            self.inferred_dovetail,
            self.inferred_containment,
            self.budget_exhaustions,
            self.test_failures
        )?;
        for (length, count) in self.path_lengths.iter().enumerate() {
            if *count > 0 {
                write!(f, ", {count} proofs of length {length}")?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct WorkerTally {
    test_failures: usize,
    path_lengths: Vec<usize>,
}

/// Searches all candidate edges whose proximal fragment lies in `fragments` in parallel and
/// records the proven ones in `proven`.
fn search_fragments(
    graph: &OverlapGraph,
    configuration: &UnitiggerConfiguration,
    fragments: Range<FragmentIndex>,
    proven: &RelaxedAtomicBoolVec,
    report: &mut TransitiveReport,
) -> Result<()> {
    let threads = configuration.threads.max(1);
    let offset = Mutex::new(fragments.start);
    let candidates = RelaxedCounter::default();
    let budget_exhaustions = RelaxedCounter::default();

    let results = crossbeam::scope(|scope| {
        let mut thread_handles = Vec::new();

        for _ in 0..threads {
            thread_handles.push(scope.spawn(|_| -> Result<WorkerTally> {
                let mut search = TransitiveSearch::new(graph, configuration);
                let mut tally = WorkerTally::default();
                let chunk_size = ((fragments.end - fragments.start) / (threads * 16)).max(64);

                loop {
                    let (current_offset, current_limit) = {
                        let mut offset = offset.lock().unwrap_or_else(PoisonError::into_inner);
                        let current_offset = *offset;
                        if current_offset >= fragments.end {
                            break;
                        }
                        let current_limit = (current_offset + chunk_size).min(fragments.end);
                        *offset = current_limit;
                        (current_offset, current_limit)
                    };

                    for fragment in current_offset..current_limit {
                        if graph.fragment(fragment)?.deleted {
                            continue;
                        }
                        for suffix in [false, true] {
                            for edge in graph.segment(FragmentEnd::new(fragment, suffix))? {
                                if !is_candidate(graph.edges()[edge].label) {
                                    continue;
                                }
                                candidates.inc();
                                match search.is_inferable(edge)? {
                                    SearchOutcome::Inferred { path_length } => {
                                        proven.set(edge, true);
                                        if tally.path_lengths.len() <= path_length {
                                            tally.path_lengths.resize(path_length + 1, 0);
                                        }
                                        tally.path_lengths[path_length] += 1;
                                    }
                                    SearchOutcome::NotInferred => {}
                                    SearchOutcome::BudgetExhausted => {
                                        budget_exhaustions.inc();
                                    }
                                }
                            }
                        }
                    }
                }

                tally.test_failures = search.test_failures();
                Ok(tally)
            }));
        }

        debug!("Waiting for {} transitive reduction threads to finish", thread_handles.len());
        thread_handles
            .into_iter()
            .map(|thread_handle| thread_handle.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| UnitiggerError::WorkerPanicked("transitive reduction"))?;

    for result in results {
        let tally = result.map_err(|_| UnitiggerError::WorkerPanicked("transitive reduction"))??;
        report.test_failures += tally.test_failures;
        if report.path_lengths.len() < tally.path_lengths.len() {
            report.path_lengths.resize(tally.path_lengths.len(), 0);
        }
        for (length, count) in tally.path_lengths.into_iter().enumerate() {
            report.path_lengths[length] += count;
        }
    }
    report.candidates += candidates.get();
    report.budget_exhaustions += budget_exhaustions.get();
    Ok(())
}

/// Applies the proven marks in edge index order. Overlaps whose mate was removed first are
/// skipped, so each overlap is written by exactly one directed half.
fn apply_proofs(
    graph: &mut OverlapGraph,
    proven: &RelaxedAtomicBoolVec,
    report: &mut TransitiveReport,
) -> Result<()> {
    for (edge, is_proven) in proven.iter().enumerate() {
        if !is_proven || graph.edge_label(edge)?.is_removed() {
            continue;
        }
        mark_removed(graph, edge)?;
        if graph.edge_label(edge)? == EdgeLabel::RemovedByTransitivityCon {
            report.inferred_containment += 1;
        } else {
            report.inferred_dovetail += 1;
        }
    }
    Ok(())
}

/// Removes transitively inferable overlaps from the graph.
///
/// The edges must be sorted and mate-symmetric. The edge array is packed before and after.
/// If a block size is configured, proofs are applied and the edge array packed after every
/// block of fragments.
pub fn transitive_edge_marking(
    graph: &mut OverlapGraph,
    configuration: &UnitiggerConfiguration,
) -> Result<TransitiveReport> {
    let asymmetric = verify_symmetric(graph);
    if asymmetric > 0 {
        return Err(UnitiggerError::InconsistentGraphState(format!(
            "{asymmetric} edges are not mate-symmetric before transitive reduction"
        )));
    }
    pack_edges(graph)?;

    let fragment_count = graph.fragment_count();
    let block_size = configuration
        .transitive_block_size
        .unwrap_or(fragment_count)
        .max(1);
    info!(
        "Starting transitive reduction over {fragment_count} fragments with {} threads",
        configuration.threads.max(1)
    );

    let mut report = TransitiveReport::default();
    let mut proven = RelaxedAtomicBoolVec::new(graph.edge_count());
    let mut block_start = 0;
    while block_start < fragment_count {
        let block_end = (block_start + block_size).min(fragment_count);
        proven.reinitialise(graph.edge_count());
        search_fragments(
            graph,
            configuration,
            block_start..block_end,
            &proven,
            &mut report,
        )?;
        apply_proofs(graph, &proven, &mut report)?;
        if block_end < fragment_count {
            pack_edges(graph)?;
        }
        block_start = block_end;
    }

    let asymmetric = verify_symmetric(graph);
    if asymmetric > 0 {
        return Err(UnitiggerError::InconsistentGraphState(format!(
            "{asymmetric} edges are not mate-symmetric after transitive reduction"
        )));
    }
    pack_edges(graph)?;

    info!("Transitive reduction: {report}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{transitive_edge_marking, SearchOutcome, TransitiveSearch};
    use crate::implementation::config::UnitiggerConfiguration;
    use crate::implementation::mate::verify_symmetric;
    use crate::implementation::segments::sort_and_reindex;
    use crate::implementation::store::ingest::{FragmentRecord, OverlapRecord};
    use crate::implementation::store::{EdgeLabel, FragmentEnd, FragmentKind, OverlapGraph};

    fn triangle(configuration: &UnitiggerConfiguration, chord_hang: i32) -> OverlapGraph {
        let mut graph = OverlapGraph::new();
        for iid in 1..=3 {
            graph
                .add_fragment(FragmentRecord::new(iid, 1000, FragmentKind::Read))
                .unwrap();
        }
        for overlap in [
            OverlapRecord::new(1, true, 2, false, 300, 300),
            OverlapRecord::new(2, true, 3, false, 300, 300),
            OverlapRecord::new(1, true, 3, false, chord_hang, chord_hang),
        ] {
            graph.add_overlap(&overlap, configuration).unwrap();
        }
        sort_and_reindex(&mut graph, configuration.edge_sort_strategy).unwrap();
        graph
    }

    fn chord(graph: &OverlapGraph) -> usize {
        graph
            .segment(FragmentEnd::new(0, true))
            .unwrap()
            .find(|&edge| graph.edges()[edge].b.fragment == 2)
            .unwrap()
    }

    #[test]
    fn test_triangle_chord_is_inferable() {
        let configuration = UnitiggerConfiguration {
            walk_depth: 2,
            ..Default::default()
        };
        let graph = triangle(&configuration, 600);
        let mut search = TransitiveSearch::new(&graph, &configuration);
        assert_eq!(
            search.is_inferable(chord(&graph)).unwrap(),
            SearchOutcome::Inferred { path_length: 2 }
        );

        let first = graph.segment(FragmentEnd::new(0, true)).unwrap().start;
        assert_eq!(search.is_inferable(first).unwrap(), SearchOutcome::NotInferred);
    }

    #[test]
    fn test_depth_and_work_bounds() {
        let shallow = UnitiggerConfiguration {
            walk_depth: 1,
            ..Default::default()
        };
        let graph = triangle(&shallow, 600);
        let mut search = TransitiveSearch::new(&graph, &shallow);
        assert_eq!(
            search.is_inferable(chord(&graph)).unwrap(),
            SearchOutcome::NotInferred
        );

        let starved = UnitiggerConfiguration {
            work_limit_per_candidate_edge: 1,
            ..Default::default()
        };
        let mut search = TransitiveSearch::new(&graph, &starved);
        assert_eq!(
            search.is_inferable(chord(&graph)).unwrap(),
            SearchOutcome::BudgetExhausted
        );
    }

    #[test]
    fn test_chord_outside_tolerance_is_kept() {
        let configuration = UnitiggerConfiguration::default();
        // The path undershoots the chord by 100bp, more than the 39bp of slop.
        let graph = triangle(&configuration, 700);
        let mut search = TransitiveSearch::new(&graph, &configuration);
        assert_eq!(
            search.is_inferable(chord(&graph)).unwrap(),
            SearchOutcome::NotInferred
        );
        assert_eq!(search.test_failures(), 1);
    }

    #[test]
    fn test_parallel_marking_removes_the_chord() {
        for threads in [1, 4] {
            let configuration = UnitiggerConfiguration {
                threads,
                ..Default::default()
            };
            let mut graph = triangle(&configuration, 600);
            let report = transitive_edge_marking(&mut graph, &configuration).unwrap();
            assert_eq!(report.inferred_dovetail, 1);
            assert_eq!(report.inferred_containment, 0);
            assert_eq!(report.candidates, 6);
            assert_eq!(graph.edge_count(), 4);
            assert!(graph
                .edges()
                .iter()
                .all(|edge| edge.label == EdgeLabel::Dovetail));
            assert_eq!(verify_symmetric(&graph), 0);
        }
    }

    #[test]
    fn test_block_mode_packs_between_blocks() {
        let configuration = UnitiggerConfiguration {
            transitive_block_size: Some(1),
            ..Default::default()
        };
        let mut graph = triangle(&configuration, 600);
        let report = transitive_edge_marking(&mut graph, &configuration).unwrap();
        assert_eq!(report.inferred_dovetail, 1);
        // The chord is proven from the first fragment and packed away before the third
        // fragment is searched.
        assert_eq!(report.candidates, 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(verify_symmetric(&graph), 0);
    }

    #[test]
    fn test_contained_chain_is_inferable() {
        // 3 is contained in 2, which is contained in 1.
        let configuration = UnitiggerConfiguration::default();
        let mut graph = OverlapGraph::new();
        for (iid, length) in [(1, 1000), (2, 800), (3, 600)] {
            graph
                .add_fragment(FragmentRecord::new(iid, length, FragmentKind::Read))
                .unwrap();
        }
        for overlap in [
            OverlapRecord::new(2, true, 1, false, -100, 100),
            OverlapRecord::new(3, true, 2, false, -100, 100),
            OverlapRecord::new(3, true, 1, false, -200, 200),
        ] {
            graph.add_overlap(&overlap, &configuration).unwrap();
        }
        sort_and_reindex(&mut graph, configuration.edge_sort_strategy).unwrap();

        let report = transitive_edge_marking(&mut graph, &configuration).unwrap();
        assert_eq!(report.inferred_containment, 1);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.edges().iter().all(|edge| edge.a.fragment != 2 || edge.b.fragment != 0));
    }
}
