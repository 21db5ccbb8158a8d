//! Compressed adjacency segments over the edge array.

use crate::implementation::config::EdgeSortStrategy;
use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::mate::compare_edges_strong;
use crate::implementation::store::{FragmentEnd, OverlapGraph};
use permutation::Permutation;
use std::fmt::{Display, Formatter};

/// Recomputes the segment of every fragment-end together with its live degrees.
///
/// The edge array must be grouped by proximal fragment-end in key order.
pub fn rebuild_segments(graph: &mut OverlapGraph) -> Result<()> {
    let end_count = 2 * graph.fragment_count();
    let mut lengths = vec![0usize; end_count];
    let mut dovetail_degrees = vec![0usize; end_count];
    let mut containment_degrees = vec![0usize; end_count];

    let mut previous_key = 0;
    for (index, edge) in graph.edges().iter().enumerate() {
        let key = edge.a.key();
        if key >= end_count {
            return Err(UnitiggerError::IndexOutOfRange {
                kind: "fragment",
                index: edge.a.fragment,
                len: graph.fragment_count(),
            });
        }
        if key < previous_key {
            return Err(UnitiggerError::InconsistentGraphState(format!(
                "edge {index} at fragment-end key {key} follows key {previous_key}, the edges are not grouped by fragment-end"
            )));
        }
        previous_key = key;

        lengths[key] += 1;
        if edge.label.is_live() {
            if edge.is_dovetail() {
                dovetail_degrees[key] += 1;
            } else {
                containment_degrees[key] += 1;
            }
        }
    }

    let mut start = 0;
    for (fragment_index, fragment) in graph.fragments_mut().iter_mut().enumerate() {
        for suffix in [false, true] {
            let key = FragmentEnd::new(fragment_index, suffix).key();
            let end = fragment.end_mut(suffix);
            end.segment_start = start;
            end.segment_length = lengths[key];
            end.dovetail_degree = dovetail_degrees[key];
            end.containment_degree = containment_degrees[key];
            start += lengths[key];
        }
    }

    Ok(())
}

/// Sorts the edge array into segment order and rebuilds the segments.
///
/// Edges are first placed by a counting sort on their proximal fragment-end, then each
/// segment is sorted by [compare_edges_strong].
pub fn sort_and_reindex(graph: &mut OverlapGraph, strategy: EdgeSortStrategy) -> Result<()> {
    let end_count = 2 * graph.fragment_count();
    let mut next = vec![0usize; end_count + 1];
    for edge in graph.edges() {
        let key = edge.a.key();
        if key >= end_count {
            return Err(UnitiggerError::IndexOutOfRange {
                kind: "fragment",
                index: edge.a.fragment,
                len: graph.fragment_count(),
            });
        }
        next[key + 1] += 1;
    }
    for key in 1..=end_count {
        next[key] += next[key - 1];
    }
    let boundaries = next.clone();

    let rank: Vec<_> = graph
        .edges()
        .iter()
        .map(|edge| {
            let key = edge.a.key();
            let rank = next[key];
            next[key] += 1;
            rank
        })
        .collect();

    let edges = graph.edges_vec_mut();
    match strategy {
        EdgeSortStrategy::InPlaceCyclePermutation => {
            let mut permutation = Permutation::oneline(rank);
            permutation.apply_slice_in_place(edges.as_mut_slice());
        }
        EdgeSortStrategy::StableBuffer => {
            let mut order = vec![0; rank.len()];
            for (index, &rank) in rank.iter().enumerate() {
                order[rank] = index;
            }
            let sorted: Vec<_> = order.into_iter().map(|index| edges[index]).collect();
            *edges = sorted;
        }
    }

    for window in boundaries.windows(2) {
        edges[window[0]..window[1]].sort_by(compare_edges_strong);
    }

    rebuild_segments(graph)
}

/// The outcome of [pack_edges].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PackReport {
    /// Edges kept.
    pub kept: usize,
    /// Edges dropped.
    pub dropped: usize,
    /// Fragment-ends that had dovetail edges before packing but none after.
    pub disconnected_dovetail_ends: usize,
    /// Fragment-ends that had containment edges before packing but none after.
    pub disconnected_containment_ends: usize,
}

impl Display for PackReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kept {} edges, dropped {} edges, disconnected {} dovetail and {} containment fragment-ends",
            self.kept,
            self.dropped,
            self.disconnected_dovetail_ends,
            self.disconnected_containment_ends
        )
    }
}

/// Removes all edges whose label is not live, preserving order, and rebuilds the segments.
pub fn pack_edges(graph: &mut OverlapGraph) -> Result<PackReport> {
    let end_count = 2 * graph.fragment_count();
    let mut dovetails_before = vec![0usize; end_count];
    let mut containments_before = vec![0usize; end_count];
    for edge in graph.edges() {
        if edge.is_dovetail() {
            dovetails_before[edge.a.key()] += 1;
        } else {
            containments_before[edge.a.key()] += 1;
        }
    }

    let before = graph.edge_count();
    graph.edges_vec_mut().retain(|edge| edge.label.is_live());
    rebuild_segments(graph)?;

    let mut report = PackReport {
        kept: graph.edge_count(),
        dropped: before - graph.edge_count(),
        ..Default::default()
    };

    for (end, data) in graph.fragment_ends() {
        let key = end.key();
        let iid = graph.fragments()[end.fragment].iid;
        if dovetails_before[key] > 0 && data.dovetail_degree == 0 {
            warn!(
                "fragment-end became dovetail disconnected: iid={iid} suffix={}",
                end.suffix
            );
            report.disconnected_dovetail_ends += 1;
        }
        if containments_before[key] > 0 && data.containment_degree == 0 {
            warn!(
                "fragment-end became containment disconnected: iid={iid} suffix={}",
                end.suffix
            );
            report.disconnected_containment_ends += 1;
        }
    }

    info!("Packed edges: {report}");
    Ok(report)
}

/// Asserts that the segments partition the edge array in key order.
pub fn debug_assert_segments_cover_edges(graph: &OverlapGraph) {
    if !cfg!(debug_assertions) {
        return;
    }

    let mut expected_start = 0;
    for (end, data) in graph.fragment_ends() {
        debug_assert_eq!(data.segment_start, expected_start);
        for edge in &graph.edges()[data.segment_start..data.segment_start + data.segment_length] {
            debug_assert_eq!(edge.a, end);
        }
        expected_start += data.segment_length;
    }
    debug_assert_eq!(expected_start, graph.edge_count());
}
