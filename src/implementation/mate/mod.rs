//! Keeps the two directed records of every overlap consistent.

use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::segments::sort_and_reindex;
use crate::implementation::config::EdgeSortStrategy;
use crate::implementation::store::{Edge, EdgeIndex, EdgeLabel, FragmentEnd, OverlapGraph};
use std::cmp::Ordering;

/// Swaps the roles of the two fragment-ends. The mate transform of dovetail overlaps.
pub fn reflect(edge: &Edge) -> Edge {
    Edge {
        a: edge.b,
        a_hang: edge.b_hang,
        b: edge.a,
        b_hang: edge.a_hang,
        reflected: !edge.reflected,
        ..*edge
    }
}

/// Complements both ends and maps `(ahg, bhg)` to `(-bhg, -ahg)`.
/// The mate transform of containment overlaps, which keeps the contained fragment proximal.
pub fn granger(edge: &Edge) -> Edge {
    Edge {
        a: edge.a.opposite(),
        a_hang: -edge.b_hang,
        b: edge.b.opposite(),
        b_hang: -edge.a_hang,
        grangered: !edge.grangered,
        ..*edge
    }
}

/// The other directed record of the overlap described by `edge`.
pub fn mate_of(edge: &Edge) -> Edge {
    if edge.is_dovetail() {
        reflect(edge)
    } else {
        granger(edge)
    }
}

/// Orders edges by proximal end, thinnest proximal overhang and thickest distal overhang first,
/// then by distal end. Flags are ignored.
pub fn compare_edges_weak(e1: &Edge, e2: &Edge) -> Ordering {
    e1.a.fragment
        .cmp(&e2.a.fragment)
        .then(e1.a.suffix.cmp(&e2.a.suffix))
        .then(e1.a_hang.cmp(&e2.a_hang))
        .then(e2.b_hang.cmp(&e1.b_hang))
        .then(e1.b.fragment.cmp(&e2.b.fragment))
        .then(e1.b.suffix.cmp(&e2.b.suffix))
}

/// Like [compare_edges_weak], but blessed edges come first in their segment and reflected
/// copies come after their unreflected twins.
pub fn compare_edges_strong(e1: &Edge, e2: &Edge) -> Ordering {
    e1.a.fragment
        .cmp(&e2.a.fragment)
        .then(e1.a.suffix.cmp(&e2.a.suffix))
        .then(e2.blessed.cmp(&e1.blessed))
        .then(e1.a_hang.cmp(&e2.a_hang))
        .then(e2.b_hang.cmp(&e1.b_hang))
        .then(e1.b.fragment.cmp(&e2.b.fragment))
        .then(e1.b.suffix.cmp(&e2.b.suffix))
        .then(e1.reflected.cmp(&e2.reflected))
}

/// The strong order without its last tie breaker. Mates are searched with this key.
fn compare_mate_key(e1: &Edge, e2: &Edge) -> Ordering {
    e2.blessed
        .cmp(&e1.blessed)
        .then(e1.a_hang.cmp(&e2.a_hang))
        .then(e2.b_hang.cmp(&e1.b_hang))
        .then(e1.b.fragment.cmp(&e2.b.fragment))
        .then(e1.b.suffix.cmp(&e2.b.suffix))
}

fn mate_not_found(graph: &OverlapGraph, edge: EdgeIndex, data: &Edge) -> UnitiggerError {
    UnitiggerError::MateNotFound {
        edge,
        a_iid: graph.iid(data.a.fragment).unwrap_or_default(),
        a_suffix: data.a.suffix,
        b_iid: graph.iid(data.b.fragment).unwrap_or_default(),
        b_suffix: data.b.suffix,
        a_hang: data.a_hang,
        b_hang: data.b_hang,
    }
}

/// Finds the other directed record of an overlap.
///
/// Binary search over the segment of the mate's proximal end, so the edges must be sorted and
/// the segments current. Among equal candidates, one with the same removal state is preferred.
pub fn find_mate(graph: &OverlapGraph, edge: EdgeIndex) -> Result<EdgeIndex> {
    let data = *graph.edge(edge)?;
    let target = mate_of(&data);
    let segment = graph.segment(target.a)?;
    let edges = &graph.edges()[segment.clone()];

    let lower = edges.partition_point(|other| compare_mate_key(other, &target) == Ordering::Less);
    let upper =
        edges.partition_point(|other| compare_mate_key(other, &target) != Ordering::Greater);
    let candidates = (lower..upper).filter(|&offset| segment.start + offset != edge);

    let mut fallback = None;
    for offset in candidates {
        if edges[offset].label.is_removed() == data.label.is_removed() {
            return Ok(segment.start + offset);
        }
        fallback.get_or_insert(segment.start + offset);
    }
    if let Some(mate) = fallback {
        return Ok(mate);
    }

    // Blessing may have been applied to one half only; fall back to a linear scan.
    edges
        .iter()
        .enumerate()
        .find(|&(offset, other)| {
            compare_edges_weak(other, &target) == Ordering::Equal && segment.start + offset != edge
        })
        .map(|(offset, _)| segment.start + offset)
        .ok_or_else(|| mate_not_found(graph, edge, &data))
}

/// Copies the label of an edge to its mate.
pub fn fix_mate(graph: &mut OverlapGraph, edge: EdgeIndex) -> Result<()> {
    let label = graph.edge_label(edge)?;
    let mate = find_mate(graph, edge)?;
    graph.set_edge_label(mate, label)
}

/// Sets the label of an edge and its mate.
pub fn relabel_overlap(graph: &mut OverlapGraph, edge: EdgeIndex, label: EdgeLabel) -> Result<()> {
    graph.set_edge_label(edge, label)?;
    fix_mate(graph, edge)
}

/// Synthesises the missing mate of every edge that has none, then re-sorts.
/// Returns the number of synthesised edges.
pub fn append_missing_mates(
    graph: &mut OverlapGraph,
    strategy: EdgeSortStrategy,
) -> Result<usize> {
    let mut missing = Vec::new();
    for edge in 0..graph.edge_count() {
        match find_mate(graph, edge) {
            Ok(_) => {}
            Err(UnitiggerError::MateNotFound { .. }) => missing.push(mate_of(graph.edge(edge)?)),
            Err(error) => return Err(error),
        }
    }

    let count = missing.len();
    if count > 0 {
        warn!("Synthesising {count} missing mate edges");
        for edge in missing {
            graph.push_edge(edge);
        }
        sort_and_reindex(graph, strategy)?;
    }
    Ok(count)
}

/// Counts adjacent edge pairs that are out of strong order.
pub fn verify_sorted(graph: &OverlapGraph) -> usize {
    let violations = graph
        .edges()
        .windows(2)
        .filter(|pair| compare_edges_strong(&pair[0], &pair[1]) == Ordering::Greater)
        .count();
    if violations > 0 {
        warn!("Found {violations} edges out of order");
    }
    violations
}

/// Counts edges without a mate or whose mate carries a different label.
pub fn verify_symmetric(graph: &OverlapGraph) -> usize {
    let mut violations = 0;
    for (edge, data) in graph.edges().iter().enumerate() {
        match find_mate(graph, edge) {
            Ok(mate) => {
                if graph.edges()[mate].label != data.label {
                    debug!(
                        "Edge {edge} is {} but its mate {mate} is {}",
                        data.label,
                        graph.edges()[mate].label
                    );
                    violations += 1;
                }
            }
            Err(error) => {
                debug!("{error}");
                violations += 1;
            }
        }
    }
    if violations > 0 {
        warn!("Found {violations} asymmetric edges");
    }
    violations
}

/// Marks every edge that is weakly equal to its predecessor as a duplicate.
/// The edges must be sorted. Returns the number of marked edges.
pub fn mark_duplicate_edges(graph: &mut OverlapGraph) -> usize {
    let edges = graph.edges_vec_mut();
    let mut count = 0;
    for index in 1..edges.len() {
        if compare_edges_weak(&edges[index - 1], &edges[index]) == Ordering::Equal {
            edges[index].label = if edges[index].is_dovetail() {
                EdgeLabel::RemovedByDuplicateDvt
            } else {
                EdgeLabel::RemovedByDuplicateCon
            };
            count += 1;
        }
    }
    info!("Marked {count} duplicate edges");
    count
}

/// Keeps at most `cutoff` dovetail and `cutoff` containment edges per fragment-end,
/// in segment order. Returns the number of overlaps removed.
pub fn apply_degree_threshold(graph: &mut OverlapGraph, cutoff: usize) -> Result<usize> {
    let mut count = 0;
    for key in 0..2 * graph.fragment_count() {
        let segment = graph.segment(FragmentEnd::from_key(key))?;
        let mut dovetails = 0;
        let mut containments = 0;
        for edge in segment {
            let data = *graph.edge(edge)?;
            if data.label.is_removed() {
                continue;
            }
            let label = if data.is_dovetail() {
                dovetails += 1;
                if dovetails <= cutoff {
                    continue;
                }
                EdgeLabel::RemovedByThresholdDvt
            } else {
                containments += 1;
                if containments <= cutoff {
                    continue;
                }
                EdgeLabel::RemovedByThresholdCon
            };
            relabel_overlap(graph, edge, label)?;
            count += 1;
        }
    }
    info!("Removed {count} overlaps above the fragment-end degree cutoff of {cutoff}");
    Ok(count)
}

/// Asserts that every edge has a mate with the same label.
pub fn debug_assert_symmetric(graph: &OverlapGraph) {
    if !cfg!(debug_assertions) {
        return;
    }

    debug_assert_eq!(verify_symmetric(graph), 0);
}

#[cfg(test)]
mod tests {
    use super::{
        compare_edges_strong, compare_edges_weak, find_mate, granger, mate_of, reflect,
        verify_symmetric,
    };
    use crate::implementation::config::UnitiggerConfiguration;
    use crate::implementation::mate::{
        append_missing_mates, apply_degree_threshold, fix_mate, verify_sorted,
    };
    use crate::implementation::segments::sort_and_reindex;
    use crate::implementation::store::ingest::{FragmentRecord, OverlapRecord};
    use crate::implementation::store::{
        Edge, EdgeLabel, FragmentEnd, FragmentKind, OverlapGraph,
    };
    use std::cmp::Ordering;

    fn star_graph() -> OverlapGraph {
        let configuration = UnitiggerConfiguration::default();
        let mut graph = OverlapGraph::new();
        for iid in 1..=4 {
            graph
                .add_fragment(FragmentRecord::new(iid, 1000, FragmentKind::Read))
                .unwrap();
        }
        for (other, hang) in [(2, 300), (3, 500), (4, 700)] {
            graph
                .add_overlap(
                    &OverlapRecord::new(1, true, other, false, hang, hang),
                    &configuration,
                )
                .unwrap();
        }
        sort_and_reindex(&mut graph, configuration.edge_sort_strategy).unwrap();
        graph
    }

    #[test]
    fn test_transforms_are_involutions() {
        let dovetail = Edge::new(
            FragmentEnd::new(0, true),
            300,
            FragmentEnd::new(1, false),
            200,
            EdgeLabel::Dovetail,
        );
        assert_eq!(reflect(&reflect(&dovetail)), dovetail);
        assert_eq!(mate_of(&dovetail).a, FragmentEnd::new(1, false));
        assert!(mate_of(&dovetail).reflected);

        let containment = Edge::new(
            FragmentEnd::new(0, false),
            -200,
            FragmentEnd::new(1, true),
            300,
            EdgeLabel::Contained,
        );
        let mate = granger(&containment);
        assert_eq!(mate.a, FragmentEnd::new(0, true));
        assert_eq!(mate.b, FragmentEnd::new(1, false));
        assert_eq!((mate.a_hang, mate.b_hang), (-300, 200));
        assert!(mate.is_from_contained());
        assert_eq!(granger(&mate), containment);
    }

    #[test]
    fn test_strong_order_puts_blessed_first() {
        let mut e1 = Edge::new(
            FragmentEnd::new(0, true),
            300,
            FragmentEnd::new(1, false),
            300,
            EdgeLabel::Dovetail,
        );
        let mut e2 = e1;
        e2.a_hang = 100;
        assert_eq!(compare_edges_weak(&e1, &e2), Ordering::Greater);
        e1.blessed = true;
        assert_eq!(compare_edges_strong(&e1, &e2), Ordering::Less);
        e2 = e1;
        e2.reflected = true;
        assert_eq!(compare_edges_weak(&e1, &e2), Ordering::Equal);
        assert_eq!(compare_edges_strong(&e1, &e2), Ordering::Less);
    }

    #[test]
    fn test_find_mate_is_an_involution() {
        let graph = star_graph();
        assert_eq!(graph.edge_count(), 6);
        for edge in 0..graph.edge_count() {
            let mate = find_mate(&graph, edge).unwrap();
            assert_ne!(mate, edge);
            assert_eq!(find_mate(&graph, mate).unwrap(), edge);
        }
        assert_eq!(verify_symmetric(&graph), 0);
    }

    #[test]
    fn test_missing_mate_is_synthesised() {
        let mut graph = star_graph();
        let strategy = UnitiggerConfiguration::default().edge_sort_strategy;
        let hub_edge = graph.segment(FragmentEnd::new(0, true)).unwrap().start;
        let mate = find_mate(&graph, hub_edge).unwrap();
        graph.edges_vec_mut().remove(mate);
        sort_and_reindex(&mut graph, strategy).unwrap();
        assert_eq!(graph.edge_count(), 5);
        assert_eq!(verify_symmetric(&graph), 1);

        assert_eq!(append_missing_mates(&mut graph, strategy).unwrap(), 1);
        assert_eq!(graph.edge_count(), 6);
        assert_eq!(verify_symmetric(&graph), 0);
        assert_eq!(verify_sorted(&graph), 0);
        assert_eq!(graph.segment_length(FragmentEnd::new(1, false)).unwrap(), 1);

        assert_eq!(append_missing_mates(&mut graph, strategy).unwrap(), 0);
    }

    #[test]
    fn test_fix_mate_copies_label() {
        let mut graph = star_graph();
        graph.set_edge_label(0, EdgeLabel::Thickest).unwrap();
        assert_eq!(verify_symmetric(&graph), 2);
        fix_mate(&mut graph, 0).unwrap();
        assert_eq!(verify_symmetric(&graph), 0);
    }

    #[test]
    fn test_degree_threshold_keeps_thickest() {
        let mut graph = star_graph();
        assert_eq!(apply_degree_threshold(&mut graph, 1).unwrap(), 2);
        let hub_suffix = graph.segment(FragmentEnd::new(0, true)).unwrap();
        let labels: Vec<_> = hub_suffix
            .map(|edge| (graph.edges()[edge].a_hang, graph.edges()[edge].label))
            .collect();
        assert_eq!(
            labels,
            vec![
                (300, EdgeLabel::Dovetail),
                (500, EdgeLabel::RemovedByThresholdDvt),
                (700, EdgeLabel::RemovedByThresholdDvt),
            ]
        );
        assert_eq!(verify_symmetric(&graph), 0);
    }
}
