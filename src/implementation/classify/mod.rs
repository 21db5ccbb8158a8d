//! Degree-driven labelling of fragments and overlap edges.
//!
//! The fragment graph phase separates fragments by their dovetail degrees, finds spurs and
//! contained fragments. The chunk graph phase narrows dovetail edges down to the essential
//! backbone and derives the chunk role of every fragment from it.

use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::mate::relabel_overlap;
use crate::implementation::store::{
    EdgeIndex, EdgeLabel, FragmentEnd, FragmentLabel, OverlapGraph,
};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// The fragment counts produced by [separate_fragments_as_solo_hanging_thru].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SoloHangingThruCounts {
    /// Fragments without dovetail overlaps.
    pub solo: usize,
    /// Fragments without dovetail overlaps at the prefix only.
    pub prefix_hanging: usize,
    /// Fragments without dovetail overlaps at the suffix only.
    pub suffix_hanging: usize,
    /// Fragments with dovetail overlaps at both ends.
    pub thru: usize,
}

/// Fails a classification pass on an edge whose label the pass does not handle.
fn unknown_edge_type<T>(graph: &OverlapGraph, phase: &'static str, edge: EdgeIndex) -> Result<T> {
    let data = graph.edge(edge)?;
    Err(UnitiggerError::UnknownEdgeType {
        phase,
        edge,
        label: data.label,
        a_iid: graph.iid(data.a.fragment)?,
        b_iid: graph.iid(data.b.fragment)?,
    })
}

/// Labels every fragment as SOLO, HANGING or THRU by its current dovetail out-degrees.
///
/// Dovetails touching deleted or removed-breaker fragments are not counted.
/// Deleted and removed-breaker fragments keep their label.
/// The edges must be packed, so only DOVETAIL and CONTAINED labels are accepted.
pub fn separate_fragments_as_solo_hanging_thru(
    graph: &mut OverlapGraph,
) -> Result<SoloHangingThruCounts> {
    let mut degrees = vec![0usize; 2 * graph.fragment_count()];
    for (edge, data) in graph.edges().iter().enumerate() {
        match data.label {
            EdgeLabel::Dovetail => {
                let a_label = graph.fragment_label(data.a.fragment)?;
                let b_label = graph.fragment_label(data.b.fragment)?;
                if [a_label, b_label].iter().all(|label| {
                    !matches!(label, FragmentLabel::Deleted | FragmentLabel::RemovedBreaker)
                }) {
                    degrees[data.a.key()] += 1;
                }
            }
            EdgeLabel::Contained => {}
            _ => return unknown_edge_type(graph, "solo, hanging and thru separation", edge),
        }
    }

    let mut counts = SoloHangingThruCounts::default();
    for (fragment_index, fragment) in graph.fragments_mut().iter_mut().enumerate() {
        if fragment.deleted
            || matches!(
                fragment.label,
                FragmentLabel::Deleted | FragmentLabel::RemovedBreaker
            )
        {
            continue;
        }
        let prefix = degrees[FragmentEnd::new(fragment_index, false).key()];
        let suffix = degrees[FragmentEnd::new(fragment_index, true).key()];
        fragment.label = match (prefix, suffix) {
            (0, 0) => {
                counts.solo += 1;
                FragmentLabel::Solo
            }
            (0, _) => {
                counts.prefix_hanging += 1;
                FragmentLabel::Hanging
            }
            (_, 0) => {
                counts.suffix_hanging += 1;
                FragmentLabel::Hanging
            }
            _ => {
                counts.thru += 1;
                FragmentLabel::Thru
            }
        };
    }

    info!(
        "Separated fragments: {} solo, {} prefix hanging, {} suffix hanging, {} thru",
        counts.solo, counts.prefix_hanging, counts.suffix_hanging, counts.thru
    );
    Ok(counts)
}

/// Marks hanging fragments that compete with thru fragments for the same fragment-end as spurs.
///
/// Every hanging fragment becomes HANGING_CRAPPY first. It is redeemed if one of its dovetail
/// neighbour ends is not overlapped by any thru fragment. Returns the number of spurs.
///
/// Apart from duplicates, removed edges must have been packed away.
pub fn identify_early_spur_fragments(graph: &mut OverlapGraph) -> Result<usize> {
    let mut thru_in_degrees = vec![0usize; 2 * graph.fragment_count()];
    for (edge, data) in graph.edges().iter().enumerate() {
        match data.label {
            EdgeLabel::Dovetail => {
                if graph.fragment_label(data.a.fragment)? == FragmentLabel::Thru {
                    thru_in_degrees[data.b.key()] += 1;
                }
            }
            EdgeLabel::Contained
            | EdgeLabel::RemovedByDuplicateDvt
            | EdgeLabel::RemovedByDuplicateCon => {}
            _ => return unknown_edge_type(graph, "early spur identification", edge),
        }
    }

    for fragment in graph.fragments_mut() {
        fragment.spur = false;
        if matches!(
            fragment.label,
            FragmentLabel::Hanging | FragmentLabel::HangingCrappy | FragmentLabel::HangingChunk
        ) {
            fragment.label = FragmentLabel::HangingCrappy;
            fragment.spur = true;
        }
    }

    for edge in 0..graph.edge_count() {
        let data = *graph.edge(edge)?;
        if data.label != EdgeLabel::Dovetail {
            continue;
        }
        let fragment = graph.fragment_mut(data.a.fragment)?;
        if (fragment.spur || fragment.label == FragmentLabel::HangingCrappy)
            && thru_in_degrees[data.b.key()] == 0
        {
            fragment.label = FragmentLabel::Hanging;
            fragment.spur = false;
        }
    }

    let spurs = graph.fragments().iter().filter(|fragment| fragment.spur).count();
    info!("Identified {spurs} early spur fragments");
    Ok(spurs)
}

/// Marks every fragment with a live from-contained containment edge as contained.
///
/// Contained fragments are labelled UNPLACEDCONT, and dovetails between two contained
/// fragments become BETWEEN_CONTAINED. Returns the number of contained fragments.
pub fn mark_contained_fragments(graph: &mut OverlapGraph) -> Result<usize> {
    let mut contained = vec![false; graph.fragment_count()];
    for edge in graph.edges() {
        if edge.label == EdgeLabel::Contained && !edge.is_dovetail() {
            contained[edge.a.fragment] = true;
        }
    }

    let mut count = 0;
    for (fragment, is_contained) in graph.fragments_mut().iter_mut().zip(&contained) {
        if *is_contained && !fragment.deleted {
            fragment.contained = true;
            fragment.label = FragmentLabel::UnplacedCont;
            count += 1;
        }
    }

    let mut between = 0;
    for edge in 0..graph.edge_count() {
        let data = *graph.edge(edge)?;
        if data.label == EdgeLabel::Dovetail
            && graph.fragment(data.a.fragment)?.contained
            && graph.fragment(data.b.fragment)?.contained
        {
            relabel_overlap(graph, edge, EdgeLabel::BetweenContained)?;
            between += 1;
        }
    }

    info!("Marked {count} contained fragments and {between} edges between contained fragments");
    Ok(count)
}

/// The edge counts produced by [mask_overlaps_touching_crappy_fragments].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CrappyMaskCounts {
    /// Dovetail edges touching one spur.
    pub touches_crappy_dvt: usize,
    /// Dovetail edges between two spurs.
    pub between_crappy_dvt: usize,
    /// Containment edges touching one spur.
    pub touches_crappy_con: usize,
    /// Containment edges between two spurs.
    pub between_crappy_con: usize,
}

/// Relabels the edges touching HANGING_CRAPPY fragments so that they are not used for chunks.
pub fn mask_overlaps_touching_crappy_fragments(
    graph: &mut OverlapGraph,
) -> Result<CrappyMaskCounts> {
    let mut counts = CrappyMaskCounts::default();
    for edge in 0..graph.edge_count() {
        let data = *graph.edge(edge)?;
        let crappy_ends = [data.a.fragment, data.b.fragment]
            .into_iter()
            .map(|fragment| graph.fragment_label(fragment))
            .filter_ok(|label| *label == FragmentLabel::HangingCrappy)
            .fold_ok(0, |count, _| count + 1)?;

        let new_label = match data.label {
            EdgeLabel::Dovetail
            | EdgeLabel::Interchunk
            | EdgeLabel::TouchesCrappyDvt
            | EdgeLabel::BetweenCrappyDvt => {
                match crappy_ends {
                    0 => data.label,
                    1 => EdgeLabel::TouchesCrappyDvt,
                    _ => EdgeLabel::BetweenCrappyDvt,
                }
            }
            EdgeLabel::Contained | EdgeLabel::TouchesCrappyCon | EdgeLabel::BetweenCrappyCon => {
                match crappy_ends {
                    0 => data.label,
                    1 => EdgeLabel::TouchesCrappyCon,
                    _ => EdgeLabel::BetweenCrappyCon,
                }
            }
            EdgeLabel::Thickest | EdgeLabel::BetweenContained => data.label,
            _ => return unknown_edge_type(graph, "masking overlaps of spurs", edge),
        };

        match new_label {
            EdgeLabel::TouchesCrappyDvt => counts.touches_crappy_dvt += 1,
            EdgeLabel::BetweenCrappyDvt => counts.between_crappy_dvt += 1,
            EdgeLabel::TouchesCrappyCon => counts.touches_crappy_con += 1,
            EdgeLabel::BetweenCrappyCon => counts.between_crappy_con += 1,
            _ => {}
        }
        if new_label != data.label {
            relabel_overlap(graph, edge, new_label)?;
        }
    }

    info!(
        "Masked edges touching spurs: {} touching and {} between dovetails, {} touching and {} between containments",
        counts.touches_crappy_dvt,
        counts.between_crappy_dvt,
        counts.touches_crappy_con,
        counts.between_crappy_con
    );
    Ok(counts)
}

/// The first dovetail-family edge of the segment. Segments are in strong order, so this is
/// the thickest one.
pub fn thickest_edge(graph: &OverlapGraph, end: FragmentEnd) -> Result<Option<EdgeIndex>> {
    let segment = graph.segment(end)?;
    Ok(segment.clone().zip(&graph.edges()[segment]).find_map(|(edge, data)| {
        matches!(
            data.label,
            EdgeLabel::Dovetail
                | EdgeLabel::Thickest
                | EdgeLabel::Buddy
                | EdgeLabel::Interchunk
                | EdgeLabel::Intrachunk
        )
        .then_some(edge)
    }))
}

/// Labels the thickest dovetail edge of every fragment-end as THICKEST.
/// Returns the number of relabelled overlaps.
pub fn identify_thickest_overlaps(graph: &mut OverlapGraph) -> Result<usize> {
    let mut count = 0;
    for fragment in 0..graph.fragment_count() {
        if graph.fragment(fragment)?.deleted {
            continue;
        }
        for suffix in [false, true] {
            if let Some(edge) = thickest_edge(graph, FragmentEnd::new(fragment, suffix))? {
                if graph.edge_label(edge)? == EdgeLabel::Dovetail {
                    relabel_overlap(graph, edge, EdgeLabel::Thickest)?;
                    count += 1;
                }
            }
        }
    }

    info!("Identified {count} thickest overlaps");
    Ok(count)
}

/// Follows thickest edges from an essential fragment through contained fragments,
/// turning them into INTERCHUNK edges. Returns the number of relabelled overlaps.
fn mark_branch_multi_contained_path(graph: &mut OverlapGraph, start: EdgeIndex) -> Result<usize> {
    let mut count = 0;
    let mut current = Some(start);
    while let Some(edge) = current {
        let data = *graph.edge(edge)?;
        if data.label != EdgeLabel::Thickest {
            break;
        }
        relabel_overlap(graph, edge, EdgeLabel::Interchunk)?;
        count += 1;

        let distal = graph.fragment(data.b.fragment)?;
        if !distal.contained {
            break;
        }
        if !matches!(
            distal.label,
            FragmentLabel::UnplacedCont | FragmentLabel::BranchMultiCont
        ) {
            return Err(UnitiggerError::UnexpectedFragmentLabel {
                phase: "essential component identification",
                iid: distal.iid,
                label: distal.label,
            });
        }
        graph.set_fragment_label(data.b.fragment, FragmentLabel::BranchMultiCont)?;
        current = thickest_edge(graph, data.b.opposite())?;
    }
    Ok(count)
}

/// Marks the thickest edges of all non-contained HANGING and THRU fragments as INTERCHUNK,
/// continuing through chains of contained fragments. Returns the number of relabelled overlaps.
pub fn identify_essential_components(graph: &mut OverlapGraph) -> Result<usize> {
    let mut count = 0;
    for fragment in 0..graph.fragment_count() {
        let data = graph.fragment(fragment)?;
        if data.contained || !matches!(data.label, FragmentLabel::Hanging | FragmentLabel::Thru) {
            continue;
        }
        for suffix in [false, true] {
            if let Some(edge) = thickest_edge(graph, FragmentEnd::new(fragment, suffix))? {
                count += mark_branch_multi_contained_path(graph, edge)?;
            }
        }
    }

    let branch_multi_contained = graph
        .fragments()
        .iter()
        .filter(|fragment| fragment.label == FragmentLabel::BranchMultiCont)
        .count();
    info!(
        "Identified {count} essential overlaps and {branch_multi_contained} branch multi contained fragments"
    );
    Ok(count)
}

/// Turns INTERCHUNK edges between mutually unique fragment-ends into INTRACHUNK edges.
///
/// The in-degree of a fragment-end counts the essential edges pointing at it. An edge is
/// intrachunk if both of its ends have in-degree one and neither fragment is contained.
/// Returns the number of intrachunk overlaps.
pub fn classify_intrachunk_edges(graph: &mut OverlapGraph) -> Result<usize> {
    let mut in_degrees = vec![0usize; 2 * graph.fragment_count()];
    for (edge, data) in graph.edges().iter().enumerate() {
        match data.label {
            EdgeLabel::Interchunk | EdgeLabel::Intrachunk | EdgeLabel::Buddy => {
                in_degrees[data.b.key()] += 1
            }
            EdgeLabel::Dovetail
            | EdgeLabel::Thickest
            | EdgeLabel::TouchesContained
            | EdgeLabel::BetweenContained
            | EdgeLabel::Contained
            | EdgeLabel::TouchesCrappyDvt
            | EdgeLabel::BetweenCrappyDvt
            | EdgeLabel::TouchesCrappyCon
            | EdgeLabel::BetweenCrappyCon
            | EdgeLabel::MarkedByBranchDvt
            | EdgeLabel::MarkedByBreaker
            | EdgeLabel::MarkedByDeletedDvt
            | EdgeLabel::MarkedByDeletedCon => {}
            EdgeLabel::Unused
            | EdgeLabel::RemovedByTransitivityDvt
            | EdgeLabel::RemovedByTransitivityCon
            | EdgeLabel::RemovedByThresholdDvt
            | EdgeLabel::RemovedByThresholdCon
            | EdgeLabel::RemovedByDuplicateDvt
            | EdgeLabel::RemovedByDuplicateCon => {
                return unknown_edge_type(graph, "intrachunk classification", edge);
            }
        }
    }

    let mut count = 0;
    for edge in 0..graph.edge_count() {
        let data = *graph.edge(edge)?;
        if !data.label.is_thickest() {
            continue;
        }
        let convert = in_degrees[data.a.key()] == 1
            && in_degrees[data.b.key()] == 1
            && !graph.fragment(data.a.fragment)?.contained
            && !graph.fragment(data.b.fragment)?.contained;
        if convert {
            if data.label != EdgeLabel::Intrachunk {
                relabel_overlap(graph, edge, EdgeLabel::Intrachunk)?;
            }
            count += 1;
        }
    }

    // Both directed halves were counted.
    let count = count / 2;
    info!("Classified {count} intrachunk overlaps");
    Ok(count)
}

/// Derives the chunk role of every fragment from its intrachunk and interchunk edges.
pub fn classify_fragment_labels(graph: &mut OverlapGraph) -> Result<()> {
    let end_count = 2 * graph.fragment_count();
    let mut intrachunk = vec![0usize; end_count];
    let mut interchunk = vec![0usize; end_count];
    for (edge, data) in graph.edges().iter().enumerate() {
        match data.label {
            EdgeLabel::Intrachunk => intrachunk[data.a.key()] += 1,
            EdgeLabel::Interchunk => interchunk[data.a.key()] += 1,
            EdgeLabel::Dovetail
            | EdgeLabel::Thickest
            | EdgeLabel::Buddy
            | EdgeLabel::BetweenContained
            | EdgeLabel::Contained
            | EdgeLabel::TouchesCrappyDvt
            | EdgeLabel::BetweenCrappyDvt
            | EdgeLabel::TouchesCrappyCon
            | EdgeLabel::BetweenCrappyCon
            | EdgeLabel::MarkedByBranchDvt
            | EdgeLabel::MarkedByBreaker
            | EdgeLabel::MarkedByDeletedDvt
            | EdgeLabel::MarkedByDeletedCon => {}
            // Contained fragments must not have been joined to the backbone.
            EdgeLabel::TouchesContained
            | EdgeLabel::Unused
            | EdgeLabel::RemovedByTransitivityDvt
            | EdgeLabel::RemovedByTransitivityCon
            | EdgeLabel::RemovedByThresholdDvt
            | EdgeLabel::RemovedByThresholdCon
            | EdgeLabel::RemovedByDuplicateDvt
            | EdgeLabel::RemovedByDuplicateCon => {
                return unknown_edge_type(graph, "fragment chunk classification", edge);
            }
        }
    }

    for (fragment_index, fragment) in graph.fragments_mut().iter_mut().enumerate() {
        let prefix = FragmentEnd::new(fragment_index, false).key();
        let suffix = FragmentEnd::new(fragment_index, true).key();
        let (inpx, insx) = (intrachunk[prefix], intrachunk[suffix]);
        let (jnpx, jnsx) = (interchunk[prefix], interchunk[suffix]);

        if inpx > 1 || insx > 1 {
            return Err(UnitiggerError::InconsistentGraphState(format!(
                "fragment iid={} has {inpx} intrachunk edges at its prefix and {insx} at its suffix",
                fragment.iid
            )));
        }

        fragment.container = None;
        if fragment.deleted {
            fragment.label = FragmentLabel::Deleted;
            continue;
        }
        if fragment.label == FragmentLabel::BranchMultiCont {
            continue;
        }
        if fragment.contained {
            fragment.label = FragmentLabel::UnplacedCont;
            continue;
        }
        if fragment.label == FragmentLabel::HangingCrappy {
            continue;
        }

        if inpx != 0 && jnpx != 0 {
            warn!(
                "Woops: iid={} vid={fragment_index} inpx={inpx} jnpx={jnpx}",
                fragment.iid
            );
        }
        if insx != 0 && jnsx != 0 {
            warn!(
                "Woops: iid={} vid={fragment_index} insx={insx} jnsx={jnsx}",
                fragment.iid
            );
        }

        let prefix_blunt = inpx == 0 && jnpx == 0;
        let suffix_blunt = insx == 0 && jnsx == 0;
        fragment.label = match (prefix_blunt, suffix_blunt) {
            (true, true) => FragmentLabel::Solo,
            (true, false) | (false, true) => match inpx + insx {
                0 => FragmentLabel::Hanging,
                1 => FragmentLabel::HangingChunk,
                _ => fragment.label,
            },
            (false, false) => match inpx + insx {
                0 => FragmentLabel::Thru,
                1 => FragmentLabel::Interchunk,
                _ => FragmentLabel::Intrachunk,
            },
        };
    }

    Ok(())
}

/// Fragment and edge counts by label.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LabelReport {
    /// The number of fragments per label, in [FragmentLabel::ALL] order.
    pub fragments: Vec<(FragmentLabel, usize)>,
    /// The number of directed edges per label, in [EdgeLabel::ALL] order.
    pub edges: Vec<(EdgeLabel, usize)>,
}

impl LabelReport {
    /// The number of fragments with the given label.
    pub fn fragment_count(&self, label: FragmentLabel) -> usize {
        self.fragments
            .iter()
            .find(|(other, _)| *other == label)
            .map_or(0, |(_, count)| *count)
    }

    /// The number of directed edges with the given label.
    pub fn edge_count(&self, label: EdgeLabel) -> usize {
        self.edges
            .iter()
            .find(|(other, _)| *other == label)
            .map_or(0, |(_, count)| *count)
    }
}

impl Display for LabelReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Fragment labels:")?;
        for (label, count) in self.fragments.iter().filter(|(_, count)| *count > 0) {
            writeln!(f, "  {label}: {count}")?;
        }
        writeln!(f, "Edge labels:")?;
        for (label, count) in self.edges.iter().filter(|(_, count)| *count > 0) {
            writeln!(f, "  {label}: {count}")?;
        }
        Ok(())
    }
}

/// Counts fragments and edges by label.
pub fn count_labels(graph: &OverlapGraph) -> LabelReport {
    let fragment_counts = graph.fragments().iter().map(|fragment| fragment.label).counts();
    let edge_counts = graph.edges().iter().map(|edge| edge.label).counts();
    LabelReport {
        fragments: FragmentLabel::ALL
            .into_iter()
            .map(|label| (label, fragment_counts.get(&label).copied().unwrap_or(0)))
            .collect(),
        edges: EdgeLabel::ALL
            .into_iter()
            .map(|label| (label, edge_counts.get(&label).copied().unwrap_or(0)))
            .collect(),
    }
}
