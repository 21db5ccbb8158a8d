//! The unitigger pipeline: the fragment graph phase followed by the chunk graph phase.

use crate::implementation::chunks::{
    apply_coverage_statistics, bless_unique_overlaps, build_chunks, check_edge_trimming,
    check_fragment_occurrences, compute_global_fragment_arrival_rate, ArrivalRateEstimate,
    ChunkSet, OccurrenceReport,
};
use crate::implementation::classify::{
    classify_fragment_labels, classify_intrachunk_edges, count_labels,
    identify_early_spur_fragments, identify_essential_components, identify_thickest_overlaps,
    mark_contained_fragments, mask_overlaps_touching_crappy_fragments,
    separate_fragments_as_solo_hanging_thru, CrappyMaskCounts, LabelReport,
    SoloHangingThruCounts,
};
use crate::implementation::config::UnitiggerConfiguration;
use crate::implementation::error::Result;
use crate::implementation::log_memory_usage;
use crate::implementation::mate::{
    append_missing_mates, apply_degree_threshold, debug_assert_symmetric, mark_duplicate_edges,
};
use crate::implementation::segments::{
    debug_assert_segments_cover_edges, pack_edges, sort_and_reindex, PackReport,
};
use crate::implementation::store::OverlapGraph;
use crate::implementation::transitive::{transitive_edge_marking, TransitiveReport};

/// Counts collected by the phases of a unitigger run.
#[derive(Debug, Clone, Default)]
pub struct PhaseReports {
    /// Mate edges that had to be synthesised.
    pub missing_mates: usize,
    /// Directed edges marked as duplicates.
    pub duplicate_edges: usize,
    /// Overlaps removed by the fragment-end degree cutoff.
    pub threshold_removed: usize,
    /// The edge pack after the graph was cleaned up.
    pub initial_pack: PackReport,
    /// The first SOLO / HANGING / THRU classification.
    pub solo_hanging_thru: SoloHangingThruCounts,
    /// Transitive reduction, if it ran.
    pub transitive: Option<TransitiveReport>,
    /// Hanging fragments marked as spurs.
    pub early_spurs: usize,
    /// Fragments marked as contained.
    pub contained_fragments: usize,
    /// Edges masked because they touch spurs.
    pub crappy_mask: CrappyMaskCounts,
    /// Thickest overlaps.
    pub thickest_overlaps: usize,
    /// Contained fragments promoted to essential.
    pub essential_components: usize,
    /// Overlaps classified as INTRACHUNK.
    pub intrachunk_overlaps: usize,
    /// Fragment-ends whose dovetail overlaps were all trimmed away.
    pub trimmed_ends: usize,
    /// Directed edges blessed in unique chunks.
    pub blessed_edges: usize,
}

/// The result of a unitigger run.
#[derive(Debug, Clone)]
pub struct UnitiggerOutput {
    /// The chunks and their fragment lists.
    pub chunks: ChunkSet,
    /// The fragment arrival rate used for the coverage statistics.
    pub arrival_rate: ArrivalRateEstimate,
    /// Fragments that do not occur exactly once in the chunks.
    pub occurrences: OccurrenceReport,
    /// Counts of the individual phases.
    pub reports: PhaseReports,
    /// Fragment and edge labels at the end of the run.
    pub labels: LabelReport,
}

/// Builds unitigs from an overlap graph.
#[derive(Debug, Clone, Default)]
pub struct Unitigger {
    configuration: UnitiggerConfiguration,
}

impl Unitigger {
    /// Creates a unitigger with the given configuration.
    pub fn new(configuration: UnitiggerConfiguration) -> Self {
        Self { configuration }
    }

    /// The configuration of this unitigger.
    pub fn configuration(&self) -> &UnitiggerConfiguration {
        &self.configuration
    }

    /// Runs all phases on a graph whose fragments and overlaps have been ingested.
    ///
    /// The graph is left classified, with fragment offsets and chunk ids of the final
    /// chunking pass and blessed edges of unique chunks.
    pub fn run(&self, graph: &mut OverlapGraph) -> Result<UnitiggerOutput> {
        let configuration = &self.configuration;
        let mut reports = PhaseReports::default();
        info!(
            "Running the unitigger on {} fragments and {} directed edges",
            graph.fragment_count(),
            graph.edge_count()
        );

        sort_and_reindex(graph, configuration.edge_sort_strategy)?;
        reports.missing_mates = append_missing_mates(graph, configuration.edge_sort_strategy)?;
        reports.duplicate_edges = mark_duplicate_edges(graph);
        reports.threshold_removed =
            apply_degree_threshold(graph, configuration.cutoff_fragment_end_degree)?;
        reports.initial_pack = pack_edges(graph)?;
        debug_assert_symmetric(graph);
        debug_assert_segments_cover_edges(graph);
        log_labels("graph cleanup", graph);

        reports.solo_hanging_thru = separate_fragments_as_solo_hanging_thru(graph)?;
        log_labels("solo, hanging and thru fragments", graph);

        if configuration.dechord_the_graph {
            reports.transitive = Some(transitive_edge_marking(graph, configuration)?);
            log_labels("transitive reduction", graph);
            log_memory_usage("transitive reduction");
        } else {
            info!("Skipping transitive reduction");
        }

        if configuration.aggressive_spur_fragment_marking {
            reports.early_spurs = identify_early_spur_fragments(graph)?;
        }
        reports.contained_fragments = mark_contained_fragments(graph)?;
        log_labels("spur and contained fragments", graph);

        reports.crappy_mask = mask_overlaps_touching_crappy_fragments(graph)?;
        reports.thickest_overlaps = identify_thickest_overlaps(graph)?;
        reports.essential_components = identify_essential_components(graph)?;
        reports.intrachunk_overlaps = classify_intrachunk_edges(graph)?;
        classify_fragment_labels(graph)?;
        log_labels("chunk classification", graph);
        log_memory_usage("fragment graph");

        let mut chunks = build_chunks(graph, configuration)?;
        reports.trimmed_ends = check_edge_trimming(graph);
        let arrival_rate = compute_global_fragment_arrival_rate(graph, &chunks, configuration)?;
        apply_coverage_statistics(graph, &mut chunks, arrival_rate.rate)?;
        reports.blessed_edges =
            bless_unique_overlaps(graph, &chunks, configuration.cgb_unique_cutoff)?;
        let occurrences = check_fragment_occurrences(graph, &chunks)?;
        log_memory_usage("chunk graph");

        let labels = count_labels(graph);
        debug!("Labels after chunk construction:\n{labels}");
        info!(
            "Unitigger finished with {} chunks at arrival rate {}",
            chunks.len(),
            arrival_rate.rate
        );
        Ok(UnitiggerOutput {
            chunks,
            arrival_rate,
            occurrences,
            reports,
            labels,
        })
    }
}

fn log_labels(phase: &str, graph: &OverlapGraph) {
    if log_enabled!(log::Level::Debug) {
        debug!("Labels after {phase}:\n{}", count_labels(graph));
    }
}
