//! Configuration of a unitigger run.

use std::str::FromStr;

/// The slop allowed when comparing overhang sums of a path against an overlap.
///
/// The tolerance for an overlap is `alpha + epsilon * (average overlap length)`, computed in
/// integer arithmetic with epsilon scaled by 256 so results are identical on every platform.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SlopTolerance {
    /// Constant slop in base pairs.
    pub alpha: i64,
    /// Slop per base pair of overlap, times 256.
    pub epsilon_256: i64,
}

impl Default for SlopTolerance {
    fn default() -> Self {
        // 20bp + 0.07 per bp, about 40bp on a 512bp overlap.
        Self {
            alpha: 20,
            epsilon_256: 17,
        }
    }
}

impl SlopTolerance {
    /// The tolerance for an overlap with the given fragment lengths and overhangs.
    pub fn for_overlap(&self, a_length: i64, a_hang: i64, b_length: i64, b_hang: i64) -> i64 {
        let overlap_sum = (a_length - a_hang) + (b_length - b_hang);
        self.alpha + ((self.epsilon_256 * overlap_sum) >> 9)
    }

    /// The tolerance for placing a fragment of the given length.
    pub fn for_length(&self, length: i64) -> i64 {
        self.alpha + ((self.epsilon_256 * length) >> 8)
    }
}

/// How the edge array is brought into segment order.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum EdgeSortStrategy {
    /// Counting sort by fragment-end applied with an in-place cycle-following permutation.
    InPlaceCyclePermutation,
    /// Counting sort by fragment-end applied into a freshly allocated buffer.
    StableBuffer,
}

impl FromStr for EdgeSortStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "InPlaceCyclePermutation" => Self::InPlaceCyclePermutation,
            "StableBuffer" => Self::StableBuffer,
            other => {
                return Err(format!("Unknown edge sort strategy: {other}"));
            }
        })
    }
}

/// The options for a unitigger run.
#[derive(Debug, Clone)]
pub struct UnitiggerConfiguration {
    /// The number of threads used for transitive edge reduction.
    pub threads: usize,
    /// The maximum depth of a path proving that an overlap is transitively inferable.
    pub walk_depth: usize,
    /// The maximum number of edges explored per candidate overlap.
    pub work_limit_per_candidate_edge: usize,
    /// The slop used by transitive reduction and contained fragment placement.
    pub slop: SlopTolerance,
    /// Remove transitively inferable overlaps.
    pub dechord_the_graph: bool,
    /// Ignore hanging fragments that compete with thru fragments while building chunk backbones.
    pub aggressive_spur_fragment_marking: bool,
    /// Keep at most this many dovetail and this many containment overlaps per fragment-end.
    pub cutoff_fragment_end_degree: usize,
    /// Overlaps with a quality value above this are ignored during ingestion.
    pub overlap_error_threshold: Option<u32>,
    /// The genome length, or zero to estimate the fragment arrival rate from the chunks.
    pub nbase_in_genome: u64,
    /// Recalibrate the estimated arrival rate from the local rates of long chunks.
    pub recalibrate_global_arrival_rate: bool,
    /// Chunks with a coverage statistic at least this large are considered unique.
    pub cgb_unique_cutoff: f32,
    /// How the edge array is sorted.
    pub edge_sort_strategy: EdgeSortStrategy,
    /// The number of fragments to reserve memory for.
    pub expected_fragments: usize,
    /// The number of edges to reserve memory for.
    pub expected_edges: usize,
    /// If given, transitive reduction packs the edge array after every block of this many fragments.
    pub transitive_block_size: Option<usize>,
}

impl Default for UnitiggerConfiguration {
    fn default() -> Self {
        Self {
            threads: 1,
            walk_depth: 100,
            work_limit_per_candidate_edge: 1000,
            slop: SlopTolerance::default(),
            dechord_the_graph: true,
            aggressive_spur_fragment_marking: true,
            cutoff_fragment_end_degree: 1_000_000,
            overlap_error_threshold: None,
            nbase_in_genome: 0,
            recalibrate_global_arrival_rate: false,
            cgb_unique_cutoff: 5.0,
            edge_sort_strategy: EdgeSortStrategy::InPlaceCyclePermutation,
            expected_fragments: 40_000,
            expected_edges: 40_000,
            transitive_block_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EdgeSortStrategy, SlopTolerance};

    #[test]
    fn test_slop_on_average_overlap() {
        let slop = SlopTolerance::default();
        // Two 512bp overlaps: 20 + 17 * 1024 / 512 = 54.
        assert_eq!(slop.for_overlap(600, 88, 600, 88), 54);
        assert_eq!(slop.for_overlap(1000, 600, 1000, 600), 46);
        assert_eq!(slop.for_length(512), 54);
    }

    #[test]
    fn test_parse_edge_sort_strategy() {
        assert_eq!(
            "StableBuffer".parse::<EdgeSortStrategy>(),
            Ok(EdgeSortStrategy::StableBuffer)
        );
        assert!("QuickSort".parse::<EdgeSortStrategy>().is_err());
    }
}
