//! Ingestion of fragment and overlap records.

use crate::implementation::config::UnitiggerConfiguration;
use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::mate::{granger, reflect};
use crate::implementation::store::{
    Edge, EdgeLabel, Fragment, FragmentEnd, FragmentIndex, FragmentKind, Iid, OverlapGraph,
    OverlapTopology,
};

/// A fragment as delivered by the fragment store.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FragmentRecord {
    /// External id.
    pub iid: Iid,
    /// Length in base pairs.
    pub length: i64,
    /// Read kind.
    pub kind: FragmentKind,
}

impl FragmentRecord {
    /// Creates a fragment record.
    pub fn new(iid: Iid, length: i64, kind: FragmentKind) -> Self {
        Self { iid, length, kind }
    }
}

/// An undirected overlap as delivered by the overlap store.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OverlapRecord {
    /// External id of the first fragment.
    pub a_iid: Iid,
    /// The overlapping end of the first fragment.
    pub a_suffix: bool,
    /// External id of the second fragment.
    pub b_iid: Iid,
    /// The overlapping end of the second fragment.
    pub b_suffix: bool,
    /// Overhang of the first fragment.
    pub a_hang: i32,
    /// Overhang of the second fragment.
    pub b_hang: i32,
    /// Quality value, lower is better.
    pub quality: u32,
}

impl OverlapRecord {
    /// Creates an overlap record with quality zero.
    pub fn new(
        a_iid: Iid,
        a_suffix: bool,
        b_iid: Iid,
        b_suffix: bool,
        a_hang: i32,
        b_hang: i32,
    ) -> Self {
        Self {
            a_iid,
            a_suffix,
            b_iid,
            b_suffix,
            a_hang,
            b_hang,
            quality: 0,
        }
    }

    /// Sets the quality value.
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }
}

/// Why an overlap record was not inserted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SkipReason {
    /// One of the fragments was never added.
    UnknownFragment,
    /// One of the fragments is deleted.
    DeletedFragment,
    /// The quality value exceeds the configured threshold.
    ErrorAboveThreshold,
}

/// What [OverlapGraph::add_overlap] did with a record.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OverlapAdmission {
    /// Inserted as two dovetail edges.
    Dovetail,
    /// Inserted as two containment edges.
    Containment,
    /// Ignored.
    Skipped(SkipReason),
}

impl OverlapGraph {
    /// Adds a fragment. Its external id must be new.
    pub fn add_fragment(&mut self, record: FragmentRecord) -> Result<FragmentIndex> {
        self.insert_fragment(Fragment::new(record.iid, record.kind, record.length))
    }

    /// Inserts both directed records of an overlap.
    ///
    /// The edges are appended unsorted, so segments are stale until the next sort.
    pub fn add_overlap(
        &mut self,
        record: &OverlapRecord,
        configuration: &UnitiggerConfiguration,
    ) -> Result<OverlapAdmission> {
        let (Some(avx), Some(bvx)) = (
            self.fragment_index(record.a_iid),
            self.fragment_index(record.b_iid),
        ) else {
            return Ok(OverlapAdmission::Skipped(SkipReason::UnknownFragment));
        };
        if self.fragment(avx)?.deleted || self.fragment(bvx)?.deleted {
            return Ok(OverlapAdmission::Skipped(SkipReason::DeletedFragment));
        }
        if configuration
            .overlap_error_threshold
            .is_some_and(|threshold| record.quality > threshold)
        {
            return Ok(OverlapAdmission::Skipped(SkipReason::ErrorAboveThreshold));
        }

        let invalid = |reason: &str| UnitiggerError::InvalidOverlap {
            a_iid: record.a_iid,
            b_iid: record.b_iid,
            reason: reason.to_string(),
        };
        if avx == bvx {
            return Err(invalid("self overlap"));
        }
        let (ahg, bhg) = (i64::from(record.a_hang), i64::from(record.b_hang));
        if ahg < 0 && bhg < 0 {
            return Err(invalid("both overhangs are negative"));
        }
        let aln = self.fragment(avx)?.length;
        let bln = self.fragment(bvx)?.length;
        if !(aln > ahg && bln > bhg && aln > -bhg && bln > -ahg) {
            return Err(invalid("overhangs exceed the fragment lengths"));
        }

        let mut edge = Edge::new(
            FragmentEnd::new(avx, record.a_suffix),
            record.a_hang,
            FragmentEnd::new(bvx, record.b_suffix),
            record.b_hang,
            EdgeLabel::Dovetail,
        );
        edge.quality = record.quality;

        match edge.topology() {
            OverlapTopology::Dovetail => {
                self.fragment_mut(avx)?
                    .end_mut(record.a_suffix)
                    .raw_dovetail_count += 1;
                self.fragment_mut(bvx)?
                    .end_mut(record.b_suffix)
                    .raw_dovetail_count += 1;
                self.push_edge(edge);
                self.push_edge(reflect(&edge));
                Ok(OverlapAdmission::Dovetail)
            }
            topology => {
                // Containment edges are stored at the contained fragment.
                let reflect_first = match topology {
                    OverlapTopology::ToContained => true,
                    OverlapTopology::Degenerate => avx < bvx,
                    OverlapTopology::FromContained | OverlapTopology::Dovetail => false,
                };
                if reflect_first {
                    edge = reflect(&edge);
                    edge.reflected = false;
                }
                edge.label = EdgeLabel::Contained;

                self.fragment_mut(edge.a.fragment)?.raw_from_contained_count += 1;
                self.fragment_mut(edge.b.fragment)?.raw_to_contained_count += 1;
                self.push_edge(edge);
                self.push_edge(granger(&edge));
                Ok(OverlapAdmission::Containment)
            }
        }
    }
}
