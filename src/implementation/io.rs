//! Text input and output of fragments, overlaps and chunks.
//!
//! Input lines are one of
//!
//! ```text
//! FRG <iid> <length> <kind>
//! DEL <iid>
//! OVL <a_iid> <a_suffix> <b_iid> <b_suffix> <a_hang> <b_hang> <quality>
//! ```
//!
//! with end flags `0` (prefix) and `1` (suffix). Blank lines and lines starting with `#` are
//! ignored. Files ending in `.gz` are decompressed on the fly.

use crate::implementation::chunks::{BranchPoint, BranchPointKind, ChunkSet};
use crate::implementation::config::UnitiggerConfiguration;
use crate::implementation::error::{Result, UnitiggerError};
use crate::implementation::store::ingest::{
    FragmentRecord, OverlapAdmission, OverlapRecord, SkipReason,
};
use crate::implementation::store::{FragmentEnd, Iid, OverlapGraph};
use flate2::read::MultiGzDecoder;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;

/// The prefix of a fragment line.
pub const FRAGMENT_PREFIX: &str = "FRG";
/// The prefix of a deletion line.
pub const DELETION_PREFIX: &str = "DEL";
/// The prefix of an overlap line.
pub const OVERLAP_PREFIX: &str = "OVL";
/// The prefix of a chunk line.
pub const CHUNK_PREFIX: &str = "UTG";

/// One line of input.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputRecord {
    /// A fragment.
    Fragment(FragmentRecord),
    /// The deletion of a previously given fragment.
    Deletion(Iid),
    /// An overlap between two fragments.
    Overlap(OverlapRecord),
}

fn parse_field<'a, T: FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> std::result::Result<T, String> {
    let field = fields
        .next()
        .ok_or_else(|| format!("Missing field: {name}"))?;
    field
        .parse()
        .map_err(|_| format!("Invalid {name}: {field}"))
}

fn parse_end_flag<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> std::result::Result<bool, String> {
    match fields.next() {
        Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(other) => Err(format!("Invalid {name}: {other}")),
        None => Err(format!("Missing field: {name}")),
    }
}

impl FromStr for InputRecord {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let record = match fields.next() {
            Some(FRAGMENT_PREFIX) => {
                let iid = parse_field(&mut fields, "fragment iid")?;
                let length = parse_field(&mut fields, "fragment length")?;
                let kind = fields
                    .next()
                    .ok_or_else(|| "Missing field: fragment kind".to_string())?
                    .parse()?;
                Self::Fragment(FragmentRecord::new(iid, length, kind))
            }
            Some(DELETION_PREFIX) => Self::Deletion(parse_field(&mut fields, "fragment iid")?),
            Some(OVERLAP_PREFIX) => {
                let a_iid = parse_field(&mut fields, "a iid")?;
                let a_suffix = parse_end_flag(&mut fields, "a end")?;
                let b_iid = parse_field(&mut fields, "b iid")?;
                let b_suffix = parse_end_flag(&mut fields, "b end")?;
                let a_hang = parse_field(&mut fields, "a hang")?;
                let b_hang = parse_field(&mut fields, "b hang")?;
                let quality = parse_field(&mut fields, "quality")?;
                Self::Overlap(
                    OverlapRecord::new(a_iid, a_suffix, b_iid, b_suffix, a_hang, b_hang)
                        .with_quality(quality),
                )
            }
            Some(other) => return Err(format!("Unknown record type: {other}")),
            None => return Err("Empty record".to_string()),
        };

        if let Some(extra) = fields.next() {
            return Err(format!("Unexpected trailing field: {extra}"));
        }
        Ok(record)
    }
}

/// Opens a text input file, decompressing it if its name ends in `.gz`.
pub fn open_input(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if path.extension().is_some_and(|extension| extension == "gz") {
        debug!("Reading {path:?} as gzip");
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// What [read_graph] did with the input.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct InputSummary {
    /// Fragment records.
    pub fragments: usize,
    /// Deletion records.
    pub deletions: usize,
    /// Overlaps inserted as dovetails.
    pub dovetail_overlaps: usize,
    /// Overlaps inserted as containments.
    pub containment_overlaps: usize,
    /// Overlaps referring to unknown fragments.
    pub unknown_fragment_overlaps: usize,
    /// Overlaps touching deleted fragments.
    pub deleted_fragment_overlaps: usize,
    /// Overlaps above the error threshold.
    pub low_quality_overlaps: usize,
}

impl Display for InputSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} fragments, {} deletions, {} dovetail and {} containment overlaps, skipped {} overlaps with unknown, {} with deleted fragments and {} above the error threshold",
            self.fragments,
            self.deletions,
            self.dovetail_overlaps,
            self.containment_overlaps,
            self.unknown_fragment_overlaps,
            self.deleted_fragment_overlaps,
            self.low_quality_overlaps
        )
    }
}

/// Reads fragments, deletions and overlaps into a new graph.
///
/// Overlaps are inserted after all fragments and deletions were read, so the records may come
/// in any order.
pub fn read_graph(
    reader: impl BufRead,
    configuration: &UnitiggerConfiguration,
) -> Result<(OverlapGraph, InputSummary)> {
    let mut graph =
        OverlapGraph::with_capacity(configuration.expected_fragments, configuration.expected_edges);
    let mut summary = InputSummary::default();
    let mut deletions = Vec::new();
    let mut overlaps = Vec::new();

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record = line.parse::<InputRecord>().map_err(|message| UnitiggerError::Parse {
            line: line_index + 1,
            message,
        })?;
        match record {
            InputRecord::Fragment(fragment) => {
                graph.add_fragment(fragment)?;
                summary.fragments += 1;
            }
            InputRecord::Deletion(iid) => deletions.push(iid),
            InputRecord::Overlap(overlap) => overlaps.push(overlap),
        }
    }

    for iid in deletions {
        graph.delete_fragment(iid)?;
        summary.deletions += 1;
    }
    for overlap in &overlaps {
        match graph.add_overlap(overlap, configuration)? {
            OverlapAdmission::Dovetail => summary.dovetail_overlaps += 1,
            OverlapAdmission::Containment => summary.containment_overlaps += 1,
            OverlapAdmission::Skipped(SkipReason::UnknownFragment) => {
                summary.unknown_fragment_overlaps += 1
            }
            OverlapAdmission::Skipped(SkipReason::DeletedFragment) => {
                summary.deleted_fragment_overlaps += 1
            }
            OverlapAdmission::Skipped(SkipReason::ErrorAboveThreshold) => {
                summary.low_quality_overlaps += 1
            }
        }
    }

    info!("Read {summary}");
    Ok((graph, summary))
}

fn write_tip(
    writer: &mut impl Write,
    graph: &OverlapGraph,
    tip: FragmentEnd,
    branch_point: BranchPoint,
) -> Result<()> {
    let kind = match branch_point.kind {
        BranchPointKind::None => 'N',
        BranchPointKind::Fork => 'F',
    };
    write!(
        writer,
        " {} {} {} {kind}",
        graph.iid(tip.fragment)?,
        u8::from(tip.suffix),
        branch_point.offset
    )?;
    Ok(())
}

/// Writes one `UTG` line per chunk followed by one `FRG` line per fragment of the chunk.
///
/// ```text
/// UTG <index> <rho> <bp_length> <fragments> <coverage> <a_iid> <a_suffix> <a_offset> <a_kind> <b_iid> <b_suffix> <b_offset> <b_kind>
/// FRG <iid> <F|R> <offset5p> <offset3p> <container iid or 0>
/// ```
pub fn write_chunks(
    writer: &mut impl Write,
    graph: &OverlapGraph,
    chunks: &ChunkSet,
) -> Result<()> {
    for (chunk, members) in chunks.iter() {
        write!(
            writer,
            "{CHUNK_PREFIX} {} {} {} {} {:.3}",
            chunk.index,
            chunk.rho,
            chunk.bp_length,
            members.len(),
            chunk.coverage_statistic
        )?;
        write_tip(writer, graph, chunk.a_tip, chunk.a_branch_point)?;
        write_tip(writer, graph, chunk.b_tip, chunk.b_branch_point)?;
        writeln!(writer)?;

        for member in members {
            writeln!(
                writer,
                "{FRAGMENT_PREFIX} {} {} {} {} {}",
                member.iid,
                if member.is_forward() { 'F' } else { 'R' },
                member.offset5p,
                member.offset3p,
                member.container.unwrap_or(0)
            )?;
        }
    }
    Ok(())
}

/// The orientation letter of an overlap between the given ends.
pub fn orientation_code(a_suffix: bool, b_suffix: bool) -> char {
    match (a_suffix, b_suffix) {
        (true, false) => 'N',
        (true, true) => 'I',
        (false, true) => 'A',
        (false, false) => 'O',
    }
}

/// Writes every blessed overlap once as an `OVL` line and returns the number of lines.
///
/// ```text
/// OVL <a_iid> <b_iid> <orientation> <D|C> <a_hang> <b_hang> <quality>
/// ```
pub fn write_blessed_overlaps(writer: &mut impl Write, graph: &OverlapGraph) -> Result<usize> {
    let mut written = 0;
    for edge in graph.edges() {
        if !edge.blessed {
            continue;
        }
        let (primary, kind) = if edge.is_dovetail() {
            (!edge.reflected, 'D')
        } else {
            (!edge.grangered, 'C')
        };
        if !primary {
            continue;
        }

        writeln!(
            writer,
            "{OVERLAP_PREFIX} {} {} {} {kind} {} {} {}",
            graph.iid(edge.a.fragment)?,
            graph.iid(edge.b.fragment)?,
            orientation_code(edge.a.suffix, edge.b.suffix),
            edge.a_hang,
            edge.b_hang,
            edge.quality
        )?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::{orientation_code, read_graph, write_chunks, InputRecord};
    use crate::implementation::chunks::{build_chunks, ChunkSet};
    use crate::implementation::config::UnitiggerConfiguration;
    use crate::implementation::error::UnitiggerError;
    use crate::implementation::store::ingest::{FragmentRecord, OverlapRecord};
    use crate::implementation::store::{FragmentKind, FragmentLabel};

    #[test]
    fn test_parse_records() {
        assert_eq!(
            "FRG 7 1200 R".parse::<InputRecord>(),
            Ok(InputRecord::Fragment(FragmentRecord::new(
                7,
                1200,
                FragmentKind::Read
            )))
        );
        assert_eq!("DEL 7".parse::<InputRecord>(), Ok(InputRecord::Deletion(7)));
        assert_eq!(
            "OVL 1 1 2 0 300 -20 4".parse::<InputRecord>(),
            Ok(InputRecord::Overlap(
                OverlapRecord::new(1, true, 2, false, 300, -20).with_quality(4)
            ))
        );

        assert!("FRG 7 1200".parse::<InputRecord>().is_err());
        assert!("OVL 1 2 2 0 300 300 0".parse::<InputRecord>().is_err());
        assert!("DEL 7 8".parse::<InputRecord>().is_err());
        assert!("ABC 7".parse::<InputRecord>().is_err());
    }

    #[test]
    fn test_read_graph_applies_deletions_before_overlaps() {
        let input = "# a comment\n\
                     OVL 1 1 2 0 300 300 0\n\
                     OVL 2 1 3 0 300 300 0\n\
                     FRG 1 1000 R\n\
                     FRG 2 1000 R\n\
                     \n\
                     FRG 3 1000 B\n\
                     DEL 3\n\
                     OVL 1 1 9 0 300 300 0\n";
        let (graph, summary) = read_graph(input.as_bytes(), &UnitiggerConfiguration::default()).unwrap();

        assert_eq!(summary.fragments, 3);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.dovetail_overlaps, 1);
        assert_eq!(summary.deleted_fragment_overlaps, 1);
        assert_eq!(summary.unknown_fragment_overlaps, 1);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.fragments()[2].label, FragmentLabel::Deleted);
        assert_eq!(graph.fragments()[2].kind, FragmentKind::Guide('B'));
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let input = "FRG 1 1000 R\nFRG 2 x R\n";
        assert!(matches!(
            read_graph(input.as_bytes(), &UnitiggerConfiguration::default()),
            Err(UnitiggerError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_orientation_codes() {
        assert_eq!(orientation_code(true, false), 'N');
        assert_eq!(orientation_code(true, true), 'I');
        assert_eq!(orientation_code(false, true), 'A');
        assert_eq!(orientation_code(false, false), 'O');
    }

    #[test]
    fn test_write_singleton_chunk() {
        let configuration = UnitiggerConfiguration::default();
        let (mut graph, _) = read_graph("FRG 5 800 R\n".as_bytes(), &configuration).unwrap();
        graph.set_fragment_label(0, FragmentLabel::Solo).unwrap();
        let chunks = build_chunks(&mut graph, &configuration).unwrap();

        let mut output = Vec::new();
        write_chunks(&mut output, &graph, &chunks).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "UTG 0 0 800 1 0.000 5 0 0 N 5 1 800 N\nFRG 5 F 0 800 0\n"
        );

        let mut output = Vec::new();
        write_chunks(&mut output, &graph, &ChunkSet::default()).unwrap();
        assert!(output.is_empty());
    }
}
