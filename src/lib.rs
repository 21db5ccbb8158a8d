//! A library containing the unitigger of an overlap-based genome assembler.
//! Use this to reduce a fragment overlap graph transitively, classify its fragments and overlaps,
//! and lay the fragments out into unitigs (chunks) with an A-statistic for unique sequence.

#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod implementation;

pub use implementation::{
    chunks, classify, config, error, initialise_logging, io, log_memory_usage, mate, segments,
    store, transitive, unitigger,
};
pub use implementation::{
    chunks::{Chunk, ChunkMember, ChunkSet},
    config::{EdgeSortStrategy, SlopTolerance, UnitiggerConfiguration},
    error::{Result, UnitiggerError},
    store::{
        ingest::{FragmentRecord, OverlapRecord},
        Edge, EdgeLabel, FragmentEnd, FragmentKind, FragmentLabel, OverlapGraph,
    },
    unitigger::{Unitigger, UnitiggerOutput},
};
