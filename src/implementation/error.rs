//! Errors of the unitigger.

use crate::implementation::store::{EdgeIndex, EdgeLabel, FragmentLabel, Iid};
use thiserror::Error;

/// The result type of all fallible unitigger operations.
pub type Result<T> = std::result::Result<T, UnitiggerError>;

/// A structural violation or boundary failure.
///
/// Structural variants carry external fragment ids so that an inconsistency found in a graph
/// with millions of fragments can be located without dumping the whole graph.
#[derive(Error, Debug)]
pub enum UnitiggerError {
    /// An index into the fragment, edge or chunk array is out of bounds.
    #[error("{kind} index {index} is out of range (length {len})")]
    IndexOutOfRange {
        /// The array that was accessed.
        kind: &'static str,
        /// The offending index.
        index: usize,
        /// The length of the array at the time of access.
        len: usize,
    },

    /// The second directed record of an overlap is missing.
    #[error("no mate for edge {edge}: afr={a_iid} asx={a_suffix} bfr={b_iid} bsx={b_suffix} ahg={a_hang} bhg={b_hang}")]
    MateNotFound {
        /// The edge whose mate was searched.
        edge: EdgeIndex,
        /// External id of the proximal fragment.
        a_iid: Iid,
        /// Proximal end flag.
        a_suffix: bool,
        /// External id of the distal fragment.
        b_iid: Iid,
        /// Distal end flag.
        b_suffix: bool,
        /// Proximal overhang.
        a_hang: i32,
        /// Distal overhang.
        b_hang: i32,
    },

    /// An edge carries a label that the current phase does not accept.
    #[error("unexpected edge label {label} on edge {edge} (afr={a_iid} bfr={b_iid}) during {phase}")]
    UnknownEdgeType {
        /// The phase that rejected the label.
        phase: &'static str,
        /// The edge index.
        edge: EdgeIndex,
        /// The observed label.
        label: EdgeLabel,
        /// External id of the proximal fragment.
        a_iid: Iid,
        /// External id of the distal fragment.
        b_iid: Iid,
    },

    /// A fragment carries a label that the current phase does not accept.
    #[error("unexpected fragment label {label} on fragment iid={iid} during {phase}")]
    UnexpectedFragmentLabel {
        /// The phase that rejected the label.
        phase: &'static str,
        /// External id of the fragment.
        iid: Iid,
        /// The observed label.
        label: FragmentLabel,
    },

    /// A structural invariant of the graph or chunk arrays does not hold.
    #[error("inconsistent graph state: {0}")]
    InconsistentGraphState(String),

    /// An overlap or deletion refers to a fragment that was never added.
    #[error("unknown fragment iid {0}")]
    UnknownFragment(Iid),

    /// A fragment id was added twice.
    #[error("duplicate fragment iid {0}")]
    DuplicateFragment(Iid),

    /// An overlap record is geometrically impossible.
    #[error("invalid overlap {a_iid}-{b_iid}: {reason}")]
    InvalidOverlap {
        /// External id of the first fragment.
        a_iid: Iid,
        /// External id of the second fragment.
        b_iid: Iid,
        /// Why the record was rejected.
        reason: String,
    },

    /// A line of text input could not be parsed.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A worker thread panicked.
    #[error("a {0} worker thread panicked")]
    WorkerPanicked(&'static str),

    /// An i/o error at the input or output boundary.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
