//! DistMapError: unified error type for distmap public APIs.
//!
//! All fallible entry points return this type; the library performs no local
//! recovery and never retries transport operations.

use thiserror::Error;

use crate::exchange::ExchangePhase;

/// Unified error type for distmap operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DistMapError {
    /// The transport group has no members.
    #[error("transport group is empty")]
    GroupTooSmall,
    /// Ranks disagree on how the collective is being called.
    #[error("ranks disagree on collective configuration: {0}")]
    GroupInconsistent(&'static str),
    /// A destination index has no source owner anywhere in the group.
    ///
    /// Returned on every rank that participated in the collective; `index`
    /// is one offending index (the same one on every rank), `total` the
    /// group-wide number of unmatched destination records.
    #[error("destination index {index} has no source owner ({total} unmatched across the group)")]
    UnmatchedIndex { index: i64, total: u64 },
    /// The same global index was claimed as source by more than one rank
    /// while strict ownership was requested.
    #[error("global index {index} claimed as source more than once ({total} duplicate claims across the group)")]
    DuplicateOwner { index: i64, total: u64 },
    /// A point-to-point operation with `peer` failed.
    #[error("communication with rank {peer} failed: {reason}")]
    Comm { peer: usize, reason: String },
    /// A message arrived with a different size than the negotiated one.
    #[error("message from rank {peer} has {got} bytes, expected {expected}")]
    MessageSizeMismatch {
        peer: usize,
        expected: usize,
        got: usize,
    },
    /// A user buffer is too small for the map bound to the exchanger.
    #[error("user buffer holds {got} elements, map requires {needed}")]
    ShapeMismatch { needed: usize, got: usize },
    /// `Map::lift` requires at least one level.
    #[error("level count must be at least 1")]
    InvalidLevelCount,
    /// `Exchanger::go` was entered while a previous exchange had not
    /// returned to the idle state.
    #[error("exchanger is not idle (stuck in phase {phase:?})")]
    ExchangerNotIdle { phase: ExchangePhase },
    /// An exchange schedule failed internal validation.
    #[error("schedule invariant violated: {0}")]
    BrokenSchedule(String),
    /// A staging-buffer access fell outside the allocated region.
    #[error("staging access out of bounds: offset {offset}, len {len} (capacity {capacity})")]
    StagingOutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// Mapping a GPU staging buffer for host access failed.
    #[cfg(feature = "wgpu")]
    #[error("failed to map GPU staging buffer for host access")]
    GpuMappingFailed,
}
