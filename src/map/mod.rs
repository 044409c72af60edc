//! Redistribution maps: the negotiated exchange plan between a source and
//! a destination decomposition of a global index space.
//!
//! A [`Map`] is built collectively over a transport group (see
//! [`build`]), is immutable afterwards, and can be shared by any number of
//! exchangers. [`Map::lift`] derives a higher-rank map from a 2D base map
//! without re-running the negotiation.

use std::sync::Arc;

use crate::comm::{CommTag, Communicator, DEFAULT_MAP_TAG};
use crate::debug_invariants;
use crate::debug_invariants::DebugInvariants;
use crate::error::DistMapError;
use crate::idxlist::IndexList;

pub mod build;
pub mod lift;

/// The data exchange with one specific peer in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLeg {
    rank: usize,
    count: usize,
}

impl PeerLeg {
    /// Transport rank of the other end.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Element count for this peer.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

/// The ordered set of legs for one direction on one rank, together with
/// the gather/scatter permutation between the user buffer and the wire
/// buffer.
///
/// Legs are sorted by ascending peer rank. `buffer_offsets` has
/// `peer_count() + 1` entries; entry `i` is the start of leg `i` within
/// `buffer_indices` and the final entry equals `buffer_size()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSchedule {
    legs: Vec<PeerLeg>,
    buffer_indices: Vec<usize>,
    buffer_offsets: Vec<usize>,
}

impl ExchangeSchedule {
    pub(crate) fn new(
        legs: Vec<PeerLeg>,
        buffer_indices: Vec<usize>,
        buffer_offsets: Vec<usize>,
    ) -> Self {
        Self {
            legs,
            buffer_indices,
            buffer_offsets,
        }
    }

    /// Schedule with no legs at all (a rank not participating in this
    /// direction).
    pub(crate) fn empty() -> Self {
        Self {
            legs: Vec::new(),
            buffer_indices: Vec::new(),
            buffer_offsets: vec![0],
        }
    }

    /// Number of peer ranks.
    #[inline]
    pub fn peer_count(&self) -> usize {
        self.legs.len()
    }

    /// Total element count across all legs.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_indices.len()
    }

    /// Legs in ascending peer-rank order.
    #[inline]
    pub fn legs(&self) -> &[PeerLeg] {
        &self.legs
    }

    /// The local-slot permutation mapping the user buffer to the wire
    /// buffer (send side: gather sources; recv side: scatter targets).
    #[inline]
    pub fn buffer_indices(&self) -> &[usize] {
        &self.buffer_indices
    }

    /// Start position of each leg within `buffer_indices`, terminated by
    /// `buffer_size()`.
    #[inline]
    pub fn buffer_offsets(&self) -> &[usize] {
        &self.buffer_offsets
    }

    /// The slice of `buffer_indices` belonging to leg `i`.
    #[inline]
    pub fn leg_indices(&self, i: usize) -> &[usize] {
        &self.buffer_indices[self.buffer_offsets[i]..self.buffer_offsets[i + 1]]
    }

    /// Check the structural invariants against the slot space of the
    /// corresponding index list.
    pub(crate) fn validate(&self, slot_limit: usize) -> Result<(), DistMapError> {
        if self.buffer_offsets.len() != self.legs.len() + 1 {
            return Err(DistMapError::BrokenSchedule(format!(
                "{} legs but {} offsets",
                self.legs.len(),
                self.buffer_offsets.len()
            )));
        }
        if self.buffer_offsets[0] != 0 {
            return Err(DistMapError::BrokenSchedule(
                "first offset is not zero".into(),
            ));
        }
        let mut cum = 0usize;
        for (i, leg) in self.legs.iter().enumerate() {
            if leg.count == 0 {
                return Err(DistMapError::BrokenSchedule(format!(
                    "empty leg for rank {}",
                    leg.rank
                )));
            }
            if i > 0 && self.legs[i - 1].rank >= leg.rank {
                return Err(DistMapError::BrokenSchedule(format!(
                    "legs not strictly ascending at rank {}",
                    leg.rank
                )));
            }
            if self.buffer_offsets[i] != cum {
                return Err(DistMapError::BrokenSchedule(format!(
                    "offset of leg {i} is {} instead of {cum}",
                    self.buffer_offsets[i]
                )));
            }
            cum += leg.count;
        }
        if cum != self.buffer_indices.len()
            || *self.buffer_offsets.last().expect("offsets non-empty") != cum
        {
            return Err(DistMapError::BrokenSchedule(format!(
                "leg sizes sum to {cum}, buffer holds {}",
                self.buffer_indices.len()
            )));
        }
        if let Some(&bad) = self.buffer_indices.iter().find(|&&s| s >= slot_limit) {
            return Err(DistMapError::BrokenSchedule(format!(
                "slot {bad} out of range (limit {slot_limit})"
            )));
        }
        Ok(())
    }
}

/// Options for map construction.
#[derive(Debug, Clone, Copy)]
pub struct MapConfig {
    /// Promote duplicate source ownership from a logged warning to a
    /// collective fatal error. Every rank must pass the same value.
    pub strict_ownership: bool,
    /// First tag of the block used by the negotiation (see
    /// [`crate::comm::NegotiationTags`]). Concurrent negotiations on one
    /// group need disjoint blocks.
    pub base_tag: CommTag,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            strict_ownership: false,
            base_tag: DEFAULT_MAP_TAG,
        }
    }
}

/// The negotiated redistribution plan between a source and a destination
/// decomposition, bound to a transport group.
///
/// Immutable after construction. Owns its two schedules; the group handle
/// is shared and released when the last holder drops.
#[derive(Debug)]
pub struct Map<C: Communicator> {
    send: ExchangeSchedule,
    recv: ExchangeSchedule,
    comm: Arc<C>,
    src_len: usize,
    dst_len: usize,
    stride_hint: i32,
}

impl<C: Communicator> Map<C> {
    /// Build the redistribution plan between `src` (indices this rank
    /// owns) and `dst` (indices this rank wants). **Collective** over
    /// every rank of the group behind `comm`; ranks participating in only
    /// one role pass an empty list for the other.
    ///
    /// `stride_hint < 0` (canonically `-1`) disables stride optimization;
    /// non-negative values are advisory and never change the resulting
    /// schedules.
    pub fn new(
        src: &IndexList,
        dst: &IndexList,
        stride_hint: i32,
        comm: Arc<C>,
    ) -> Result<Self, DistMapError> {
        Self::new_with(src, dst, stride_hint, comm, &MapConfig::default())
    }

    /// [`Map::new`] with explicit construction options.
    pub fn new_with(
        src: &IndexList,
        dst: &IndexList,
        stride_hint: i32,
        comm: Arc<C>,
        config: &MapConfig,
    ) -> Result<Self, DistMapError> {
        let (send, recv) = build::negotiate(src, dst, comm.as_ref(), config)?;
        let map = Self {
            send,
            recv,
            comm,
            src_len: src.len(),
            dst_len: dst.len(),
            stride_hint,
        };
        debug_invariants!(map.validate_invariants(), "Map::new");
        Ok(map)
    }

    /// Outgoing traffic for this rank.
    #[inline]
    pub fn send_schedule(&self) -> &ExchangeSchedule {
        &self.send
    }

    /// Incoming traffic for this rank.
    #[inline]
    pub fn recv_schedule(&self) -> &ExchangeSchedule {
        &self.recv
    }

    /// The transport group this map is bound to.
    #[inline]
    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    /// Local slot count on the source side (minimum source buffer length
    /// for an exchange).
    #[inline]
    pub fn src_len(&self) -> usize {
        self.src_len
    }

    /// Local slot count on the destination side (minimum destination
    /// buffer length for an exchange).
    #[inline]
    pub fn dst_len(&self) -> usize {
        self.dst_len
    }

    /// The advisory stride hint the map was built with.
    #[inline]
    pub fn stride_hint(&self) -> i32 {
        self.stride_hint
    }
}

impl<C: Communicator> DebugInvariants for Map<C> {
    fn debug_assert_invariants(&self) {
        debug_invariants!(self.validate_invariants(), "Map");
    }

    fn validate_invariants(&self) -> Result<(), DistMapError> {
        self.send.validate(self.src_len)?;
        self.recv.validate(self.dst_len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(legs: &[(usize, usize)], indices: &[usize]) -> ExchangeSchedule {
        let mut offsets = vec![0usize];
        let mut cum = 0;
        let legs: Vec<PeerLeg> = legs
            .iter()
            .map(|&(rank, count)| {
                cum += count;
                offsets.push(cum);
                PeerLeg { rank, count }
            })
            .collect();
        ExchangeSchedule::new(legs, indices.to_vec(), offsets)
    }

    #[test]
    fn validate_accepts_well_formed() {
        let s = schedule(&[(0, 2), (2, 1)], &[4, 0, 3]);
        assert!(s.validate(5).is_ok());
        assert_eq!(s.leg_indices(0), &[4, 0]);
        assert_eq!(s.leg_indices(1), &[3]);
    }

    #[test]
    fn validate_rejects_out_of_range_slot() {
        let s = schedule(&[(1, 1)], &[9]);
        assert!(matches!(
            s.validate(5),
            Err(DistMapError::BrokenSchedule(_))
        ));
    }

    #[test]
    fn validate_rejects_unsorted_legs() {
        let s = ExchangeSchedule::new(
            vec![PeerLeg { rank: 3, count: 1 }, PeerLeg { rank: 1, count: 1 }],
            vec![0, 1],
            vec![0, 1, 2],
        );
        assert!(matches!(
            s.validate(5),
            Err(DistMapError::BrokenSchedule(_))
        ));
    }

    #[test]
    fn empty_schedule_is_valid() {
        assert!(ExchangeSchedule::empty().validate(0).is_ok());
    }
}
