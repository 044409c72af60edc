//! Level extension: derive a higher-rank map from a 2D base map.
//!
//! The lifted index space is `base × {0..nlevels-1}` with levels laid out
//! contiguously in the user buffers: the value for slot `s` at level `L`
//! lives at position `s + L * stride`, where `stride` is the local slot
//! count of the role's index list. Lifting replicates each leg across the
//! levels; no transport traffic is involved.

use std::sync::Arc;

use crate::comm::Communicator;
use crate::debug_invariants;
use crate::debug_invariants::DebugInvariants;
use crate::error::DistMapError;
use crate::map::{ExchangeSchedule, Map, PeerLeg};

impl<C: Communicator> Map<C> {
    /// Derive a map over `nlevels` stacked copies of the base index
    /// space. Purely local; the result's lifetime is independent of the
    /// base map. `nlevels` must be at least 1.
    pub fn lift(&self, nlevels: usize) -> Result<Map<C>, DistMapError> {
        if nlevels == 0 {
            return Err(DistMapError::InvalidLevelCount);
        }
        let lifted = Map {
            send: lift_schedule(self.send_schedule(), nlevels, self.src_len()),
            recv: lift_schedule(self.recv_schedule(), nlevels, self.dst_len()),
            comm: Arc::clone(self.comm()),
            src_len: self.src_len() * nlevels,
            dst_len: self.dst_len() * nlevels,
            stride_hint: self.stride_hint(),
        };
        debug_invariants!(lifted.validate_invariants(), "Map::lift");
        Ok(lifted)
    }
}

fn lift_schedule(base: &ExchangeSchedule, nlevels: usize, stride: usize) -> ExchangeSchedule {
    let mut legs = Vec::with_capacity(base.peer_count());
    let mut buffer_indices = Vec::with_capacity(base.buffer_size() * nlevels);
    let mut buffer_offsets = Vec::with_capacity(base.peer_count() + 1);
    buffer_offsets.push(0);
    for (i, leg) in base.legs().iter().enumerate() {
        // level-major within the leg: the wire carries level 0's block,
        // then level 1's, matching the contiguous user-buffer layout
        for level in 0..nlevels {
            for &slot in base.leg_indices(i) {
                buffer_indices.push(slot + level * stride);
            }
        }
        legs.push(PeerLeg {
            rank: leg.rank(),
            count: leg.count() * nlevels,
        });
        buffer_offsets.push(buffer_indices.len());
    }
    ExchangeSchedule::new(legs, buffer_indices, buffer_offsets)
}
