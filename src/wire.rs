//! Fixed, little-endian wire records for map negotiation.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded
//! with `::from_le()`. Records are `#[repr(C)]`, `Pod`-safe, and free of
//! implicit padding; sizes are asserted at compile time.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

/// One global index together with its local slot, routed to a broker.
///
/// Serves both roles of phase 1: on the claims round it reads "the sending
/// rank owns `index` at source slot `slot`", on the requests round "the
/// sending rank wants `index` into destination slot `slot`". The origin
/// rank is implicit from the all-to-all lane.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireIndexRecord {
    index_le: i64,
    slot_le: u64,
}

impl WireIndexRecord {
    pub fn new(index: i64, slot: u64) -> Self {
        Self {
            index_le: index.to_le(),
            slot_le: slot.to_le(),
        }
    }

    pub fn index(&self) -> i64 {
        i64::from_le(self.index_le)
    }

    pub fn slot(&self) -> u64 {
        u64::from_le(self.slot_le)
    }
}

/// One matched transfer, disseminated by a broker to both endpoints:
/// `owner` must send its source slot `src_slot` to `wanter`, which stores
/// it at destination slot `dst_slot`.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireAssignment {
    owner_le: u32,
    wanter_le: u32,
    src_slot_le: u64,
    dst_slot_le: u64,
}

impl WireAssignment {
    pub fn new(owner: u32, wanter: u32, src_slot: u64, dst_slot: u64) -> Self {
        Self {
            owner_le: owner.to_le(),
            wanter_le: wanter.to_le(),
            src_slot_le: src_slot.to_le(),
            dst_slot_le: dst_slot.to_le(),
        }
    }

    pub fn owner(&self) -> u32 {
        u32::from_le(self.owner_le)
    }

    pub fn wanter(&self) -> u32 {
        u32::from_le(self.wanter_le)
    }

    pub fn src_slot(&self) -> u64 {
        u64::from_le(self.src_slot_le)
    }

    pub fn dst_slot(&self) -> u64 {
        u64::from_le(self.dst_slot_le)
    }
}

const STATUS_FLAG_STRICT: u32 = 1;

/// Per-broker outcome of the matching phase, broadcast to every rank
/// before assignments are disseminated. Folding all R records tells each
/// rank whether the whole collective succeeds, fails on unmatched indices,
/// or fails on duplicate ownership under strict mode.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireNegotiationStatus {
    unmatched_le: u64,
    unmatched_example_le: i64,
    duplicates_le: u64,
    duplicate_example_le: i64,
    flags_le: u32,
    _pad: u32,
}

impl WireNegotiationStatus {
    pub fn new(
        unmatched: u64,
        unmatched_example: i64,
        duplicates: u64,
        duplicate_example: i64,
        strict: bool,
    ) -> Self {
        let flags = if strict { STATUS_FLAG_STRICT } else { 0 };
        Self {
            unmatched_le: unmatched.to_le(),
            unmatched_example_le: unmatched_example.to_le(),
            duplicates_le: duplicates.to_le(),
            duplicate_example_le: duplicate_example.to_le(),
            flags_le: flags.to_le(),
            _pad: 0,
        }
    }

    pub fn unmatched(&self) -> u64 {
        u64::from_le(self.unmatched_le)
    }

    pub fn unmatched_example(&self) -> i64 {
        i64::from_le(self.unmatched_example_le)
    }

    pub fn duplicates(&self) -> u64 {
        u64::from_le(self.duplicates_le)
    }

    pub fn duplicate_example(&self) -> i64 {
        i64::from_le(self.duplicate_example_le)
    }

    pub fn strict(&self) -> bool {
        u32::from_le(self.flags_le) & STATUS_FLAG_STRICT != 0
    }
}

const _: () = {
    assert!(size_of::<WireIndexRecord>() == 16);
    assert!(size_of::<WireAssignment>() == 24);
    assert!(size_of::<WireNegotiationStatus>() == 40);
    assert!(align_of::<WireAssignment>() == 8);
};
