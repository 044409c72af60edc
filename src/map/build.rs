//! Collective map construction: a three-phase all-to-all negotiation.
//!
//! Phase 1 routes every local claim ("I own index i at slot s") and
//! request ("I want index i into slot d") to a broker rank chosen by a
//! fixed bucketing of the index universe. Phase 2 matches requests
//! against claims at the brokers. Phase 3 first agrees group-wide on the
//! outcome (so errors surface on every rank), then disseminates each
//! match to both endpoints, where the send and receive schedules are
//! assembled with a shared ordering rule.
//!
//! Determinism: lanes are walked in ascending rank order, per-lane record
//! order is the sender's slot order, and assembly sorts on total keys, so
//! the schedules are a pure function of the global index-list state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::comm::collective::{alltoall, alltoallv};
use crate::comm::{Communicator, NegotiationTags};
use crate::error::DistMapError;
use crate::idxlist::{GlobalIndex, IndexList};
use crate::map::{ExchangeSchedule, MapConfig, PeerLeg};
use crate::wire::{WireAssignment, WireIndexRecord, WireNegotiationStatus};

/// Broker bucketing of the index universe. Identical on every rank;
/// handles negative indices.
#[inline]
pub(crate) fn bucket(index: GlobalIndex, size: usize) -> usize {
    index.rem_euclid(size as i64) as usize
}

/// Run the negotiation. Returns `(send, recv)` schedules for this rank.
pub(crate) fn negotiate<C: Communicator>(
    src: &IndexList,
    dst: &IndexList,
    comm: &C,
    config: &MapConfig,
) -> Result<(ExchangeSchedule, ExchangeSchedule), DistMapError> {
    let size = comm.size();
    if size == 0 {
        return Err(DistMapError::GroupTooSmall);
    }
    let me = comm.rank();
    let tags = NegotiationTags::from_base(config.base_tag);

    // Phase 1: route claims and requests to their brokers.
    let mut claims_out: Vec<Vec<WireIndexRecord>> = vec![Vec::new(); size];
    for (slot, ix) in src.iter().enumerate() {
        claims_out[bucket(ix, size)].push(WireIndexRecord::new(ix, slot as u64));
    }
    let mut requests_out: Vec<Vec<WireIndexRecord>> = vec![Vec::new(); size];
    for (slot, ix) in dst.iter().enumerate() {
        requests_out[bucket(ix, size)].push(WireIndexRecord::new(ix, slot as u64));
    }
    let claims_in = alltoallv(comm, tags.claims, &claims_out)?;
    let requests_in = alltoallv(comm, tags.requests, &requests_out)?;

    // Phase 2: match at the broker. Claims fold in ascending
    // (origin rank, slot) order; the first claim for an index wins.
    let mut owners: HashMap<GlobalIndex, (u32, u64)> = HashMap::new();
    let mut duplicates = 0u64;
    let mut duplicate_example = 0i64;
    for (origin, records) in claims_in.iter().enumerate() {
        for rec in records {
            match owners.entry(rec.index()) {
                Entry::Vacant(v) => {
                    v.insert((origin as u32, rec.slot()));
                }
                Entry::Occupied(held) => {
                    if duplicates == 0 {
                        duplicate_example = rec.index();
                    }
                    duplicates += 1;
                    log::warn!(
                        "index {} claimed by rank {} and rank {}; keeping rank {}",
                        rec.index(),
                        held.get().0,
                        origin,
                        held.get().0,
                    );
                }
            }
        }
    }

    let mut assignments_out: Vec<Vec<WireAssignment>> = vec![Vec::new(); size];
    let mut unmatched = 0u64;
    let mut unmatched_example = 0i64;
    for (origin, records) in requests_in.iter().enumerate() {
        for rec in records {
            match owners.get(&rec.index()) {
                Some(&(owner, src_slot)) => {
                    let a = WireAssignment::new(owner, origin as u32, src_slot, rec.slot());
                    assignments_out[owner as usize].push(a);
                    // one copy suffices when both endpoints are the same rank
                    if owner as usize != origin {
                        assignments_out[origin].push(a);
                    }
                }
                None => {
                    if unmatched == 0 {
                        unmatched_example = rec.index();
                    }
                    unmatched += 1;
                }
            }
        }
    }

    // Status round: every rank folds every broker's outcome, so either
    // all ranks proceed to dissemination or none does.
    let status = WireNegotiationStatus::new(
        unmatched,
        unmatched_example,
        duplicates,
        duplicate_example,
        config.strict_ownership,
    );
    let statuses = alltoall(comm, tags.status, &vec![status; size])?;

    if statuses.iter().any(|s| s.strict() != config.strict_ownership) {
        return Err(DistMapError::GroupInconsistent(
            "strict_ownership differs between ranks",
        ));
    }
    let total_unmatched: u64 = statuses.iter().map(|s| s.unmatched()).sum();
    if total_unmatched > 0 {
        let index = statuses
            .iter()
            .find(|s| s.unmatched() > 0)
            .map(|s| s.unmatched_example())
            .expect("some broker reported unmatched");
        return Err(DistMapError::UnmatchedIndex {
            index,
            total: total_unmatched,
        });
    }
    let total_duplicates: u64 = statuses.iter().map(|s| s.duplicates()).sum();
    if config.strict_ownership && total_duplicates > 0 {
        let index = statuses
            .iter()
            .find(|s| s.duplicates() > 0)
            .map(|s| s.duplicate_example())
            .expect("some broker reported duplicates");
        return Err(DistMapError::DuplicateOwner {
            index,
            total: total_duplicates,
        });
    }

    // Phase 3: disseminate assignments and assemble the schedules.
    let assignments_in = alltoallv(comm, tags.assignments, &assignments_out)?;

    let mut outgoing: Vec<WireAssignment> = Vec::new();
    let mut incoming: Vec<WireAssignment> = Vec::new();
    for records in &assignments_in {
        for a in records {
            if a.owner() as usize == me {
                outgoing.push(*a);
            }
            if a.wanter() as usize == me {
                incoming.push(*a);
            }
        }
    }
    // Shared ordering rule: the k-th element sent to a peer is the k-th
    // element that peer receives. Within a leg, order by destination
    // slot; ties (impossible for well-formed inputs) break on the
    // remaining fields for full determinism.
    outgoing.sort_by_key(|a| (a.wanter(), a.dst_slot(), a.src_slot()));
    incoming.sort_by_key(|a| (a.owner(), a.dst_slot(), a.src_slot()));

    if incoming.len() != dst.len() {
        return Err(DistMapError::BrokenSchedule(format!(
            "{} assignments arrived for {} destination slots",
            incoming.len(),
            dst.len()
        )));
    }

    let send = assemble(&outgoing, |a| a.wanter(), |a| a.src_slot());
    let recv = assemble(&incoming, |a| a.owner(), |a| a.dst_slot());
    log::debug!(
        "rank {me}: negotiated {} send legs / {} elements, {} recv legs / {} elements",
        send.peer_count(),
        send.buffer_size(),
        recv.peer_count(),
        recv.buffer_size(),
    );
    Ok((send, recv))
}

/// Group sorted assignments into legs and lay out the wire permutation.
fn assemble(
    records: &[WireAssignment],
    peer_of: impl Fn(&WireAssignment) -> u32,
    slot_of: impl Fn(&WireAssignment) -> u64,
) -> ExchangeSchedule {
    if records.is_empty() {
        return ExchangeSchedule::empty();
    }
    let mut legs: Vec<PeerLeg> = Vec::new();
    let mut buffer_indices = Vec::with_capacity(records.len());
    let mut buffer_offsets = Vec::new();
    for a in records {
        let peer = peer_of(a) as usize;
        if legs.last().map(|leg| leg.rank) != Some(peer) {
            buffer_offsets.push(buffer_indices.len());
            legs.push(PeerLeg {
                rank: peer,
                count: 0,
            });
        }
        if let Some(leg) = legs.last_mut() {
            leg.count += 1;
        }
        buffer_indices.push(slot_of(a) as usize);
    }
    buffer_offsets.push(buffer_indices.len());
    ExchangeSchedule::new(legs, buffer_indices, buffer_offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_handles_negative_indices() {
        assert_eq!(bucket(-1, 4), 3);
        assert_eq!(bucket(-4, 4), 0);
        assert_eq!(bucket(7, 4), 3);
    }

    #[test]
    fn assemble_groups_consecutive_peers() {
        let recs = vec![
            WireAssignment::new(0, 1, 5, 0),
            WireAssignment::new(0, 1, 6, 1),
            WireAssignment::new(0, 3, 2, 0),
        ];
        let s = assemble(&recs, |a| a.wanter(), |a| a.src_slot());
        assert_eq!(s.peer_count(), 2);
        assert_eq!(s.legs()[0].rank(), 1);
        assert_eq!(s.legs()[0].count(), 2);
        assert_eq!(s.legs()[1].rank(), 3);
        assert_eq!(s.buffer_indices(), &[5, 6, 2]);
        assert_eq!(s.buffer_offsets(), &[0, 2, 3]);
    }

    #[test]
    fn serial_negotiation_builds_self_legs() {
        use crate::comm::NoComm;
        let src = IndexList::new(&[10, 11, 12]);
        let dst = IndexList::new(&[12, 10]);
        let (send, recv) =
            negotiate(&src, &dst, &NoComm, &MapConfig::default()).unwrap();
        assert_eq!(send.peer_count(), 1);
        assert_eq!(send.legs()[0].rank(), 0);
        // dst slot order: 12 (dst slot 0, src slot 2), 10 (dst slot 1, src slot 0)
        assert_eq!(send.buffer_indices(), &[2, 0]);
        assert_eq!(recv.buffer_indices(), &[0, 1]);
    }

    #[test]
    fn serial_unmatched_is_reported() {
        use crate::comm::NoComm;
        let src = IndexList::new(&[1]);
        let dst = IndexList::new(&[1, 99]);
        let err = negotiate(&src, &dst, &NoComm, &MapConfig::default()).unwrap_err();
        assert_eq!(
            err,
            DistMapError::UnmatchedIndex {
                index: 99,
                total: 1
            }
        );
    }
}
