//! Collective primitives built from the point-to-point contract.
//!
//! Map negotiation needs two collectives: a symmetric all-to-all of one
//! fixed-size record per peer (count and status rounds) and a vector
//! all-to-all with per-peer lengths (record and assignment rounds). Both
//! follow the same discipline: post every receive in ascending peer order,
//! post every send, wait for receives, then wait for sends. The self lane
//! never touches the transport; it is serviced by a local copy, which also
//! makes size-1 groups over [`NoComm`](crate::comm::NoComm) fully
//! functional.

use bytemuck::{Pod, Zeroable};

use crate::comm::{CommTag, Communicator, Wait};
use crate::error::DistMapError;

/// Symmetric all-to-all: send `send[p]` to peer `p`, return the record
/// received from every peer. `send.len()` must equal the group size.
pub fn alltoall<T, C>(comm: &C, tag: CommTag, send: &[T]) -> Result<Vec<T>, DistMapError>
where
    T: Pod + Zeroable,
    C: Communicator,
{
    let size = comm.size();
    let me = comm.rank();
    debug_assert_eq!(send.len(), size);
    let rec_bytes = std::mem::size_of::<T>();

    let mut pending_recv = Vec::with_capacity(size);
    for peer in 0..size {
        if peer == me {
            pending_recv.push(None);
            continue;
        }
        let mut template = vec![0u8; rec_bytes];
        pending_recv.push(Some(comm.irecv(peer, tag, &mut template)));
    }

    let mut pending_send = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer == me {
            continue;
        }
        pending_send.push(comm.isend(peer, tag, bytemuck::bytes_of(&send[peer])));
    }

    let mut out = vec![T::zeroed(); size];
    out[me] = send[me];
    for (peer, handle) in pending_recv.into_iter().enumerate() {
        let Some(handle) = handle else { continue };
        let raw = handle.wait().ok_or_else(|| DistMapError::Comm {
            peer,
            reason: "receive returned no data".into(),
        })?;
        if raw.len() != rec_bytes {
            return Err(DistMapError::MessageSizeMismatch {
                peer,
                expected: rec_bytes,
                got: raw.len(),
            });
        }
        bytemuck::bytes_of_mut(&mut out[peer]).copy_from_slice(&raw);
    }
    for s in pending_send {
        let _ = s.wait();
    }
    Ok(out)
}

/// Vector all-to-all: send `send[p]` (any length, possibly empty) to peer
/// `p`, return the records received from every peer. Lengths are
/// negotiated first with an [`alltoall`] of counts on `tags.0`; payloads
/// travel on `tags.1`. Zero-length lanes are skipped symmetrically.
pub fn alltoallv<T, C>(
    comm: &C,
    tags: (CommTag, CommTag),
    send: &[Vec<T>],
) -> Result<Vec<Vec<T>>, DistMapError>
where
    T: Pod + Zeroable,
    C: Communicator,
{
    let size = comm.size();
    let me = comm.rank();
    debug_assert_eq!(send.len(), size);
    let rec_bytes = std::mem::size_of::<T>();

    let counts_out: Vec<u64> = send.iter().map(|v| v.len() as u64).collect();
    let counts_in = alltoall(comm, tags.0, &counts_out)?;

    let mut pending_recv = Vec::with_capacity(size);
    for peer in 0..size {
        let n = counts_in[peer] as usize;
        if peer == me || n == 0 {
            pending_recv.push(None);
            continue;
        }
        let mut template = vec![0u8; n * rec_bytes];
        pending_recv.push(Some(comm.irecv(peer, tags.1, &mut template)));
    }

    let mut pending_send = Vec::new();
    for peer in 0..size {
        if peer == me || send[peer].is_empty() {
            continue;
        }
        pending_send.push(comm.isend(peer, tags.1, bytemuck::cast_slice(&send[peer])));
    }

    let mut out: Vec<Vec<T>> = Vec::with_capacity(size);
    for peer in 0..size {
        out.push(vec![T::zeroed(); counts_in[peer] as usize]);
    }
    out[me].clone_from(&send[me]);

    for (peer, handle) in pending_recv.into_iter().enumerate() {
        let Some(handle) = handle else { continue };
        let raw = handle.wait().ok_or_else(|| DistMapError::Comm {
            peer,
            reason: "receive returned no data".into(),
        })?;
        let expected = out[peer].len() * rec_bytes;
        if raw.len() != expected {
            return Err(DistMapError::MessageSizeMismatch {
                peer,
                expected,
                got: raw.len(),
            });
        }
        bytemuck::cast_slice_mut(&mut out[peer]).copy_from_slice(&raw);
    }
    for s in pending_send {
        let _ = s.wait();
    }
    Ok(out)
}
