//! Transport abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! The map-construction collective and the exchanger only require the small
//! contract expressed by [`Communicator`]: reliable, in-order, non-blocking
//! point-to-point messages addressed by rank, plus knowledge of the group
//! size and this rank's identity. Buffers handed to [`Communicator::isend`]
//! are copied before the call returns, so callers may reuse them freely.
//!
//! Wire conventions for the layers above: all multi-byte integers are
//! little-endian fixed width, payload records are `#[repr(C)]` and
//! `bytemuck::Pod`-safe (see [`crate::wire`]).

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

pub mod collective;

#[cfg(feature = "mpi-support")]
mod mpi_backend;
#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a non-blocking send of `buf` to `peer`. The buffer is copied
    /// before the call returns.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;

    /// Post a non-blocking receive from `peer`. Only `buf.len()` is
    /// significant; the handle's `wait` returns the received bytes.
    fn irecv(&self, peer: usize, tag: CommTag, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks in the group.
    fn size(&self) -> usize;
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Tag block used by one map negotiation.
///
/// Each vector all-to-all consumes two adjacent tags (count round, payload
/// round); the status round consumes one. Concurrent negotiations on the
/// same group must use disjoint blocks.
#[derive(Copy, Clone, Debug)]
pub struct NegotiationTags {
    /// Source-claim routing to brokers (counts, payload).
    pub claims: (CommTag, CommTag),
    /// Destination-request routing to brokers (counts, payload).
    pub requests: (CommTag, CommTag),
    /// Assignment dissemination from brokers (counts, payload).
    pub assignments: (CommTag, CommTag),
    /// Group-wide negotiation status round.
    pub status: CommTag,
}

impl NegotiationTags {
    /// Number of consecutive tags a negotiation occupies.
    pub const SPAN: u16 = 7;

    /// Construct the block from a base tag, assigning deterministic
    /// offsets per phase.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            claims: (base, base.offset(1)),
            requests: (base.offset(2), base.offset(3)),
            assignments: (base.offset(4), base.offset(5)),
            status: base.offset(6),
        }
    }
}

/// Default tag block for map negotiation.
pub const DEFAULT_MAP_TAG: CommTag = CommTag::new(0x4d00);
/// Default tag for exchanger data traffic.
pub const DEFAULT_EXCHANGE_TAG: CommTag = CommTag::new(0x4500);

/// Compile-time no-op comm for pure serial use and unit tests.
///
/// Size-1 group; every leg of a map built over `NoComm` is a self-leg and
/// is serviced by local copies, so no message ever reaches the transport.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: CommTag, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: intra-process, one thread per rank ---

type LaneKey = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Lane {
    q: VecDeque<Vec<u8>>,
}

struct Mailbox {
    map: Mutex<HashMap<LaneKey, Arc<(Mutex<Lane>, Condvar)>>>,
}

static MAILBOX: Lazy<Mailbox> = Lazy::new(|| Mailbox {
    map: Mutex::new(HashMap::new()),
});

fn mailbox_lane(key: LaneKey) -> Arc<(Mutex<Lane>, Condvar)> {
    let mut g = MAILBOX.map.lock().expect("mailbox poisoned");
    g.entry(key)
        .or_insert_with(|| Arc::new((Mutex::new(Lane::default()), Condvar::new())))
        .clone()
}

/// Send side completes at post time; nothing to wait for.
pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Blocks on the matching lane until a message is available.
pub struct ThreadRecvHandle {
    lane: Arc<(Mutex<Lane>, Condvar)>,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.lane;
        let mut lane = lock.lock().expect("lane poisoned");
        while lane.q.is_empty() {
            lane = cv.wait(lane).expect("condvar poisoned");
        }
        Some(lane.q.pop_front().expect("queue non-empty"))
    }
}

/// Intra-process communicator: every rank is a thread of the same process,
/// messages travel through a process-global mailbox keyed by
/// `(sender, receiver, tag)` with FIFO ordering per lane.
///
/// This is the backend the multi-rank test suite runs on; production use
/// goes through [`MpiComm`] (feature `mpi-support`).
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
}

impl ThreadComm {
    pub fn new(rank: usize, size: usize) -> Self {
        debug_assert!(rank < size);
        Self { rank, size }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        let lane = mailbox_lane((self.rank, peer, tag.as_u16()));
        let (lock, cv) = &*lane;
        {
            let mut lane = lock.lock().expect("lane poisoned");
            lane.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: CommTag, _buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            lane: mailbox_lane((peer, self.rank, tag.as_u16())),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}
