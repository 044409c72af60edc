//! Typed executors that move values along a map's schedules.
//!
//! An [`Exchanger`] binds a shared [`Map`] to a concrete element type and
//! a pair of staging buffers. Each [`Exchanger::go`] packs the source
//! buffer through the send permutation, runs the point-to-point legs,
//! and scatters the receive staging into the destination buffer. The
//! staging step decouples input from output, so in-place exchange
//! ([`Exchanger::go_in_place`]) is well-defined.
//!
//! A single exchanger is not re-entrant; several exchangers (possibly of
//! different element types) may share one map, each with its own staging
//! and tag, provided their `go` calls are posted in the same order on
//! every rank.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::comm::{CommTag, Communicator, Wait, DEFAULT_EXCHANGE_TAG};
use crate::error::DistMapError;
use crate::map::Map;

pub mod staging;
#[cfg(feature = "wgpu")]
pub mod wgpu;

pub use staging::{MemorySpace, Staging, VecStaging};

/// Where a `go` call currently is. One exchange runs
/// `Idle → Posting → Waiting → Unpacking → Idle`; an error leaves the
/// phase where it happened and poisons the exchanger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Posting,
    Waiting,
    Unpacking,
}

/// Typed executor for one map.
pub struct Exchanger<T, C, S = VecStaging<T>>
where
    T: Pod,
    C: Communicator,
    S: Staging<T>,
{
    map: Arc<Map<C>>,
    send_stage: S,
    recv_stage: S,
    tag: CommTag,
    phase: ExchangePhase,
    _elem: PhantomData<T>,
}

impl<T, C> Exchanger<T, C, VecStaging<T>>
where
    T: Pod + Send + Sync,
    C: Communicator,
{
    /// Bind `map` to element type `T` with host staging buffers sized
    /// from the map's schedules.
    pub fn new(map: Arc<Map<C>>) -> Result<Self, DistMapError> {
        let send_stage = VecStaging::with_len(map.send_schedule().buffer_size());
        let recv_stage = VecStaging::with_len(map.recv_schedule().buffer_size());
        Self::with_staging(map, send_stage, recv_stage)
    }
}

impl<T, C, S> Exchanger<T, C, S>
where
    T: Pod + Send + Sync,
    C: Communicator,
    S: Staging<T>,
{
    /// Bind `map` with caller-provided staging buffers. This is how the
    /// memory-space hint selects the allocator: pass
    /// [`VecStaging`] for host exchanges or a device-backed
    /// implementation for accelerator-resident staging.
    pub fn with_staging(
        map: Arc<Map<C>>,
        send_stage: S,
        recv_stage: S,
    ) -> Result<Self, DistMapError> {
        if send_stage.len() != map.send_schedule().buffer_size() {
            return Err(DistMapError::ShapeMismatch {
                needed: map.send_schedule().buffer_size(),
                got: send_stage.len(),
            });
        }
        if recv_stage.len() != map.recv_schedule().buffer_size() {
            return Err(DistMapError::ShapeMismatch {
                needed: map.recv_schedule().buffer_size(),
                got: recv_stage.len(),
            });
        }
        Ok(Self {
            map,
            send_stage,
            recv_stage,
            tag: DEFAULT_EXCHANGE_TAG,
            phase: ExchangePhase::Idle,
            _elem: PhantomData,
        })
    }

    /// Use a specific tag for this exchanger's traffic. Exchangers that
    /// run interleaved on the same group need distinct tags.
    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }

    /// The map this exchanger executes.
    pub fn map(&self) -> &Arc<Map<C>> {
        &self.map
    }

    /// Current phase; `Idle` unless a previous exchange failed midway.
    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Memory space of the staging buffers.
    pub fn memory_space(&self) -> MemorySpace {
        self.send_stage.memory_space()
    }

    /// Execute one exchange: values from `src` (source-role slot order)
    /// are delivered into `dst` (destination-role slot order) on the
    /// ranks that want them. Blocking; returns when every leg of this
    /// rank has completed.
    pub fn go(&mut self, src: &[T], dst: &mut [T]) -> Result<(), DistMapError> {
        self.check_idle()?;
        self.check_shape(src.len(), self.map.src_len())?;
        self.check_shape(dst.len(), self.map.dst_len())?;
        self.transport_round(src)?;
        self.phase = ExchangePhase::Unpacking;
        self.recv_stage
            .scatter_to(dst, self.map.recv_schedule().buffer_indices())?;
        self.phase = ExchangePhase::Idle;
        Ok(())
    }

    /// Execute one exchange with a single buffer serving both roles. The
    /// buffer must satisfy both role lengths; the pack step completes
    /// before anything is scattered back, so overlapping slots are safe.
    pub fn go_in_place(&mut self, buf: &mut [T]) -> Result<(), DistMapError> {
        self.check_idle()?;
        self.check_shape(buf.len(), self.map.src_len())?;
        self.check_shape(buf.len(), self.map.dst_len())?;
        self.transport_round(buf)?;
        self.phase = ExchangePhase::Unpacking;
        self.recv_stage
            .scatter_to(buf, self.map.recv_schedule().buffer_indices())?;
        self.phase = ExchangePhase::Idle;
        Ok(())
    }

    fn check_idle(&self) -> Result<(), DistMapError> {
        if self.phase != ExchangePhase::Idle {
            return Err(DistMapError::ExchangerNotIdle { phase: self.phase });
        }
        Ok(())
    }

    fn check_shape(&self, got: usize, needed: usize) -> Result<(), DistMapError> {
        if got < needed {
            return Err(DistMapError::ShapeMismatch { needed, got });
        }
        Ok(())
    }

    /// Pack, post all legs, and wait; on return the receive staging holds
    /// every incoming element in wire order.
    fn transport_round(&mut self, src: &[T]) -> Result<(), DistMapError> {
        let map = Arc::clone(&self.map);
        let comm = map.comm();
        let me = comm.rank();
        let send = map.send_schedule();
        let recv = map.recv_schedule();
        let elem_bytes = std::mem::size_of::<T>();

        self.phase = ExchangePhase::Posting;
        self.send_stage.gather_from(src, send.buffer_indices())?;

        // receives first, ascending peer order; self legs are local copies
        let mut pending_recv = Vec::with_capacity(recv.peer_count());
        for leg in recv.legs() {
            if leg.rank() == me {
                pending_recv.push(None);
                continue;
            }
            let mut template = vec![0u8; leg.count() * elem_bytes];
            pending_recv.push(Some(comm.irecv(leg.rank(), self.tag, &mut template)));
        }

        let mut pending_send = Vec::with_capacity(send.peer_count());
        for (i, leg) in send.legs().iter().enumerate() {
            let offset = send.buffer_offsets()[i];
            if leg.rank() == me {
                self.copy_self_leg(offset, leg.count())?;
                continue;
            }
            let data = self.send_stage.read_slice(offset, leg.count())?;
            pending_send.push(comm.isend(leg.rank(), self.tag, bytemuck::cast_slice(&data)));
        }

        self.phase = ExchangePhase::Waiting;
        for (i, handle) in pending_recv.into_iter().enumerate() {
            let Some(handle) = handle else { continue };
            let leg = recv.legs()[i];
            let raw = handle.wait().ok_or_else(|| DistMapError::Comm {
                peer: leg.rank(),
                reason: "receive returned no data".into(),
            })?;
            let expected = leg.count() * elem_bytes;
            if raw.len() != expected {
                return Err(DistMapError::MessageSizeMismatch {
                    peer: leg.rank(),
                    expected,
                    got: raw.len(),
                });
            }
            let mut typed = vec![T::zeroed(); leg.count()];
            bytemuck::cast_slice_mut(&mut typed).copy_from_slice(&raw);
            self.recv_stage
                .write_slice(recv.buffer_offsets()[i], &typed)?;
        }
        for s in pending_send {
            let _ = s.wait();
        }
        Ok(())
    }

    /// A rank owning and wanting the same indices exchanges with itself
    /// without touching the transport.
    fn copy_self_leg(&mut self, send_offset: usize, count: usize) -> Result<(), DistMapError> {
        let me = self.map.comm().rank();
        let recv = self.map.recv_schedule();
        let i = recv
            .legs()
            .iter()
            .position(|leg| leg.rank() == me)
            .ok_or_else(|| {
                DistMapError::BrokenSchedule("self send leg without matching recv leg".into())
            })?;
        debug_assert_eq!(recv.legs()[i].count(), count);
        let data = self.send_stage.read_slice(send_offset, count)?;
        self.recv_stage
            .write_slice(recv.buffer_offsets()[i], &data)
    }
}
