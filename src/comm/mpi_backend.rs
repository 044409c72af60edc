//! MPI transport backend over the `mpi` crate (feature `mpi-support`).

use core::ptr::NonNull;

use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Communicator as _, SimpleCommunicator};

use crate::comm::{CommTag, Communicator, Wait};

/// World communicator wrapper. Owns the MPI universe; rank and size are
/// cached at initialization.
pub struct MpiComm {
    _universe: Universe,
    pub world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

unsafe impl Send for MpiComm {}
unsafe impl Sync for MpiComm {}

impl Default for MpiComm {
    fn default() -> Self {
        let universe = mpi::initialize().expect("MPI already initialized");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self {
            _universe: universe,
            world,
            rank,
            size,
        }
    }
}

impl Communicator for MpiComm {
    type SendHandle = MpiSendHandle;
    type RecvHandle = MpiRecvHandle;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        use mpi::request::StaticScope;
        let boxed = buf.to_vec().into_boxed_slice();
        let raw: *mut [u8] = Box::into_raw(boxed);
        let slice: &[u8] = unsafe { &*raw };
        let req = self
            .world
            .process_at_rank(peer as i32)
            .immediate_send_with_tag(StaticScope, slice, tag.as_u16() as i32);
        MpiSendHandle {
            req: Some(req),
            buf: Some(unsafe { NonNull::new_unchecked(raw) }),
        }
    }

    fn irecv(&self, peer: usize, tag: CommTag, template: &mut [u8]) -> Self::RecvHandle {
        use mpi::request::StaticScope;
        let len = template.len();
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw: *mut [u8] = Box::into_raw(boxed);
        let slice_mut: &mut [u8] = unsafe { &mut *raw };
        let req = self
            .world
            .process_at_rank(peer as i32)
            .immediate_receive_into_with_tag(StaticScope, slice_mut, tag.as_u16() as i32);
        MpiRecvHandle {
            req: Some(req),
            buf: Some(unsafe { NonNull::new_unchecked(raw) }),
            len,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

pub struct MpiSendHandle {
    req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
    buf: Option<NonNull<[u8]>>,
}

impl Wait for MpiSendHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        if let Some(ptr) = self.buf.take() {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
        None
    }
}

impl Drop for MpiSendHandle {
    fn drop(&mut self) {
        if let Some(r) = self.req.take() {
            let _ = r.test();
            #[cfg(debug_assertions)]
            eprintln!("[MpiSendHandle::drop] send not explicitly waited");
        }
        if let Some(ptr) = self.buf.take() {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}

pub struct MpiRecvHandle {
    req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
    buf: Option<NonNull<[u8]>>,
    len: usize,
}

impl Wait for MpiRecvHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        let ptr = self.buf.take()?;
        let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
        let mut v = Vec::from(boxed);
        v.truncate(self.len);
        Some(v)
    }
}

impl Drop for MpiRecvHandle {
    fn drop(&mut self) {
        if let Some(r) = self.req.take() {
            let _ = r.test();
            #[cfg(debug_assertions)]
            eprintln!("[MpiRecvHandle::drop] recv not explicitly waited");
        }
        if let Some(ptr) = self.buf.take() {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}
