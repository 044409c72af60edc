//! GPU-backed staging buffers using wgpu (feature `wgpu`).
//!
//! The wire data is staged in a device buffer; pack and unpack move
//! through host scratch on the mapped-read/queued-write path. The
//! schedule and the observable exchange results are identical to host
//! staging.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::DistMapError;
use crate::exchange::staging::{MemorySpace, Staging};

/// Device-resident staging buffer.
#[derive(Debug)]
pub struct WgpuStaging<T: Pod> {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffer: wgpu::Buffer,
    len: usize,
    _pd: PhantomData<T>,
}

impl<T> WgpuStaging<T>
where
    T: Pod + Zeroable + Send + Sync + 'static,
{
    /// Allocate a zero-initialized device staging buffer of `len`
    /// elements.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, len: usize) -> Self {
        let byte_len = (len * std::mem::size_of::<T>()) as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Exchanger/WgpuStaging"),
            size: byte_len,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if byte_len > 0 {
            let zeros = vec![T::zeroed(); len];
            queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&zeros));
        }
        Self {
            device,
            queue,
            buffer,
            len,
            _pd: PhantomData,
        }
    }

    #[inline]
    fn elem_size() -> usize {
        std::mem::size_of::<T>()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), DistMapError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(DistMapError::StagingOutOfBounds {
                offset,
                len,
                capacity: self.len,
            }),
        }
    }
}

impl<T> Staging<T> for WgpuStaging<T>
where
    T: Pod + Zeroable + Send + Sync + 'static,
{
    fn len(&self) -> usize {
        self.len
    }

    fn memory_space(&self) -> MemorySpace {
        MemorySpace::Device
    }

    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), DistMapError> {
        self.check_range(offset, src.len())?;
        if src.is_empty() {
            return Ok(());
        }
        self.queue.write_buffer(
            &self.buffer,
            (offset * Self::elem_size()) as u64,
            bytemuck::cast_slice(src),
        );
        Ok(())
    }

    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, DistMapError> {
        self.check_range(offset, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let src_b = (offset * Self::elem_size()) as u64;
        let size_b = (len * Self::elem_size()) as u64;
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("WgpuStaging[read]"),
            size: size_b,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut enc = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("WgpuStaging::read_slice"),
            });
        enc.copy_buffer_to_buffer(&self.buffer, src_b, &readback, 0, size_b);
        self.queue.submit(Some(enc.finish()));

        let buffer_slice = readback.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            sender.send(res).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        let res = pollster::block_on(receiver.receive());
        res.ok_or(DistMapError::GpuMappingFailed)?
            .map_err(|_| DistMapError::GpuMappingFailed)?;
        let data = buffer_slice.get_mapped_range();
        let mut out = vec![T::zeroed(); len];
        out.copy_from_slice(bytemuck::cast_slice(&data));
        drop(data);
        readback.unmap();
        Ok(out)
    }
}
