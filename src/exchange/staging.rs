//! Pluggable staging buffers for the exchanger.
//!
//! The exchange schedule is independent of where staging lives; this
//! trait is the seam that lets the pack/unpack permutation run against
//! host memory (the default, [`VecStaging`]) or against device-resident
//! buffers (feature `wgpu`, [`WgpuStaging`](crate::exchange::wgpu::WgpuStaging))
//! without the exchanger caring which it got.

use bytemuck::{Pod, Zeroable};

use crate::error::DistMapError;

/// Where a staging buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySpace {
    /// Ordinary host memory.
    Host,
    /// Accelerator-resident memory.
    Device,
}

/// Contiguous element storage the exchanger stages wire data through.
pub trait Staging<T: Pod>: Send {
    /// Capacity in elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which allocator produced this buffer.
    fn memory_space(&self) -> MemorySpace;

    /// Copy `src` into `[offset .. offset + src.len())`.
    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), DistMapError>;

    /// Read `[offset .. offset + len)` into a host vector.
    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, DistMapError>;

    /// Pack step: gather `src[indices[k]]` into position `k` for the whole
    /// buffer. `indices.len()` must equal `len()`.
    fn gather_from(&mut self, src: &[T], indices: &[usize]) -> Result<(), DistMapError> {
        let mut scratch = Vec::with_capacity(indices.len());
        for &slot in indices {
            scratch.push(src[slot]);
        }
        self.write_slice(0, &scratch)
    }

    /// Unpack step: scatter position `k` into `dst[indices[k]]` for the
    /// whole buffer. `indices.len()` must equal `len()`.
    fn scatter_to(&self, dst: &mut [T], indices: &[usize]) -> Result<(), DistMapError> {
        let staged = self.read_slice(0, self.len())?;
        for (k, &slot) in indices.iter().enumerate() {
            dst[slot] = staged[k];
        }
        Ok(())
    }
}

/// `Vec`-backed host staging (the default allocator).
#[derive(Debug, Clone)]
pub struct VecStaging<T>(Vec<T>);

impl<T: Pod> VecStaging<T> {
    /// Allocate a zero-initialized staging buffer of `len` elements.
    pub fn with_len(len: usize) -> Self {
        Self(vec![T::zeroed(); len])
    }
}

impl<T: Pod + Send + Sync> Staging<T> for VecStaging<T> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn memory_space(&self) -> MemorySpace {
        MemorySpace::Host
    }

    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), DistMapError> {
        let end = offset
            .checked_add(src.len())
            .filter(|&end| end <= self.0.len())
            .ok_or(DistMapError::StagingOutOfBounds {
                offset,
                len: src.len(),
                capacity: self.0.len(),
            })?;
        self.0[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, DistMapError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.0.len())
            .ok_or(DistMapError::StagingOutOfBounds {
                offset,
                len,
                capacity: self.0.len(),
            })?;
        Ok(self.0[offset..end].to_vec())
    }

    // Direct gather into the owned vector; parallel when the `rayon`
    // feature is enabled (the loop is embarrassingly parallel over k).
    fn gather_from(&mut self, src: &[T], indices: &[usize]) -> Result<(), DistMapError> {
        debug_assert_eq!(indices.len(), self.0.len());
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            self.0
                .par_iter_mut()
                .zip(indices.par_iter())
                .for_each(|(out, &slot)| *out = src[slot]);
        }
        #[cfg(not(feature = "rayon"))]
        for (out, &slot) in self.0.iter_mut().zip(indices) {
            *out = src[slot];
        }
        Ok(())
    }

    fn scatter_to(&self, dst: &mut [T], indices: &[usize]) -> Result<(), DistMapError> {
        debug_assert_eq!(indices.len(), self.0.len());
        for (value, &slot) in self.0.iter().zip(indices) {
            dst[slot] = *value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_then_scatter_round_trips() {
        let src = [10.0f64, 11.0, 12.0, 13.0];
        let indices = [2usize, 0, 3, 1];
        let mut stage = VecStaging::<f64>::with_len(4);
        stage.gather_from(&src, &indices).unwrap();
        assert_eq!(stage.read_slice(0, 4).unwrap(), vec![12.0, 10.0, 13.0, 11.0]);

        let mut dst = [0.0f64; 4];
        stage.scatter_to(&mut dst, &indices).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut stage = VecStaging::<u32>::with_len(2);
        let err = stage.write_slice(1, &[1, 2]).unwrap_err();
        assert!(matches!(err, DistMapError::StagingOutOfBounds { .. }));
    }

    #[test]
    fn host_space_reported() {
        let stage = VecStaging::<u8>::with_len(1);
        assert_eq!(stage.memory_space(), MemorySpace::Host);
    }
}
