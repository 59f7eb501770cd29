//! Guest linear memory.
//!
//! Every integer a guest hands to a host call is an untrusted offset into its
//! linear memory.  This module is the only place such offsets are turned into
//! host memory, and it refuses every offset that does not lie inside the
//! region the runtime lent us.
//!
//! - The address translator (`to_address`, `to_offset`).
//! - Checked scalar and buffer access (`slice`, `write_u32`, ...).
//! - The I/O vector marshaller (`copy_iovecs_to_host`).
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::errno::{ErrNo, ShimResult};
use byteorder::{ByteOrder, LittleEndian};
use std::{convert::TryFrom, mem::size_of, ops::Range};

/// Largest number of I/O vectors accepted in one call, matching the host's
/// `IOV_MAX`.
pub const IOV_MAX: u32 = 1024;

/// An I/O vector as laid out in guest memory: a buffer offset and a length,
/// both little-endian `u32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVec {
    pub buf: u32,
    pub len: u32,
}

impl IoVec {
    /// Size of the guest encoding.
    pub const SIZE: u32 = size_of::<IoVec>() as u32;

    fn unpack(bytes: &[u8]) -> IoVec {
        IoVec {
            buf: LittleEndian::read_u32(&bytes[0..4]),
            len: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}

/// The host form of an I/O vector: a byte range of linear memory that has
/// already been checked against the memory's current size.  Valid only for
/// the host call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIoVec {
    pub start: usize,
    pub len: usize,
}

impl HostIoVec {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Borrows the ranges of `iovecs` out of `region` as separate mutable
/// slices, in the order of `iovecs`.  Returns `None` if two non-empty ranges
/// overlap.  The ranges must lie inside `region`.
pub fn split_iovecs_mut<'a>(region: &'a mut [u8], iovecs: &[HostIoVec]) -> Option<Vec<&'a mut [u8]>> {
    let mut order: Vec<usize> = (0..iovecs.len()).filter(|i| iovecs[*i].len > 0).collect();
    order.sort_by_key(|i| iovecs[*i].start);

    let mut slices: Vec<&'a mut [u8]> = iovecs.iter().map(|_| <&mut [u8]>::default()).collect();
    let mut rest = region;
    let mut consumed = 0;
    for i in order {
        let iovec = &iovecs[i];
        if iovec.start < consumed {
            return None;
        }
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(iovec.start - consumed);
        let (slice, tail) = tail.split_at_mut(iovec.len);
        slices[i] = slice;
        rest = tail;
        consumed = iovec.start + iovec.len;
    }
    Some(slices)
}

/// Checks that `[offset, offset + length)` lies inside a memory of
/// `memory_len` bytes.
#[inline]
fn checked_range(memory_len: usize, offset: u32, length: u32) -> ShimResult<Range<usize>> {
    let start = offset as usize;
    let end = start.checked_add(length as usize).ok_or(ErrNo::Fault)?;
    if end > memory_len {
        return Err(ErrNo::Fault);
    }
    Ok(start..end)
}

/// The memory handler for interacting with the wasm memory space.
///
/// An embedding runtime lends the guest's linear memory by implementing
/// `memory_region`; the base of the returned slice is the memory base and its
/// length is the current memory size.  The shim never resizes or frees it.
/// All other methods are derived and bounds-checked: an offset outside the
/// region fails with `ErrNo::Fault`.
///
/// NOTE: offsets are `u32` as the guest is a 32-bit wasm module.
pub trait MemoryHandler {
    /// Borrow the guest's linear memory.
    fn memory_region(&mut self) -> ShimResult<&mut [u8]>;

    /// Translate a guest offset into a host address, `base + offset`.
    fn to_address(&mut self, offset: u32) -> ShimResult<*const u8> {
        let memory = self.memory_region()?;
        if offset as usize >= memory.len() {
            return Err(ErrNo::Fault);
        }
        Ok(memory[offset as usize..].as_ptr())
    }

    /// Translate a host address back into a guest offset, `address - base`.
    fn to_offset(&mut self, address: *const u8) -> ShimResult<u32> {
        let memory = self.memory_region()?;
        let base = memory.as_ptr() as usize;
        let address = address as usize;
        if address < base || address - base >= memory.len() {
            return Err(ErrNo::Fault);
        }
        u32::try_from(address - base).map_err(|_| ErrNo::Fault)
    }

    /// Borrow `length` bytes at `offset`.
    fn slice(&mut self, offset: u32, length: u32) -> ShimResult<&[u8]> {
        let memory = self.memory_region()?;
        let range = checked_range(memory.len(), offset, length)?;
        Ok(&memory[range])
    }

    /// Mutably borrow `length` bytes at `offset`.
    fn slice_mut(&mut self, offset: u32, length: u32) -> ShimResult<&mut [u8]> {
        let memory = self.memory_region()?;
        let range = checked_range(memory.len(), offset, length)?;
        Ok(&mut memory[range])
    }

    /// Write the `buffer` to `address`.
    fn write_buffer(&mut self, address: u32, buffer: &[u8]) -> ShimResult<()> {
        let length = u32::try_from(buffer.len()).map_err(|_| ErrNo::Fault)?;
        self.slice_mut(address, length)?.copy_from_slice(buffer);
        Ok(())
    }

    /// Read `length` bytes from `address`.
    fn read_buffer(&mut self, address: u32, length: u32) -> ShimResult<Vec<u8>> {
        Ok(self.slice(address, length)?.to_vec())
    }

    fn read_u32(&mut self, address: u32) -> ShimResult<u32> {
        Ok(LittleEndian::read_u32(self.slice(address, 4)?))
    }

    fn read_u64(&mut self, address: u32) -> ShimResult<u64> {
        Ok(LittleEndian::read_u64(self.slice(address, 8)?))
    }

    fn write_u16(&mut self, address: u32, number: u16) -> ShimResult<()> {
        LittleEndian::write_u16(self.slice_mut(address, 2)?, number);
        Ok(())
    }

    fn write_u32(&mut self, address: u32, number: u32) -> ShimResult<()> {
        LittleEndian::write_u32(self.slice_mut(address, 4)?, number);
        Ok(())
    }

    fn write_u64(&mut self, address: u32, number: u64) -> ShimResult<()> {
        LittleEndian::write_u64(self.slice_mut(address, 8)?, number);
        Ok(())
    }

    /// Reads `count` guest `IoVec` structures starting at `iovs_address`.
    fn read_iovecs(&mut self, iovs_address: u32, count: u32) -> ShimResult<Vec<IoVec>> {
        if count > IOV_MAX {
            return Err(ErrNo::Inval);
        }
        let all_bytes = self.slice(iovs_address, count * IoVec::SIZE)?;
        Ok(all_bytes
            .chunks_exact(IoVec::SIZE as usize)
            .map(IoVec::unpack)
            .collect())
    }

    /// Marshals `count` guest I/O vectors at `iovs_address` into host form,
    /// resolving each buffer through the address translator.  Fails if the
    /// array or any buffer it names lies outside linear memory.
    fn copy_iovecs_to_host(&mut self, iovs_address: u32, count: u32) -> ShimResult<Vec<HostIoVec>> {
        let iovecs = self.read_iovecs(iovs_address, count)?;
        let memory_len = self.memory_region()?.len();
        iovecs
            .iter()
            .map(|IoVec { buf, len }| {
                let range = checked_range(memory_len, *buf, *len)?;
                Ok(HostIoVec {
                    start: range.start,
                    len: range.len(),
                })
            })
            .collect()
    }

    /// Write the content to the buf_address and the starting address to buf_pointers.
    /// For example:
    /// buf_address:
    /// --------------------------------------------------------------------
    ///  content[0] content[1] ......
    /// --------------------------------------------------------------------
    ///    ^           ^
    ///   0x10        0x64
    /// buf_pointers: [0x10, 0x64, ...]
    ///
    fn write_string_list(
        &mut self,
        content: &[Vec<u8>],
        mut buf_address: u32,
        mut buf_pointers: u32,
    ) -> ShimResult<()> {
        for to_write in content {
            self.write_buffer(buf_address, to_write)?;
            self.write_u32(buf_pointers, buf_address)?;
            buf_address = buf_address
                .checked_add(to_write.len() as u32)
                .ok_or(ErrNo::Fault)?;
            buf_pointers = buf_pointers
                .checked_add(size_of::<u32>() as u32)
                .ok_or(ErrNo::Fault)?;
        }
        Ok(())
    }
}

/// A linear memory lent as a plain byte slice, e.g. by a runtime that exposes
/// its memory as `&mut [u8]` for the duration of a host call.
pub struct GuestMemory<'a>(pub &'a mut [u8]);

impl<'a> MemoryHandler for GuestMemory<'a> {
    #[inline]
    fn memory_region(&mut self) -> ShimResult<&mut [u8]> {
        Ok(&mut *self.0)
    }
}

impl MemoryHandler for Vec<u8> {
    #[inline]
    fn memory_region(&mut self) -> ShimResult<&mut [u8]> {
        Ok(self.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_translation_round_trips_inside_memory() {
        let mut memory = vec![0u8; 256];
        for offset in [0u32, 1, 17, 128, 255] {
            let address = memory.to_address(offset).unwrap();
            assert_eq!(memory.to_offset(address).unwrap(), offset);
        }
    }

    #[test]
    fn address_translation_refuses_out_of_bounds() {
        let mut memory = vec![0u8; 16];
        assert_eq!(memory.to_address(16), Err(ErrNo::Fault));
        assert_eq!(memory.to_address(u32::MAX), Err(ErrNo::Fault));

        let other = [0u8; 4];
        assert_eq!(memory.to_offset(other.as_ptr()), Err(ErrNo::Fault));
    }

    #[test]
    fn slices_are_checked_against_overflow() {
        let mut memory = vec![0u8; 16];
        assert!(memory.slice(12, 4).is_ok());
        assert_eq!(memory.slice(12, 5).err(), Some(ErrNo::Fault));
        assert_eq!(memory.slice(u32::MAX, 2).err(), Some(ErrNo::Fault));
        assert_eq!(memory.write_u64(10, 1), Err(ErrNo::Fault));
    }

    #[test]
    fn scalars_are_little_endian() {
        let mut memory = vec![0u8; 16];
        memory.write_u32(0, 0x0403_0201).unwrap();
        memory.write_u16(4, 0x0605).unwrap();
        assert_eq!(&memory[0..6], &[1, 2, 3, 4, 5, 6]);
        memory.write_u64(8, 42).unwrap();
        assert_eq!(memory.read_u64(8).unwrap(), 42);
    }

    #[test]
    fn iovecs_are_resolved_in_order() {
        let mut memory = vec![0u8; 64];
        memory.write_u32(0, 32).unwrap();
        memory.write_u32(4, 5).unwrap();
        memory.write_u32(8, 40).unwrap();
        memory.write_u32(12, 0).unwrap();

        let host = memory.copy_iovecs_to_host(0, 2).unwrap();
        assert_eq!(
            host,
            vec![HostIoVec { start: 32, len: 5 }, HostIoVec { start: 40, len: 0 }]
        );
        assert_eq!(host[0].range(), 32..37);
    }

    #[test]
    fn disjoint_iovecs_are_split_in_their_own_order() {
        let mut region = [0u8; 32];
        let iovecs = vec![
            HostIoVec { start: 20, len: 4 },
            HostIoVec { start: 2, len: 3 },
            HostIoVec { start: 5, len: 0 },
            HostIoVec { start: 5, len: 2 },
        ];
        let slices = split_iovecs_mut(&mut region, &iovecs).unwrap();
        assert_eq!(slices.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![4, 3, 0, 2]);
        for (n, slice) in slices.into_iter().enumerate() {
            slice.fill(n as u8 + 1);
        }
        assert_eq!(&region[0..8], &[0, 0, 2, 2, 2, 4, 4, 0]);
        assert_eq!(&region[20..24], &[1; 4]);
    }

    #[test]
    fn overlapping_iovecs_are_not_split() {
        let mut region = [0u8; 32];
        let iovecs = vec![HostIoVec { start: 0, len: 8 }, HostIoVec { start: 4, len: 8 }];
        assert!(split_iovecs_mut(&mut region, &iovecs).is_none());
    }

    #[test]
    fn iovecs_pointing_outside_memory_are_refused() {
        let mut memory = vec![0u8; 64];
        memory.write_u32(0, 60).unwrap();
        memory.write_u32(4, 8).unwrap();
        assert_eq!(memory.copy_iovecs_to_host(0, 1), Err(ErrNo::Fault));
        // The array itself runs off the end.
        assert_eq!(memory.copy_iovecs_to_host(60, 1), Err(ErrNo::Fault));
        assert_eq!(memory.copy_iovecs_to_host(0, IOV_MAX + 1), Err(ErrNo::Inval));
    }

    #[test]
    fn borrowed_regions_are_handled_like_owned_ones() {
        let mut backing = [0u8; 8];
        let mut memory = GuestMemory(&mut backing);
        memory.write_u32(4, 7).unwrap();
        assert_eq!(memory.write_u32(6, 7), Err(ErrNo::Fault));
        assert_eq!(backing[4], 7);
    }

    #[test]
    fn string_lists_record_each_start() {
        let mut memory = vec![0u8; 64];
        let content = vec![b"ab\0".to_vec(), b"cde\0".to_vec()];
        memory.write_string_list(&content, 16, 0).unwrap();
        assert_eq!(memory.read_u32(0).unwrap(), 16);
        assert_eq!(memory.read_u32(4).unwrap(), 19);
        assert_eq!(&memory[16..23], b"ab\0cde\0");
    }
}
