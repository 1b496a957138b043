//! Access to raw physical memory.
//!
//! Everything the discovery code reads (BIOS data area, floating pointer, configuration table)
//! and everything the sequencer writes (trampoline, startup parameters) goes through the
//! [`PhysicalMemory`] trait, so the whole pipeline can run against a plain byte buffer.
use addr::{Physical, Virtual};

/// A range of physical memory that could not be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutOfRange {
    pub base: Physical,
    pub len: usize,
}

pub trait PhysicalMemory {
    /// Borrow `len` bytes of physical memory starting at `base`, or `None` if any part of the
    /// range is not accessible.
    fn read(&self, base: Physical, len: usize) -> Option<&[u8]>;

    /// Copy `bytes` into physical memory starting at `base`.
    ///
    /// # Errors
    /// Returns [`OutOfRange`] if any part of the destination is not accessible. In that case,
    /// nothing has been written.
    fn write(&mut self, base: Physical, bytes: &[u8]) -> Result<(), OutOfRange>;

    /// Read a single byte.
    fn read_u8(&self, base: Physical) -> Option<u8> {
        self.read(base, 1).map(|bytes| bytes[0])
    }

    /// Read a little-endian 16-bit word.
    fn read_u16(&self, base: Physical) -> Option<u16> {
        self.read(base, 2)
            .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

/// Physical memory reached through the higher-half direct map set up by the bootloader.
pub struct DirectMap {
    _private: (),
}

impl DirectMap {
    /// Create a new accessor over the direct map.
    ///
    /// # Safety
    /// The caller must ensure that all physical memory touched through this accessor is mapped
    /// at [`addr::DIRECT_MAP_BASE`], and that nothing else owns the low memory written by the
    /// sequencer while it runs.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn translate(base: Physical, len: usize) -> Option<Virtual> {
        base.checked_add(len as u64)?;
        Some(Virtual::from(base))
    }
}

impl PhysicalMemory for DirectMap {
    fn read(&self, base: Physical, len: usize) -> Option<&[u8]> {
        let virt = Self::translate(base, len)?;
        // SAFETY: `DirectMap::new` requires the whole physical memory to be mapped.
        unsafe { Some(core::slice::from_raw_parts(virt.as_ptr::<u8>(), len)) }
    }

    fn write(&mut self, base: Physical, bytes: &[u8]) -> Result<(), OutOfRange> {
        let len = bytes.len();
        let virt = Self::translate(base, len).ok_or(OutOfRange { base, len })?;
        // SAFETY: see `read`. The destination is low memory reserved for the trampoline.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), virt.as_mut_ptr::<u8>(), len);
        }
        Ok(())
    }
}

/// Additive 8-bit checksum used by every MP structure: a structure is valid when all of its
/// bytes sum to zero modulo 256.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Read a `repr(C, packed)` record from `bytes` at `offset`, or `None` if it does not fit.
///
/// `T` must be a plain-old-data type made only of integers and byte arrays, for which every
/// bit pattern is valid.
pub(crate) fn read_record<T: Copy>(bytes: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(core::mem::size_of::<T>())?;
    let raw = bytes.get(offset..end)?;
    // SAFETY: the slice is exactly `size_of::<T>()` bytes long and `T` is only ever a packed
    // record of integers, so any content is a valid `T`.
    Some(unsafe { raw.as_ptr().cast::<T>().read_unaligned() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::BufferMemory;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xFF, 0x01]), 0);
        assert_eq!(checksum(&[0x80, 0x80, 0x05]), 0x05);
    }

    #[test]
    fn read_record_refuses_short_slices() {
        #[derive(Clone, Copy)]
        #[repr(C, packed)]
        struct Pair {
            low: u8,
            high: u16,
        }

        let bytes = [0x01, 0x34, 0x12];
        let pair: Pair = read_record(&bytes, 0).unwrap();
        assert_eq!({ pair.low }, 0x01);
        assert_eq!({ pair.high }, 0x1234);
        assert!(read_record::<Pair>(&bytes, 1).is_none());
        assert!(read_record::<Pair>(&bytes, usize::MAX).is_none());
    }

    #[test]
    fn buffer_memory_bounds() {
        let mut memory = BufferMemory::new(Physical::new(0x1000), 0x100);
        assert!(memory.read(Physical::new(0x1000), 0x100).is_some());
        assert!(memory.read(Physical::new(0x0FFF), 2).is_none());
        assert!(memory.read(Physical::new(0x10FF), 2).is_none());
        assert_eq!(
            memory.write(Physical::new(0x10FF), &[1, 2]),
            Err(OutOfRange {
                base: Physical::new(0x10FF),
                len: 2
            })
        );

        memory.write(Physical::new(0x1010), &[0x34, 0x12]).unwrap();
        assert_eq!(memory.read_u16(Physical::new(0x1010)), Some(0x1234));
        assert_eq!(memory.read_u8(Physical::new(0x1011)), Some(0x12));
    }
}
