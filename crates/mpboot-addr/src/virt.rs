use crate::{Physical, DIRECT_MAP_BASE};
use core::{fmt, ops::Add};

/// A canonical 64-bit virtual memory address.
///
/// On `x86_64`, only the 48 lower bits of a virtual address can be used. This type guarantees that
/// the address is always canonical, i.e. that the top 17 bits are either all 0 or all 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Virtual(u64);

/// An invalid virtual address, returned by [`Virtual::try_new`] when the given address is not
/// canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InvalidVirtual(pub u64);

impl Virtual {
    /// Creates a new canonical virtual address.
    ///
    /// # Panics
    /// This function panics if the given address is not canonical.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        match Self::try_new(address) {
            Ok(addr) => addr,
            Err(InvalidVirtual(_)) => panic!("Invalid virtual address: non canonical"),
        }
    }

    /// Tries to create a new canonical virtual address.
    ///
    /// # Errors
    /// This function returns an [`InvalidVirtual`] error if the given address is not canonical.
    pub const fn try_new(address: u64) -> Result<Self, InvalidVirtual> {
        if Self::is_canonical(address) {
            Ok(Self(address))
        } else {
            Err(InvalidVirtual(address))
        }
    }

    /// Checks if the given address is canonical.
    #[must_use]
    pub const fn is_canonical(address: u64) -> bool {
        matches!((address & 0xFFFF_8000_0000_0000) >> 47, 0 | 0x1FFFF)
    }

    /// Creates a new canonical virtual address from a pointer.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as u64)
    }

    #[must_use]
    pub const fn as_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }

    #[must_use]
    pub const fn as_mut_ptr<T>(&self) -> *mut T {
        self.as_ptr::<T>() as *mut T
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Align the address down to the given alignment.
    ///
    /// # Panics
    /// This function panics if the given alignment is not a power of two.
    #[must_use]
    pub fn align_down(&self, alignment: u64) -> Self {
        assert!(alignment.is_power_of_two());
        Self(self.0 & !(alignment - 1))
    }

    /// Checks if the address is aligned to the given alignment.
    ///
    /// # Panics
    /// This function panics if the given alignment is not a power of two.
    #[must_use]
    pub fn is_aligned(&self, alignment: u64) -> bool {
        assert!(alignment.is_power_of_two());
        self.0 & (alignment - 1) == 0
    }
}

impl fmt::Debug for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Virtual({:#x})", self.0)
    }
}

impl fmt::Display for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<Virtual> for u64 {
    fn from(address: Virtual) -> Self {
        address.0
    }
}

impl From<Physical> for Virtual {
    fn from(address: Physical) -> Self {
        // All physical memory is mapped at `DIRECT_MAP_BASE`, so converting a physical address
        // only requires adding the base of the direct map.
        Self::new(DIRECT_MAP_BASE + address.0)
    }
}

impl Add<usize> for Virtual {
    type Output = Virtual;

    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_goes_through_direct_map() {
        let virt = Virtual::from(Physical::new(0xFEE0_0000));
        assert_eq!(u64::from(virt), 0xFFFF_8000_FEE0_0000);
    }

    #[test]
    fn non_canonical_is_rejected() {
        assert!(Virtual::try_new(0x0000_8000_0000_0000).is_err());
        assert!(Virtual::try_new(0xFFFF_8000_0000_0000).is_ok());
    }

    #[test]
    fn align_down_to_stack_alignment() {
        let top = Virtual::new(0x1000_0017).align_down(16);
        assert_eq!(top, Virtual::new(0x1000_0010));
        assert!(top.is_aligned(16));
    }
}
