use core::{
    fmt,
    ops::{Add, Sub},
};

/// A 52-bit physical memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Physical(pub(crate) u64);

/// An invalid physical address, returned by [`Physical::try_new`] when bits 52-63 are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InvalidPhysical(pub u64);

impl Physical {
    /// The highest valid physical address.
    pub const MAX: u64 = 0x000F_FFFF_FFFF_FFFF;

    /// Creates a new physical address.
    ///
    /// # Panics
    /// If the address is not valid (bits 52-63 must be 0), this function panics.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        match Self::try_new(address) {
            Ok(addr) => addr,
            Err(InvalidPhysical(_)) => panic!("Physical address is not valid (must be 52 bits)"),
        }
    }

    /// Try to create a new physical address.
    ///
    /// # Errors
    /// If the address is not valid (bits 52-63 must be 0), this function returns an error,
    /// containing the invalid address.
    pub const fn try_new(address: u64) -> Result<Self, InvalidPhysical> {
        if address > Self::MAX {
            Err(InvalidPhysical(address))
        } else {
            Ok(Self(address))
        }
    }

    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset the address by `count` bytes, returning `None` if the result would overflow or
    /// would not be a valid physical address.
    #[must_use]
    pub const fn checked_add(self, count: u64) -> Option<Self> {
        match self.0.checked_add(count) {
            Some(addr) if addr <= Self::MAX => Some(Self(addr)),
            _ => None,
        }
    }

    /// Move the address `count` bytes down, returning `None` on underflow.
    #[must_use]
    pub const fn checked_sub(self, count: u64) -> Option<Self> {
        match self.0.checked_sub(count) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Checks if the address is aligned to a page boundary (4 KiB).
    #[must_use]
    pub const fn is_page_aligned(&self) -> bool {
        self.0.trailing_zeros() >= 12
    }

    /// The index of the 4 KiB frame containing this address.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.0 >> 12
    }
}

impl fmt::Debug for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Physical({:#x})", self.0)
    }
}

impl fmt::LowerHex for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<Physical> for u64 {
    fn from(address: Physical) -> Self {
        address.0
    }
}

impl From<u32> for Physical {
    fn from(address: u32) -> Self {
        Self(u64::from(address))
    }
}

impl From<u64> for Physical {
    fn from(address: u64) -> Self {
        Self::new(address)
    }
}

impl Add<u64> for Physical {
    type Output = Physical;

    fn add(self, rhs: u64) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Add<usize> for Physical {
    type Output = Physical;

    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs as u64)
    }
}

impl Sub<u64> for Physical {
    type Output = Physical;

    fn sub(self, rhs: u64) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}
