//! Locating the MP floating pointer structure.
//!
//! The floating pointer is a 16 byte, 16 byte aligned record that the firmware leaves in one of
//! three places: the first KiB of the extended BIOS data area, the last KiB of base memory, or
//! the BIOS ROM between `0xF0000` and `0xFFFFF`.
use crate::{
    config,
    memory::{checksum, read_record, PhysicalMemory},
};
use addr::Physical;
use bitflags::bitflags;

/// The signature at the start of the floating pointer.
pub const SIGNATURE: [u8; 4] = *b"_MP_";

/// The size of the floating pointer record, which is also the scan stride.
pub const SIZE: usize = core::mem::size_of::<RawFloatingPointer>();

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawFloatingPointer {
    signature: [u8; 4],
    table: u32,
    length: u8,
    revision: u8,
    checksum: u8,
    default_config: u8,
    features: u8,
    reserved: [u8; 3],
}

bitflags! {
    /// The second feature byte of the floating pointer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features : u8 {
        /// The IMCR is present and the system starts in PIC mode: interrupts must be rerouted
        /// through the APIC before the APs are started. The other bits are reserved and do not
        /// enable the switch.
        const IMCR = 1 << 7;
    }
}

/// A floating pointer structure that passed its signature and checksum test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatingPointer {
    location: Physical,
    table: Option<Physical>,
    length: u8,
    revision: u8,
    checksum: u8,
    default_config: u8,
    features: Features,
}

impl FloatingPointer {
    /// Decode and check the record in `bytes`, which was read at `location`. Returns `None` if
    /// the signature does not match or the checksum is not zero.
    #[must_use]
    pub fn parse(location: Physical, bytes: &[u8]) -> Option<Self> {
        let raw: RawFloatingPointer = read_record(bytes, 0)?;
        if raw.signature != SIGNATURE || checksum(&bytes[..SIZE]) != 0 {
            return None;
        }

        Some(Self {
            location,
            table: match raw.table {
                0 => None,
                table => Some(Physical::from(table)),
            },
            length: raw.length,
            revision: raw.revision,
            checksum: raw.checksum,
            default_config: raw.default_config,
            features: Features::from_bits_retain(raw.features),
        })
    }

    /// Where the record was found.
    #[must_use]
    pub fn location(&self) -> Physical {
        self.location
    }

    /// The address of the configuration table, or `None` if the system uses one of the default
    /// configurations.
    #[must_use]
    pub fn table(&self) -> Option<Physical> {
        self.table
    }

    /// The length of the record in 16 byte units.
    #[must_use]
    pub fn length(&self) -> u8 {
        self.length
    }

    /// The MP specification revision (1 for 1.1, 4 for 1.4).
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.revision
    }

    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// The default configuration type, only meaningful when [`Self::table`] is `None`.
    #[must_use]
    pub fn default_config(&self) -> u8 {
        self.default_config
    }

    #[must_use]
    pub fn features(&self) -> Features {
        self.features
    }

    /// Return `true` if the firmware advertises an IMCR that must be switched to APIC mode.
    #[must_use]
    pub fn imcr_present(&self) -> bool {
        self.features.contains(Features::IMCR)
    }
}

/// Scan `len` bytes of physical memory starting at `base` for a floating pointer. The scan
/// moves in 16 byte steps and stops at the first valid record.
pub fn scan<M: PhysicalMemory>(memory: &M, base: Physical, len: usize) -> Option<FloatingPointer> {
    log::trace!("Scanning {} bytes at {} for the MP floating pointer", len, base);
    let region = memory.read(base, len)?;
    region
        .chunks_exact(SIZE)
        .enumerate()
        .find_map(|(index, bytes)| FloatingPointer::parse(base + index * SIZE, bytes))
}

/// Search the floating pointer in the places where the firmware is allowed to put it: the
/// first KiB of the EBDA if the BIOS data area points to one, the last KiB of base memory
/// otherwise, and finally the BIOS ROM.
pub fn search<M: PhysicalMemory>(memory: &M) -> Option<FloatingPointer> {
    match memory.read_u16(config::BDA_EBDA_SEGMENT) {
        Some(segment) if segment != 0 => {
            let ebda = Physical::from(u64::from(segment) << 4);
            if let Some(mp) = scan(memory, ebda, config::SCAN_WINDOW) {
                return Some(mp);
            }
        }
        _ => {
            let kib = memory.read_u16(config::BDA_BASE_MEMORY_KIB).unwrap_or(0);
            if kib != 0 {
                let top = Physical::from(u64::from(kib) * 1024 - config::SCAN_WINDOW as u64);
                if let Some(mp) = scan(memory, top, config::SCAN_WINDOW) {
                    return Some(mp);
                }
            }
        }
    }

    scan(memory, config::BIOS_ROM_BASE, config::BIOS_ROM_SIZE)
}
