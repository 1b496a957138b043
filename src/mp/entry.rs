//! Decoding of the entries that follow the configuration table header.
//!
//! The entries form a stream of variable-length records without any count: each record starts
//! with a one byte tag, and the tag alone determines the length of the record. The stream ends
//! when the cursor reaches the length declared by the header.
use super::{bus::BusKind, MpError};
use crate::{memory::read_record, topology::ApicId};
use addr::Physical;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::iter::FusedIterator;

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawProcessor {
    kind: u8,
    apic_id: u8,
    apic_version: u8,
    flags: u8,
    signature: u32,
    features: u32,
    reserved: [u32; 2],
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawBus {
    kind: u8,
    id: u8,
    name: [u8; 6],
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawIoApic {
    kind: u8,
    id: u8,
    version: u8,
    flags: u8,
    address: u32,
}

/// Shared layout of the I/O and local interrupt assignment entries.
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawInterrupt {
    kind: u8,
    interrupt: u8,
    flags: u16,
    source_bus: u8,
    source_irq: u8,
    destination: u8,
    pin: u8,
}

/// The tag at the start of each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    Processor = 0,
    Bus = 1,
    IoApic = 2,
    IoInterrupt = 3,
    LocalInterrupt = 4,
}

impl EntryKind {
    /// Decode a tag, or return `None` if it is not one of the five base table entry types.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Processor),
            1 => Some(Self::Bus),
            2 => Some(Self::IoApic),
            3 => Some(Self::IoInterrupt),
            4 => Some(Self::LocalInterrupt),
            _ => None,
        }
    }

    /// The size in bytes of an entry of this kind, tag included.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Processor => core::mem::size_of::<RawProcessor>(),
            Self::Bus => core::mem::size_of::<RawBus>(),
            Self::IoApic => core::mem::size_of::<RawIoApic>(),
            Self::IoInterrupt | Self::LocalInterrupt => core::mem::size_of::<RawInterrupt>(),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProcessorFlags : u8 {
        /// The processor is usable. Firmware may list disabled processors.
        const ENABLED = 1 << 0;

        /// This is the processor the firmware booted on.
        const BOOTSTRAP = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IoApicFlags : u8 {
        /// The I/O APIC is usable.
        const ENABLED = 1 << 0;
    }
}

bitfield::bitfield! {
    /// Polarity and trigger mode of an interrupt assignment.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptFlags(u16);
    impl Debug;
    u8;
    pub polarity, _: 1, 0;
    pub trigger, _: 3, 2;
}

impl InterruptFlags {
    /// Return `true` if the signal is active low. A conforming polarity (0) follows the bus
    /// default, which is active high for ISA.
    #[must_use]
    pub fn active_low(&self) -> bool {
        self.polarity() == 0b11
    }

    /// Return `true` if the signal is level triggered. A conforming trigger mode (0) follows
    /// the bus default, which is edge triggered for ISA.
    #[must_use]
    pub fn level_triggered(&self) -> bool {
        self.trigger() == 0b11
    }
}

/// The kind of interrupt signal described by an interrupt assignment entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptKind {
    /// A vectored interrupt, the vector comes from the APIC redirection table.
    Vectored,
    Nmi,
    Smi,
    /// A vectored interrupt whose vector comes from an external 8259A.
    External,
}

impl InterruptKind {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Vectored),
            1 => Some(Self::Nmi),
            2 => Some(Self::Smi),
            3 => Some(Self::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorEntry {
    pub apic_id: ApicId,
    pub apic_version: u8,
    pub flags: ProcessorFlags,
    /// CPUID family/model/stepping of the processor.
    pub signature: u32,
    /// CPUID feature flags of the processor.
    pub features: u32,
}

impl ProcessorEntry {
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.flags.contains(ProcessorFlags::BOOTSTRAP)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ProcessorFlags::ENABLED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEntry {
    pub id: u8,
    pub name: [u8; 6],
}

impl BusEntry {
    /// The type of the bus, or `None` if its name is not in the catalog.
    #[must_use]
    pub fn kind(&self) -> Option<BusKind> {
        BusKind::from_name(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoApicEntry {
    pub id: ApicId,
    pub version: u8,
    pub flags: IoApicFlags,
    pub address: Physical,
}

/// An I/O or local interrupt assignment. For I/O assignments, `destination` is an I/O APIC id
/// and `pin` its input; for local assignments, `destination` is a local APIC id (0xFF for all
/// of them) and `pin` the LINT input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEntry {
    pub interrupt: u8,
    pub flags: InterruptFlags,
    pub source_bus: u8,
    pub source_irq: u8,
    pub destination: u8,
    pub pin: u8,
}

impl InterruptEntry {
    #[must_use]
    pub fn kind(&self) -> Option<InterruptKind> {
        InterruptKind::from_raw(self.interrupt)
    }

    fn from_raw(raw: RawInterrupt) -> Self {
        Self {
            interrupt: raw.interrupt,
            flags: InterruptFlags(raw.flags),
            source_bus: raw.source_bus,
            source_irq: raw.source_irq,
            destination: raw.destination,
            pin: raw.pin,
        }
    }
}

/// A decoded base table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Processor(ProcessorEntry),
    Bus(BusEntry),
    IoApic(IoApicEntry),
    IoInterrupt(InterruptEntry),
    LocalInterrupt(InterruptEntry),
}

impl Entry {
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Processor(_) => EntryKind::Processor,
            Self::Bus(_) => EntryKind::Bus,
            Self::IoApic(_) => EntryKind::IoApic,
            Self::IoInterrupt(_) => EntryKind::IoInterrupt,
            Self::LocalInterrupt(_) => EntryKind::LocalInterrupt,
        }
    }

    /// Decode the entry starting at `offset` in `bytes`. The caller is responsible for making
    /// `bytes` end where the stream ends.
    fn decode(bytes: &[u8], offset: usize) -> Result<Self, MpError> {
        let tag = bytes[offset];
        let kind =
            EntryKind::from_tag(tag).ok_or(MpError::UnrecognizedEntry { kind: tag, offset })?;
        let truncated = MpError::TruncatedEntry { kind: tag, offset };

        Ok(match kind {
            EntryKind::Processor => {
                let raw: RawProcessor = read_record(bytes, offset).ok_or(truncated)?;
                Self::Processor(ProcessorEntry {
                    apic_id: ApicId(raw.apic_id),
                    apic_version: raw.apic_version,
                    flags: ProcessorFlags::from_bits_retain(raw.flags),
                    signature: raw.signature,
                    features: raw.features,
                })
            }
            EntryKind::Bus => {
                let raw: RawBus = read_record(bytes, offset).ok_or(truncated)?;
                Self::Bus(BusEntry {
                    id: raw.id,
                    name: raw.name,
                })
            }
            EntryKind::IoApic => {
                let raw: RawIoApic = read_record(bytes, offset).ok_or(truncated)?;
                Self::IoApic(IoApicEntry {
                    id: ApicId(raw.id),
                    version: raw.version,
                    flags: IoApicFlags::from_bits_retain(raw.flags),
                    address: Physical::from(raw.address),
                })
            }
            EntryKind::IoInterrupt => {
                let raw: RawInterrupt = read_record(bytes, offset).ok_or(truncated)?;
                Self::IoInterrupt(InterruptEntry::from_raw(raw))
            }
            EntryKind::LocalInterrupt => {
                let raw: RawInterrupt = read_record(bytes, offset).ok_or(truncated)?;
                Self::LocalInterrupt(InterruptEntry::from_raw(raw))
            }
        })
    }
}

/// A single forward pass over an entry stream. Yields an error at most once, then stops.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Entries<'a> {
    /// Walk the entries of `bytes` between `start` and `end`. Nothing at or after `end` is ever
    /// read, and `end` is clamped to the length of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            bytes: &bytes[..end.min(bytes.len())],
            offset: start,
            failed: false,
        }
    }

    /// The offset of the next entry. Once the iterator is exhausted without error, this is the
    /// end of the stream.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry, MpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }

        let entry = Entry::decode(self.bytes, self.offset);
        match &entry {
            Ok(entry) => self.offset += entry.kind().size(),
            Err(_) => self.failed = true,
        }
        Some(entry)
    }
}

impl FusedIterator for Entries<'_> {}

/// Decode every entry of `bytes` between `start` and `end`, in table order. On success, also
/// return the offset where the stream stopped, which is always `end` (or `start` if the stream
/// is empty).
///
/// # Errors
/// - [`MpError::UnrecognizedEntry`] if a tag is unknown: its length cannot be determined, so
///   the rest of the stream cannot be decoded.
/// - [`MpError::TruncatedEntry`] if an entry would extend past `end`.
pub fn parse(bytes: &[u8], start: usize, end: usize) -> Result<(Vec<Entry>, usize), MpError> {
    let mut stream = Entries::new(bytes, start, end);
    let entries = stream.by_ref().collect::<Result<Vec<_>, _>>()?;
    Ok((entries, stream.offset()))
}
