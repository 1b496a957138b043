//! Validation of the MP configuration table referenced by the floating pointer.
use super::{
    entry::{self, Entries, Entry},
    floating::FloatingPointer,
    MpError,
};
use crate::memory::{checksum, read_record, PhysicalMemory};
use addr::Physical;

/// The signature at the start of the configuration table header.
pub const SIGNATURE: [u8; 4] = *b"PCMP";

/// The size of the fixed header, after which the entries start.
pub const HEADER_SIZE: usize = core::mem::size_of::<RawHeader>();

/// The table versions this code understands (MP specification 1.1 and 1.4).
pub const VERSIONS: [u8; 2] = [1, 4];

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct RawHeader {
    signature: [u8; 4],
    length: u16,
    version: u8,
    checksum: u8,
    oem_id: [u8; 8],
    product_id: [u8; 12],
    oem_table: u32,
    oem_table_size: u16,
    entry_count: u16,
    lapic_base: u32,
    extended_length: u16,
    extended_checksum: u8,
    reserved: u8,
}

/// The decoded header of a configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    pub length: u16,
    pub version: u8,
    pub checksum: u8,
    pub oem_id: [u8; 8],
    pub product_id: [u8; 12],
    pub oem_table: u32,
    pub oem_table_size: u16,
    /// The number of entries announced by the firmware. The parser does not rely on it.
    pub entry_count: u16,
    pub lapic_base: Physical,
    pub extended_length: u16,
    pub extended_checksum: u8,
}

impl From<RawHeader> for TableHeader {
    fn from(raw: RawHeader) -> Self {
        Self {
            length: raw.length,
            version: raw.version,
            checksum: raw.checksum,
            oem_id: raw.oem_id,
            product_id: raw.product_id,
            oem_table: raw.oem_table,
            oem_table_size: raw.oem_table_size,
            entry_count: raw.entry_count,
            lapic_base: Physical::from(raw.lapic_base),
            extended_length: raw.extended_length,
            extended_checksum: raw.extended_checksum,
        }
    }
}

/// A configuration table whose signature, checksum and version have been checked.
#[derive(Debug, Clone, Copy)]
pub struct ConfigTable<'a> {
    location: Physical,
    header: TableHeader,
    bytes: &'a [u8],
}

impl<'a> ConfigTable<'a> {
    /// Check the table stored in `bytes`, which must start with the header and span at least
    /// the length declared by the header. Extra bytes are ignored.
    ///
    /// # Errors
    /// - [`MpError::TableNotFound`] if `bytes` is shorter than the header or the declared length.
    /// - [`MpError::BadSignature`] if the header does not start with `PCMP`.
    /// - [`MpError::BadChecksumOrVersion`] if the declared length is smaller than the header,
    ///   the bytes of the table do not sum to zero or the version is not supported.
    pub fn parse(location: Physical, bytes: &'a [u8]) -> Result<Self, MpError> {
        let raw: RawHeader = read_record(bytes, 0).ok_or(MpError::TableNotFound)?;
        if raw.signature != SIGNATURE {
            return Err(MpError::BadSignature);
        }

        let length = usize::from(raw.length);
        if length < HEADER_SIZE {
            return Err(MpError::BadChecksumOrVersion);
        }

        let bytes = bytes.get(..length).ok_or(MpError::TableNotFound)?;
        if checksum(bytes) != 0 || !VERSIONS.contains(&raw.version) {
            return Err(MpError::BadChecksumOrVersion);
        }

        Ok(Self {
            location,
            header: TableHeader::from(raw),
            bytes,
        })
    }

    #[must_use]
    pub fn location(&self) -> Physical {
        self.location
    }

    #[must_use]
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// The whole table, header included, exactly `header().length` bytes long.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Iterate over the entries that follow the header.
    #[must_use]
    pub fn entries(&self) -> Entries<'a> {
        Entries::new(self.bytes, HEADER_SIZE, self.bytes.len())
    }

    /// Collect every entry of the table.
    ///
    /// # Errors
    /// See [`entry::parse`].
    pub fn parse_entries(&self) -> Result<alloc::vec::Vec<Entry>, MpError> {
        entry::parse(self.bytes, HEADER_SIZE, self.bytes.len()).map(|(entries, _)| entries)
    }
}

/// Find and check the configuration table referenced by `mp`.
///
/// # Errors
/// - [`MpError::TableNotFound`] if the floating pointer does not reference a table (default
///   configurations are not supported) or the table is not readable.
/// - [`MpError::BadSignature`] or [`MpError::BadChecksumOrVersion`], see
///   [`ConfigTable::parse`].
pub fn validate<'m, M: PhysicalMemory>(
    memory: &'m M,
    mp: &FloatingPointer,
) -> Result<ConfigTable<'m>, MpError> {
    let location = mp.table().ok_or(MpError::TableNotFound)?;
    let header = memory
        .read(location, HEADER_SIZE)
        .ok_or(MpError::TableNotFound)?;

    // Read the declared length only, so a table at the very end of readable memory is fine.
    let length = match read_record::<RawHeader>(header, 0) {
        Some(raw) if raw.signature == SIGNATURE => usize::from(raw.length).max(HEADER_SIZE),
        _ => HEADER_SIZE,
    };
    let bytes = memory.read(location, length).ok_or(MpError::TableNotFound)?;
    let table = ConfigTable::parse(location, bytes)?;

    check_extended(memory, &table);
    Ok(table)
}

/// The extended entries following the base table have their own checksum. Nothing here uses
/// the extended entries, so a mismatch is only reported. Returns `false` on a mismatch or if
/// the extended entries cannot be read.
fn check_extended<M: PhysicalMemory>(memory: &M, table: &ConfigTable<'_>) -> bool {
    let header = table.header();
    if header.extended_length == 0 {
        return true;
    }

    let base = table.location() + usize::from(header.length);
    match memory.read(base, usize::from(header.extended_length)) {
        Some(extended) if checksum(extended).wrapping_add(header.extended_checksum) == 0 => true,
        Some(_) => {
            log::warn!("MP extended table checksum mismatch, ignoring extended entries");
            false
        }
        None => {
            log::warn!("MP extended table at {} is not readable", base);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{floating_pointer, BufferMemory, TableBuilder};

    const TABLE: u32 = 0x9_0000;

    fn memory_with(table: &[u8]) -> (BufferMemory, FloatingPointer) {
        let mut memory = BufferMemory::new(Physical::null(), 0x10_0000);
        memory.write(Physical::from(TABLE), table).unwrap();
        let mp = FloatingPointer::parse(Physical::new(0xF0000), &floating_pointer(TABLE, false))
            .unwrap();
        (memory, mp)
    }

    fn sample() -> Vec<u8> {
        TableBuilder::new()
            .processor(0, true)
            .processor(1, false)
            .bus(0, b"ISA   ")
            .io_apic(2)
            .build()
    }

    #[test]
    fn valid_table_is_accepted() {
        let bytes = sample();
        let (memory, mp) = memory_with(&bytes);

        let table = validate(&memory, &mp).unwrap();
        assert_eq!(table.location(), Physical::from(TABLE));
        assert_eq!(usize::from(table.header().length), bytes.len());
        assert_eq!(table.header().lapic_base, Physical::new(0xFEE0_0000));
        assert_eq!(table.header().entry_count, 4);
        assert_eq!(table.bytes().len(), bytes.len());
    }

    #[test]
    fn zero_table_pointer_is_not_found() {
        let (memory, _) = memory_with(&sample());
        let mp = FloatingPointer::parse(Physical::new(0xF0000), &floating_pointer(0, false))
            .unwrap();
        assert_eq!(validate(&memory, &mp).unwrap_err(), MpError::TableNotFound);
    }

    #[test]
    fn table_outside_memory_is_not_found() {
        let memory = BufferMemory::new(Physical::null(), 0x1000);
        let mp = FloatingPointer::parse(Physical::new(0xF0000), &floating_pointer(TABLE, false))
            .unwrap();
        assert_eq!(validate(&memory, &mp).unwrap_err(), MpError::TableNotFound);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut bytes = sample();
        bytes[..4].copy_from_slice(b"PCMQ");
        let (memory, mp) = memory_with(&bytes);
        assert_eq!(validate(&memory, &mp).unwrap_err(), MpError::BadSignature);
    }

    #[test]
    fn every_single_byte_corruption_is_detected() {
        let bytes = sample();
        for index in 0..bytes.len() {
            // Skip the signature: a corrupted signature is reported as such
            if index < 4 {
                continue;
            }
            for delta in [1u8, 0x80, 0xFF] {
                let mut corrupted = bytes.clone();
                corrupted[index] = corrupted[index].wrapping_add(delta);
                assert!(
                    ConfigTable::parse(Physical::from(TABLE), &corrupted).is_err(),
                    "corruption at byte {index} (+{delta:#x}) went unnoticed"
                );
            }
        }
    }

    #[test]
    fn unsupported_version_is_rejected() {
        for version in [0u8, 2, 3, 5] {
            let bytes = TableBuilder::new().version(version).processor(0, true).build();
            let (memory, mp) = memory_with(&bytes);
            assert_eq!(
                validate(&memory, &mp).unwrap_err(),
                MpError::BadChecksumOrVersion
            );
        }
    }

    #[test]
    fn supported_versions_are_accepted() {
        for version in VERSIONS {
            let bytes = TableBuilder::new().version(version).processor(0, true).build();
            let (memory, mp) = memory_with(&bytes);
            assert_eq!(validate(&memory, &mp).unwrap().header().version, version);
        }
    }

    #[test]
    fn length_shorter_than_header_is_rejected() {
        let mut bytes = TableBuilder::new().build();
        bytes[4..6].copy_from_slice(&8u16.to_le_bytes());
        assert_eq!(
            ConfigTable::parse(Physical::from(TABLE), &bytes).unwrap_err(),
            MpError::BadChecksumOrVersion
        );
    }

    #[test]
    fn length_beyond_available_bytes_is_not_found() {
        let bytes = sample();
        assert_eq!(
            ConfigTable::parse(Physical::from(TABLE), &bytes[..bytes.len() - 1]).unwrap_err(),
            MpError::TableNotFound
        );
    }

    #[test]
    fn only_the_declared_length_is_checksummed() {
        let mut bytes = sample();
        bytes.extend_from_slice(&[0xAA; 16]);
        let table = ConfigTable::parse(Physical::from(TABLE), &bytes).unwrap();
        assert_eq!(table.bytes().len(), bytes.len() - 16);
    }

    /// A table followed by sixteen extended bytes of value 1, announced with `checksum`.
    fn with_extended(checksum: u8) -> (BufferMemory, FloatingPointer, usize) {
        let mut bytes = sample();
        bytes[40..42].copy_from_slice(&16u16.to_le_bytes());
        bytes[42] = checksum;
        TableBuilder::fix_checksum(&mut bytes);

        let (mut memory, mp) = memory_with(&bytes);
        memory
            .write(Physical::from(TABLE) + bytes.len(), &[0x01; 16])
            .unwrap();
        (memory, mp, bytes.len())
    }

    #[test]
    fn matching_extended_checksum_is_accepted() {
        let (memory, mp, length) = with_extended(0xF0);

        let table = validate(&memory, &mp).unwrap();
        assert_eq!(table.header().extended_length, 16);
        assert_eq!(table.bytes().len(), length);
        assert!(check_extended(&memory, &table));
    }

    #[test]
    fn extended_checksum_mismatch_is_not_fatal() {
        let (memory, mp, _) = with_extended(0x55);

        let table = validate(&memory, &mp).unwrap();
        assert_eq!(table.header().extended_checksum, 0x55);
        assert!(!check_extended(&memory, &table));
        assert_eq!(table.parse_entries().unwrap().len(), 4);
    }

    #[test]
    fn unreadable_extended_table_is_not_fatal() {
        let mut bytes = sample();
        bytes[40..42].copy_from_slice(&0x8000u16.to_le_bytes());
        TableBuilder::fix_checksum(&mut bytes);
        let mut memory = BufferMemory::new(Physical::null(), TABLE as usize + bytes.len());
        memory.write(Physical::from(TABLE), &bytes).unwrap();
        let mp = FloatingPointer::parse(Physical::new(0xF0000), &floating_pointer(TABLE, false))
            .unwrap();

        let table = validate(&memory, &mp).unwrap();
        assert!(!check_extended(&memory, &table));
    }
}
