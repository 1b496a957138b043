//! Fake machines for the unit tests: a byte buffer standing for physical memory, a builder of
//! MP tables, and recording stand-ins for the IMCR and the startup signal.
use crate::{
    memory::{checksum, OutOfRange, PhysicalMemory},
    mp::{entry, floating, table},
    smp::StartupSignal,
    topology::{ApicId, Topology},
    x86_64::imcr::Imcr,
};
use addr::Physical;
use std::{cell::RefCell, rc::Rc};

/// Where [`install_table`] places the configuration table.
pub const TABLE_ADDRESS: u64 = 0x9_0000;

/// Where [`install_table`] places the floating pointer, inside the BIOS ROM region.
pub const FLOATING_ADDRESS: u64 = 0xF_0000;

/// Physical memory backed by a byte buffer covering `[base, base + size)`.
pub struct BufferMemory {
    base: Physical,
    bytes: Vec<u8>,
}

impl BufferMemory {
    pub fn new(base: Physical, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    fn range(&self, base: Physical, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(base.as_u64().checked_sub(self.base.as_u64())?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.bytes.len()).then_some(start..end)
    }
}

impl PhysicalMemory for BufferMemory {
    fn read(&self, base: Physical, len: usize) -> Option<&[u8]> {
        self.range(base, len).map(|range| &self.bytes[range])
    }

    fn write(&mut self, base: Physical, bytes: &[u8]) -> Result<(), OutOfRange> {
        let len = bytes.len();
        let range = self.range(base, len).ok_or(OutOfRange { base, len })?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}

/// A valid floating pointer record, revision 1.4, pointing at `table`.
pub fn floating_pointer(table: u32, imcr: bool) -> [u8; floating::SIZE] {
    let mut record = [0u8; floating::SIZE];
    record[..4].copy_from_slice(&floating::SIGNATURE);
    record[4..8].copy_from_slice(&table.to_le_bytes());
    record[8] = 1;
    record[9] = 4;
    record[12] = if imcr { 0x80 } else { 0 };
    record[10] = 0u8.wrapping_sub(checksum(&record));
    record
}

/// Builds the bytes of a configuration table, header included, with a correct checksum.
pub struct TableBuilder {
    version: u8,
    count: u16,
    entries: Vec<u8>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            version: 4,
            count: 0,
            entries: Vec::new(),
        }
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    fn push(mut self, record: &[u8]) -> Self {
        self.entries.extend_from_slice(record);
        self.count += 1;
        self
    }

    pub fn processor(self, apic_id: u8, bootstrap: bool) -> Self {
        let mut record = [0u8; 20];
        record[1] = apic_id;
        record[2] = 0x14;
        record[3] = if bootstrap { 0b11 } else { 0b01 };
        record[4..8].copy_from_slice(&0x0000_0663u32.to_le_bytes());
        record[8..12].copy_from_slice(&0x0000_0201u32.to_le_bytes());
        self.push(&record)
    }

    pub fn bus(self, id: u8, name: &[u8; 6]) -> Self {
        let mut record = [1u8, id, 0, 0, 0, 0, 0, 0];
        record[2..].copy_from_slice(name);
        self.push(&record)
    }

    pub fn io_apic(self, id: u8) -> Self {
        let mut record = [2u8, id, 0x11, 0x01, 0, 0, 0, 0];
        record[4..].copy_from_slice(&0xFEC0_0000u32.to_le_bytes());
        self.push(&record)
    }

    pub fn io_interrupt(
        self,
        interrupt: u8,
        irq: u8,
        destination: u8,
        pin: u8,
        flags: u16,
    ) -> Self {
        let [low, high] = flags.to_le_bytes();
        self.push(&[3, interrupt, low, high, 0, irq, destination, pin])
    }

    pub fn local_interrupt(self, interrupt: u8, irq: u8, destination: u8, pin: u8) -> Self {
        self.push(&[4, interrupt, 0, 0, 0, irq, destination, pin])
    }

    pub fn build(self) -> Vec<u8> {
        let length = table::HEADER_SIZE + self.entries.len();
        let mut bytes = vec![0u8; table::HEADER_SIZE];
        bytes[..4].copy_from_slice(&table::SIGNATURE);
        bytes[4..6].copy_from_slice(&(length as u16).to_le_bytes());
        bytes[6] = self.version;
        bytes[8..16].copy_from_slice(b"MPBOOT  ");
        bytes[16..28].copy_from_slice(b"TEST MACHINE");
        bytes[34..36].copy_from_slice(&self.count.to_le_bytes());
        bytes[36..40].copy_from_slice(&0xFEE0_0000u32.to_le_bytes());
        bytes.extend_from_slice(&self.entries);
        Self::fix_checksum(&mut bytes);
        bytes
    }

    /// Recompute the checksum byte after the table has been modified.
    pub fn fix_checksum(bytes: &mut [u8]) {
        bytes[7] = 0;
        bytes[7] = 0u8.wrapping_sub(checksum(bytes));
    }
}

/// Write `table` at [`TABLE_ADDRESS`] and a floating pointer to it in the BIOS ROM.
pub fn install_table(memory: &mut BufferMemory, table: &[u8], imcr: bool) {
    memory.write(Physical::new(TABLE_ADDRESS), table).unwrap();
    memory
        .write(
            Physical::new(FLOATING_ADDRESS),
            &floating_pointer(TABLE_ADDRESS as u32, imcr),
        )
        .unwrap();
}

/// Decode the table built by `table` into a topology.
pub fn topology_of(table: TableBuilder) -> Topology {
    let bytes = table.build();
    let (entries, _) = entry::parse(&bytes, table::HEADER_SIZE, bytes.len()).unwrap();
    Topology::from_entries(Physical::new(0xFEE0_0000), entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImcrOp {
    Select(u8),
    Read(u8),
    Write(u8),
}

/// An IMCR holding a single register, recording every access.
pub struct RecordingImcr {
    value: u8,
    ops: Vec<ImcrOp>,
}

impl RecordingImcr {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[ImcrOp] {
        &self.ops
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

impl Imcr for RecordingImcr {
    unsafe fn select(&mut self, register: u8) {
        self.ops.push(ImcrOp::Select(register));
    }

    unsafe fn read(&mut self) -> u8 {
        self.ops.push(ImcrOp::Read(self.value));
        self.value
    }

    unsafe fn write(&mut self, value: u8) {
        self.ops.push(ImcrOp::Write(value));
        self.value = value;
    }
}

/// What the sequencer did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(Physical, Vec<u8>),
    Startup(ApicId, Physical),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Low memory that records every write in a shared log.
pub struct RecordingMemory {
    inner: BufferMemory,
    log: EventLog,
}

impl RecordingMemory {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: BufferMemory::new(Physical::null(), 0x10_0000),
            log,
        }
    }
}

impl PhysicalMemory for RecordingMemory {
    fn read(&self, base: Physical, len: usize) -> Option<&[u8]> {
        self.inner.read(base, len)
    }

    fn write(&mut self, base: Physical, bytes: &[u8]) -> Result<(), OutOfRange> {
        self.inner.write(base, bytes)?;
        self.log.borrow_mut().push(Event::Write(base, bytes.to_vec()));
        Ok(())
    }
}

/// A startup signal that records each startup in a shared log, and makes the target
/// acknowledge immediately, as if it had run the trampoline.
pub struct RecordingSignal<'a> {
    topology: &'a Topology,
    log: EventLog,
}

impl<'a> RecordingSignal<'a> {
    pub fn new(topology: &'a Topology, log: EventLog) -> Self {
        Self { topology, log }
    }
}

impl StartupSignal for RecordingSignal<'_> {
    unsafe fn startup(&mut self, target: ApicId, trampoline: Physical) {
        self.log.borrow_mut().push(Event::Startup(target, trampoline));
        self.topology
            .find(target)
            .expect("signaled a processor outside the topology")
            .acknowledge();
    }
}
