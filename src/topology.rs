//! The processor topology discovered from the MP table.
//!
//! A [`Topology`] is built once by the boot processor, then published and never modified
//! again, except for the boot acknowledgment flag of each processor, which is written by that
//! processor alone.
use crate::{
    config,
    mp::entry::{Entry, ProcessorEntry},
};
use addr::{Physical, Virtual};
use alloc::vec::Vec;
use core::fmt;
use sync::Flag;

pub use crate::mp::entry::ProcessorFlags;

/// The identifier of a local (or I/O) APIC, which is how a processor is addressed by IPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ApicId(pub u8);

impl fmt::Display for ApicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stack given to an application processor. The memory is leaked on purpose: once the
/// processor runs, it uses this stack forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stack {
    base: Virtual,
    size: usize,
}

impl Stack {
    /// Allocate a new stack of `size` bytes on the kernel heap.
    #[must_use]
    pub fn allocate(size: usize) -> Self {
        let region: &'static mut [u8] = alloc::vec![0u8; size].leak();
        Self {
            base: Virtual::from_ptr(region.as_ptr()),
            size,
        }
    }

    #[must_use]
    pub fn base(&self) -> Virtual {
        self.base
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The initial stack pointer, aligned on 16 bytes as required by the System V ABI.
    #[must_use]
    pub fn top(&self) -> Virtual {
        (self.base + self.size).align_down(16)
    }
}

/// A processor described by the MP table.
#[derive(Debug)]
pub struct Processor {
    apic_id: ApicId,
    apic_version: u8,
    flags: ProcessorFlags,
    stack: Option<Stack>,
    booted: Flag,
}

impl Processor {
    fn new(entry: &ProcessorEntry) -> Self {
        Self {
            apic_id: entry.apic_id,
            apic_version: entry.apic_version,
            flags: entry.flags,
            stack: None,
            booted: Flag::new(),
        }
    }

    #[must_use]
    pub fn apic_id(&self) -> ApicId {
        self.apic_id
    }

    #[must_use]
    pub fn apic_version(&self) -> u8 {
        self.apic_version
    }

    #[must_use]
    pub fn flags(&self) -> ProcessorFlags {
        self.flags
    }

    /// The stack this processor starts on. The boot processor has none: it is already running
    /// on its own stack.
    #[must_use]
    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// Return `true` once the processor has started running kernel code.
    #[must_use]
    pub fn booted(&self) -> bool {
        self.booted.is_set()
    }

    /// Spin until the processor has acknowledged its startup.
    pub fn wait_booted(&self) {
        self.booted.wait();
    }

    /// Tell the boot processor that this processor is running. Must only be called once, by
    /// the processor itself.
    pub fn acknowledge(&self) {
        self.booted.set();
    }
}

/// Every processor of the machine, in table order.
#[derive(Debug)]
pub struct Topology {
    processors: Vec<Processor>,
    bsp: Option<usize>,
    io_apic: Option<ApicId>,
    lapic_base: Physical,
}

impl Topology {
    /// A topology without any processor, used when no usable MP table exists. The caller is
    /// expected to keep running on the boot processor alone.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            processors: Vec::new(),
            bsp: None,
            io_apic: None,
            lapic_base: Physical::null(),
        }
    }

    /// Build the topology from the decoded entries of a configuration table. Processors keep
    /// the order of the table; the boot processor is the first one flagged as such, and the
    /// I/O APIC is the last one listed. Every processor but the boot one gets a stack.
    pub fn from_entries<I>(lapic_base: Physical, entries: I) -> Self
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut topology = Self {
            lapic_base,
            ..Self::empty()
        };

        for entry in entries {
            match entry {
                Entry::Processor(cpu) => {
                    log::debug!(
                        "Processor: APIC id {}, version {:#x}, flags {:?}",
                        cpu.apic_id,
                        cpu.apic_version,
                        cpu.flags
                    );
                    if cpu.is_bootstrap() && topology.bsp.is_none() {
                        topology.bsp = Some(topology.processors.len());
                    }
                    topology.processors.push(Processor::new(&cpu));
                }
                Entry::Bus(bus) => match bus.kind() {
                    Some(kind) => log::debug!("Bus {}: {:?}", bus.id, kind),
                    None => log::debug!("Bus {}: unknown type {:?}", bus.id, bus.name),
                },
                Entry::IoApic(ioapic) => {
                    log::debug!("I/O APIC: id {}, flags {:?}", ioapic.id, ioapic.flags);
                    topology.io_apic = Some(ioapic.id);
                }
                Entry::IoInterrupt(_) | Entry::LocalInterrupt(_) => {}
            }
        }

        let bsp = topology.bsp;
        topology
            .processors
            .iter_mut()
            .enumerate()
            .filter(|&(index, _)| Some(index) != bsp)
            .for_each(|(_, cpu)| cpu.stack = Some(Stack::allocate(config::AP_STACK_SIZE)));
        topology
    }

    /// The number of processors, boot processor included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    #[must_use]
    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    /// The index of the boot processor, or `None` if no processor entry carried the bootstrap
    /// flag. In that case the table is unusable for starting the other processors.
    #[must_use]
    pub fn bsp_index(&self) -> Option<usize> {
        self.bsp
    }

    #[must_use]
    pub fn bsp(&self) -> Option<&Processor> {
        self.bsp.map(|index| &self.processors[index])
    }

    /// The id of the I/O APIC. Only one I/O APIC is supported: if the table lists several, the
    /// last one wins.
    #[must_use]
    pub fn io_apic(&self) -> Option<ApicId> {
        self.io_apic
    }

    /// The physical address of the local APIC registers, shared by every processor.
    #[must_use]
    pub fn lapic_base(&self) -> Physical {
        self.lapic_base
    }

    /// Find a processor by its APIC id.
    #[must_use]
    pub fn find(&self, apic_id: ApicId) -> Option<&Processor> {
        self.processors.iter().find(|cpu| cpu.apic_id == apic_id)
    }
}
