//! Discovery of the processor topology from the MP configuration table.
//!
//! The discovery runs in four steps: find the floating pointer, validate the configuration
//! table it points to, decode the entries of the table, and build the [`Topology`] from them.
//! If the firmware asks for it, interrupts are then rerouted from the PIC to the APIC.
use crate::{
    memory::{DirectMap, PhysicalMemory},
    smp,
    topology::Topology,
    x86_64::imcr::{self, Imcr, ImcrPorts},
};
use macros::init;
use sync::Once;

pub mod bus;
pub mod entry;
pub mod floating;
pub mod table;

pub use floating::FloatingPointer;
pub use table::ConfigTable;

/// Why no topology could be derived from the firmware tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpError {
    /// No floating pointer was found, it references a default configuration, or the
    /// configuration table is not readable.
    TableNotFound,

    /// The configuration table does not start with the `PCMP` signature.
    BadSignature,

    /// The configuration table checksum is not zero, its length is smaller than its header, or
    /// its version is not supported.
    BadChecksumOrVersion,

    /// An entry has a tag that is not defined by the MP standard. Its length is unknown, so
    /// the rest of the table cannot be decoded.
    UnrecognizedEntry { kind: u8, offset: usize },

    /// An entry extends past the end of the table.
    TruncatedEntry { kind: u8, offset: usize },
}

/// The result of a successful discovery.
#[derive(Debug)]
pub struct Discovery {
    pub floating: FloatingPointer,
    pub topology: Topology,
}

/// Locate, validate and decode the MP tables, and build the processor topology.
///
/// # Errors
/// See [`MpError`]. Nothing is returned on error, not even the processors decoded before an
/// unrecognized or truncated entry.
pub fn discover<M: PhysicalMemory>(memory: &M) -> Result<Discovery, MpError> {
    let floating = floating::search(memory).ok_or(MpError::TableNotFound)?;
    log::info!(
        "MP floating pointer at {}: revision 1.{}, IMCR {}",
        floating.location(),
        floating.revision(),
        if floating.imcr_present() { "present" } else { "absent" }
    );

    let table = table::validate(memory, &floating)?;
    let header = table.header();
    log::debug!("Local APIC registers at {}", header.lapic_base);

    let entries = table.parse_entries()?;
    if entries.len() != usize::from(header.entry_count) {
        log::warn!(
            "MP table announces {} entries but contains {}",
            header.entry_count,
            entries.len()
        );
    }

    let topology = Topology::from_entries(header.lapic_base, entries);
    Ok(Discovery { floating, topology })
}

/// Discover the topology and switch the interrupt routing to the APIC if the firmware asks
/// for it. Any failure is logged and results in an empty topology: the kernel then keeps
/// running on the boot processor alone.
///
/// The IMCR is only touched once the topology has been fully built. Since writing it is not
/// idempotent, this function must not run more than once per boot.
pub fn init<M, I>(memory: &M, imcr: &mut I) -> Topology
where
    M: PhysicalMemory,
    I: Imcr,
{
    let discovery = match discover(memory) {
        Ok(discovery) => discovery,
        Err(error) => {
            log::warn!("No usable MP configuration ({:?}), running uniprocessor", error);
            return Topology::empty();
        }
    };

    if discovery.floating.imcr_present() {
        log::info!("Switching interrupt routing from the PIC to the APIC");
        // SAFETY: the firmware told us the IMCR exists, and this runs once per boot.
        unsafe { imcr::route_through_apic(imcr) };
    }

    let topology = discovery.topology;
    match topology.bsp_index() {
        Some(bsp) => log::info!("{} processor(s) found, boot processor {}", topology.len(), bsp),
        None => log::warn!(
            "{} processor(s) found but none is flagged as the boot processor",
            topology.len()
        ),
    }
    topology
}

/// Discover the topology of the machine and publish it for the rest of the kernel. Calling
/// this function more than once returns the topology published by the first call.
///
/// # Safety
/// The whole physical memory must be mapped in the direct map, and the BIOS data area, EBDA
/// and BIOS ROM must still contain what the firmware left there.
#[init]
pub unsafe fn setup() -> &'static Topology {
    static DONE: Once<&'static Topology> = Once::new();
    DONE.call_once(|| {
        let memory = DirectMap::new();
        let mut ports = ImcrPorts::new();
        smp::publish(init(&memory, &mut ports))
    })
}
