//! Starting the application processors.
//!
//! The boot processor copies a real mode trampoline in low memory, then starts the other
//! processors one at a time. Before each start, it writes two parameter words right below the
//! trampoline: the top of the stack of the processor (at `base - 8`) and the address of the
//! kernel entry point (at `base - 16`). The trampoline switches to long mode, loads the stack
//! and jumps to the entry point, which ends up in [`ap_entry`]. The boot processor waits for the
//! processor to acknowledge its startup before reusing the parameter words for the next one.
use crate::{
    config,
    memory::{DirectMap, OutOfRange, PhysicalMemory},
    topology::{ApicId, Processor, Topology},
    x86_64::{self, lapic::Lapic},
};
use addr::{Physical, Virtual};
use core::sync::atomic::{AtomicBool, Ordering};
use macros::init;
use sync::Once;
use typed_builder::TypedBuilder;

/// Offset below the trampoline base of the stack top parameter word.
pub const STACK_WORD_OFFSET: u64 = 8;

/// Offset below the trampoline base of the entry point parameter word.
pub const ENTRY_WORD_OFFSET: u64 = 16;

/// The first address a STARTUP IPI cannot reach.
const REAL_MODE_LIMIT: u64 = 0x10_0000;

static TOPOLOGY: Once<Topology> = Once::new();
static HANDOFF: Once<Handoff> = Once::new();

/// Wakes up a processor and makes it execute the trampoline.
pub trait StartupSignal {
    /// Start the processor identified by `target` at the trampoline located at `trampoline`.
    /// This only sends the signal and returns: it does not wait for the processor.
    ///
    /// # Safety
    /// The target must be a processor that has not been started yet, and a valid trampoline
    /// must be installed at `trampoline`.
    unsafe fn startup(&mut self, target: ApicId, trampoline: Physical);
}

/// Why the application processors could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmpError {
    /// Processors were found but none of them is the boot processor.
    NoBootProcessor,

    /// An application processor has no stack to start on.
    MissingStack { apic_id: ApicId },

    /// The trampoline is not page aligned, does not fit below 1 MiB, or leaves no room below it
    /// for the parameter words.
    BadTrampolineBase(Physical),

    /// The trampoline or its parameters could not be written.
    Memory(OutOfRange),
}

impl From<OutOfRange> for SmpError {
    fn from(error: OutOfRange) -> Self {
        Self::Memory(error)
    }
}

/// The real mode code executed by the application processors.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct Trampoline<'a> {
    #[builder(default = config::TRAMPOLINE_BASE)]
    base: Physical,
    code: &'a [u8],
}

impl<'a> Trampoline<'a> {
    #[must_use]
    pub fn base(&self) -> Physical {
        self.base
    }

    #[must_use]
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    /// The STARTUP IPI vector, which is the page number of the trampoline.
    #[must_use]
    pub fn vector(&self) -> u8 {
        self.base.frame_index() as u8
    }

    /// Check that a STARTUP IPI can reach the trampoline and that the parameter words fit
    /// below it.
    fn check(&self) -> Result<(), SmpError> {
        let end = self.base.as_u64() + self.code.len() as u64;
        if !self.base.is_page_aligned()
            || end > REAL_MODE_LIMIT
            || self.base.as_u64() < ENTRY_WORD_OFFSET
        {
            return Err(SmpError::BadTrampolineBase(self.base));
        }
        Ok(())
    }

    /// Copy the trampoline code at its base address.
    ///
    /// # Errors
    /// Fails if the base address is unsuitable or the memory cannot be written.
    pub fn install<M: PhysicalMemory>(&self, memory: &mut M) -> Result<(), SmpError> {
        self.check()?;
        memory.write(self.base, self.code)?;
        Ok(())
    }

    /// Write the parameter words for the next processor to start.
    ///
    /// # Errors
    /// Fails if the base address is unsuitable or the memory cannot be written.
    pub fn arm<M: PhysicalMemory>(
        &self,
        memory: &mut M,
        stack_top: Virtual,
        entry: u64,
    ) -> Result<(), SmpError> {
        self.check()?;
        let stack_word = self.base - STACK_WORD_OFFSET;
        let entry_word = self.base - ENTRY_WORD_OFFSET;
        memory.write(stack_word, &stack_top.as_u64().to_le_bytes())?;
        memory.write(entry_word, &entry.to_le_bytes())?;
        Ok(())
    }
}

/// Start every processor of the topology except the boot one, in topology order. Each processor
/// is signaled only once the previous one has acknowledged its startup, so the parameter words
/// below the trampoline are never overwritten while a processor may still read them.
///
/// Returns the number of processors started. An empty topology, or one with only the boot
/// processor, returns 0 without writing any memory or sending any signal.
///
/// There is no timeout: a processor that never acknowledges hangs the boot processor.
///
/// # Errors
/// See [`SmpError`]. Errors are detected before any processor is signaled.
///
/// # Safety
/// `entry` must be the address of a function that never returns and acknowledges the startup
/// of the processor running it. The memory under the trampoline must not be used by anything
/// else.
pub unsafe fn boot<M, S>(
    topology: &Topology,
    trampoline: &Trampoline,
    entry: u64,
    memory: &mut M,
    signal: &mut S,
) -> Result<usize, SmpError>
where
    M: PhysicalMemory,
    S: StartupSignal,
{
    if topology.is_empty() {
        return Ok(0);
    }

    let bsp = topology.bsp_index().ok_or(SmpError::NoBootProcessor)?;
    let aps = || {
        topology
            .processors()
            .iter()
            .enumerate()
            .filter(move |&(index, _)| index != bsp)
            .map(|(_, cpu)| cpu)
    };

    if aps().next().is_none() {
        return Ok(0);
    }

    if let Some(cpu) = aps().find(|cpu| cpu.stack().is_none()) {
        return Err(SmpError::MissingStack {
            apic_id: cpu.apic_id(),
        });
    }

    trampoline.install(memory)?;
    log::debug!(
        "Trampoline installed at {} ({} bytes, vector {:#x})",
        trampoline.base(),
        trampoline.code().len(),
        trampoline.vector()
    );

    let mut started = 0;
    for cpu in aps() {
        let stack = cpu.stack().ok_or(SmpError::MissingStack {
            apic_id: cpu.apic_id(),
        })?;

        trampoline.arm(memory, stack.top(), entry)?;
        signal.startup(cpu.apic_id(), trampoline.base());
        cpu.wait_booted();

        log::info!("Processor {} started", cpu.apic_id());
        started += 1;
    }

    Ok(started)
}

/// What the application processors need once they run kernel code.
#[derive(TypedBuilder)]
pub struct Handoff {
    /// The real mode trampoline, copied at [`config::TRAMPOLINE_BASE`].
    trampoline: &'static [u8],

    /// Called on each application processor before it acknowledges its startup.
    #[builder(default = noop as fn(&Processor))]
    setup: fn(&Processor),

    /// Where the application processors go after their startup.
    main: fn() -> !,
}

fn noop(_: &Processor) {}

/// Register what the application processors run once started. Only the first registration
/// is kept.
pub fn register(handoff: Handoff) -> &'static Handoff {
    keep_first(&HANDOFF, handoff, "handoff")
}

/// Publish the topology for the rest of the kernel. Only the first topology published is
/// kept, later ones are dropped.
pub fn publish(topology: Topology) -> &'static Topology {
    keep_first(&TOPOLOGY, topology, "topology")
}

/// Store `value` in `cell` unless it already holds one, and return what `cell` holds.
fn keep_first<'a, T>(cell: &'a Once<T>, value: T, what: &str) -> &'a T {
    if cell.is_completed() {
        log::warn!("A {} is already set, ignoring the new one", what);
    }
    cell.call_once(|| value)
}

/// The published topology, if any.
#[must_use]
pub fn topology() -> Option<&'static Topology> {
    TOPOLOGY.get()
}

/// Start the application processors of the published topology with the registered handoff.
/// Calling this function more than once does nothing.
///
/// # Safety
/// The local APIC and the low memory must be reachable through the direct map, and the low
/// memory under and at [`config::TRAMPOLINE_BASE`] must be free.
#[init]
pub unsafe fn start_cpus() {
    static STARTED: AtomicBool = AtomicBool::new(false);
    if STARTED.swap(true, Ordering::AcqRel) {
        log::warn!("Application processors already started");
        return;
    }

    let Some(topology) = TOPOLOGY.get() else {
        log::warn!("No topology published, running uniprocessor");
        return;
    };
    let Some(handoff) = HANDOFF.get() else {
        log::warn!("No handoff registered, running uniprocessor");
        return;
    };

    let trampoline = Trampoline::builder().code(handoff.trampoline).build();
    let mut memory = DirectMap::new();
    let mut lapic = Lapic::from_physical(topology.lapic_base());

    match boot(
        topology,
        &trampoline,
        ap_entry as *const () as usize as u64,
        &mut memory,
        &mut lapic,
    ) {
        Ok(0) => log::info!("No application processor to start"),
        Ok(count) => log::info!("{} application processor(s) started", count),
        Err(error) => log::error!("Cannot start the application processors: {:?}", error),
    }
}

/// Where the trampoline jumps once the processor runs in long mode on its own stack.
#[no_mangle]
extern "C" fn ap_entry() -> ! {
    let (Some(topology), Some(handoff)) = (TOPOLOGY.get(), HANDOFF.get()) else {
        x86_64::freeze();
    };

    // SAFETY: the boot processor reached this processor through the same mapping.
    let lapic = unsafe { Lapic::from_physical(topology.lapic_base()) };
    let Some(cpu) = topology.find(lapic.id()) else {
        log::error!("Processor {} is not in the topology", lapic.id());
        x86_64::freeze();
    };

    (handoff.setup)(cpu);
    cpu.acknowledge();
    (handoff.main)()
}
