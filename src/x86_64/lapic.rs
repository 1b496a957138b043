use super::io;
use crate::{smp::StartupSignal, topology::ApicId};
use addr::{Physical, Virtual};

/// Represents the local APIC registers used during the bring-up. The values are the offsets from
/// the base address of the local APIC.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Id = 0x0020,
    Version = 0x0030,
    ErrorStatus = 0x0280,
    InterruptCommand0 = 0x0300,
    InterruptCommand1 = 0x0310,
}

/// The delivery mode field of the interrupt command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Init = 5,
    Startup = 6,
}

/// Level field of the interrupt command register (assert when set).
const LEVEL_ASSERT: u32 = 1 << 14;

/// Trigger mode field of the interrupt command register (level triggered when set).
const TRIGGER_LEVEL: u32 = 1 << 15;

/// Delivery status field of the interrupt command register, set while an IPI is pending.
const DELIVERY_PENDING: u32 = 1 << 12;

/// How long to wait after the INIT IPI before sending the STARTUP IPIs, in microseconds.
const INIT_DELAY_US: u32 = 10_000;

/// How long to wait after each STARTUP IPI, in microseconds.
const STARTUP_DELAY_US: u32 = 200;

/// The local APIC of the current core, reached through its memory mapped registers. Every core
/// sees its own local APIC at the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lapic {
    base: Virtual,
}

impl Lapic {
    /// Create a new handle on the local APIC whose registers are mapped at `base`.
    ///
    /// # Safety
    /// The caller must ensure that the local APIC registers are mapped at `base` with caching
    /// disabled, and stay mapped as long as this handle is used.
    #[must_use]
    pub const unsafe fn new(base: Virtual) -> Self {
        Self { base }
    }

    /// Create a handle on the local APIC through the direct map.
    ///
    /// # Safety
    /// See [`Lapic::new`]. The physical address `base` must be mapped in the direct map.
    #[must_use]
    pub unsafe fn from_physical(base: Physical) -> Self {
        Self::new(Virtual::from(base))
    }

    /// Return the id of the local APIC of the current core.
    #[must_use]
    pub fn id(&self) -> ApicId {
        // SAFETY: reading the ID register has no side effect.
        let id = unsafe { self.read(Register::Id) };
        ApicId((id >> 24) as u8)
    }

    /// Return the version of the local APIC. Values below `0x10` are discrete 82489DX APICs.
    #[must_use]
    pub fn version(&self) -> u8 {
        // SAFETY: reading the version register has no side effect.
        unsafe { self.read(Register::Version) as u8 }
    }

    /// Send an INIT IPI to the given core, then deassert it. Even if modern processors ignore
    /// the deassert, older ones with a discrete APIC require it.
    ///
    /// # Safety
    /// This resets the target core: it must not be running anything we care about.
    pub unsafe fn send_init(&mut self, target: ApicId) {
        self.clear_errors();
        self.send(target, Delivery::Init, LEVEL_ASSERT | TRIGGER_LEVEL, 0);
        self.send(target, Delivery::Init, TRIGGER_LEVEL, 0);
    }

    /// Send a STARTUP IPI to the given core. The core starts executing in real mode at the
    /// address `vector << 12`.
    ///
    /// # Safety
    /// The target core must be waiting for a STARTUP IPI after an INIT IPI, and valid real mode
    /// code must be present at the page designated by `vector`.
    pub unsafe fn send_startup(&mut self, target: ApicId, vector: u8) {
        self.clear_errors();
        self.send(target, Delivery::Startup, LEVEL_ASSERT, vector);
    }

    /// Send an IPI and wait until the local APIC has accepted it.
    unsafe fn send(&mut self, target: ApicId, delivery: Delivery, flags: u32, vector: u8) {
        let command = u32::from(vector) | (delivery as u32) << 8 | flags;

        self.write(Register::InterruptCommand1, u32::from(target.0) << 24);
        self.write(Register::InterruptCommand0, command);

        // Wait for the IPI to be sent
        while self.read(Register::InterruptCommand0) & DELIVERY_PENDING != 0 {
            core::hint::spin_loop();
        }
    }

    /// The error status register must be written before being read, and clearing it before an
    /// IPI makes any error reported afterward relevant to that IPI.
    unsafe fn clear_errors(&mut self) {
        self.write(Register::ErrorStatus, 0);
        let status = self.read(Register::ErrorStatus);
        if status != 0 {
            log::debug!("Local APIC error status {:#x} cleared", status);
        }
    }

    /// Write the given value to the given register.
    ///
    /// # Safety
    /// This function is unsafe because writing to a register can have side effects and may break
    /// the memory safety of the program, or may crash the kernel if used improperly.
    pub unsafe fn write(&mut self, register: Register, value: u32) {
        let ptr = (self.base + register as usize).as_mut_ptr::<u32>();
        ptr.write_volatile(value);
    }

    /// Read the value of the given register.
    ///
    /// # Safety
    /// This function is unsafe because reading to a register can have side effects and may break
    /// the memory safety of the program, or may crash the kernel if used improperly.
    #[must_use]
    pub unsafe fn read(&self, register: Register) -> u32 {
        let ptr = (self.base + register as usize).as_ptr::<u32>();
        ptr.read_volatile()
    }
}

impl StartupSignal for Lapic {
    /// The INIT-SIPI-SIPI sequence from the Intel MultiProcessor specification. The second
    /// STARTUP IPI is ignored by a core that already started with the first one.
    unsafe fn startup(&mut self, target: ApicId, trampoline: Physical) {
        let vector = (trampoline.as_u64() >> 12) as u8;

        self.send_init(target);
        io::delay_us(INIT_DELAY_US);

        for _ in 0..2 {
            self.send_startup(target, vector);
            io::delay_us(STARTUP_DELAY_US);
        }
    }
}
