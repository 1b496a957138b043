//! The Interrupt Mode Configuration Register of PC/AT compatible chipsets.
//!
//! Machines booting in PIC mode wire the 8259 PIC straight to the boot processor. Writing bit 0
//! of the IMCR disconnects the PIC and routes interrupts through the APICs instead.
use super::io::Port;

/// Selects which chipset register the data port reads and writes.
const SELECT_PORT: u16 = 0x22;

/// Data port of the register selected through [`SELECT_PORT`].
const DATA_PORT: u16 = 0x23;

/// Index of the IMCR in the chipset register space.
pub const IMCR_INDEX: u8 = 0x70;

/// Routes interrupts through the APIC when set in the IMCR.
pub const APIC_MODE: u8 = 0x01;

/// Access to the chipset register pair holding the IMCR.
pub trait Imcr {
    /// Select the chipset register accessed by the next [`Imcr::read`] or [`Imcr::write`].
    ///
    /// # Safety
    /// Selecting a register can change the behavior of the chipset.
    unsafe fn select(&mut self, register: u8);

    /// Read the selected register.
    ///
    /// # Safety
    /// See [`Imcr::select`].
    unsafe fn read(&mut self) -> u8;

    /// Write the selected register.
    ///
    /// # Safety
    /// Writing the IMCR changes how interrupts reach the boot processor.
    unsafe fn write(&mut self, value: u8);
}

/// The IMCR reached through I/O ports `0x22` and `0x23`.
pub struct ImcrPorts {
    select: Port,
    data: Port,
}

impl ImcrPorts {
    /// Create a new handle on the IMCR ports.
    ///
    /// # Safety
    /// The caller must ensure that the firmware advertised the IMCR. On other machines these
    /// ports may belong to another device.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self {
            select: Port::new(SELECT_PORT),
            data: Port::new(DATA_PORT),
        }
    }
}

impl Imcr for ImcrPorts {
    unsafe fn select(&mut self, register: u8) {
        self.select.write(register);
    }

    unsafe fn read(&mut self) -> u8 {
        self.data.read()
    }

    unsafe fn write(&mut self, value: u8) {
        self.data.write(value);
    }
}

/// Disconnect the PIC and deliver interrupts through the APIC. The other bits of the IMCR are
/// preserved.
///
/// # Safety
/// The IMCR must exist, and this must run at most once per boot, before interrupts are enabled.
pub unsafe fn route_through_apic<I: Imcr>(imcr: &mut I) {
    imcr.select(IMCR_INDEX);
    let value = imcr.read();
    imcr.write(value | APIC_MODE);
}
