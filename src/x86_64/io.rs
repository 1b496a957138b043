//! Byte-wide port I/O. Every device this crate talks to through ports (the UART, the IMCR and
//! the POST diagnostic port) is 8 bits wide.
use super::instruction::{inb, outb};

/// An 8-bit I/O port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port(u16);

impl Port {
    #[must_use]
    pub const fn new(number: u16) -> Self {
        Self(number)
    }

    /// The port `offset` ports after this one, for devices with several consecutive registers.
    #[must_use]
    pub const fn offset(self, offset: u16) -> Self {
        Self(self.0 + offset)
    }

    #[must_use]
    pub const fn number(self) -> u16 {
        self.0
    }

    /// # Safety
    /// The device behind the port may react to the write in any way, including corrupting
    /// memory through DMA.
    pub unsafe fn write(self, value: u8) {
        outb(self.0, value);
    }

    /// # Safety
    /// Reading some device registers has side effects, such as acknowledging an interrupt.
    #[must_use]
    pub unsafe fn read(self) -> u8 {
        inb(self.0)
    }
}

/// The POST diagnostic port. Nothing listens on it after the firmware has booted, and a write
/// to it takes about a microsecond on the ISA bus.
const POST: Port = Port::new(0x80);

/// Wait for about a microsecond. This is the only delay available before any timer has been
/// calibrated.
///
/// # Safety
/// Nothing must be listening on port `0x80`.
pub unsafe fn pause() {
    POST.write(0);
}

/// Wait for roughly `us` microseconds. See [`pause`].
///
/// # Safety
/// See [`pause`].
pub unsafe fn delay_us(us: u32) {
    (0..us).for_each(|_| pause());
}
