//! A minimal 16550 UART driver, only able to transmit. The logger is its only user.
use super::io::Port;

/// The I/O base of the legacy COM ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Com {
    Com1 = 0x3F8,
    Com2 = 0x2F8,
    Com3 = 0x3E8,
    Com4 = 0x2E8,
}

/// Registers of the UART, as offsets from its I/O base. With DLAB set in the line control
/// register, the first two registers hold the baud rate divisor instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum Register {
    Data = 0,
    InterruptEnable = 1,
    FifoControl = 2,
    LineControl = 3,
    ModemControl = 4,
    LineStatus = 5,
}

const DLAB: u8 = 1 << 7;
const EIGHT_BITS_NO_PARITY_ONE_STOP: u8 = 0x03;
const TRANSMIT_EMPTY: u8 = 1 << 5;

/// 115200 / 3 = 38400 bauds.
const DIVISOR: u16 = 3;

#[derive(Debug)]
pub struct Serial {
    base: Port,
}

impl Serial {
    /// Configure the UART at `com` for 38400 bauds, 8N1, FIFO enabled, interrupts disabled.
    ///
    /// # Safety
    /// A 16550 compatible UART must be present at `com`.
    #[must_use]
    pub unsafe fn new(com: Com) -> Self {
        let serial = Self {
            base: Port::new(com as u16),
        };

        let [low, high] = DIVISOR.to_le_bytes();
        serial.write_register(Register::InterruptEnable, 0x00);
        serial.write_register(Register::LineControl, DLAB);
        serial.write_register(Register::Data, low);
        serial.write_register(Register::InterruptEnable, high);
        serial.write_register(Register::LineControl, EIGHT_BITS_NO_PARITY_ONE_STOP);
        serial.write_register(Register::FifoControl, 0xC7);
        serial.write_register(Register::ModemControl, 0x0B);
        serial
    }

    unsafe fn write_register(&self, register: Register, value: u8) {
        self.base.offset(register as u16).write(value);
    }

    unsafe fn read_register(&self, register: Register) -> u8 {
        self.base.offset(register as u16).read()
    }

    /// Send a byte, waiting for room in the transmit holding register first.
    pub fn send(&mut self, byte: u8) {
        // SAFETY: `new` checked that a UART is present.
        unsafe {
            while self.read_register(Register::LineStatus) & TRANSMIT_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.write_register(Register::Data, byte);
        }
    }
}

impl core::fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        s.bytes().for_each(|byte| self.send(byte));
        Ok(())
    }
}
