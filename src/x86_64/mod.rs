//! The x86_64 hardware touched during the bring-up: port I/O, the COM1 serial port used by the
//! logger, the IMCR and the local APIC.
pub mod imcr;
pub mod instruction;
pub mod io;
pub mod lapic;
pub mod serial;

pub use instruction::freeze;
