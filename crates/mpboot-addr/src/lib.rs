//! Address types shared by the MP discovery code and the AP bootstrap sequencer.
//!
//! Firmware tables only ever hand out physical addresses, while the boot processor reaches
//! them (and the local APIC registers) through the higher-half direct map. Keeping the two
//! kinds of address in distinct types makes it impossible to write a physical table pointer
//! where a stack pointer is expected.
#![cfg_attr(not(test), no_std)]

mod phys;
mod virt;

pub use phys::{InvalidPhysical, Physical};
pub use virt::{InvalidVirtual, Virtual};

/// Base of the higher-half direct map. Physical address `p` is reachable at
/// `DIRECT_MAP_BASE + p` once the bootloader has set up the kernel page tables.
pub const DIRECT_MAP_BASE: u64 = 0xFFFF_8000_0000_0000;
