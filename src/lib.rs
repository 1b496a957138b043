//! Discovery of the processors of a PC from the Intel MultiProcessor tables, and startup of the
//! application processors.
//!
//! The boot processor runs the whole sequence:
//! 1. [`logger::setup`] to get messages on the serial port.
//! 2. [`mp::setup`] to find the MP floating pointer, validate the configuration table, decode
//!    its entries into a [`topology::Topology`], switch the interrupt routing to the APIC if
//!    the firmware asks for it, and publish the topology.
//! 3. [`smp::register`] to tell the application processors what to run once started.
//! 4. [`smp::start_cpus`] to start them, one after the other.
//!
//! Everything that touches the hardware sits behind a trait ([`memory::PhysicalMemory`],
//! [`x86_64::imcr::Imcr`], [`smp::StartupSignal`]) so the discovery and the sequencing can be
//! tested on the host.
#![cfg_attr(not(test), no_std)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::match_bool)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

extern crate alloc;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("mpboot only supports x86_64 computers");

pub mod config;
pub mod logger;
pub mod memory;
pub mod mp;
pub mod smp;
pub mod topology;
pub mod x86_64;

#[cfg(test)]
mod test_fixtures;
