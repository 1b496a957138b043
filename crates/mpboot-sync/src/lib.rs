//! Synchronization primitives used during SMP bring-up. Locks are reexported from the `spin`
//! crate; the only primitive implemented here is [`Flag`], the handshake between the boot
//! processor and an application processor.
#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicBool, Ordering};

pub type Spinlock<T> = spin::Mutex<T>;
pub type Lazy<T> = spin::Lazy<T>;
pub type Once<T> = spin::Once<T>;

/// A set-once flag with a single writer and a single reader.
///
/// The writer calls [`Flag::set`] exactly once, the reader polls it with [`Flag::is_set`] or
/// spins on it with [`Flag::wait`]. The flag is never cleared. This is not a lock: no side ever
/// blocks except the reader waiting for the writer, which is the whole point of the handshake.
///
/// On `x86_64`, the release store and the acquire load compile to plain `mov` instructions, so
/// this is exactly the "write a word, poll the word" protocol an AP trampoline expects.
#[derive(Debug, Default)]
pub struct Flag(AtomicBool);

impl Flag {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Set the flag. Every write made by the current CPU before this call is visible to the
    /// reader once it observes the flag.
    pub fn set(&self) {
        let previous = self.0.swap(true, Ordering::Release);
        debug_assert!(!previous, "Flag set twice");
    }

    /// Return `true` if the flag has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Busy-wait until the flag is set. There is no timeout: if the writer never runs, this
    /// never returns.
    pub fn wait(&self) {
        while !self.is_set() {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn flag_starts_clear() {
        let flag = Flag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }

    #[test]
    fn wait_returns_once_remote_sets() {
        let flag = Arc::new(Flag::new());
        let remote = Arc::clone(&flag);

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.set();
        });

        flag.wait();
        assert!(flag.is_set());
        writer.join().unwrap();
    }

    #[test]
    fn writes_before_set_are_visible_after_wait() {
        let shared = Arc::new((Spinlock::new(0u32), Flag::new()));
        let remote = Arc::clone(&shared);

        let writer = thread::spawn(move || {
            *remote.0.lock() = 42;
            remote.1.set();
        });

        shared.1.wait();
        assert_eq!(*shared.0.lock(), 42);
        writer.join().unwrap();
    }
}
