use core::arch::asm;

/// Write `value` to the I/O port `port`.
///
/// # Safety
/// See [`super::io::Port::write`].
#[inline(always)]
pub unsafe fn outb(port: u16, value: u8) {
    asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
}

/// Read a byte from the I/O port `port`.
///
/// # Safety
/// See [`super::io::Port::read`].
#[must_use]
#[inline(always)]
pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
    value
}

/// Stop the current core for good: interrupts are masked, then the core halts. A non maskable
/// interrupt can still wake it up, hence the loop.
#[cold]
pub fn freeze() -> ! {
    loop {
        // SAFETY: the core never runs anything else afterward.
        unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
    }
}
