use addr::Physical;

/// Physical address of the 16-bit EBDA segment in the BIOS data area.
pub const BDA_EBDA_SEGMENT: Physical = Physical::new(0x40E);

/// Physical address of the base memory size, in KiB, in the BIOS data area.
pub const BDA_BASE_MEMORY_KIB: Physical = Physical::new(0x413);

/// Size of the windows scanned at the start of the EBDA and at the top of base memory.
pub const SCAN_WINDOW: usize = 1024;

/// The BIOS ROM region, scanned last.
pub const BIOS_ROM_BASE: Physical = Physical::new(0xF0000);
pub const BIOS_ROM_SIZE: usize = 0x10000;

/// Where the AP trampoline is copied. Must be page aligned and below 1 MiB, because a STARTUP
/// IPI can only encode the page number of a real mode address.
pub const TRAMPOLINE_BASE: Physical = Physical::new(0x7000);

/// The size of the stack given to each application processor.
pub const AP_STACK_SIZE: usize = 16 * 1024;

/// The maximum level of the messages written by the serial logger.
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
