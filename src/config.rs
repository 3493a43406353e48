//! Configuration constants for the CH32V003 bootloader

/// Core clock in Hz (HSI with PLL)
pub const SYSTEM_CORE_CLOCK_HZ: u32 = 48_000_000;

/// SysTick rate, one tick per millisecond
pub const SYSTICK_HZ: u32 = 1_000;

/// I2C bus speed in Hz
pub const I2C_SPEED_HZ: u32 = 100_000;

/// Bootloader firmware version, reported through the common version registers
pub const BL_VERSION_MAJOR: u8 = 1;
pub const BL_VERSION_MINOR: u8 = 0;

/// Upper bound on any flash busy-wait (about 1s at 48MHz)
pub const FLASH_TIMEOUT_POLLS: u32 = 1_000 * 1_000;

/// Startup blink: status and error LEDs alternate this many times
pub const STARTUP_BLINKS: u8 = 3;
pub const STARTUP_BLINK_MS: u16 = 100;
pub const STARTUP_SETTLE_MS: u16 = 200;

/// POST pattern: `code` flashes of the error LED per cycle
pub const POST_CYCLE_MS: u32 = 2_000;
pub const POST_FLASH_PERIOD_MS: u32 = 300;
pub const POST_FLASH_ON_MS: u32 = 150;

/// Grace period for the last bus transaction before jumping to the application
pub const JUMP_SETTLE_MS: u16 = 10;
