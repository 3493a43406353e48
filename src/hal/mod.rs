//! Hardware capabilities the protocol logic is written against
//!
//! The bootloader never touches peripheral registers directly. It talks to
//! these traits; `ch32v003` implements them for the real chip and `sim`
//! implements them on the host.

#[cfg(all(feature = "ch32v003", target_arch = "riscv32"))]
pub mod ch32v003;
pub mod sim;

/// Raw flash-control block (key register, lock, status flags, program and
/// erase modes) plus a memory-mapped read window.
///
/// Methods map one-to-one onto register accesses and never wait; polling,
/// guards and timeouts live in `drivers::flash`.
pub trait FlashController {
    fn is_locked(&self) -> bool;
    /// Feed one word of the unlock key sequence.
    fn write_key(&mut self, key: u32);
    fn lock(&mut self);

    fn is_busy(&self) -> bool;
    fn write_protect_error(&self) -> bool;
    fn clear_write_protect_error(&mut self);

    /// Select page-erase mode, latch `addr` and start the erase.
    fn start_page_erase(&mut self, addr: u32);
    fn end_page_erase(&mut self);

    fn begin_program(&mut self);
    /// Program one 32-bit word. Completion is reported through `is_busy`.
    fn program_word(&mut self, addr: u32, word: u32);
    fn end_program(&mut self);

    /// Live view of flash content, no copy.
    fn memory(&self, addr: u32, len: usize) -> &[u8];
}

/// Flags decoded from one I2C event interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusEvents {
    /// Own address matched; `transmitting` says which direction
    pub address_matched: bool,
    /// Controller is reading from us
    pub transmitting: bool,
    pub byte_received: bool,
    pub transmit_empty: bool,
    pub stop: bool,
}

/// Flags decoded from one I2C error interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusFaults {
    pub bus_error: bool,
    pub arbitration_lost: bool,
    pub ack_failure: bool,
    pub overrun: bool,
}

impl BusFaults {
    pub fn any(&self) -> bool {
        self.bus_error || self.arbitration_lost || self.ack_failure || self.overrun
    }
}

/// Slave-mode I2C peripheral as seen from its interrupt handlers.
pub trait I2cSlave {
    /// Read and decode pending events (clears address-match as a side effect).
    fn events(&mut self) -> BusEvents;
    fn read_byte(&mut self) -> u8;
    fn write_byte(&mut self, byte: u8);
    fn clear_stop(&mut self);

    fn faults(&mut self) -> BusFaults;
    fn clear_faults(&mut self, faults: BusFaults);
}

/// Control transfer out of the running image.
pub trait Cpu {
    /// Disable interrupts, stop the tick timer and jump to `entry`.
    fn jump_to_application(&mut self, entry: u32) -> !;
    fn system_reset(&mut self) -> !;
}
