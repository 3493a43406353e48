//! Single-slot command latch between the bus interrupt and the main loop

use core::cell::Cell;
use core::num::NonZeroU8;

use critical_section::Mutex;

/// Holds at most one command byte.
///
/// The interrupt handler is the only producer and the command executor the
/// only consumer. A zero byte means "no command", so writing 0x00 to the
/// command register withdraws whatever was pending.
pub struct CommandLatch {
    slot: Mutex<Cell<Option<NonZeroU8>>>,
}

impl CommandLatch {
    pub const fn new() -> Self {
        Self { slot: Mutex::new(Cell::new(None)) }
    }

    /// Record a command byte, replacing any command not yet taken.
    pub fn post(&self, byte: u8) {
        critical_section::with(|cs| self.slot.borrow(cs).set(NonZeroU8::new(byte)));
    }

    /// Take the pending command and clear the slot in one critical section.
    pub fn take(&self) -> Option<u8> {
        critical_section::with(|cs| self.slot.borrow(cs).take()).map(NonZeroU8::get)
    }

    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).get().is_some())
    }
}

impl Default for CommandLatch {
    fn default() -> Self {
        Self::new()
    }
}
