//! Host-side models of the flash controller, the I2C peripheral and the CPU
//!
//! These stand in for the chip in tests and simulations. `SimFlash` keeps
//! NOR semantics (erase sets bytes to 0xFF, programming can only clear
//! bits) and can inject the faults the driver has to survive.

use super::{BusEvents, BusFaults, Cpu, FlashController, I2cSlave};
use crate::protocol::{FLASH_SIZE, PAGE_SIZE};

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

pub struct SimFlash {
    mem: [u8; FLASH_SIZE],
    locked: bool,
    key_stage: u8,
    programming: bool,
    wrprt_error: bool,

    // fault injection
    reject_keys: bool,
    stuck_busy: bool,
    protected_below: u32,

    key_writes: u32,
    erase_count: u32,
    program_count: u32,
}

impl SimFlash {
    /// Fully erased, locked flash.
    pub fn new() -> Self {
        Self {
            mem: [0xFF; FLASH_SIZE],
            locked: true,
            key_stage: 0,
            programming: false,
            wrprt_error: false,
            reject_keys: false,
            stuck_busy: false,
            protected_below: 0,
            key_writes: 0,
            erase_count: 0,
            program_count: 0,
        }
    }

    /// Place bytes directly, as an external programmer would.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);
    }

    /// Flip bits in place, bypassing the controller.
    pub fn corrupt(&mut self, addr: u32, mask: u8) {
        self.mem[addr as usize] ^= mask;
    }

    pub fn reject_keys(&mut self, reject: bool) {
        self.reject_keys = reject;
    }

    pub fn stick_busy(&mut self, busy: bool) {
        self.stuck_busy = busy;
    }

    /// Hardware write protection for everything below `addr`.
    pub fn protect_below(&mut self, addr: u32) {
        self.protected_below = addr;
    }

    pub fn key_writes(&self) -> u32 {
        self.key_writes
    }

    pub fn erase_count(&self) -> u32 {
        self.erase_count
    }

    pub fn program_count(&self) -> u32 {
        self.program_count
    }

    fn writable(&self, addr: u32) -> bool {
        !self.locked && addr >= self.protected_below && (addr as usize) < FLASH_SIZE
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashController for SimFlash {
    fn is_locked(&self) -> bool {
        self.locked
    }

    fn write_key(&mut self, key: u32) {
        self.key_writes += 1;
        self.key_stage = match (self.key_stage, key) {
            (0, KEY1) => 1,
            (1, KEY2) => {
                if !self.reject_keys {
                    self.locked = false;
                }
                0
            }
            _ => 0,
        };
    }

    fn lock(&mut self) {
        self.locked = true;
        self.key_stage = 0;
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy
    }

    fn write_protect_error(&self) -> bool {
        self.wrprt_error
    }

    fn clear_write_protect_error(&mut self) {
        self.wrprt_error = false;
    }

    fn start_page_erase(&mut self, addr: u32) {
        if !self.writable(addr) {
            self.wrprt_error = true;
            return;
        }
        let start = addr as usize & !(PAGE_SIZE - 1);
        self.mem[start..start + PAGE_SIZE].fill(0xFF);
        self.erase_count += 1;
    }

    fn end_page_erase(&mut self) {}

    fn begin_program(&mut self) {
        self.programming = true;
    }

    fn program_word(&mut self, addr: u32, word: u32) {
        if !self.programming || !self.writable(addr) || addr % 4 != 0 {
            self.wrprt_error = true;
            return;
        }
        let at = addr as usize;
        for (cell, byte) in self.mem[at..at + 4].iter_mut().zip(word.to_le_bytes()) {
            *cell &= byte;
        }
        self.program_count += 1;
    }

    fn end_program(&mut self) {
        self.programming = false;
    }

    fn memory(&self, addr: u32, len: usize) -> &[u8] {
        let start = (addr as usize).min(FLASH_SIZE);
        let end = start.saturating_add(len).min(FLASH_SIZE);
        &self.mem[start..end]
    }
}

/// I2C peripheral driven from the controller side one event at a time.
///
/// Each transaction helper raises the same event sequence the hardware
/// would and calls `isr` once per event.
#[derive(Default)]
pub struct SimBus {
    pending: BusEvents,
    rx: u8,
    tx: Option<u8>,
    faults: BusFaults,
    stops_cleared: u32,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stops_cleared(&self) -> u32 {
        self.stops_cleared
    }

    pub fn pending_faults(&self) -> BusFaults {
        self.faults
    }

    /// Write transaction: `bytes[0]` is the register address, the rest data.
    pub fn write(&mut self, bytes: &[u8], mut isr: impl FnMut(&mut SimBus)) {
        self.start_write(bytes, &mut isr);
        self.stop(&mut isr);
    }

    /// Write the register address, repeated start, then read `out.len()` bytes.
    pub fn read(&mut self, reg: u8, out: &mut [u8], mut isr: impl FnMut(&mut SimBus)) {
        self.start_write(&[reg], &mut isr);
        self.step(
            BusEvents { address_matched: true, transmitting: true, ..Default::default() },
            &mut isr,
        );
        for (i, byte) in out.iter_mut().enumerate() {
            if i > 0 {
                self.step(BusEvents { transmit_empty: true, ..Default::default() }, &mut isr);
            }
            // Nothing loaded reads as an idle, pulled-up bus
            *byte = self.tx.take().unwrap_or(0xFF);
        }
        self.stop(&mut isr);
    }

    /// Address and data bytes with no stop, as when the controller gives up.
    pub fn start_write(&mut self, bytes: &[u8], isr: &mut impl FnMut(&mut SimBus)) {
        self.step(BusEvents { address_matched: true, ..Default::default() }, isr);
        for &byte in bytes {
            self.rx = byte;
            self.step(BusEvents { byte_received: true, ..Default::default() }, isr);
        }
    }

    /// Raise `faults` and run the error handler.
    pub fn fault(&mut self, faults: BusFaults, mut isr: impl FnMut(&mut SimBus)) {
        self.faults = faults;
        isr(self);
    }

    fn stop(&mut self, isr: &mut impl FnMut(&mut SimBus)) {
        self.step(BusEvents { stop: true, ..Default::default() }, isr);
    }

    fn step(&mut self, events: BusEvents, isr: &mut impl FnMut(&mut SimBus)) {
        self.pending = events;
        isr(self);
        self.pending = BusEvents::default();
    }
}

impl I2cSlave for SimBus {
    fn events(&mut self) -> BusEvents {
        self.pending
    }

    fn read_byte(&mut self) -> u8 {
        self.rx
    }

    fn write_byte(&mut self, byte: u8) {
        self.tx = Some(byte);
    }

    fn clear_stop(&mut self) {
        self.stops_cleared += 1;
    }

    fn faults(&mut self) -> BusFaults {
        self.faults
    }

    fn clear_faults(&mut self, faults: BusFaults) {
        self.faults.bus_error &= !faults.bus_error;
        self.faults.arbitration_lost &= !faults.arbitration_lost;
        self.faults.ack_failure &= !faults.ack_failure;
        self.faults.overrun &= !faults.overrun;
    }
}

/// CPU whose control transfers end the current test by panicking.
pub struct SimCpu;

impl Cpu for SimCpu {
    fn jump_to_application(&mut self, entry: u32) -> ! {
        panic!("jump to application at {:#x}", entry)
    }

    fn system_reset(&mut self) -> ! {
        panic!("system reset")
    }
}
