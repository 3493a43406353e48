//! Bus side of the bootloader: register file and the I2C event handler
//!
//! `SharedRegisters` is the only state the interrupt handler and the main
//! loop have in common. Ownership of its fields is split:
//!
//! * the bus handler writes the page buffer, page address and expected CRC,
//!   and posts command bytes to the latch;
//! * the command executor takes from the latch and writes status, error and
//!   the reported hardware type.
//!
//! Each side only reads what the other writes, always inside a critical
//! section, and the handler never waits on anything.

use core::cell::RefCell;

use critical_section::Mutex;

use super::latch::CommandLatch;
use crate::config::{BL_VERSION_MAJOR, BL_VERSION_MINOR};
use crate::hal::I2cSlave;
use crate::logger::{trace, warn};
use crate::protocol::registers::{byte_lane, set_lane_u16, set_lane_u32};
use crate::protocol::{
    BootloaderRegister, CommonRegister, ErrorCode, Register, Status, BOOTLOADER_MODE_FLAG, PAGE_SIZE,
    PROTOCOL_VERSION,
};

pub struct RegisterFile {
    status: Status,
    error: ErrorCode,
    hw_type: u8,
    page: [u8; PAGE_SIZE],
    page_index: usize,
    page_addr: u16,
    expected_crc: u32,
}

impl RegisterFile {
    const fn new() -> Self {
        Self {
            status: Status::Idle,
            error: ErrorCode::None,
            hw_type: 0,
            page: [0xFF; PAGE_SIZE],
            page_index: 0,
            page_addr: 0,
            expected_crc: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> ErrorCode {
        self.error
    }

    pub fn page(&self) -> &[u8; PAGE_SIZE] {
        &self.page
    }

    /// Bytes received into the page buffer in the current write.
    pub fn page_fill(&self) -> usize {
        self.page_index
    }

    pub fn page_addr(&self) -> u16 {
        self.page_addr
    }

    pub fn expected_crc(&self) -> u32 {
        self.expected_crc
    }

    pub(super) fn begin_command(&mut self) {
        self.status = Status::Busy;
        self.error = ErrorCode::None;
    }

    pub(super) fn complete(&mut self, outcome: core::result::Result<(), ErrorCode>) {
        match outcome {
            Ok(()) => {
                self.status = Status::Success;
                self.error = ErrorCode::None;
            }
            Err(code) => {
                self.status = Status::Error;
                self.error = code;
            }
        }
    }

    pub(super) fn set_hw_type(&mut self, hw_type: u8) {
        self.hw_type = hw_type;
    }

    /// Start filling the page buffer from its first byte again.
    pub(super) fn rewind_page(&mut self) {
        self.page_index = 0;
    }

    pub(super) fn read(&self, reg: Register) -> u8 {
        match reg {
            Register::Common(CommonRegister::HwType) => self.hw_type | BOOTLOADER_MODE_FLAG,
            Register::Common(CommonRegister::FwVersionMajor) => BL_VERSION_MAJOR,
            Register::Common(CommonRegister::FwVersionMinor) => BL_VERSION_MINOR,
            Register::Bootloader(BootloaderRegister::ProtocolVersion) => PROTOCOL_VERSION,
            Register::Bootloader(BootloaderRegister::Status) => self.status as u8,
            Register::Bootloader(BootloaderRegister::Error) => self.error as u8,
            Register::Bootloader(BootloaderRegister::ExpectedCrc(lane)) => byte_lane(self.expected_crc, lane),
            _ => 0xFF,
        }
    }

    pub(super) fn write(&mut self, reg: Register, byte: u8) {
        match reg {
            Register::Bootloader(BootloaderRegister::PageData) => {
                // Anything past one page is dropped
                if self.page_index < PAGE_SIZE {
                    self.page[self.page_index] = byte;
                    self.page_index += 1;
                }
            }
            Register::Bootloader(BootloaderRegister::PageAddress(lane)) => {
                self.page_addr = set_lane_u16(self.page_addr, lane, byte);
            }
            Register::Bootloader(BootloaderRegister::ExpectedCrc(lane)) => {
                self.expected_crc = set_lane_u32(self.expected_crc, lane, byte);
            }
            other => trace!("ignoring write to {}", other),
        }
    }
}

/// Register file and command latch shared between interrupt and main loop.
pub struct SharedRegisters {
    file: Mutex<RefCell<RegisterFile>>,
    latch: CommandLatch,
}

impl SharedRegisters {
    pub const fn new() -> Self {
        Self {
            file: Mutex::new(RefCell::new(RegisterFile::new())),
            latch: CommandLatch::new(),
        }
    }

    /// Run `f` on the register file inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut RegisterFile) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.file.borrow_ref_mut(cs)))
    }

    pub fn latch(&self) -> &CommandLatch {
        &self.latch
    }

    pub fn status(&self) -> Status {
        self.with(|file| file.status())
    }

    pub fn error(&self) -> ErrorCode {
        self.with(|file| file.error())
    }
}

impl Default for SharedRegisters {
    fn default() -> Self {
        Self::new()
    }
}

/// I2C slave state machine, called from the event and error interrupts.
pub struct BusHandler<'a> {
    regs: &'a SharedRegisters,
    reg_addr: u8,
    addr_received: bool,
    tx_mode: bool,
    window_read: usize,
}

impl<'a> BusHandler<'a> {
    pub fn new(regs: &'a SharedRegisters) -> Self {
        Self {
            regs,
            reg_addr: 0,
            addr_received: false,
            tx_mode: false,
            window_read: 0,
        }
    }

    /// Current register cursor.
    pub fn register(&self) -> u8 {
        self.reg_addr
    }

    pub fn is_transmitting(&self) -> bool {
        self.tx_mode
    }

    pub fn on_event<B: I2cSlave>(&mut self, bus: &mut B) {
        let events = bus.events();

        if events.address_matched {
            self.tx_mode = events.transmitting;
            if self.tx_mode {
                self.window_read = 0;
                self.transmit(bus);
            } else {
                self.addr_received = false;
                self.regs.with(|file| file.rewind_page());
            }
        }

        if events.byte_received {
            let byte = bus.read_byte();
            if self.addr_received {
                self.receive(byte);
            } else {
                self.reg_addr = byte;
                self.addr_received = true;
                self.regs.with(|file| file.rewind_page());
            }
        }

        // The first byte of a read already went out with the address match
        if events.transmit_empty && self.tx_mode && !events.address_matched {
            self.transmit(bus);
        }

        if events.stop {
            bus.clear_stop();
            self.tx_mode = false;
            self.addr_received = false;
        }
    }

    /// Clear whatever went wrong and wait for the controller to start over.
    pub fn on_error<B: I2cSlave>(&mut self, bus: &mut B) {
        let faults = bus.faults();
        if faults.any() {
            warn!("i2c fault {}", faults);
        }
        bus.clear_faults(faults);
        self.tx_mode = false;
        self.addr_received = false;
    }

    fn transmit<B: I2cSlave>(&mut self, bus: &mut B) {
        let reg = Register::from(self.reg_addr);
        let value = if reg.is_window() {
            let at = self.window_read;
            self.window_read += 1;
            self.regs.with(|file| file.page.get(at).copied().unwrap_or(0xFF))
        } else {
            self.regs.with(|file| file.read(reg))
        };
        bus.write_byte(value);
        self.advance(reg);
    }

    fn receive(&mut self, byte: u8) {
        let reg = Register::from(self.reg_addr);
        match reg {
            Register::Bootloader(BootloaderRegister::Command) => self.regs.latch().post(byte),
            _ => self.regs.with(|file| file.write(reg, byte)),
        }
        self.advance(reg);
    }

    fn advance(&mut self, reg: Register) {
        if !reg.is_window() {
            self.reg_addr = self.reg_addr.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimBus;
    use crate::hal::BusFaults;
    use crate::protocol::registers::*;

    fn write(handler: &mut BusHandler<'_>, bus: &mut SimBus, bytes: &[u8]) {
        bus.write(bytes, |bus| handler.on_event(bus));
    }

    fn read<const N: usize>(handler: &mut BusHandler<'_>, bus: &mut SimBus, reg: u8) -> [u8; N] {
        let mut out = [0u8; N];
        bus.read(reg, &mut out, |bus| handler.on_event(bus));
        out
    }

    #[test]
    fn common_registers_report_bootloader_mode() {
        let regs = SharedRegisters::new();
        regs.with(|file| file.set_hw_type(4));
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        let out: [u8; 3] = read(&mut handler, &mut bus, REG_HW_TYPE);
        assert_eq!(out, [0x84, BL_VERSION_MAJOR, BL_VERSION_MINOR]);

        let out: [u8; 3] = read(&mut handler, &mut bus, REG_BL_VERSION);
        assert_eq!(out, [PROTOCOL_VERSION, Status::Idle as u8, ErrorCode::None as u8]);
    }

    #[test]
    fn unmapped_and_write_only_registers_read_as_ff() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        let out: [u8; 2] = read(&mut handler, &mut bus, 0x10);
        assert_eq!(out, [0xFF, 0xFF]);
        let out: [u8; 3] = read(&mut handler, &mut bus, REG_BL_CMD);
        assert_eq!(out, [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn burst_writes_fill_little_endian_fields() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        write(&mut handler, &mut bus, &[REG_BL_ADDR_L, 0x40, 0x01]);
        write(&mut handler, &mut bus, &[REG_BL_CRC_0, 0x26, 0x39, 0xF4, 0xCB]);

        assert_eq!(regs.with(|f| f.page_addr()), 0x0140);
        assert_eq!(regs.with(|f| f.expected_crc()), 0xCBF4_3926);

        let out: [u8; 4] = read(&mut handler, &mut bus, REG_BL_CRC_0);
        assert_eq!(out, [0x26, 0x39, 0xF4, 0xCB]);
    }

    #[test]
    fn page_window_streams_and_drops_overflow() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        let mut frame = [0u8; 1 + PAGE_SIZE + 6];
        frame[0] = REG_BL_DATA;
        for (i, b) in frame[1..].iter_mut().enumerate() {
            *b = i as u8;
        }
        write(&mut handler, &mut bus, &frame);

        regs.with(|file| {
            assert_eq!(file.page_fill(), PAGE_SIZE);
            assert_eq!(&file.page()[..], &frame[1..=PAGE_SIZE]);
        });
        assert_eq!(handler.register(), REG_BL_DATA);

        let out: [u8; 4] = read(&mut handler, &mut bus, REG_BL_DATA);
        assert_eq!(out, [0, 1, 2, 3]);
    }

    #[test]
    fn new_write_restarts_the_page_buffer() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        write(&mut handler, &mut bus, &[REG_BL_DATA, 0xAA, 0xBB]);
        write(&mut handler, &mut bus, &[REG_BL_DATA, 0x11]);
        regs.with(|file| {
            assert_eq!(file.page_fill(), 1);
            assert_eq!(file.page()[..2], [0x11, 0xBB]);
        });
    }

    #[test]
    fn command_byte_goes_to_latch_only() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        write(&mut handler, &mut bus, &[REG_BL_CMD, 0x03]);
        assert_eq!(regs.latch().take(), Some(0x03));
        assert_eq!(regs.status(), Status::Idle);
    }

    #[test]
    fn status_and_error_are_read_only() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        write(&mut handler, &mut bus, &[REG_BL_STATUS, 0x40, 0x05]);
        assert_eq!(regs.status(), Status::Idle);
        assert_eq!(regs.error(), ErrorCode::None);
        assert!(!regs.latch().is_pending());
    }

    #[test]
    fn stop_returns_to_neutral() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        let _: [u8; 1] = read(&mut handler, &mut bus, REG_BL_STATUS);
        assert!(!handler.is_transmitting());
        assert_eq!(bus.stops_cleared(), 1);
    }

    #[test]
    fn fault_resets_state_and_clears_flags() {
        let regs = SharedRegisters::new();
        let mut handler = BusHandler::new(&regs);
        let mut bus = SimBus::new();

        // Controller loses arbitration halfway through a CRC write
        bus.start_write(&[REG_BL_CRC_0, 0x11], &mut |bus: &mut SimBus| handler.on_event(bus));
        let faults = BusFaults { arbitration_lost: true, ack_failure: true, ..Default::default() };
        bus.fault(faults, |bus| handler.on_error(bus));

        assert!(!bus.pending_faults().any());
        assert!(!handler.is_transmitting());
        assert_eq!(regs.with(|f| f.expected_crc()), 0x11);

        // The retried transaction starts cleanly with a register address
        write(&mut handler, &mut bus, &[REG_BL_CRC_0, 0x22, 0x33]);
        assert_eq!(regs.with(|f| f.expected_crc()), 0x3322);
    }
}
