//! Full update cycles driven the way a bus controller would drive them.

use std::panic::{catch_unwind, AssertUnwindSafe};

use i2c_bootloader::bootloader::{self, BusHandler, Launch, Resident, SharedRegisters, Startup};
use i2c_bootloader::client::UpdateClient;
use i2c_bootloader::drivers::Flash;
use i2c_bootloader::hal::sim::{SimBus, SimCpu, SimFlash};
use i2c_bootloader::hal::FlashController;
use i2c_bootloader::protocol::crc;
use i2c_bootloader::protocol::registers::*;
use i2c_bootloader::protocol::{
    AppHeader, Command, ErrorCode, Status, APP_CODE_ADDR, APP_HEADER_ADDR, PAGE_SIZE, UPDATE_TRIGGER,
};

/// Bus controller talking to a resident bootloader.
struct Controller<'a> {
    bus: SimBus,
    handler: BusHandler<'a>,
    resident: Resident<'a, SimFlash>,
}

impl<'a> Controller<'a> {
    fn attach(sim: SimFlash, regs: &'a SharedRegisters) -> Self {
        let resident = match bootloader::start(sim, regs, || {}) {
            Startup::Resident(resident) => resident,
            Startup::Launch(launch) => panic!("launched {:#x} instead of staying resident", launch.entry),
        };
        Self { bus: SimBus::new(), handler: BusHandler::new(regs), resident }
    }

    fn write(&mut self, bytes: &[u8]) {
        let handler = &mut self.handler;
        self.bus.write(bytes, |bus| handler.on_event(bus));
    }

    fn read<const N: usize>(&mut self, reg: u8) -> [u8; N] {
        let mut out = [0u8; N];
        let handler = &mut self.handler;
        self.bus.read(reg, &mut out, |bus| handler.on_event(bus));
        out
    }

    /// Issue a command, let the main loop run once, read status and error.
    fn command(&mut self, cmd: Command) -> (u8, u8, Option<Launch>) {
        self.write(&[REG_BL_CMD, cmd as u8]);
        let launch = self.resident.poll();
        let [status, error] = self.read(REG_BL_STATUS);
        (status, error, launch)
    }

    fn write_page(&mut self, offset: u16, data: &[u8]) -> (u8, u8) {
        let mut frame = vec![REG_BL_DATA];
        frame.extend_from_slice(data);
        frame.resize(1 + PAGE_SIZE, 0xFF);

        let [lo, hi] = offset.to_le_bytes();
        self.write(&[REG_BL_ADDR_L, lo, hi]);
        self.write(&frame);
        let (status, error, _) = self.command(Command::Write);
        (status, error)
    }

    fn set_crc(&mut self, crc: u32) {
        let mut frame = vec![REG_BL_CRC_0];
        frame.extend_from_slice(&crc.to_le_bytes());
        self.write(&frame);
    }

    fn flash(&self) -> &SimFlash {
        self.resident.executor().flash().controller()
    }
}

fn firmware(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn upload(ctl: &mut Controller<'_>, header: &AppHeader, code: &[u8]) {
    assert_eq!(ctl.write_page(0, &header.to_bytes()), (Status::Success as u8, 0));
    for (i, chunk) in code.chunks(PAGE_SIZE).enumerate() {
        let offset = ((i + 1) * PAGE_SIZE) as u16;
        assert_eq!(ctl.write_page(offset, chunk), (Status::Success as u8, 0), "page {}", i);
    }
}

#[test]
fn blank_device_is_programmed_and_booted() {
    let regs = SharedRegisters::new();
    let mut ctl = Controller::attach(SimFlash::new(), &regs);

    let [hw, major, minor] = ctl.read(REG_HW_TYPE);
    assert_eq!((hw, major, minor), (0x80, 1, 0));
    assert_eq!(ctl.read::<1>(REG_BL_VERSION), [1]);

    let code = firmware(1000, 3);
    let header = AppHeader::for_image(&code, 2, 5, 9);

    let (status, error, _) = ctl.command(Command::Erase);
    assert_eq!((status, error), (Status::Success as u8, ErrorCode::None as u8));
    upload(&mut ctl, &header, &code);

    ctl.set_crc(crc::crc32(&code));
    assert_eq!(ctl.read::<4>(REG_BL_CRC_0), crc::crc32(&code).to_le_bytes());
    let (status, _, launch) = ctl.command(Command::Verify);
    assert_eq!(status, Status::Success as u8);
    assert!(launch.is_none());

    let (status, _, launch) = ctl.command(Command::Boot);
    assert_eq!(status, Status::Success as u8);
    let launch = launch.expect("valid image should boot");
    assert_eq!(launch.entry, APP_CODE_ADDR);
    assert_eq!(launch.header, header);

    assert_eq!(ctl.read::<1>(REG_HW_TYPE), [0x89]);
    assert!(ctl.flash().is_locked());
}

#[test]
fn interrupted_upload_is_refused_at_boot() {
    let regs = SharedRegisters::new();
    let mut ctl = Controller::attach(SimFlash::new(), &regs);

    let code = firmware(400, 11);
    let header = AppHeader::for_image(&code, 1, 0, 0);

    ctl.command(Command::Erase);
    ctl.write_page(0, &header.to_bytes());
    ctl.write_page(PAGE_SIZE as u16, &code[..PAGE_SIZE]);

    ctl.set_crc(header.app_crc32);
    let (status, error, _) = ctl.command(Command::Verify);
    assert_eq!((status, error), (Status::Error as u8, ErrorCode::CrcMismatch as u8));

    // Boot is accepted as a command but the image does not validate
    let (status, _, launch) = ctl.command(Command::Boot);
    assert_eq!(status, Status::Success as u8);
    assert!(launch.is_none());
    assert_eq!(ctl.resident.post_code(), bootloader::PostCode::CrcMismatch);
}

#[test]
fn bad_requests_are_reported_over_the_bus() {
    let regs = SharedRegisters::new();
    let mut ctl = Controller::attach(SimFlash::new(), &regs);

    ctl.write(&[REG_BL_CMD, 0x09]);
    ctl.resident.poll();
    assert_eq!(ctl.read::<2>(REG_BL_STATUS), [Status::Error as u8, ErrorCode::InvalidCommand as u8]);

    let (status, error) = ctl.write_page(0x0003, &[0u8; PAGE_SIZE]);
    assert_eq!((status, error), (Status::Error as u8, ErrorCode::InvalidAddress as u8));

    // Without an erase the second write cannot turn zeros back into ones
    ctl.write_page(0x0040, &[0u8; PAGE_SIZE]);
    let (status, error) = ctl.write_page(0x0040, &[0xFFu8; PAGE_SIZE]);
    assert_eq!((status, error), (Status::Error as u8, ErrorCode::FlashWrite as u8));

    assert_eq!(ctl.flash().erase_count(), 0);
    assert!(ctl.flash().memory(APP_HEADER_ADDR, PAGE_SIZE).iter().all(|&b| b == 0xFF));
}

#[test]
fn only_the_latest_command_is_kept() {
    let regs = SharedRegisters::new();
    let mut ctl = Controller::attach(SimFlash::new(), &regs);

    // Two commands before the main loop runs: only Verify executes
    ctl.write(&[REG_BL_CMD, Command::Erase as u8]);
    ctl.write(&[REG_BL_CMD, Command::Verify as u8]);
    assert_eq!(ctl.read::<1>(REG_BL_STATUS), [Status::Idle as u8]);

    ctl.resident.poll();
    assert_eq!(ctl.read::<1>(REG_BL_ERROR), [ErrorCode::AppInvalid as u8]);
    assert_eq!(ctl.flash().erase_count(), 0);
    assert!(ctl.resident.poll().is_none());
}

#[test]
fn application_requests_update_and_is_replaced() {
    let old_code = firmware(300, 1);
    let mut sim = SimFlash::new();
    sim.load(APP_HEADER_ADDR, &AppHeader::for_image(&old_code, 1, 0, 4).to_bytes());
    sim.load(APP_CODE_ADDR, &old_code);

    // Running application: controller stages size and CRC, then triggers
    let new_code = firmware(700, 42);
    let mut client = UpdateClient::new(Flash::new(sim), SimCpu);
    client.process_write(REG_APP_UPDATE_SIZE_L, &(new_code.len() as u16).to_le_bytes());
    client.process_write(REG_APP_UPDATE_CRC_0, &crc::crc32(&new_code).to_le_bytes());
    assert_eq!(client.read_register(REG_APP_UPDATE_SIZE_L), (new_code.len() & 0xFF) as u8);

    let reset = catch_unwind(AssertUnwindSafe(|| {
        client.write_register(REG_APP_UPDATE_CMD, UPDATE_TRIGGER);
    }));
    assert!(reset.is_err());
    let (flash, _cpu) = client.release();
    assert!(flash.boot_state().is_update_requested());

    // The old image is still valid, so a plain reset would run it again.
    // The controller erases it from a resident bootloader instead; model
    // that by damaging the header as a failed earlier update would.
    let mut sim = flash.release();
    sim.corrupt(APP_HEADER_ADDR, 0xFF);

    let regs = SharedRegisters::new();
    let mut ctl = Controller::attach(sim, &regs);
    ctl.command(Command::Erase);
    let header = AppHeader::for_image(&new_code, 2, 0, 4);
    upload(&mut ctl, &header, &new_code);
    ctl.set_crc(crc::crc32(&new_code));
    assert_eq!(ctl.command(Command::Verify).0, Status::Success as u8);

    let launch = ctl.command(Command::Boot).2.expect("new image should boot");
    assert_eq!(launch.header.fw_ver_major, 2);
    // Erase already dropped the request along with the old image
    assert!(!ctl.resident.executor().flash().boot_state().is_update_requested());
}
