//! Update client linked into application firmware
//!
//! Serves the 0xE0-0xE7 register range from the application's own I2C
//! handler. Writing [`UPDATE_TRIGGER`] to the command register records an
//! update request in the boot-state page and resets into the bootloader.

use crate::drivers::flash::{self, Flash};
use crate::hal::{Cpu, FlashController};
use crate::logger::{error, info};
use crate::protocol::registers::{byte_lane, set_lane_u16, set_lane_u32, REG_APP_BL_VERSION, REG_APP_UPDATE_CRC_3};
use crate::protocol::{BootState, ClientRegister, Register, PROTOCOL_VERSION, UPDATE_TRIGGER};

/// Outcome of a single register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteResult {
    Accepted,
    /// Address outside the client range; the application handles it
    Unhandled,
}

/// Whether `reg` belongs to the client range.
pub fn handles_register(reg: u8) -> bool {
    (REG_APP_BL_VERSION..=REG_APP_UPDATE_CRC_3).contains(&reg)
}

pub struct UpdateClient<C: FlashController, P: Cpu> {
    flash: Flash<C>,
    cpu: P,
    update_size: u16,
    update_crc: u32,
}

impl<C: FlashController, P: Cpu> UpdateClient<C, P> {
    pub fn new(flash: Flash<C>, cpu: P) -> Self {
        Self { flash, cpu, update_size: 0, update_crc: 0 }
    }

    /// Expected image size staged by the bus controller.
    pub fn update_size(&self) -> u16 {
        self.update_size
    }

    /// Expected image CRC staged by the bus controller.
    pub fn update_crc(&self) -> u32 {
        self.update_crc
    }

    pub fn flash(&self) -> &Flash<C> {
        &self.flash
    }

    pub fn release(self) -> (Flash<C>, P) {
        (self.flash, self.cpu)
    }

    pub fn read_register(&self, reg: u8) -> u8 {
        match Register::from(reg) {
            Register::Client(ClientRegister::BootloaderVersion) => PROTOCOL_VERSION,
            Register::Client(ClientRegister::UpdateSize(lane)) => byte_lane(self.update_size.into(), lane),
            Register::Client(ClientRegister::UpdateCrc(lane)) => byte_lane(self.update_crc, lane),
            _ => 0xFF,
        }
    }

    /// Apply one byte. Writing the trigger value does not return.
    pub fn write_register(&mut self, reg: u8, value: u8) -> WriteResult {
        let reg = match Register::from(reg) {
            Register::Client(reg) => reg,
            _ => return WriteResult::Unhandled,
        };

        match reg {
            ClientRegister::UpdateCommand if value == UPDATE_TRIGGER => self.request_update(),
            ClientRegister::UpdateSize(lane) => self.update_size = set_lane_u16(self.update_size, lane, value),
            ClientRegister::UpdateCrc(lane) => self.update_crc = set_lane_u32(self.update_crc, lane, value),
            ClientRegister::UpdateCommand | ClientRegister::BootloaderVersion => {}
        }
        WriteResult::Accepted
    }

    /// Apply a burst starting at `reg`, one register per byte.
    pub fn process_write(&mut self, reg: u8, buf: &[u8]) {
        for (i, &byte) in buf.iter().enumerate() {
            self.write_register(reg.wrapping_add(i as u8), byte);
        }
    }

    /// Persist an update request and reset into the bootloader.
    ///
    /// The reset happens even if the record could not be written; the
    /// bootloader then only stays resident if the application is invalid.
    pub fn request_update(&mut self) -> ! {
        info!(
            "entering update mode, {=u16} bytes expected, crc {=u32:#x}",
            self.update_size, self.update_crc
        );
        if let Err(e) = self.record_request() {
            error!("update request not recorded: {}", e);
        }
        self.cpu.system_reset()
    }

    fn record_request(&mut self) -> flash::Result<()> {
        self.flash.write_boot_state(&BootState::update_requested())
    }
}
