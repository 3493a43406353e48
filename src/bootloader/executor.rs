//! Foreground half of the bootloader: runs latched commands against flash

use super::i2c::SharedRegisters;
use crate::drivers::flash::Flash;
use crate::hal::FlashController;
use crate::logger::{debug, info, warn};
use crate::protocol::{self, Command, ErrorCode, ProtocolError, APP_CODE_ADDR};

/// What the last `process` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Executed {
    /// Raw byte taken from the latch
    pub byte: u8,
    pub command: Option<Command>,
    pub outcome: Result<(), ErrorCode>,
}

impl Executed {
    pub fn is_successful_boot(&self) -> bool {
        self.command == Some(Command::Boot) && self.outcome.is_ok()
    }
}

pub struct CommandExecutor<'a, C: FlashController> {
    flash: Flash<C>,
    regs: &'a SharedRegisters,
}

impl<'a, C: FlashController> CommandExecutor<'a, C> {
    pub fn new(flash: Flash<C>, regs: &'a SharedRegisters) -> Self {
        let mut executor = Self { flash, regs };
        executor.refresh_hw_type();
        executor
    }

    pub fn flash(&self) -> &Flash<C> {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut Flash<C> {
        &mut self.flash
    }

    /// Run the pending command, if any. Called once per main-loop pass.
    pub fn process(&mut self) -> Option<Executed> {
        let byte = self.regs.latch().take()?;
        self.regs.with(|file| file.begin_command());

        let command = Command::try_from(byte).ok();
        let outcome = match command {
            Some(command) => {
                debug!("running {}", command);
                self.execute(command)
            }
            None => {
                warn!("invalid command {=u8:#x}", byte);
                Err(ErrorCode::InvalidCommand)
            }
        };

        let hw_type = self.installed_hw_type();
        self.regs.with(|file| {
            file.complete(outcome);
            file.set_hw_type(hw_type);
        });

        Some(Executed { byte, command, outcome })
    }

    fn execute(&mut self, command: Command) -> Result<(), ErrorCode> {
        match command {
            Command::Erase => self.flash.erase_app().map_err(|e| {
                warn!("erase failed: {}", e);
                ErrorCode::FlashErase
            }),
            Command::Write => self.write_page(),
            Command::Verify => self.verify().map_err(ErrorCode::from),
            // Jumping is the main loop's call, once the bus has gone quiet
            Command::Boot => Ok(()),
        }
    }

    fn write_page(&mut self) -> Result<(), ErrorCode> {
        let (offset, page) = self.regs.with(|file| (file.page_addr(), *file.page()));
        let addr = protocol::page_address(offset).map_err(|e| {
            warn!("page offset {=u16:#x} rejected", offset);
            ErrorCode::from(e)
        })?;

        self.flash.write_page(addr, &page).map_err(|e| {
            warn!("write failed at {=u32:#x}: {}", addr, e);
            ErrorCode::FlashWrite
        })
    }

    /// Compare the code CRC over the header's recorded size with the
    /// latched expectation. Oversized headers are clipped by the driver.
    fn verify(&mut self) -> protocol::Result<()> {
        let header = self.flash.app_header();
        if !header.has_valid_magic() {
            return Err(ProtocolError::BadMagic);
        }

        let expected = self.regs.with(|file| file.expected_crc());
        let actual = self.flash.calculate_crc(APP_CODE_ADDR, header.app_size);
        if actual != expected {
            info!("crc {=u32:#x}, expected {=u32:#x}", actual, expected);
            return Err(ProtocolError::CrcMismatch);
        }
        Ok(())
    }

    fn installed_hw_type(&self) -> u8 {
        let header = self.flash.app_header();
        if header.has_valid_magic() {
            header.hw_type
        } else {
            0
        }
    }

    fn refresh_hw_type(&mut self) {
        let hw_type = self.installed_hw_type();
        self.regs.with(|file| file.set_hw_type(hw_type));
    }
}
